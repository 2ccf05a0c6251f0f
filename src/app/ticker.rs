//! Timer driver - one interval task per armed countdown

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::session::TimerKind;

/// One tick from an armed countdown. `epoch` identifies the arming it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub kind: TimerKind,
    pub epoch: u64,
}

/// Delivers a [`TimerTick`] once per period for each armed countdown
pub struct TimerDriver {
    ticks: mpsc::Sender<TimerTick>,
    period: Duration,
    armed: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_epoch: u64,
}

impl TimerDriver {
    pub fn new(ticks: mpsc::Sender<TimerTick>, period: Duration) -> Self {
        Self {
            ticks,
            period,
            armed: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Arm `kind`, replacing any task already ticking for it. First tick
    /// arrives one period from now.
    pub fn start(&mut self, kind: TimerKind) {
        self.cancel(kind);

        self.next_epoch += 1;
        let tick = TimerTick {
            kind,
            epoch: self.next_epoch,
        };
        let ticks = self.ticks.clone();
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if ticks.send(tick).await.is_err() {
                    break;
                }
            }
        });

        debug!(timer = ?kind, epoch = tick.epoch, "Timer armed");
        self.armed.insert(kind, (tick.epoch, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = self.armed.remove(&kind) {
            handle.abort();
            debug!(timer = ?kind, "Timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }

    /// Whether `tick` came from the current arming of its countdown. Ticks
    /// still queued from a cancelled or replaced task are not.
    pub fn is_current(&self, tick: TimerTick) -> bool {
        matches!(self.armed.get(&tick.kind), Some((epoch, _)) if *epoch == tick.epoch)
    }

    #[cfg(test)]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }
}

impl Drop for TimerDriver {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
