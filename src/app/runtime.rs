//! Client runtime - the single control loop
//!
//! Triggers arrive on three channels (console, match server, timers) and are
//! applied to the session one at a time. The effects each transition returns
//! are executed before the next trigger is read.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ClientMsg};
use crate::session::{Countdown, Effect, SessionController, SessionSettings, TimerKind, Trigger, UserAction};
use crate::util::rate_limit::BoardUpdateLimiter;

use super::console;
use super::ticker::{TimerDriver, TimerTick};

/// Owns the session controller and everything its effects touch
pub struct ClientRuntime {
    controller: SessionController,
    outbound: mpsc::Sender<ClientMsg>,
    timers: TimerDriver,
    board_limiter: BoardUpdateLimiter,
    echo: bool,
}

impl ClientRuntime {
    pub fn new(
        settings: SessionSettings,
        outbound: mpsc::Sender<ClientMsg>,
        timers: TimerDriver,
        board_limiter: BoardUpdateLimiter,
    ) -> Self {
        Self {
            controller: SessionController::new(settings),
            outbound,
            timers,
            board_limiter,
            echo: true,
        }
    }

    #[cfg(test)]
    fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    #[cfg(test)]
    fn state(&self) -> &crate::session::SessionState {
        self.controller.state()
    }

    /// Run until the console closes
    pub async fn run(
        mut self,
        mut actions: mpsc::Receiver<UserAction>,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut ticks: mpsc::Receiver<TimerTick>,
    ) {
        info!("Client runtime started");
        self.render();

        loop {
            let trigger = tokio::select! {
                action = actions.recv() => match action {
                    Some(action) => Trigger::User(action),
                    None => break,
                },
                Some(event) = events.recv() => match event {
                    ChannelEvent::Link(link) => Trigger::Link(link),
                    ChannelEvent::Message(msg) => Trigger::Server(msg),
                },
                Some(tick) = ticks.recv() => match self.tick_trigger(tick) {
                    Some(trigger) => trigger,
                    None => continue,
                },
            };

            let ticked = match trigger {
                Trigger::Tick(kind) => Some(kind),
                _ => None,
            };
            let effects = self.dispatch(trigger);
            match ticked {
                Some(kind) if effects.is_empty() => self.show_countdown(kind),
                _ => self.render(),
            }
        }

        self.timers.cancel_all();
        info!("Client runtime stopped");
    }

    /// Ticks still queued from a cancelled or re-armed timer are dropped here
    fn tick_trigger(&self, tick: TimerTick) -> Option<Trigger> {
        if self.timers.is_current(tick) {
            Some(Trigger::Tick(tick.kind))
        } else {
            debug!(timer = ?tick.kind, epoch = tick.epoch, "Dropping tick from a stopped timer");
            None
        }
    }

    /// Apply one trigger and execute its effects. Returns the effects for inspection.
    pub fn dispatch(&mut self, trigger: Trigger) -> Vec<Effect> {
        debug!(trigger = ?trigger, "Dispatch");
        let effects = self.controller.handle(trigger);
        for effect in &effects {
            self.execute(effect);
        }
        effects
    }

    fn execute(&mut self, effect: &Effect) {
        match effect {
            Effect::Send(msg) => self.send(msg.clone()),
            Effect::StartTimer(kind) => self.timers.start(*kind),
            Effect::CancelTimer(kind) => self.timers.cancel(*kind),
            Effect::Notify(notice) => {
                if self.echo {
                    console::print_notice(notice);
                }
            }
        }
    }

    /// Fire-and-forget; a full queue drops the message rather than block the loop
    fn send(&mut self, msg: ClientMsg) {
        if matches!(msg, ClientMsg::UpdateBoard { .. }) && !self.board_limiter.check() {
            debug!("Board update rate limited");
            return;
        }
        if let Err(e) = self.outbound.try_send(msg) {
            warn!(error = %e, "Outbound message dropped");
        }
    }

    fn show_countdown(&self, kind: TimerKind) {
        let state = self.controller.state();
        if self.echo && countdown_due(state.countdown(kind)) {
            console::print_countdown(state, kind);
        }
    }

    fn render(&self) {
        if self.echo {
            console::render(self.controller.state());
        }
    }
}

/// A running countdown is reprinted every ten seconds, then every second near the end
fn countdown_due(countdown: &Countdown) -> bool {
    let remaining = countdown.remaining();
    countdown.is_running() && (remaining % 10 == 0 || remaining <= 5)
}
