//! One-second countdowns owned by the session

/// Which countdown a tick belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Waiting for the server to acknowledge a join request
    JoinAck,
    /// Waiting for an invoice to be paid
    Payment,
    /// Ship placement window
    Placement,
}

/// Result of feeding one tick to a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Countdown is not running; the tick was stale
    Idle,
    /// Still counting, this many seconds left
    Running(u32),
    /// Just reached zero. Reported once, after which the countdown is idle.
    Expired,
}

/// Countdown that decrements once per tick and expires exactly once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    running: bool,
}

impl Countdown {
    /// (Re)start from `seconds`
    pub fn start(&mut self, seconds: u32) {
        self.remaining = seconds;
        self.running = true;
    }

    /// Stop without expiring. Later ticks are ignored.
    pub fn cancel(&mut self) {
        self.running = false;
        self.remaining = 0;
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
