//! Client session - phases, session-scoped state and the transition function

pub mod machine;
pub mod timer;

use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::board::{BoardState, Grid, GRID_COLS, GRID_ROWS};
use crate::channel::protocol::WagerTerms;
use crate::util::time::{session_seed, unix_millis};

pub use machine::{Effect, LinkEvent, Notice, NoticeLevel, SessionController, Trigger, UserAction};
pub use timer::{Countdown, TimerKind};

/// Wager tiers a player may pick from, in sats
pub const BET_TIERS: [u64; 6] = [1_000, 5_000, 10_000, 25_000, 50_000, 100_000];

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Title screen
    #[default]
    Splash,
    /// Entering wager and payout address
    Join,
    /// Join sent; matchmaking and payment in progress
    Waiting,
    /// Arranging ships
    Placing,
    /// Exchanging shots
    Playing,
    /// Outcome shown
    Finished,
}

/// Countdown lengths, fixed for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub join_timeout_secs: u32,
    pub placement_seconds: u32,
    pub payment_seconds: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            join_timeout_secs: 10,
            placement_seconds: 60,
            payment_seconds: 300,
        }
    }
}

/// Outstanding payment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub invoice: String,
    pub hosted_url: String,
}

/// Shots resolved by the server this match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotTally {
    pub fired: u32,
    pub hits: u32,
    pub taken: u32,
}

impl fmt::Display for ShotTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shots fired {}, hits {}, hits taken {}",
            self.fired, self.hits, self.taken
        )
    }
}

/// State that exists once the server has accepted the join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub match_id: Uuid,
    pub player_id: Uuid,
    pub terms: Option<WagerTerms>,
    pub turn_holder: Option<Uuid>,
    /// What we know of the opponent's grid. Only water, hit or miss.
    pub enemy_view: Grid,
    pub tally: ShotTally,
}

impl MatchContext {
    pub fn new(match_id: Uuid, player_id: Uuid, terms: Option<WagerTerms>) -> Self {
        Self {
            match_id,
            player_id,
            terms,
            turn_holder: None,
            enemy_view: Grid::new(GRID_COLS, GRID_ROWS),
            tally: ShotTally::default(),
        }
    }

    pub fn my_turn(&self) -> bool {
        self.turn_holder == Some(self.player_id)
    }
}

/// Everything the client knows about the current session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: Phase,
    /// Link status; survives session resets
    pub connected: bool,
    pub settings: SessionSettings,

    pub match_ctx: Option<MatchContext>,
    pub invoice: Option<Invoice>,
    pub board: BoardState,
    pub placement_locked: bool,
    pub outcome: Option<String>,

    pub join_ack: Countdown,
    pub payment: Countdown,
    pub placement: Countdown,

    rng: ChaCha8Rng,
    seeded: bool,
}

impl SessionState {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            phase: Phase::Splash,
            connected: false,
            settings,
            match_ctx: None,
            invoice: None,
            board: BoardState::standard(),
            placement_locked: false,
            outcome: None,
            join_ack: Countdown::default(),
            payment: Countdown::default(),
            placement: Countdown::default(),
            rng: ChaCha8Rng::seed_from_u64(unix_millis()),
            seeded: false,
        }
    }

    /// A blank session in `phase`, keeping link status and settings
    pub fn fresh(&self, phase: Phase) -> Self {
        Self {
            phase,
            connected: self.connected,
            ..Self::new(self.settings)
        }
    }

    /// Seed the placement generator from the player id. Only the first call
    /// in a session has any effect.
    pub fn seed_for(&mut self, player_id: Uuid) {
        if self.seeded {
            return;
        }
        self.rng = ChaCha8Rng::seed_from_u64(session_seed(player_id, unix_millis()));
        self.seeded = true;
    }

    #[cfg(test)]
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn countdown(&self, kind: TimerKind) -> &Countdown {
        match kind {
            TimerKind::JoinAck => &self.join_ack,
            TimerKind::Payment => &self.payment,
            TimerKind::Placement => &self.placement,
        }
    }

    pub(crate) fn countdown_mut(&mut self, kind: TimerKind) -> &mut Countdown {
        match kind {
            TimerKind::JoinAck => &mut self.join_ack,
            TimerKind::Payment => &mut self.payment,
            TimerKind::Placement => &mut self.placement,
        }
    }

    /// Board and generator borrowed together for random placement
    pub(crate) fn board_and_rng(&mut self) -> (&mut BoardState, &mut ChaCha8Rng) {
        (&mut self.board, &mut self.rng)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
