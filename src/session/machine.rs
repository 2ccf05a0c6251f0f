//! Session state machine
//!
//! [`transition`] takes the current [`SessionState`] and one [`Trigger`] and
//! returns the next state plus the effects the runtime must carry out. Every
//! handler re-checks the phase first; triggers that do not apply to the
//! current phase are dropped.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::board::{BoardState, Cell, Grid, PlacementError, ShipId};
use crate::channel::protocol::{ClientMsg, ServerMsg, ShipPlacement, WagerTerms};

use super::timer::{Tick, TimerKind};
use super::{Invoice, MatchContext, Phase, SessionSettings, SessionState, BET_TIERS};

/// Something that happened, fed to the state machine one at a time
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    User(UserAction),
    Server(ServerMsg),
    Link(LinkEvent),
    Tick(TimerKind),
}

/// Local player input
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Start,
    SubmitJoin { address: String, bet: Option<u64> },
    Cancel,
    /// Drop a ship at pixel coordinates on a grid of `cell_px` sized cells
    PlaceShip { ship: ShipId, x: f64, y: f64, cell_px: f64 },
    ToggleOrientation(ShipId),
    RandomizeAll,
    RandomizeUnplaced,
    ClearBoard,
    CommitPlacement,
    Fire(usize),
    Restart,
}

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected(String),
    ConnectFailed(String),
}

/// Work for the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientMsg),
    StartTimer(TimerKind),
    CancelTimer(TimerKind),
    Notify(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Why a join submission was refused locally
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejected {
    #[error("Enter a payout address")]
    MissingAddress,

    #[error("Payout address must contain '@'")]
    InvalidAddress,

    #[error("Select a wager")]
    NoBet,

    #[error("{0} sats is not an available wager")]
    UnsupportedBet(u64),

    #[error("Not connected to the match server")]
    NotConnected,
}

/// Check a join form. Returns the trimmed address and the bet on success.
pub fn validate_join(
    address: &str,
    bet: Option<u64>,
    connected: bool,
) -> Result<(String, u64), JoinRejected> {
    let address = address.trim();
    if address.is_empty() {
        return Err(JoinRejected::MissingAddress);
    }
    if !address.contains('@') {
        return Err(JoinRejected::InvalidAddress);
    }
    let bet = bet.ok_or(JoinRejected::NoBet)?;
    if !BET_TIERS.contains(&bet) {
        return Err(JoinRejected::UnsupportedBet(bet));
    }
    if !connected {
        return Err(JoinRejected::NotConnected);
    }
    Ok((address.to_string(), bet))
}

/// Apply one trigger
pub fn transition(state: SessionState, trigger: Trigger) -> (SessionState, Vec<Effect>) {
    let mut step = Step {
        state,
        effects: Vec::new(),
    };

    match trigger {
        Trigger::User(action) => step.on_user(action),
        Trigger::Server(msg) => step.on_server(msg),
        Trigger::Link(event) => step.on_link(event),
        Trigger::Tick(kind) => step.on_tick(kind),
    }

    (step.state, step.effects)
}

/// Owns the session and threads it through [`transition`]
#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
}

impl SessionController {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            state: SessionState::new(settings),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn handle(&mut self, trigger: Trigger) -> Vec<Effect> {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = transition(state, trigger);
        self.state = next;
        effects
    }
}

/// One transition in progress
struct Step {
    state: SessionState,
    effects: Vec<Effect>,
}

impl Step {
    fn on_user(&mut self, action: UserAction) {
        match action {
            UserAction::Start => {
                if self.state.phase == Phase::Splash {
                    self.enter(Phase::Join);
                }
            }
            UserAction::SubmitJoin { address, bet } => self.submit_join(&address, bet),
            UserAction::Cancel => {
                if self.state.phase == Phase::Waiting {
                    self.abandon_waiting("Matchmaking cancelled");
                }
            }
            UserAction::PlaceShip { ship, x, y, cell_px } => {
                self.edit_board(|board, _| board.place_manually(ship, x, y, cell_px).map(|_| None))
            }
            UserAction::ToggleOrientation(ship) => {
                self.edit_board(|board, _| board.toggle_orientation(ship).map(|_| None))
            }
            UserAction::RandomizeAll => self.edit_board(|board, rng| {
                let missed = board.randomize_all(rng);
                Ok(unplaced_warning(board, &missed))
            }),
            UserAction::RandomizeUnplaced => self.edit_board(|board, rng| {
                let missed = board.randomize_unplaced(rng);
                Ok(unplaced_warning(board, &missed))
            }),
            UserAction::ClearBoard => self.edit_board(|board, _| {
                board.clear();
                Ok(None)
            }),
            UserAction::CommitPlacement => self.commit_manually(),
            UserAction::Fire(position) => self.fire(position),
            UserAction::Restart => {
                if self.state.phase == Phase::Finished {
                    self.cancel_all_timers();
                    self.state = self.state.fresh(Phase::Splash);
                    info!("Session discarded, back to splash");
                }
            }
        }
    }

    fn on_server(&mut self, msg: ServerMsg) {
        let phase = self.state.phase;
        match msg {
            ServerMsg::Welcome { .. } => {
                debug!("Ignoring welcome outside the connect handshake");
            }
            ServerMsg::Joined {
                match_id,
                player_id,
                terms,
            } if phase == Phase::Waiting => self.joined(match_id, player_id, terms),
            ServerMsg::PaymentRequest {
                invoice,
                hosted_url,
            } if phase == Phase::Waiting => {
                self.acknowledge_join();
                self.state.invoice = Some(Invoice {
                    invoice,
                    hosted_url,
                });
                let seconds = self.state.settings.payment_seconds;
                self.start_timer(TimerKind::Payment, seconds);
                self.notify(NoticeLevel::Info, "Pay the invoice to enter the match");
            }
            ServerMsg::PaymentVerified if phase == Phase::Waiting => {
                self.state.invoice = None;
                self.stop_timer(TimerKind::Payment);
                self.notify(NoticeLevel::Info, "Payment received, waiting for opponent");
            }
            ServerMsg::BeginPlacement if phase == Phase::Waiting => self.begin_placement(),
            ServerMsg::PlacementCommitted | ServerMsg::PlacementAutoCommitted
                if phase == Phase::Placing =>
            {
                self.state.placement_locked = true;
                self.stop_timer(TimerKind::Placement);
                self.notify(NoticeLevel::Info, "Placement locked, waiting for opponent");
            }
            ServerMsg::BoardSync { count, grid, ships }
                if matches!(phase, Phase::Placing | Phase::Playing) =>
            {
                self.sync_board(count, grid, ships)
            }
            ServerMsg::BeginCombat {
                turn_holder,
                message,
            } if phase == Phase::Placing => self.begin_combat(turn_holder, message),
            ServerMsg::ShotResult { actor, position, hit } if phase == Phase::Playing => {
                self.shot_result(actor, position, hit)
            }
            ServerMsg::TurnChange { turn_holder } if phase == Phase::Playing => {
                if let Some(ctx) = self.state.match_ctx.as_mut() {
                    ctx.turn_holder = Some(turn_holder);
                }
            }
            ServerMsg::GameEnd { message } if phase == Phase::Playing => self.game_end(message),
            ServerMsg::Error { message } => {
                if phase == Phase::Waiting {
                    self.return_to_join(NoticeLevel::Error, message);
                } else {
                    warn!(phase = ?phase, error = %message, "Server reported error");
                    self.notify(NoticeLevel::Error, message);
                }
            }
            ServerMsg::MatchmakingUpdate { message } if phase == Phase::Waiting => {
                self.acknowledge_join();
                self.notify(NoticeLevel::Info, message);
            }
            other => {
                debug!(phase = ?phase, msg = ?other, "Ignoring server message in this phase");
            }
        }
    }

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                self.state.connected = true;
                info!("Connected to match server");
                self.notify(NoticeLevel::Info, "Connected");
            }
            LinkEvent::Disconnected(reason) | LinkEvent::ConnectFailed(reason) => {
                self.state.connected = false;
                let text = format!("Connection lost: {}", reason);
                match self.state.phase {
                    Phase::Splash | Phase::Join => {
                        warn!(reason = %reason, "Match server unavailable");
                        self.enter(Phase::Join);
                        self.notify(NoticeLevel::Warning, text);
                    }
                    phase => {
                        warn!(phase = ?phase, reason = %reason, "Session aborted by disconnect");
                        self.return_to_join(NoticeLevel::Error, text);
                    }
                }
            }
        }
    }

    fn on_tick(&mut self, kind: TimerKind) {
        match self.state.countdown_mut(kind).tick() {
            Tick::Idle => debug!(timer = ?kind, "Stale tick"),
            Tick::Running(remaining) => debug!(timer = ?kind, remaining, "Countdown"),
            Tick::Expired => {
                self.effects.push(Effect::CancelTimer(kind));
                self.expired(kind);
            }
        }
    }

    fn expired(&mut self, kind: TimerKind) {
        let phase = self.state.phase;
        match kind {
            TimerKind::JoinAck if phase == Phase::Waiting => {
                self.return_to_join(NoticeLevel::Error, "Server did not respond to join request")
            }
            TimerKind::Payment if phase == Phase::Waiting => {
                self.abandon_waiting("Payment window expired")
            }
            TimerKind::Placement if phase == Phase::Placing && !self.state.placement_locked => {
                self.auto_commit()
            }
            _ => debug!(timer = ?kind, phase = ?phase, "Countdown expired with nothing to do"),
        }
    }

    fn submit_join(&mut self, address: &str, bet: Option<u64>) {
        if self.state.phase != Phase::Join {
            return;
        }

        match validate_join(address, bet, self.state.connected) {
            Ok((address, bet_amount)) => {
                info!(bet_amount, "Submitting join request");
                self.state.invoice = None;
                self.enter(Phase::Waiting);
                self.send(ClientMsg::JoinRequest {
                    address,
                    bet_amount,
                });
                let seconds = self.state.settings.join_timeout_secs;
                self.start_timer(TimerKind::JoinAck, seconds);
            }
            Err(reason) => {
                debug!(reason = %reason, "Join rejected locally");
                self.notify(NoticeLevel::Warning, reason.to_string());
            }
        }
    }

    fn joined(&mut self, match_id: Uuid, player_id: Uuid, terms: Option<WagerTerms>) {
        self.acknowledge_join();
        self.state.seed_for(player_id);
        self.state.match_ctx = Some(MatchContext::new(match_id, player_id, terms));
        info!(match_id = %match_id, player_id = %player_id, "Joined match");
    }

    /// Any server response to the join request stops the ack countdown
    fn acknowledge_join(&mut self) {
        self.stop_timer(TimerKind::JoinAck);
    }

    fn begin_placement(&mut self) {
        self.stop_timer(TimerKind::JoinAck);
        self.stop_timer(TimerKind::Payment);
        self.state.invoice = None;
        self.state.board = BoardState::standard();
        self.state.placement_locked = false;
        self.enter(Phase::Placing);
        let seconds = self.state.settings.placement_seconds;
        self.start_timer(TimerKind::Placement, seconds);
    }

    /// Run a board edit if placement is still open, then mirror the board to
    /// the server. The edit may return a warning to show alongside.
    fn edit_board<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut BoardState, &mut rand_chacha::ChaCha8Rng) -> Result<Option<String>, PlacementError>,
    {
        if self.state.phase != Phase::Placing {
            return;
        }
        if self.state.placement_locked {
            self.notify(NoticeLevel::Warning, "Placement is locked");
            return;
        }

        let (board, rng) = self.state.board_and_rng();
        match edit(board, rng) {
            Ok(warning) => {
                if let Some(text) = warning {
                    self.notify(NoticeLevel::Warning, text);
                }
                self.send_board(false);
            }
            Err(err) => {
                debug!(error = %err, "Board edit rejected");
                self.notify(NoticeLevel::Warning, err.to_string());
            }
        }
    }

    fn commit_manually(&mut self) {
        if self.state.phase != Phase::Placing || self.state.placement_locked {
            return;
        }
        if !self.state.board.all_placed() {
            self.notify(NoticeLevel::Warning, "Place every ship before saving");
            return;
        }
        self.commit();
    }

    fn auto_commit(&mut self) {
        info!("Placement time is up, committing");
        let (board, rng) = self.state.board_and_rng();
        let missed = board.randomize_unplaced(rng);
        if let Some(text) = unplaced_warning(&self.state.board, &missed) {
            self.notify(NoticeLevel::Warning, text);
        }
        self.commit();
    }

    /// Shared by manual save and auto-commit. A second call once locked does nothing.
    fn commit(&mut self) {
        if self.state.placement_locked {
            return;
        }
        if self.state.match_ctx.is_none() {
            warn!("Commit before the match was assigned");
            self.notify(NoticeLevel::Warning, "No match assigned yet, placement not saved");
            return;
        }
        self.state.placement_locked = true;
        self.stop_timer(TimerKind::Placement);
        self.send_board(true);
        self.notify(NoticeLevel::Info, "Placement saved");
    }

    fn send_board(&mut self, commit: bool) {
        let Some(match_id) = self.state.match_ctx.as_ref().map(|ctx| ctx.match_id) else {
            warn!("No match id yet, board not sent");
            return;
        };
        let placements: Vec<ShipPlacement> =
            self.state.board.ships.iter().map(ShipPlacement::from).collect();

        self.send(if commit {
            ClientMsg::CommitPlacement {
                match_id,
                placements,
            }
        } else {
            ClientMsg::UpdateBoard {
                match_id,
                placements,
            }
        });
    }

    fn sync_board(&mut self, count: usize, grid: Vec<Cell>, ships: Vec<ShipPlacement>) {
        let (cols, rows) = (self.state.board.grid.cols(), self.state.board.grid.rows());
        let Some(grid) = Grid::from_cells(cols, rows, grid) else {
            warn!(expected = cols * rows, "Board sync with wrong grid size ignored");
            return;
        };

        let board = &mut self.state.board;
        board.grid = grid;
        for ship in &mut board.ships {
            ship.positions.clear();
        }
        for placement in ships {
            let Some(id) = board.ship_by_name(&placement.name).map(|s| s.id) else {
                warn!(name = %placement.name, "Board sync names an unknown ship");
                continue;
            };
            board.restore(id, placement.positions, placement.horizontal);
        }
        debug!(count, "Board synced from server");
    }

    fn begin_combat(&mut self, turn_holder: Uuid, message: String) {
        self.stop_timer(TimerKind::Placement);
        self.state.placement_locked = true;
        let (cols, rows) = (self.state.board.grid.cols(), self.state.board.grid.rows());
        if let Some(ctx) = self.state.match_ctx.as_mut() {
            ctx.turn_holder = Some(turn_holder);
            ctx.enemy_view = Grid::new(cols, rows);
        }
        self.enter(Phase::Playing);
        let text = if message.is_empty() {
            "Battle begins".to_string()
        } else {
            message
        };
        self.notify(NoticeLevel::Info, text);
    }

    /// Fire only when it is our turn and the target is untouched water;
    /// anything else is silently ignored.
    fn fire(&mut self, position: usize) {
        if self.state.phase != Phase::Playing {
            return;
        }
        let Some(ctx) = self.state.match_ctx.as_ref() else {
            return;
        };
        if !ctx.my_turn() || ctx.enemy_view.get(position) != Some(Cell::Water) {
            return;
        }

        let match_id = ctx.match_id;
        debug!(match_id = %match_id, position, "Firing");
        self.send(ClientMsg::Fire { match_id, position });
    }

    fn shot_result(&mut self, actor: Uuid, position: usize, hit: bool) {
        let Some(ctx) = self.state.match_ctx.as_mut() else {
            return;
        };
        let cell = Cell::from_shot(hit);

        let applied = if actor == ctx.player_id {
            ctx.tally.fired += 1;
            ctx.tally.hits += u32::from(hit);
            ctx.enemy_view.set(position, cell)
        } else {
            ctx.tally.taken += u32::from(hit);
            self.state.board.grid.set(position, cell)
        };

        if !applied {
            warn!(position, "Shot result outside the grid ignored");
        }
    }

    fn game_end(&mut self, message: String) {
        let text = match self.state.match_ctx.as_ref() {
            Some(ctx) => {
                info!(
                    match_id = %ctx.match_id,
                    fired = ctx.tally.fired,
                    hits = ctx.tally.hits,
                    taken = ctx.tally.taken,
                    "Game over"
                );
                format!("{} ({})", message, ctx.tally)
            }
            None => message.clone(),
        };
        self.state.outcome = Some(message);
        self.enter(Phase::Finished);
        self.notify(NoticeLevel::Info, text);
    }

    /// Leave `waiting` on the player's behalf, telling the server if it knows us
    fn abandon_waiting(&mut self, reason: &str) {
        if let Some(ctx) = self.state.match_ctx.as_ref() {
            let msg = ClientMsg::Cancel {
                match_id: ctx.match_id,
                player_id: ctx.player_id,
            };
            self.send(msg);
        }
        self.return_to_join(NoticeLevel::Warning, reason);
    }

    /// Drop the session and go back to the join form
    fn return_to_join(&mut self, level: NoticeLevel, reason: impl Into<String>) {
        self.cancel_all_timers();
        self.state = self.state.fresh(Phase::Join);
        info!(phase = ?Phase::Join, "Session reset");
        self.notify(level, reason);
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.state.phase, to = ?phase, "Phase change");
        self.state.phase = phase;
    }

    fn start_timer(&mut self, kind: TimerKind, seconds: u32) {
        self.state.countdown_mut(kind).start(seconds);
        self.effects.push(Effect::StartTimer(kind));
    }

    fn stop_timer(&mut self, kind: TimerKind) {
        let countdown = self.state.countdown_mut(kind);
        if countdown.is_running() {
            countdown.cancel();
            self.effects.push(Effect::CancelTimer(kind));
        }
    }

    fn cancel_all_timers(&mut self) {
        for kind in [TimerKind::JoinAck, TimerKind::Payment, TimerKind::Placement] {
            self.stop_timer(kind);
        }
    }

    fn send(&mut self, msg: ClientMsg) {
        self.effects.push(Effect::Send(msg));
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.effects.push(Effect::Notify(Notice {
            level,
            text: text.into(),
        }));
    }
}

fn unplaced_warning(board: &BoardState, missed: &[ShipId]) -> Option<String> {
    if missed.is_empty() {
        return None;
    }
    let names: Vec<&str> = missed
        .iter()
        .filter_map(|id| board.ship(*id).map(|s| s.name))
        .collect();
    Some(format!("Could not find room for {}", names.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: f64 = 40.0;

    fn sent(effects: &[Effect]) -> Vec<&ClientMsg> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn notices(effects: &[Effect]) -> Vec<&Notice> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn user(session: &mut SessionController, action: UserAction) -> Vec<Effect> {
        session.handle(Trigger::User(action))
    }

    fn server(session: &mut SessionController, msg: ServerMsg) -> Vec<Effect> {
        session.handle(Trigger::Server(msg))
    }

    fn ticks(session: &mut SessionController, kind: TimerKind, n: u32) -> Vec<Effect> {
        (0..n)
            .flat_map(|_| session.handle(Trigger::Tick(kind)))
            .collect()
    }

    fn join_form() -> SessionController {
        let mut session = SessionController::new(SessionSettings::default());
        session.handle(Trigger::Link(LinkEvent::Connected));
        user(&mut session, UserAction::Start);
        session
    }

    fn waiting() -> SessionController {
        let mut session = join_form();
        user(
            &mut session,
            UserAction::SubmitJoin {
                address: "ishmael@pequod.example".to_string(),
                bet: Some(5_000),
            },
        );
        session
    }

    fn joined(session: &mut SessionController) -> (Uuid, Uuid) {
        let (match_id, player_id) = (Uuid::new_v4(), Uuid::new_v4());
        server(
            session,
            ServerMsg::Joined {
                match_id,
                player_id,
                terms: Some(WagerTerms { bet: 5_000, payout: 9_500, fee: 500 }),
            },
        );
        (match_id, player_id)
    }

    fn placing() -> (SessionController, Uuid, Uuid) {
        let mut session = waiting();
        let (match_id, player_id) = joined(&mut session);
        server(&mut session, ServerMsg::BeginPlacement);
        (session, match_id, player_id)
    }

    fn playing(my_turn: bool) -> (SessionController, Uuid, Uuid) {
        let (mut session, match_id, player_id) = placing();
        user(&mut session, UserAction::RandomizeAll);
        user(&mut session, UserAction::CommitPlacement);
        let turn_holder = if my_turn { player_id } else { Uuid::new_v4() };
        server(
            &mut session,
            ServerMsg::BeginCombat {
                turn_holder,
                message: String::new(),
            },
        );
        (session, match_id, player_id)
    }

    #[test]
    fn start_moves_splash_to_join() {
        let session = join_form();
        assert_eq!(session.state().phase, Phase::Join);
    }

    #[test]
    fn invalid_join_is_rejected_without_sending() {
        let mut session = join_form();
        let cases = [
            ("", Some(5_000), JoinRejected::MissingAddress),
            ("no-at-sign", Some(5_000), JoinRejected::InvalidAddress),
            ("a@b", None, JoinRejected::NoBet),
            ("a@b", Some(7), JoinRejected::UnsupportedBet(7)),
        ];
        for (address, bet, reason) in cases {
            let effects = user(
                &mut session,
                UserAction::SubmitJoin {
                    address: address.to_string(),
                    bet,
                },
            );
            assert!(sent(&effects).is_empty());
            assert_eq!(notices(&effects)[0].text, reason.to_string());
            assert_eq!(session.state().phase, Phase::Join);
        }
    }

    #[test]
    fn join_requires_connection() {
        let mut session = SessionController::new(SessionSettings::default());
        user(&mut session, UserAction::Start);
        let effects = user(
            &mut session,
            UserAction::SubmitJoin {
                address: "a@b".to_string(),
                bet: Some(1_000),
            },
        );
        assert!(sent(&effects).is_empty());
        assert_eq!(session.state().phase, Phase::Join);
    }

    #[test]
    fn valid_join_sends_request_and_arms_timeout() {
        let mut session = join_form();
        let effects = user(
            &mut session,
            UserAction::SubmitJoin {
                address: "  ishmael@pequod.example ".to_string(),
                bet: Some(5_000),
            },
        );
        assert_eq!(session.state().phase, Phase::Waiting);
        assert_eq!(
            sent(&effects),
            vec![&ClientMsg::JoinRequest {
                address: "ishmael@pequod.example".to_string(),
                bet_amount: 5_000,
            }]
        );
        assert!(effects.contains(&Effect::StartTimer(TimerKind::JoinAck)));
    }

    #[test]
    fn unacknowledged_join_times_out_once() {
        let mut session = waiting();
        let effects = ticks(&mut session, TimerKind::JoinAck, 9);
        assert!(effects.is_empty());
        assert_eq!(session.state().phase, Phase::Waiting);

        let effects = ticks(&mut session, TimerKind::JoinAck, 5);
        assert_eq!(session.state().phase, Phase::Join);
        assert_eq!(notices(&effects).len(), 1);
        assert!(effects.contains(&Effect::CancelTimer(TimerKind::JoinAck)));
    }

    #[test]
    fn joined_cancels_join_timeout_and_seeds() {
        let mut session = waiting();
        let (match_id, _) = joined(&mut session);
        assert!(!session.state().join_ack.is_running());
        assert!(session.state().is_seeded());
        assert_eq!(session.state().match_ctx.as_ref().map(|c| c.match_id), Some(match_id));

        ticks(&mut session, TimerKind::JoinAck, 20);
        assert_eq!(session.state().phase, Phase::Waiting);
    }

    #[test]
    fn payment_timeout_aborts_exactly_once() {
        let mut session = waiting();
        let (match_id, player_id) = joined(&mut session);
        let effects = server(
            &mut session,
            ServerMsg::PaymentRequest {
                invoice: "lnbc1".to_string(),
                hosted_url: "https://pay.example/1".to_string(),
            },
        );
        assert!(effects.contains(&Effect::StartTimer(TimerKind::Payment)));
        assert!(session.state().invoice.is_some());

        let seconds = session.state().settings.payment_seconds;
        let effects = ticks(&mut session, TimerKind::Payment, seconds + 10);
        assert_eq!(session.state().phase, Phase::Join);
        assert!(session.state().invoice.is_none());
        assert_eq!(
            sent(&effects),
            vec![&ClientMsg::Cancel { match_id, player_id }]
        );
        let cancels = effects
            .iter()
            .filter(|e| **e == Effect::CancelTimer(TimerKind::Payment))
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn payment_verified_stops_countdown() {
        let mut session = waiting();
        joined(&mut session);
        server(
            &mut session,
            ServerMsg::PaymentRequest {
                invoice: "lnbc1".to_string(),
                hosted_url: "https://pay.example/1".to_string(),
            },
        );
        let effects = server(&mut session, ServerMsg::PaymentVerified);
        assert!(effects.contains(&Effect::CancelTimer(TimerKind::Payment)));
        assert!(session.state().invoice.is_none());

        ticks(&mut session, TimerKind::Payment, 400);
        assert_eq!(session.state().phase, Phase::Waiting);
    }

    #[test]
    fn server_error_while_waiting_returns_to_join() {
        let mut session = waiting();
        joined(&mut session);
        let effects = server(
            &mut session,
            ServerMsg::Error {
                message: "invoice expired".to_string(),
            },
        );
        assert_eq!(session.state().phase, Phase::Join);
        assert!(session.state().match_ctx.is_none());
        assert_eq!(notices(&effects)[0].text, "invoice expired");
    }

    #[test]
    fn user_cancel_without_match_sends_nothing() {
        let mut session = waiting();
        let effects = user(&mut session, UserAction::Cancel);
        assert!(sent(&effects).is_empty());
        assert_eq!(session.state().phase, Phase::Join);
    }

    #[test]
    fn begin_placement_resets_board_and_arms_countdown() {
        let (session, _, _) = placing();
        let state = session.state();
        assert_eq!(state.phase, Phase::Placing);
        assert_eq!(state.board, BoardState::standard());
        assert!(!state.placement_locked);
        assert_eq!(state.placement.remaining(), state.settings.placement_seconds);
    }

    #[test]
    fn board_edits_are_mirrored_to_server() {
        let (mut session, match_id, _) = placing();
        let effects = user(
            &mut session,
            UserAction::PlaceShip {
                ship: ShipId(4),
                x: 0.0,
                y: 0.0,
                cell_px: CELL,
            },
        );
        match sent(&effects).as_slice() {
            [ClientMsg::UpdateBoard { match_id: id, placements }] => {
                assert_eq!(*id, match_id);
                let destroyer = placements.iter().find(|p| p.name == "Destroyer").unwrap();
                assert_eq!(destroyer.positions, vec![0, 1]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejected_edit_reports_and_sends_nothing() {
        let (mut session, _, _) = placing();
        let effects = user(
            &mut session,
            UserAction::PlaceShip {
                ship: ShipId(0),
                x: 1_000.0,
                y: 0.0,
                cell_px: CELL,
            },
        );
        assert!(sent(&effects).is_empty());
        assert_eq!(notices(&effects)[0].text, PlacementError::OutsideGrid.to_string());
    }

    #[test]
    fn commit_needs_every_ship() {
        let (mut session, _, _) = placing();
        let effects = user(&mut session, UserAction::CommitPlacement);
        assert!(sent(&effects).is_empty());
        assert!(!session.state().placement_locked);
    }

    #[test]
    fn commit_is_idempotent() {
        let (mut session, _, _) = placing();
        user(&mut session, UserAction::RandomizeAll);
        let first = user(&mut session, UserAction::CommitPlacement);
        let board = session.state().board.clone();
        let second = user(&mut session, UserAction::CommitPlacement);

        assert_eq!(sent(&first).len(), 1);
        assert!(matches!(sent(&first)[0], ClientMsg::CommitPlacement { .. }));
        assert!(second.is_empty());
        assert!(session.state().placement_locked);
        assert_eq!(session.state().board, board);
    }

    #[test]
    fn locked_board_rejects_edits() {
        let (mut session, _, _) = placing();
        user(&mut session, UserAction::RandomizeAll);
        user(&mut session, UserAction::CommitPlacement);
        let board = session.state().board.clone();

        for action in [
            UserAction::ClearBoard,
            UserAction::RandomizeAll,
            UserAction::ToggleOrientation(ShipId(0)),
            UserAction::PlaceShip { ship: ShipId(0), x: 0.0, y: 0.0, cell_px: CELL },
        ] {
            let effects = user(&mut session, action);
            assert!(sent(&effects).is_empty());
            assert_eq!(notices(&effects)[0].text, "Placement is locked");
        }
        assert_eq!(session.state().board, board);
    }

    #[test]
    fn placement_expiry_fills_and_commits() {
        let (mut session, _, _) = placing();
        user(
            &mut session,
            UserAction::PlaceShip { ship: ShipId(0), x: 0.0, y: 0.0, cell_px: CELL },
        );
        let carrier = session.state().board.ship(ShipId(0)).unwrap().positions.clone();

        let seconds = session.state().settings.placement_seconds;
        let effects = ticks(&mut session, TimerKind::Placement, seconds);

        let state = session.state();
        assert!(state.placement_locked);
        assert!(state.board.all_placed());
        assert_eq!(state.board.ship(ShipId(0)).unwrap().positions, carrier);
        let commits = sent(&effects)
            .into_iter()
            .filter(|m| matches!(m, ClientMsg::CommitPlacement { .. }))
            .count();
        assert_eq!(commits, 1);

        let after = ticks(&mut session, TimerKind::Placement, 5);
        assert!(sent(&after).is_empty());
    }

    #[test]
    fn server_forced_commit_locks() {
        let (mut session, _, _) = placing();
        let effects = server(&mut session, ServerMsg::PlacementAutoCommitted);
        assert!(session.state().placement_locked);
        assert!(effects.contains(&Effect::CancelTimer(TimerKind::Placement)));
    }

    #[test]
    fn board_sync_replaces_local_board() {
        let (mut session, _, _) = placing();
        let mut grid = vec![Cell::Water; 63];
        grid[0] = Cell::Ship;
        grid[9] = Cell::Ship;
        server(
            &mut session,
            ServerMsg::BoardSync {
                count: 1,
                grid,
                ships: vec![ShipPlacement {
                    name: "Destroyer".to_string(),
                    positions: vec![0, 9],
                    horizontal: false,
                }],
            },
        );
        let board = &session.state().board;
        let destroyer = board.ship(ShipId(4)).unwrap();
        assert_eq!(destroyer.positions, vec![0, 9]);
        assert!(!destroyer.horizontal);
        assert_eq!(board.grid.count(Cell::Ship), 2);

        // wrong size is ignored
        server(
            &mut session,
            ServerMsg::BoardSync { count: 0, grid: vec![Cell::Water; 3], ships: vec![] },
        );
        assert_eq!(session.state().board.grid.count(Cell::Ship), 2);
    }

    #[test]
    fn begin_combat_sets_turn_and_clears_enemy_view() {
        let (session, _, player_id) = playing(true);
        let state = session.state();
        assert_eq!(state.phase, Phase::Playing);
        let ctx = state.match_ctx.as_ref().unwrap();
        assert_eq!(ctx.turn_holder, Some(player_id));
        assert_eq!(ctx.enemy_view.count(Cell::Water), 63);
    }

    #[test]
    fn fire_on_our_turn_sends_shot() {
        let (mut session, match_id, _) = playing(true);
        let effects = user(&mut session, UserAction::Fire(10));
        assert_eq!(sent(&effects), vec![&ClientMsg::Fire { match_id, position: 10 }]);
    }

    #[test]
    fn fire_out_of_turn_is_silent() {
        let (mut session, _, _) = playing(false);
        let before = session.state().match_ctx.clone();
        let effects = user(&mut session, UserAction::Fire(10));
        assert!(effects.is_empty());
        assert_eq!(session.state().match_ctx, before);
    }

    #[test]
    fn fire_at_resolved_cell_is_silent() {
        let (mut session, _, player_id) = playing(true);
        server(&mut session, ServerMsg::ShotResult { actor: player_id, position: 10, hit: true });
        server(&mut session, ServerMsg::ShotResult { actor: player_id, position: 11, hit: false });

        let before = session.state().match_ctx.clone();
        assert!(user(&mut session, UserAction::Fire(10)).is_empty());
        assert!(user(&mut session, UserAction::Fire(11)).is_empty());
        assert!(user(&mut session, UserAction::Fire(63)).is_empty());
        assert_eq!(session.state().match_ctx, before);
    }

    #[test]
    fn shot_results_update_the_right_grid() {
        let (mut session, _, player_id) = playing(true);
        let opponent = Uuid::new_v4();
        server(&mut session, ServerMsg::ShotResult { actor: player_id, position: 5, hit: true });
        server(&mut session, ServerMsg::ShotResult { actor: opponent, position: 6, hit: false });
        server(&mut session, ServerMsg::TurnChange { turn_holder: opponent });

        let state = session.state();
        let ctx = state.match_ctx.as_ref().unwrap();
        assert_eq!(ctx.enemy_view.get(5), Some(Cell::Hit));
        assert_eq!(ctx.enemy_view.get(6), Some(Cell::Water));
        assert_eq!(state.board.grid.get(6), Some(Cell::Miss));
        assert_eq!(ctx.tally.fired, 1);
        assert_eq!(ctx.tally.hits, 1);
        assert!(!ctx.my_turn());
    }

    #[test]
    fn game_end_then_restart_discards_session() {
        let (mut session, _, _) = playing(true);
        server(&mut session, ServerMsg::GameEnd { message: "You won".to_string() });
        assert_eq!(session.state().phase, Phase::Finished);
        assert_eq!(session.state().outcome.as_deref(), Some("You won"));

        user(&mut session, UserAction::Restart);
        let state = session.state();
        assert_eq!(state.phase, Phase::Splash);
        assert!(state.match_ctx.is_none());
        assert!(state.outcome.is_none());
        assert!(state.connected);
        assert!(!state.is_seeded());
    }

    #[test]
    fn disconnect_mid_game_returns_to_join() {
        let (mut session, _, _) = placing();
        let effects = session.handle(Trigger::Link(LinkEvent::Disconnected("reset by peer".into())));
        let state = session.state();
        assert_eq!(state.phase, Phase::Join);
        assert!(!state.connected);
        assert!(state.match_ctx.is_none());
        assert!(effects.contains(&Effect::CancelTimer(TimerKind::Placement)));
        assert!(notices(&effects)[0].text.contains("reset by peer"));

        // stale tick from the old placement countdown does nothing
        assert!(ticks(&mut session, TimerKind::Placement, 100).is_empty());
    }

    #[test]
    fn disconnect_on_splash_moves_to_join() {
        let mut session = SessionController::new(SessionSettings::default());
        session.handle(Trigger::Link(LinkEvent::Connected));
        let effects = session.handle(Trigger::Link(LinkEvent::Disconnected("gone".into())));
        assert_eq!(session.state().phase, Phase::Join);
        assert!(!session.state().connected);
        assert_eq!(notices(&effects)[0].level, NoticeLevel::Warning);

        let mut session = SessionController::new(SessionSettings::default());
        session.handle(Trigger::Link(LinkEvent::ConnectFailed("refused".into())));
        assert_eq!(session.state().phase, Phase::Join);
    }

    #[test]
    fn game_end_reports_shot_tally() {
        let (mut session, _, player_id) = playing(true);
        let opponent = Uuid::new_v4();
        for position in [0, 1, 2] {
            server(&mut session, ServerMsg::ShotResult { actor: player_id, position, hit: true });
        }
        server(&mut session, ServerMsg::ShotResult { actor: player_id, position: 3, hit: false });
        server(&mut session, ServerMsg::ShotResult { actor: opponent, position: 62, hit: true });

        let effects = server(&mut session, ServerMsg::GameEnd { message: "You won".to_string() });
        let text = &notices(&effects)[0].text;
        assert!(text.starts_with("You won"));
        assert!(text.ends_with("(shots fired 4, hits 3, hits taken 1)"));
        assert_eq!(session.state().outcome.as_deref(), Some("You won"));
    }

    #[test]
    fn commit_without_match_warns_and_stays_open() {
        let mut session = waiting();
        server(&mut session, ServerMsg::BeginPlacement);
        user(&mut session, UserAction::RandomizeAll);
        let effects = user(&mut session, UserAction::CommitPlacement);

        assert!(sent(&effects).is_empty());
        assert!(!session.state().placement_locked);
        assert!(session.state().placement.is_running());
        let notes = notices(&effects);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NoticeLevel::Warning);
    }

    #[test]
    fn unplaced_ships_are_named_in_warning() {
        let board = BoardState::standard();
        assert_eq!(unplaced_warning(&board, &[]), None);
        assert_eq!(
            unplaced_warning(&board, &[ShipId(0), ShipId(4)]),
            Some("Could not find room for Carrier, Destroyer".to_string())
        );
    }

    #[test]
    fn out_of_phase_messages_are_ignored() {
        let mut session = join_form();
        assert!(server(&mut session, ServerMsg::BeginPlacement).is_empty());
        assert!(server(&mut session, ServerMsg::TurnChange { turn_holder: Uuid::new_v4() }).is_empty());
        assert_eq!(session.state().phase, Phase::Join);
    }
}
