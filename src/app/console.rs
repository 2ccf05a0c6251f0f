//! Text console - stdin commands in, notices and boards out

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use crate::board::{Cell, Grid, ShipId, FLEET, GRID_COLS, GRID_ROWS};
use crate::session::{Notice, NoticeLevel, Phase, SessionState, TimerKind, UserAction};

/// Pixel size of a console "cell" when translating to drop coordinates
pub const CELL_PX: f64 = 40.0;

const HELP: &str = "\
commands:
  start                      leave the title screen
  join <bet> <address>       enter matchmaking (bets: 1000 5000 10000 25000 50000 100000)
  cancel                     leave matchmaking
  place <ship> <col> <row>   drop a ship (carrier battleship cruiser submarine destroyer)
  rotate <ship>              flip a ship's orientation
  random | fill | clear      randomize all, randomize unplaced, clear the board
  save                       commit placement
  fire <col> <row>           shoot at the opponent
  restart                    back to the title screen after a game
  quit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Action(UserAction),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command {0:?}, type help")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("No ship called {0:?}")]
    UnknownShip(String),

    #[error("Coordinates must be within {cols}x{rows}")]
    OutOfRange { cols: usize, rows: usize },
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(CommandError::Usage("help"));
    };
    let args: Vec<&str> = words.collect();

    let action = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("help" | "?", _) => return Ok(Command::Help),
        ("quit" | "exit", _) => return Ok(Command::Quit),
        ("start", _) => UserAction::Start,
        ("join", [bet, address]) => UserAction::SubmitJoin {
            address: address.to_string(),
            bet: bet.parse().ok(),
        },
        ("join", [address]) => UserAction::SubmitJoin {
            address: address.to_string(),
            bet: None,
        },
        ("join", _) => return Err(CommandError::Usage("join <bet> <address>")),
        ("cancel", _) => UserAction::Cancel,
        ("place", [ship, col, row]) => {
            let ship = ship_id(ship)?;
            let (col, row) = cell(col, row)?;
            UserAction::PlaceShip {
                ship,
                x: col as f64 * CELL_PX + CELL_PX / 2.0,
                y: row as f64 * CELL_PX + CELL_PX / 2.0,
                cell_px: CELL_PX,
            }
        }
        ("place", _) => return Err(CommandError::Usage("place <ship> <col> <row>")),
        ("rotate", [ship]) => UserAction::ToggleOrientation(ship_id(ship)?),
        ("rotate", _) => return Err(CommandError::Usage("rotate <ship>")),
        ("random", _) => UserAction::RandomizeAll,
        ("fill", _) => UserAction::RandomizeUnplaced,
        ("clear", _) => UserAction::ClearBoard,
        ("save" | "commit", _) => UserAction::CommitPlacement,
        ("fire", [col, row]) => {
            let (col, row) = cell(col, row)?;
            UserAction::Fire(row * GRID_COLS + col)
        }
        ("fire", _) => return Err(CommandError::Usage("fire <col> <row>")),
        ("restart", _) => UserAction::Restart,
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Command::Action(action))
}

fn ship_id(name: &str) -> Result<ShipId, CommandError> {
    FLEET
        .iter()
        .position(|class| class.name.eq_ignore_ascii_case(name))
        .map(|i| ShipId(i as u8))
        .ok_or_else(|| CommandError::UnknownShip(name.to_string()))
}

fn cell(col: &str, row: &str) -> Result<(usize, usize), CommandError> {
    let out_of_range = CommandError::OutOfRange {
        cols: GRID_COLS,
        rows: GRID_ROWS,
    };
    match (col.parse::<usize>(), row.parse::<usize>()) {
        (Ok(col), Ok(row)) if col < GRID_COLS && row < GRID_ROWS => Ok((col, row)),
        _ => Err(out_of_range),
    }
}

/// Read stdin until EOF or `quit`, forwarding actions to the runtime
pub async fn read_commands(actions: mpsc::Sender<UserAction>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Action(action)) => {
                if actions.send(action).await.is_err() {
                    break;
                }
            }
            Ok(Command::Help) => println!("{}", HELP),
            Ok(Command::Quit) => break,
            Err(e) => println!("{}", e),
        }
    }
    debug!("Console input closed");
}

pub fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Info => "*",
        NoticeLevel::Warning => "!",
        NoticeLevel::Error => "x",
    };
    println!("[{}] {}", tag, notice.text);
}

/// Print the parts of the session the player needs for the current phase
pub fn render(state: &SessionState) {
    match state.phase {
        Phase::Splash => println!("== Naval Wager == type start"),
        Phase::Join => println!("-- join: join <bet> <address>"),
        Phase::Waiting => {
            println!("-- waiting for match");
            if let Some(invoice) = &state.invoice {
                println!("   invoice: {}", invoice.invoice);
                println!("   pay at:  {}", invoice.hosted_url);
                print_countdown(state, TimerKind::Payment);
            }
        }
        Phase::Placing => {
            let status = if state.placement_locked { "locked" } else { "open" };
            println!("-- placement ({})", status);
            print_countdown(state, TimerKind::Placement);
            print_grid(&state.board.grid);
            for ship in state.board.unplaced() {
                println!("   unplaced: {} ({})", ship.name, ship.size);
            }
        }
        Phase::Playing => {
            if let Some(ctx) = &state.match_ctx {
                let turn = if ctx.my_turn() { "your turn" } else { "opponent's turn" };
                println!("-- battle: {}", turn);
                println!("   enemy waters");
                print_grid(&ctx.enemy_view);
            }
            println!("   your fleet ({} cells afloat)", state.board.grid.count(Cell::Ship));
            print_grid(&state.board.grid);
        }
        Phase::Finished => {
            if let Some(outcome) = &state.outcome {
                println!("== {} == type restart", outcome);
            }
            if let Some(ctx) = &state.match_ctx {
                println!("   {}", ctx.tally);
            }
        }
    }
}

pub fn print_countdown(state: &SessionState, kind: TimerKind) {
    let countdown = state.countdown(kind);
    if countdown.is_running() {
        println!("   {}s left", countdown.remaining());
    }
}

fn print_grid(grid: &Grid) {
    let header: String = (0..grid.cols()).map(|c| format!(" {}", c)).collect();
    println!("    {}", header);
    for row in 0..grid.rows() {
        let cells: String = (0..grid.cols())
            .map(|col| match grid.get(grid.index(row, col)) {
                Some(Cell::Ship) => " #",
                Some(Cell::Hit) => " X",
                Some(Cell::Miss) => " o",
                _ => " .",
            })
            .collect();
        println!("   {}{}", row, cells);
    }
}
