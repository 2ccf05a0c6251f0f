//! Naval Wager Client - console client for the two-player wager game
//!
//! This is the main entry point for the client. It wires together:
//! - The match-server channel (JSON lines over TCP, with reconnect)
//! - The session state machine and its countdowns
//! - A text console for commands and board rendering

mod app;
mod board;
mod channel;
mod config;
mod session;
mod util;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{console, ClientRuntime, TimerDriver};
use crate::config::Config;
use crate::util::rate_limit::BoardUpdateLimiter;
use crate::util::time::TICK_PERIOD;

const QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Naval Wager Client");
    info!("Match server: {}", config.server_addr);

    // Server channel
    let (event_tx, event_rx) = mpsc::channel(QUEUE_CAPACITY);
    let channel = channel::spawn(
        config.server_addr,
        config.connect_timeout(),
        config.reconnect_delay(),
        event_tx,
    );

    // Console input
    let (action_tx, action_rx) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(console::read_commands(action_tx));

    // Countdown ticks
    let (tick_tx, tick_rx) = mpsc::channel(QUEUE_CAPACITY);
    let timers = TimerDriver::new(tick_tx, TICK_PERIOD);

    let runtime = ClientRuntime::new(
        config.session_settings(),
        channel.outbound(),
        timers,
        BoardUpdateLimiter::new(config.board_update_rate),
    );

    tokio::select! {
        _ = runtime.run(action_rx, event_rx, tick_rx) => {
            info!("Console closed");
        }
        _ = shutdown_signal() => {}
    }

    channel.shutdown();
    info!("Client shutdown complete");
    Ok(())
}

/// Initialize tracing/logging. Logs go to stderr so they do not interleave
/// with the board on stdout.
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
