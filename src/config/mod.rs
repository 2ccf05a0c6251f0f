//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::session::SessionSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Match server address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Seconds to wait for the server's welcome after connecting
    pub connect_timeout_secs: u64,
    /// Seconds to wait before reconnecting after a dropped connection
    pub reconnect_delay_secs: u64,

    /// Seconds to wait for the server to acknowledge a join request
    pub join_timeout_secs: u32,
    /// Placement countdown length
    pub placement_seconds: u32,
    /// Payment countdown length
    pub payment_seconds: u32,

    /// Max board updates sent per second while placing
    pub board_update_rate: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:4000".to_string());

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            connect_timeout_secs: parse_or("CONNECT_TIMEOUT_SECS", 10)?,
            reconnect_delay_secs: parse_or("RECONNECT_DELAY_SECS", 3)?,

            join_timeout_secs: positive_or("JOIN_TIMEOUT_SECS", 10)?,
            placement_seconds: positive_or("PLACEMENT_SECONDS", 60)?,
            payment_seconds: positive_or("PAYMENT_SECONDS", 300)?,

            board_update_rate: positive_or("BOARD_UPDATE_RATE", 5)?,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Countdown lengths handed to the session state machine
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            join_timeout_secs: self.join_timeout_secs,
            placement_seconds: self.placement_seconds,
            payment_seconds: self.payment_seconds,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_or`] but zero is rejected; a zero-length countdown would never tick.
fn positive_or(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match parse_or(name, default)? {
        0 => Err(ConfigError::Invalid(name)),
        value => Ok(value),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
