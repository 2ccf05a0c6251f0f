//! Time utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Seed for the placement generator: the player id folded to 64 bits, mixed
/// with the time it was assigned. Not suitable for anything security related.
pub fn session_seed(player_id: Uuid, assigned_at_millis: u64) -> u64 {
    let id = player_id.as_u128();
    (id >> 64) as u64 ^ id as u64 ^ assigned_at_millis.rotate_left(32)
}

/// Countdown tick period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);
