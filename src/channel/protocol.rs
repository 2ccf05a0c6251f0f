//! Match server protocol message definitions
//! These are the wire types for client-server communication: one JSON object
//! per line, tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{Cell, Ship};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMsg {
    /// Request to be matched with an opponent
    #[serde(rename_all = "camelCase")]
    JoinRequest {
        /// Payout address, must contain `@`
        address: String,
        /// Selected wager in sats
        bet_amount: u64,
    },

    /// In-progress layout, mirrored by the server
    #[serde(rename_all = "camelCase")]
    UpdateBoard {
        match_id: Uuid,
        placements: Vec<ShipPlacement>,
    },

    /// Final layout; no edits after this
    #[serde(rename_all = "camelCase")]
    CommitPlacement {
        match_id: Uuid,
        placements: Vec<ShipPlacement>,
    },

    /// Shot at the opponent's grid
    #[serde(rename_all = "camelCase")]
    Fire { match_id: Uuid, position: usize },

    /// Abandon the match before it starts
    #[serde(rename_all = "camelCase")]
    Cancel { match_id: Uuid, player_id: Uuid },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMsg {
    /// Connect acknowledgment
    #[serde(rename_all = "camelCase")]
    Welcome { server_time: u64 },

    /// Join accepted, identifiers assigned
    #[serde(rename_all = "camelCase")]
    Joined {
        match_id: Uuid,
        player_id: Uuid,
        /// Wager terms, passed through for display
        #[serde(default)]
        terms: Option<WagerTerms>,
    },

    /// Pay this invoice to enter the match
    #[serde(rename_all = "camelCase")]
    PaymentRequest { invoice: String, hosted_url: String },

    PaymentVerified,

    BeginPlacement,

    PlacementCommitted,

    PlacementAutoCommitted,

    /// Server's copy of the local board
    #[serde(rename_all = "camelCase")]
    BoardSync {
        count: usize,
        grid: Vec<Cell>,
        ships: Vec<ShipPlacement>,
    },

    #[serde(rename_all = "camelCase")]
    BeginCombat {
        turn_holder: Uuid,
        #[serde(default)]
        message: String,
    },

    /// Authoritative outcome of a shot by either player
    #[serde(rename_all = "camelCase")]
    ShotResult {
        actor: Uuid,
        position: usize,
        hit: bool,
    },

    #[serde(rename_all = "camelCase")]
    TurnChange { turn_holder: Uuid },

    GameEnd { message: String },

    Error { message: String },

    MatchmakingUpdate { message: String },
}

/// One ship's layout on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPlacement {
    pub name: String,
    pub positions: Vec<usize>,
    pub horizontal: bool,
}

impl From<&Ship> for ShipPlacement {
    fn from(ship: &Ship) -> Self {
        Self {
            name: ship.name.to_string(),
            positions: ship.positions.clone(),
            horizontal: ship.horizontal,
        }
    }
}

/// Wager terms as quoted by the server. Not computed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerTerms {
    pub bet: u64,
    pub payout: u64,
    pub fee: u64,
}

/// Encode a message as a single line (no trailing newline)
pub fn encode(msg: &ClientMsg) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

pub fn decode(line: &str) -> Result<ServerMsg, serde_json::Error> {
    serde_json::from_str(line.trim())
}
