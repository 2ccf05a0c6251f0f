//! Remote channel to the match server

pub mod connection;
pub mod protocol;

pub use connection::{spawn, ChannelEvent};
pub use protocol::ClientMsg;
