//! Windward Multiplayer Server
//!
//! Authoritative server using Renet for networking. One single-writer
//! game session per process; clients hold filtered mirrors kept in sync
//! through projected change batches.

pub mod ai;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod players;
pub mod protocol;
pub mod transport;

pub use channels::*;
pub use config::{ServerConfig, TurnTimerConfig};
pub use players::{AddPlayerError, Player, PlayerManager, PlayerState, ReconnectError};
pub use protocol::*;
pub use transport::{ServerRunner, TransportConfig, PROTOCOL_ID};
