//! Network protocol messages for multiplayer.
//!
//! Extends windward-protocol with session-level messages: joining,
//! lobby flow, state sync, change-batch delivery and rejections.

use serde::{Deserialize, Serialize};

use windward_core::{ActionError, ErrorCategory};
use windward_protocol::{Action, ClientState, GameResult, ObjectDelta, ObjectId, PlayerId};

/// Client-to-server messages
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Request to join the game
    Join {
        player_name: String,
        /// Optional reconnection token
        reconnect_token: Option<String>,
    },
    /// Set ready state in lobby
    SetReady { ready: bool },
    /// Request to start the game (host only)
    StartGame,
    /// Submit one action; the server replies with the projected change
    /// batch on success or a structured rejection
    Submit { action: Action },
    /// Request current filtered game state (reconnection, desync)
    RequestState,
    /// Chat message
    Chat { message: String },
    /// Ping for latency measurement
    Ping { timestamp: u64 },
}

/// Server-to-client messages
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Connection accepted
    JoinAccepted {
        player: PlayerId,
        reconnect_token: String,
    },
    /// Connection rejected
    JoinRejected { reason: JoinRejectReason },
    /// Current lobby state (sent on join and when lobby changes)
    LobbyState {
        players: Vec<LobbyPlayer>,
        host: PlayerId,
        min_players: u8,
        max_players: u8,
    },
    /// Player ready state changed
    PlayerReady { player: PlayerId, ready: bool },
    /// Game is starting
    GameStarting,
    /// Filtered full state (initial sync or reconnection)
    StateSync { state: ClientState, checksum: u64 },
    /// One operation's projected change batch for this observer
    Changes {
        turn: u32,
        batch: Vec<ObjectDelta>,
        checksum: u64,
    },
    /// Action rejected; local state must not change
    ActionRejected { reason: RejectReason },
    /// A player's turn began
    TurnStarted {
        player: PlayerId,
        turn: u32,
        time_remaining_ms: u64,
    },
    /// Game ended
    GameEnded { result: GameResult },
    /// Player connected
    PlayerConnected {
        player: PlayerId,
        player_name: String,
    },
    /// Player disconnected
    PlayerDisconnected { player: PlayerId, ai_takeover: bool },
    /// Player reconnected (AI gives back control)
    PlayerReconnected { player: PlayerId },
    /// Chat message from another player
    Chat { from: PlayerId, message: String },
    /// Pong response
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    /// Server notification
    Notification { notification: ServerNotification },
}

/// Reasons for rejecting a join request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JoinRejectReason {
    GameFull,
    GameInProgress,
    InvalidReconnectToken,
}

/// Player info for lobby state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub player: PlayerId,
    pub name: String,
    pub ready: bool,
    pub is_host: bool,
}

/// Structured action rejection, presentable without touching local state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RejectReason {
    NotYourTurn,
    TurnInProgress,
    GameOver,
    GameNotStarted,
    /// Stale identifier
    NotFound { object: ObjectId },
    /// Identifier owned by someone else
    Ownership { object: ObjectId },
    /// A precondition failed
    Validation { message: String },
}

/// Map a core rejection onto the wire taxonomy.
pub fn reject_reason(err: &ActionError) -> RejectReason {
    match err {
        ActionError::UnknownObject(object) => RejectReason::NotFound { object: *object },
        ActionError::NotYours(object) => RejectReason::Ownership { object: *object },
        ActionError::NotYourTurn(_) => RejectReason::NotYourTurn,
        ActionError::TurnInProgress => RejectReason::TurnInProgress,
        ActionError::GameOver => RejectReason::GameOver,
        other => {
            debug_assert_eq!(other.category(), ErrorCategory::Validation);
            RejectReason::Validation {
                message: other.to_string(),
            }
        }
    }
}

/// Server notifications
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerNotification {
    TurnTimerWarning { seconds_remaining: u32 },
    AiTookOver { player: PlayerId },
}

/// Serialize a client message for network transmission
pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec(msg)
}

/// Deserialize a client message from network data
pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

/// Serialize a server message for network transmission
pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec(msg)
}

/// Deserialize a server message from network data
pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}
