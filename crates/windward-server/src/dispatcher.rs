//! Delivery of projected change batches and session messages.
//!
//! The dispatcher writes onto renet's per-connection buffered channels;
//! the transport drains them independently of the game loop, so a slow
//! or disconnected client never blocks the single-writer simulation.
//! Batches ride the reliable-ordered channel: one flushed operation is
//! one message, and successive operations arrive in production order.

use renet::RenetServer;
use tracing::warn;

use windward_core::{Flush, GameSession};
use windward_protocol::PlayerId;

use crate::channels::channel_id;
use crate::players::PlayerManager;
use crate::protocol::{serialize_server_message, ServerMessage};

pub fn send(server: &mut RenetServer, client_id: u64, message: &ServerMessage) {
    match serialize_server_message(message) {
        Ok(data) => {
            let channel = channel_for(message);
            server.send_message(client_id, channel, data);
        }
        Err(e) => warn!("failed to serialize server message: {e}"),
    }
}

pub fn broadcast(server: &mut RenetServer, message: &ServerMessage) {
    match serialize_server_message(message) {
        Ok(data) => {
            let channel = channel_for(message);
            server.broadcast_message(channel, data);
        }
        Err(e) => warn!("failed to serialize server message: {e}"),
    }
}

fn channel_for(message: &ServerMessage) -> u8 {
    match message {
        ServerMessage::Chat { .. } | ServerMessage::Notification { .. } => channel_id::CHAT,
        ServerMessage::Pong { .. } => channel_id::HEARTBEAT,
        _ => channel_id::COMMANDS,
    }
}

/// Send each connected observer its projected batch for one operation.
/// Empty batches are skipped; the authoritative state was already
/// committed by the session before this is called.
pub fn deliver_flush(
    server: &mut RenetServer,
    players: &PlayerManager,
    session: &GameSession,
    flush: &Flush,
) {
    let turn = session.turn_number();
    let checksum = session.checksum();
    for (seat, batch) in &flush.deltas {
        if batch.is_empty() {
            continue;
        }
        let Some(client_id) = players.client_of(*seat) else {
            continue;
        };
        if !players.is_connected(*seat) {
            continue;
        }
        send(
            server,
            client_id,
            &ServerMessage::Changes {
                turn,
                batch: batch.clone(),
                checksum,
            },
        );
    }
}

/// Full filtered snapshot for one observer (join, reconnect, desync).
pub fn sync_client(
    server: &mut RenetServer,
    session: &mut GameSession,
    client_id: u64,
    seat: PlayerId,
) {
    let state = session.sync(seat);
    let checksum = session.checksum();
    send(
        server,
        client_id,
        &ServerMessage::StateSync { state, checksum },
    );
}
