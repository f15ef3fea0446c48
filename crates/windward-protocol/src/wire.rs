//! MessagePack codec helpers plus the deterministic state hash used for
//! desync detection. JSON variants exist for tooling and debugging.

use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::{Action, ClientState, ObjectDelta};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_action(action: &Action) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(action)?)
}

pub fn deserialize_action(bytes: &[u8]) -> Result<Action, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_deltas(deltas: &[ObjectDelta]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(deltas)?)
}

pub fn deserialize_deltas(bytes: &[u8]) -> Result<Vec<ObjectDelta>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_client_state(state: &ClientState) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(state)?)
}

pub fn deserialize_client_state(bytes: &[u8]) -> Result<ClientState, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_action_json(action: &Action) -> Result<String, WireError> {
    Ok(serde_json::to_string(action)?)
}

pub fn deserialize_action_json(json: &str) -> Result<Action, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_deltas_json(deltas: &[ObjectDelta]) -> Result<String, WireError> {
    Ok(serde_json::to_string(deltas)?)
}

pub fn deserialize_deltas_json(json: &str) -> Result<Vec<ObjectDelta>, WireError> {
    Ok(serde_json::from_str(json)?)
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coord, Message, ObjectId, PlayerId};

    #[test]
    fn action_roundtrip() {
        let action = Action::Move {
            unit: ObjectId(17),
            to: Coord::new(9, 10),
        };
        let bytes = serialize_action(&action).unwrap();
        assert_eq!(deserialize_action(&bytes).unwrap(), action);

        let json = serialize_action_json(&action).unwrap();
        assert_eq!(deserialize_action_json(&json).unwrap(), action);
    }

    #[test]
    fn delta_roundtrip() {
        let deltas = vec![
            ObjectDelta::Removed {
                object: ObjectId(4),
            },
            ObjectDelta::OwnerChanged {
                object: ObjectId(9),
                previous: Some(PlayerId(1)),
                owner: PlayerId(0),
            },
            ObjectDelta::Note {
                message: Message::new("succession").arg("loser", "Verdania"),
            },
        ];
        let bytes = serialize_deltas(&deltas).unwrap();
        assert_eq!(deserialize_deltas(&bytes).unwrap(), deltas);
    }

    #[test]
    fn hash_is_stable() {
        let h1 = hash_bytes_fnv1a64(b"windward");
        let h2 = hash_bytes_fnv1a64(b"windward");
        assert_eq!(h1, h2);
        assert_ne!(h1, hash_bytes_fnv1a64(b"leeward"));
    }
}
