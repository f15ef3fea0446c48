use serde::{Deserialize, Serialize};

/// Stable identifier for a game object.
///
/// Ids are allocated monotonically by the authoritative registry and are
/// never reused within a game session, including after the object is
/// disposed. A stale id therefore always resolves to "not found" rather
/// than to some unrelated newer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The game root object, always the first registration.
    pub const ROOT: ObjectId = ObjectId(0);
}

/// Player seat index (max 8 players).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);
