use serde::{Deserialize, Serialize};

use crate::{BuildingKind, Coord, ObjectId, UnitKind};

/// All possible client/AI → server action requests. Fully serializable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Move a unit one step; moving onto a hostile tile resolves combat,
    /// and taking the last defender of a settlement captures it.
    Move { unit: ObjectId, to: Coord },
    /// Consume a settler to found a settlement on its tile.
    FoundSettlement { unit: ObjectId, name: String },
    /// Construct a building in an owned settlement.
    Build {
        settlement: ObjectId,
        building: BuildingKind,
    },
    /// Train a new unit in an owned settlement.
    Train {
        settlement: ObjectId,
        unit_kind: UnitKind,
    },
    /// Put a unit aboard a carrier on the same tile.
    Embark { unit: ObjectId, carrier: ObjectId },
    /// Land a carried unit on an adjacent tile.
    Disembark { unit: ObjectId, to: Coord },
    /// Yield the rest of this turn.
    EndTurn,
}
