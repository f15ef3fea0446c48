use serde::{Deserialize, Serialize};

use crate::{ObjectId, PlayerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Plains,
    Forest,
    Hills,
    Mountains,
    Ocean,
}

impl Terrain {
    pub fn is_water(self) -> bool {
        matches!(self, Terrain::Ocean)
    }

    pub fn is_passable_on_foot(self) -> bool {
        !matches!(self, Terrain::Ocean | Terrain::Mountains)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Settler,
    Soldier,
    Scout,
    Dragoon,
    Caravel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    TownHall,
    Stockade,
    Warehouse,
    Dock,
    Chapel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodsKind {
    Food,
    Timber,
    Ore,
    Furs,
    Cloth,
}

/// Standing objective attached to a unit. The target is a weak
/// reference: it is resolved through the registry on use and may point
/// at an object that no longer exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub kind: MissionKind,
    pub target: ObjectId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    /// Carry the target unit to its destination.
    Transport,
    /// Shadow and protect the target unit.
    Escort,
}

/// A settlement's standing request for goods. The source location is a
/// weak reference, same rules as `Mission::target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wish {
    pub goods: GoodsKind,
    pub source: ObjectId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryReason {
    /// Single live player remains.
    Elimination,
    /// Turn limit reached; highest asset score wins.
    TurnLimit,
}

/// Result of a completed game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Option<PlayerId>,
    pub reason: VictoryReason,
    pub turn: u32,
    pub scores: Vec<(PlayerId, i64)>,
}
