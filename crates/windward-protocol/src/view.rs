use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    BuildingKind, Coord, GoodsKind, Mission, ObjectId, PlayerId, Terrain, UnitKind,
};

/// Observer-facing projection of one game object. Summary projections
/// leave the `Option` fields unset; clients treat an unset field as
/// "unknown", not as a reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntityView {
    Game(GameView),
    Player(PlayerView),
    Tile(TileView),
    Unit(UnitView),
    Settlement(SettlementView),
    Building(BuildingView),
}

impl EntityView {
    pub fn object(&self) -> ObjectId {
        match self {
            EntityView::Game(v) => v.object,
            EntityView::Player(v) => v.object,
            EntityView::Tile(v) => v.object,
            EntityView::Unit(v) => v.object,
            EntityView::Settlement(v) => v.object,
            EntityView::Building(v) => v.object,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub object: ObjectId,
    pub turn: u32,
    pub succession_done: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub object: ObjectId,
    pub player: PlayerId,
    pub name: String,
    pub nation: String,
    pub is_ai: bool,
    pub dead: bool,
    /// Treasury, owner only.
    #[serde(default)]
    pub gold: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileView {
    pub object: ObjectId,
    pub coord: Coord,
    pub terrain: Terrain,
    /// Claimed-by seat; unset when only remembered terrain is visible.
    #[serde(default)]
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub settlement: Option<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub object: ObjectId,
    pub unit_kind: UnitKind,
    pub owner: PlayerId,
    /// Containing tile or carrier.
    pub location: ObjectId,
    #[serde(default)]
    pub moves_left: Option<u8>,
    /// Units aboard, carriers only.
    #[serde(default)]
    pub cargo: Option<Vec<ObjectId>>,
    #[serde(default)]
    pub mission: Option<Mission>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementView {
    pub object: ObjectId,
    pub name: String,
    pub owner: PlayerId,
    pub tile: ObjectId,
    /// Size is visible from outside the walls.
    pub population: u32,
    #[serde(default)]
    pub production_bonus: Option<i32>,
    #[serde(default)]
    pub stores: Option<BTreeMap<GoodsKind, u32>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildingView {
    pub object: ObjectId,
    pub settlement: ObjectId,
    pub building_kind: BuildingKind,
    pub level: u8,
}

/// Filtered full state for initial sync and reconnection. Everything in
/// `views` is what the receiving observer is entitled to right now; the
/// server remembers the delivered set so later deltas never reference an
/// object the observer was not told about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub observer: PlayerId,
    pub turn: u32,
    pub current_player: PlayerId,
    pub views: Vec<EntityView>,
}
