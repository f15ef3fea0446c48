use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use windward_protocol::{
    BuildingKind, BuildingView, Coord, EntityView, GameView, GoodsKind, Mission, ObjectId,
    PlayerId, PlayerView, SettlementView, Terrain, TileView, UnitKind, UnitView, Wish,
};

use crate::{Registry, Sight};

/// The game root. Owns the turn counter mirrored to clients and the
/// once-per-game succession flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: ObjectId,
    pub turn: u32,
    pub succession_done: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: ObjectId,
    pub seat: PlayerId,
    pub name: String,
    pub nation: String,
    pub is_ai: bool,
    pub dead: bool,
    pub gold: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub id: ObjectId,
    pub coord: Coord,
    pub terrain: Terrain,
    /// Claimed-by seat, set while a settlement works the tile.
    pub owner: Option<PlayerId>,
    /// Cached settlement link, re-derivable from the settlement's own
    /// tile field; the integrity checker repairs it when stale.
    pub settlement: Option<ObjectId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: ObjectId,
    pub kind: UnitKind,
    pub owner: PlayerId,
    /// Containing tile, or the carrier the unit is aboard.
    pub location: ObjectId,
    pub moves_left: u8,
    /// Weak reference; never followed for lifecycle decisions.
    pub mission: Option<Mission>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: ObjectId,
    pub name: String,
    pub owner: PlayerId,
    pub tile: ObjectId,
    pub population: u32,
    pub production_bonus: i32,
    pub food: u32,
    pub stores: BTreeMap<GoodsKind, u32>,
    /// Weak references; see `Wish`.
    pub wishes: Vec<Wish>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: ObjectId,
    pub settlement: ObjectId,
    pub kind: BuildingKind,
    pub level: u8,
}

/// Every object the registry can hold. A closed enum keeps serialization
/// and dispatch total: adding a kind fails to compile until every match
/// below handles it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameObject {
    Game(Game),
    Player(Player),
    Tile(Tile),
    Unit(Unit),
    Settlement(Settlement),
    Building(Building),
}

impl GameObject {
    pub fn id(&self) -> ObjectId {
        match self {
            GameObject::Game(o) => o.id,
            GameObject::Player(o) => o.id,
            GameObject::Tile(o) => o.id,
            GameObject::Unit(o) => o.id,
            GameObject::Settlement(o) => o.id,
            GameObject::Building(o) => o.id,
        }
    }

    /// Containment parent. These edges form the ownership tree disposal
    /// cascades along; weak references never appear here.
    pub fn parent(&self) -> Option<ObjectId> {
        match self {
            GameObject::Game(_) => None,
            GameObject::Player(_) | GameObject::Tile(_) => Some(ObjectId::ROOT),
            GameObject::Unit(u) => Some(u.location),
            GameObject::Settlement(s) => Some(s.tile),
            GameObject::Building(b) => Some(b.settlement),
        }
    }

    /// The seat directly recorded on this object, without walking the
    /// containment chain (see `Registry::owning_player` for that).
    pub fn direct_owner(&self) -> Option<PlayerId> {
        match self {
            GameObject::Game(_) | GameObject::Building(_) => None,
            GameObject::Player(p) => Some(p.seat),
            GameObject::Tile(t) => t.owner,
            GameObject::Unit(u) => Some(u.owner),
            GameObject::Settlement(s) => Some(s.owner),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GameObject::Game(_) => "game",
            GameObject::Player(_) => "player",
            GameObject::Tile(_) => "tile",
            GameObject::Unit(_) => "unit",
            GameObject::Settlement(_) => "settlement",
            GameObject::Building(_) => "building",
        }
    }

    /// Build the observer-facing view at the given sight level. Summary
    /// views leave privileged fields unset rather than zeroed, so a
    /// client mirror never mistakes redaction for a reset.
    pub fn view(&self, registry: &Registry, sight: Sight) -> EntityView {
        let full = sight == Sight::Full;
        match self {
            GameObject::Game(g) => EntityView::Game(GameView {
                object: g.id,
                turn: g.turn,
                succession_done: g.succession_done,
            }),
            GameObject::Player(p) => EntityView::Player(PlayerView {
                object: p.id,
                player: p.seat,
                name: p.name.clone(),
                nation: p.nation.clone(),
                is_ai: p.is_ai,
                dead: p.dead,
                gold: full.then_some(p.gold),
            }),
            GameObject::Tile(t) => EntityView::Tile(TileView {
                object: t.id,
                coord: t.coord,
                terrain: t.terrain,
                owner: if full { t.owner } else { None },
                settlement: if full { t.settlement } else { None },
            }),
            GameObject::Unit(u) => EntityView::Unit(UnitView {
                object: u.id,
                unit_kind: u.kind,
                owner: u.owner,
                location: u.location,
                moves_left: full.then_some(u.moves_left),
                cargo: full.then(|| registry.children_of_kind(u.id, "unit")),
                mission: if full { u.mission } else { None },
            }),
            GameObject::Settlement(s) => EntityView::Settlement(SettlementView {
                object: s.id,
                name: s.name.clone(),
                owner: s.owner,
                tile: s.tile,
                population: s.population,
                production_bonus: full.then_some(s.production_bonus),
                stores: full.then(|| s.stores.clone()),
            }),
            GameObject::Building(b) => EntityView::Building(BuildingView {
                object: b.id,
                settlement: b.settlement,
                building_kind: b.kind,
                level: b.level,
            }),
        }
    }
}
