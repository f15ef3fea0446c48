use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use windward_protocol::{Coord, ObjectId, PlayerId, See};

use crate::{ChangeSet, GameObject, Registry, Rules};

/// What one observer knows about the map: every tile ever explored, and
/// the subset currently inside some friendly unit's or settlement's
/// sight radius. Exploration is monotone; visibility is recomputed after
/// every operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    pub explored: BTreeSet<ObjectId>,
    pub visible: BTreeSet<ObjectId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMap {
    players: BTreeMap<PlayerId, Knowledge>,
}

impl KnowledgeMap {
    pub fn knowledge(&self, seat: PlayerId) -> Option<&Knowledge> {
        self.players.get(&seat)
    }

    pub fn is_visible(&self, seat: PlayerId, tile: ObjectId) -> bool {
        self.players
            .get(&seat)
            .is_some_and(|k| k.visible.contains(&tile))
    }

    pub fn is_explored(&self, seat: PlayerId, tile: ObjectId) -> bool {
        self.players
            .get(&seat)
            .is_some_and(|k| k.explored.contains(&tile))
    }

    /// Rebuild every observer's visible set from current unit and
    /// settlement positions. Tiles entering an observer's explored set
    /// for the first time are recorded as Add changes addressed to that
    /// observer alone, so the client mirror learns the terrain.
    pub(crate) fn recompute(
        &mut self,
        registry: &Registry,
        rules: &Rules,
        tiles_by_coord: &BTreeMap<Coord, ObjectId>,
        changes: &mut ChangeSet,
    ) {
        let mut sources: BTreeMap<PlayerId, Vec<(Coord, u32)>> = BTreeMap::new();
        for (_, object) in registry.iter() {
            match object {
                GameObject::Unit(u) => {
                    let Some(tile_id) = registry.location_tile(u.id) else {
                        continue;
                    };
                    if let Some(GameObject::Tile(t)) = registry.get(tile_id) {
                        sources
                            .entry(u.owner)
                            .or_default()
                            .push((t.coord, rules.unit(u.kind).sight));
                    }
                }
                GameObject::Settlement(s) => {
                    if let Some(GameObject::Tile(t)) = registry.get(s.tile) {
                        sources
                            .entry(s.owner)
                            .or_default()
                            .push((t.coord, rules.settlement.sight));
                    }
                }
                _ => {}
            }
        }

        let seats: BTreeSet<PlayerId> = self
            .players
            .keys()
            .copied()
            .chain(sources.keys().copied())
            .collect();

        for seat in seats {
            let mut visible = BTreeSet::new();
            for (center, radius) in sources.get(&seat).map(Vec::as_slice).unwrap_or(&[]) {
                let r = *radius as i32;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let coord = Coord::new(center.x + dx, center.y + dy);
                        if let Some(tile) = tiles_by_coord.get(&coord) {
                            visible.insert(*tile);
                        }
                    }
                }
            }

            let knowledge = self.players.entry(seat).or_default();
            for tile in &visible {
                if knowledge.explored.insert(*tile) {
                    changes.push_add(*tile, See::only(seat));
                }
            }
            knowledge.visible = visible;
        }
    }

    pub(crate) fn restore(players: BTreeMap<PlayerId, Knowledge>) -> Self {
        Self { players }
    }

    pub(crate) fn players(&self) -> &BTreeMap<PlayerId, Knowledge> {
        &self.players
    }
}
