//! Built-in AI actor.
//!
//! The planner is intentionally simple — strategy is not this crate's
//! business — but the *interface* is the point: an AI player receives
//! exactly the filtered `ClientState` a human client of that seat would,
//! never the authoritative registry, and submits ordinary actions
//! through the same validation path. Planning is bounded by a deadline;
//! a unit whose decision does not arrive in time simply passes.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::warn;

use windward_protocol::{
    Action, ClientState, Coord, EntityView, ObjectId, Terrain, UnitKind, UnitView,
};

/// Decide this turn's actions for the observing seat. The returned list
/// never includes `EndTurn`; the driver appends it after submission.
pub fn plan(state: &ClientState, deadline: Instant) -> Vec<Action> {
    let mut tiles: BTreeMap<Coord, Terrain> = BTreeMap::new();
    let mut coord_of_tile: BTreeMap<ObjectId, Coord> = BTreeMap::new();
    let mut settled: BTreeMap<ObjectId, bool> = BTreeMap::new();
    for view in &state.views {
        match view {
            EntityView::Tile(t) => {
                tiles.insert(t.coord, t.terrain);
                coord_of_tile.insert(t.object, t.coord);
                if t.settlement.is_some() {
                    settled.insert(t.object, true);
                }
            }
            EntityView::Settlement(s) => {
                settled.insert(s.tile, true);
            }
            _ => {}
        }
    }

    let mut own_units: Vec<&UnitView> = state
        .views
        .iter()
        .filter_map(|v| match v {
            EntityView::Unit(u) if u.owner == state.observer => Some(u),
            _ => None,
        })
        .collect();
    own_units.sort_by_key(|u| u.object);

    let mut actions = Vec::new();
    for unit in own_units {
        if Instant::now() >= deadline {
            warn!(
                seat = ?state.observer,
                "AI planning budget exhausted; remaining units pass"
            );
            break;
        }
        let Some(moves_left) = unit.moves_left else {
            continue;
        };
        if moves_left == 0 {
            continue;
        }
        // Sailing is left to future planners.
        if unit.unit_kind == UnitKind::Caravel {
            continue;
        }
        let Some(&coord) = coord_of_tile.get(&unit.location) else {
            // Aboard a carrier; nothing to decide here.
            continue;
        };

        if unit.unit_kind == UnitKind::Settler && !settled.contains_key(&unit.location) {
            actions.push(Action::FoundSettlement {
                unit: unit.object,
                name: format!("Colony {}", state.turn),
            });
            continue;
        }

        // Walk somewhere passable, rotating the preferred direction per
        // unit and turn so patrols do not ping-pong.
        let neighbors = coord.neighbors();
        let offset = (unit.object.0 as usize + state.turn as usize) % neighbors.len();
        let step = (0..neighbors.len())
            .map(|i| neighbors[(offset + i) % neighbors.len()])
            .find(|c| {
                tiles
                    .get(c)
                    .is_some_and(|terrain| terrain.is_passable_on_foot())
            });
        if let Some(to) = step {
            actions.push(Action::Move {
                unit: unit.object,
                to,
            });
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use windward_protocol::{PlayerId, TileView};

    fn tile(object: u32, x: i32, y: i32, terrain: Terrain) -> EntityView {
        EntityView::Tile(TileView {
            object: ObjectId(object),
            coord: Coord::new(x, y),
            terrain,
            owner: None,
            settlement: None,
        })
    }

    fn unit(object: u32, kind: UnitKind, owner: u8, location: u32, moves: u8) -> EntityView {
        EntityView::Unit(UnitView {
            object: ObjectId(object),
            unit_kind: kind,
            owner: PlayerId(owner),
            location: ObjectId(location),
            moves_left: Some(moves),
            cargo: None,
            mission: None,
        })
    }

    fn state(views: Vec<EntityView>) -> ClientState {
        ClientState {
            observer: PlayerId(0),
            turn: 3,
            current_player: PlayerId(0),
            views,
        }
    }

    #[test]
    fn moves_only_own_units() {
        let state = state(vec![
            tile(1, 4, 4, Terrain::Plains),
            tile(2, 5, 4, Terrain::Plains),
            unit(10, UnitKind::Scout, 0, 1, 2),
            unit(11, UnitKind::Scout, 1, 2, 2),
        ]);
        let actions = plan(&state, Instant::now() + Duration::from_secs(1));
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0],
            Action::Move { unit, .. } if unit == ObjectId(10)
        ));
    }

    #[test]
    fn settler_founds_on_open_tile() {
        let state = state(vec![
            tile(1, 4, 4, Terrain::Plains),
            unit(10, UnitKind::Settler, 0, 1, 1),
        ]);
        let actions = plan(&state, Instant::now() + Duration::from_secs(1));
        assert!(matches!(
            actions.first(),
            Some(Action::FoundSettlement { unit, .. }) if *unit == ObjectId(10)
        ));
    }

    #[test]
    fn expired_deadline_means_pass() {
        let state = state(vec![
            tile(1, 4, 4, Terrain::Plains),
            tile(2, 5, 4, Terrain::Plains),
            unit(10, UnitKind::Scout, 0, 1, 2),
        ]);
        let actions = plan(&state, Instant::now() - Duration::from_millis(1));
        assert!(actions.is_empty());
    }

    #[test]
    fn exhausted_units_do_not_act() {
        let state = state(vec![
            tile(1, 4, 4, Terrain::Plains),
            unit(10, UnitKind::Scout, 0, 1, 0),
        ]);
        let actions = plan(&state, Instant::now() + Duration::from_secs(1));
        assert!(actions.is_empty());
    }
}
