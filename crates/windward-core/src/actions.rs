use windward_protocol::{
    Action, BuildingKind, ChangePriority, Coord, Field, Message, Mission, MissionKind, ObjectId,
    PlayerId, See, Terrain, UnitKind,
};

use crate::{ActionError, Building, ChangeSet, GameObject, GameSession, Settlement};

/// Execute one in-turn action for `actor`.
///
/// Every handler follows the same discipline: validate everything, then
/// mutate. Once the first change lands in the set the operation commits;
/// there is no mid-operation rollback, so no mutation may precede the
/// last validation.
pub(crate) fn apply(
    session: &mut GameSession,
    actor: PlayerId,
    action: Action,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    match action {
        Action::Move { unit, to } => move_unit(session, actor, unit, to, changes),
        Action::FoundSettlement { unit, name } => {
            found_settlement(session, actor, unit, name, changes)
        }
        Action::Build {
            settlement,
            building,
        } => build(session, actor, settlement, building, changes),
        Action::Train {
            settlement,
            unit_kind,
        } => train(session, actor, settlement, unit_kind, changes),
        Action::Embark { unit, carrier } => embark(session, actor, unit, carrier, changes),
        Action::Disembark { unit, to } => disembark(session, actor, unit, to, changes),
        // Routed through the turn engine before reaching here.
        Action::EndTurn => Err(ActionError::TurnInProgress),
    }
}

fn require_unit(
    session: &GameSession,
    actor: PlayerId,
    id: ObjectId,
) -> Result<&crate::Unit, ActionError> {
    match session.registry.get(id) {
        Some(GameObject::Unit(u)) => {
            if u.owner == actor {
                Ok(u)
            } else {
                Err(ActionError::NotYours(id))
            }
        }
        _ => Err(ActionError::UnknownObject(id)),
    }
}

fn require_settlement(
    session: &GameSession,
    actor: PlayerId,
    id: ObjectId,
) -> Result<&Settlement, ActionError> {
    match session.registry.get(id) {
        Some(GameObject::Settlement(s)) => {
            if s.owner == actor {
                Ok(s)
            } else {
                Err(ActionError::NotYours(id))
            }
        }
        _ => Err(ActionError::UnknownObject(id)),
    }
}

fn tile_terrain(session: &GameSession, id: ObjectId) -> Option<Terrain> {
    match session.registry.get(id) {
        Some(GameObject::Tile(t)) => Some(t.terrain),
        _ => None,
    }
}

/// Units standing directly on `tile` that belong to someone else.
fn foreign_units_on(session: &GameSession, tile: ObjectId, actor: PlayerId) -> Vec<ObjectId> {
    session
        .registry
        .iter()
        .filter_map(|(id, o)| match o {
            GameObject::Unit(u) if u.location == tile && u.owner != actor => Some(id),
            _ => None,
        })
        .collect()
}

fn move_unit(
    session: &mut GameSession,
    actor: PlayerId,
    unit_id: ObjectId,
    to: Coord,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let unit = require_unit(session, actor, unit_id)?;
    let stats = session.rules.unit(unit.kind).clone();

    let from_tile = match session.registry.get(unit.location) {
        Some(GameObject::Tile(t)) => t,
        _ => return Err(ActionError::AboardCarrier),
    };
    if unit.moves_left == 0 {
        return Err(ActionError::NoMovesLeft);
    }
    if !from_tile.coord.is_adjacent(to) {
        return Err(ActionError::NotAdjacent);
    }
    let dest_id = session.tile_at(to).ok_or(ActionError::OffMap)?;
    let dest_terrain = tile_terrain(session, dest_id).ok_or(ActionError::OffMap)?;
    let passable = if stats.naval {
        dest_terrain.is_water()
    } else {
        dest_terrain.is_passable_on_foot()
    };
    if !passable {
        return Err(ActionError::Impassable);
    }

    // Strongest defender stands for the whole stack; ties break toward
    // the older unit so combat is deterministic.
    let defenders = foreign_units_on(session, dest_id, actor);
    let defender = defenders
        .iter()
        .copied()
        .max_by_key(|id| {
            let defence = match session.registry.get(*id) {
                Some(GameObject::Unit(u)) => session.rules.unit(u.kind).defence,
                _ => 0,
            };
            (defence, std::cmp::Reverse(*id))
        });

    // Validation complete; everything below mutates.
    if let Some(defender_id) = defender {
        resolve_combat(session, actor, unit_id, defender_id, dest_id, changes);
        return Ok(());
    }

    let hostile_settlement = match session.registry.get(dest_id) {
        Some(GameObject::Tile(t)) => t.settlement.filter(|s| {
            matches!(
                session.registry.get(*s),
                Some(GameObject::Settlement(settlement)) if settlement.owner != actor
            )
        }),
        _ => None,
    };

    if let Some(GameObject::Unit(u)) = session.registry.get_mut(unit_id) {
        u.location = dest_id;
        u.moves_left -= 1;
    }
    changes.push_update(unit_id, ChangePriority::State, See::Perceived);

    if let Some(settlement_id) = hostile_settlement {
        capture_settlement(session, actor, settlement_id, dest_id, changes);
    }
    Ok(())
}

/// One round of combat: a single weighted roll decides it, the loser is
/// disposed (cargo cascades with a carrier), and an attacker taking the
/// last defender off a settlement tile leaves it open for capture.
fn resolve_combat(
    session: &mut GameSession,
    actor: PlayerId,
    attacker_id: ObjectId,
    defender_id: ObjectId,
    dest_id: ObjectId,
    changes: &mut ChangeSet,
) {
    let attack = match session.registry.get(attacker_id) {
        Some(GameObject::Unit(u)) => session.rules.unit(u.kind).attack.max(1),
        _ => 1,
    };
    let (defence, defender_owner) = match session.registry.get(defender_id) {
        Some(GameObject::Unit(u)) => (session.rules.unit(u.kind).defence.max(1), u.owner),
        _ => (1, actor),
    };

    let roll = session.rng.next_below((attack + defence) as u32);
    let attacker_wins = roll < attack as u32;

    if let Some(GameObject::Unit(u)) = session.registry.get_mut(attacker_id) {
        u.moves_left = 0;
    }
    changes.push_fields(
        attacker_id,
        &[Field::MovesLeft],
        ChangePriority::State,
        See::OwnerOnly,
    );

    let parties = See::Only {
        players: vec![actor, defender_owner],
    };
    if attacker_wins {
        session.registry.dispose(defender_id, changes);
        changes.push_message(parties, Message::new("combat.attacker_won"));
    } else {
        session.registry.dispose(attacker_id, changes);
        changes.push_message(parties, Message::new("combat.defender_held"));
    }

    if attacker_wins && foreign_units_on(session, dest_id, actor).is_empty() {
        let open_settlement = match session.registry.get(dest_id) {
            Some(GameObject::Tile(t)) => t.settlement.filter(|s| {
                matches!(
                    session.registry.get(*s),
                    Some(GameObject::Settlement(settlement)) if settlement.owner != actor
                )
            }),
            _ => None,
        };
        if let Some(settlement_id) = open_settlement {
            capture_settlement(session, actor, settlement_id, dest_id, changes);
        }
    }
}

/// Ownership transfer of a settlement and its tile. Buildings follow
/// implicitly through containment.
fn capture_settlement(
    session: &mut GameSession,
    actor: PlayerId,
    settlement_id: ObjectId,
    tile_id: ObjectId,
    changes: &mut ChangeSet,
) {
    let previous = match session.registry.get_mut(settlement_id) {
        Some(GameObject::Settlement(s)) => {
            let previous = s.owner;
            s.owner = actor;
            previous
        }
        _ => return,
    };
    changes.push_owner_change(settlement_id, Some(previous), actor, See::Perceived);

    if let Some(GameObject::Tile(t)) = session.registry.get_mut(tile_id) {
        t.owner = Some(actor);
    }
    changes.push_fields(
        tile_id,
        &[Field::TileOwner],
        ChangePriority::Ownership,
        See::Perceived,
    );
    changes.push_message(
        See::Only {
            players: vec![actor, previous],
        },
        Message::new("settlement.captured"),
    );
}

fn found_settlement(
    session: &mut GameSession,
    actor: PlayerId,
    unit_id: ObjectId,
    name: String,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let unit = require_unit(session, actor, unit_id)?;
    if unit.kind != UnitKind::Settler {
        return Err(ActionError::NotASettler);
    }
    let tile_id = match session.registry.get(unit.location) {
        Some(GameObject::Tile(t)) => t.id,
        _ => return Err(ActionError::AboardCarrier),
    };
    let (coord_ok, occupied) = match session.registry.get(tile_id) {
        Some(GameObject::Tile(t)) => (t.terrain.is_passable_on_foot(), t.settlement.is_some()),
        _ => (false, false),
    };
    if !coord_ok {
        return Err(ActionError::Impassable);
    }
    if occupied {
        return Err(ActionError::TileOccupied);
    }

    let town_hall_bonus = session.rules.building(BuildingKind::TownHall).production_bonus;
    let settlement_id = session.registry.register(|id| {
        GameObject::Settlement(Settlement {
            id,
            name,
            owner: actor,
            tile: tile_id,
            population: 1,
            production_bonus: town_hall_bonus,
            food: 0,
            stores: Default::default(),
            wishes: Vec::new(),
        })
    });
    changes.push_add(settlement_id, See::Perceived);

    let hall_id = session.registry.register(|id| {
        GameObject::Building(Building {
            id,
            settlement: settlement_id,
            kind: BuildingKind::TownHall,
            level: 1,
        })
    });
    changes.push_add(hall_id, See::OwnerOnly);

    if let Some(GameObject::Tile(t)) = session.registry.get_mut(tile_id) {
        t.owner = Some(actor);
        t.settlement = Some(settlement_id);
    }
    changes.push_fields(
        tile_id,
        &[Field::TileOwner],
        ChangePriority::State,
        See::Perceived,
    );

    // The settler is consumed by the founding.
    session.registry.dispose(unit_id, changes);
    changes.push_message(See::only(actor), Message::new("settlement.founded"));
    Ok(())
}

fn build(
    session: &mut GameSession,
    actor: PlayerId,
    settlement_id: ObjectId,
    kind: BuildingKind,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let settlement = require_settlement(session, actor, settlement_id)?;
    let tile = settlement.tile;
    let already = session
        .registry
        .children_of_kind(settlement_id, "building")
        .into_iter()
        .any(|id| {
            matches!(
                session.registry.get(id),
                Some(GameObject::Building(b)) if b.kind == kind
            )
        });
    if already {
        return Err(ActionError::AlreadyBuilt);
    }
    let stats = session.rules.building(kind).clone();
    if stats.coastal && !is_coastal(session, tile) {
        return Err(ActionError::NoDock);
    }
    let available = session.player(actor).map(|p| p.gold).unwrap_or(0);
    if available < stats.cost {
        return Err(ActionError::NotEnoughGold {
            needed: stats.cost,
            available,
        });
    }

    if let Some(p) = session.player_mut(actor) {
        p.gold -= stats.cost;
    }
    let player_object = session.player_object(actor);
    if let Some(id) = player_object {
        changes.push_fields(id, &[Field::Gold], ChangePriority::State, See::OwnerOnly);
    }

    let building_id = session.registry.register(|id| {
        GameObject::Building(Building {
            id,
            settlement: settlement_id,
            kind,
            level: 1,
        })
    });
    changes.push_add(building_id, See::OwnerOnly);

    if stats.production_bonus != 0 {
        if let Some(GameObject::Settlement(s)) = session.registry.get_mut(settlement_id) {
            s.production_bonus += stats.production_bonus;
        }
        changes.push_fields(
            settlement_id,
            &[Field::ProductionBonus],
            ChangePriority::State,
            See::OwnerOnly,
        );
    }
    Ok(())
}

fn train(
    session: &mut GameSession,
    actor: PlayerId,
    settlement_id: ObjectId,
    kind: UnitKind,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let settlement = require_settlement(session, actor, settlement_id)?;
    let tile = settlement.tile;
    let stats = session.rules.unit(kind).clone();
    if stats.naval {
        let has_dock = session
            .registry
            .children_of_kind(settlement_id, "building")
            .into_iter()
            .any(|id| {
                matches!(
                    session.registry.get(id),
                    Some(GameObject::Building(b)) if b.kind == BuildingKind::Dock
                )
            });
        if !has_dock {
            return Err(ActionError::NoDock);
        }
    }
    let available = session.player(actor).map(|p| p.gold).unwrap_or(0);
    if available < stats.cost {
        return Err(ActionError::NotEnoughGold {
            needed: stats.cost,
            available,
        });
    }

    if let Some(p) = session.player_mut(actor) {
        p.gold -= stats.cost;
    }
    if let Some(id) = session.player_object(actor) {
        changes.push_fields(id, &[Field::Gold], ChangePriority::State, See::OwnerOnly);
    }

    let unit_id = session.registry.register(|id| {
        GameObject::Unit(crate::Unit {
            id,
            kind,
            owner: actor,
            location: tile,
            moves_left: 0,
            mission: None,
        })
    });
    changes.push_add(unit_id, See::Perceived);
    Ok(())
}

fn embark(
    session: &mut GameSession,
    actor: PlayerId,
    unit_id: ObjectId,
    carrier_id: ObjectId,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let unit = require_unit(session, actor, unit_id)?;
    let unit_tile = unit.location;
    let unit_naval = session.rules.unit(unit.kind).naval;
    let carrier = require_unit(session, actor, carrier_id)?;
    let stats = session.rules.unit(carrier.kind).clone();
    if !stats.naval || stats.capacity == 0 || unit_naval {
        return Err(ActionError::NotACarrier);
    }
    let carrier_tile = session
        .registry
        .location_tile(carrier_id)
        .ok_or(ActionError::UnknownObject(carrier_id))?;
    if unit_tile != carrier_tile {
        return Err(ActionError::NotAdjacent);
    }
    let aboard = session.registry.children_of_kind(carrier_id, "unit").len();
    if aboard >= stats.capacity as usize {
        return Err(ActionError::CarrierFull);
    }

    if let Some(GameObject::Unit(u)) = session.registry.get_mut(unit_id) {
        u.location = carrier_id;
        u.moves_left = 0;
    }
    // The carrier picks up a transport objective for its passenger; the
    // target is a weak reference the integrity checker can clear.
    if let Some(GameObject::Unit(c)) = session.registry.get_mut(carrier_id) {
        c.mission = Some(Mission {
            kind: MissionKind::Transport,
            target: unit_id,
        });
    }
    changes.push_update(unit_id, ChangePriority::State, See::OwnerOnly);
    changes.push_update(carrier_id, ChangePriority::State, See::OwnerOnly);
    Ok(())
}

fn disembark(
    session: &mut GameSession,
    actor: PlayerId,
    unit_id: ObjectId,
    to: Coord,
    changes: &mut ChangeSet,
) -> Result<(), ActionError> {
    let unit = require_unit(session, actor, unit_id)?;
    let carrier_id = match session.registry.get(unit.location) {
        Some(GameObject::Unit(c)) => c.id,
        _ => return Err(ActionError::NotAboard),
    };
    let carrier_tile = session
        .registry
        .location_tile(carrier_id)
        .ok_or(ActionError::NotAboard)?;
    let carrier_coord = match session.registry.get(carrier_tile) {
        Some(GameObject::Tile(t)) => t.coord,
        _ => return Err(ActionError::NotAboard),
    };
    if carrier_coord != to && !carrier_coord.is_adjacent(to) {
        return Err(ActionError::NotAdjacent);
    }
    let dest_id = session.tile_at(to).ok_or(ActionError::OffMap)?;
    let terrain = tile_terrain(session, dest_id).ok_or(ActionError::OffMap)?;
    if !terrain.is_passable_on_foot() {
        return Err(ActionError::Impassable);
    }

    if let Some(GameObject::Unit(u)) = session.registry.get_mut(unit_id) {
        u.location = dest_id;
        u.moves_left = 0;
    }
    if let Some(GameObject::Unit(c)) = session.registry.get_mut(carrier_id) {
        if c.mission.is_some_and(|m| m.target == unit_id) {
            c.mission = None;
        }
    }
    changes.push_update(unit_id, ChangePriority::State, See::Perceived);
    changes.push_update(carrier_id, ChangePriority::State, See::OwnerOnly);
    Ok(())
}

fn is_coastal(session: &GameSession, tile_id: ObjectId) -> bool {
    let Some(GameObject::Tile(t)) = session.registry.get(tile_id) else {
        return false;
    };
    t.coord.neighbors().iter().any(|coord| {
        session
            .tile_at(*coord)
            .and_then(|id| tile_terrain(session, id))
            .is_some_and(Terrain::is_water)
    })
}
