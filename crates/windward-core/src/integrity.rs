use tracing::warn;

use windward_protocol::{ObjectId, PlayerId};

use crate::{GameObject, GameSession};

/// Outcome of checking one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Repaired,
    Broken,
}

#[derive(Clone, Debug, Default)]
pub struct IntegrityReport {
    pub checked: usize,
    pub repaired: Vec<ObjectId>,
    pub broken: Vec<ObjectId>,
}

/// What is wrong with one object: the deterministically repairable
/// damage, and whether something unrepairable was found.
#[derive(Debug, Default)]
struct Damage {
    clear_mission: bool,
    dangling_wishes: Vec<ObjectId>,
    clear_settlement_link: bool,
    clear_tile_owner: bool,
    unrepairable: bool,
}

impl Damage {
    fn any_repairable(&self) -> bool {
        self.clear_mission
            || !self.dangling_wishes.is_empty()
            || self.clear_settlement_link
            || self.clear_tile_owner
    }
}

impl GameSession {
    /// Walk every object's containment and weak-reference fields.
    ///
    /// A weak reference to a disposed or unknown object is damage; with
    /// `fix` the deterministic repairs are applied (clear a dangling
    /// mission or wish, re-derive a tile's cached settlement link, drop
    /// a claim by a dead seat). Anything else is reported and logged —
    /// never raised — so a broken object cannot take down the turn
    /// engine.
    pub fn integrity_sweep(&mut self, fix: bool) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        let ids: Vec<ObjectId> = self.registry.iter().map(|(id, _)| id).collect();
        for id in ids {
            report.checked += 1;
            match self.check_object(id, fix) {
                CheckOutcome::Ok => {}
                CheckOutcome::Repaired => report.repaired.push(id),
                CheckOutcome::Broken => report.broken.push(id),
            }
        }
        report
    }

    /// Check one object; see `integrity_sweep`.
    pub fn check_object(&mut self, id: ObjectId, fix: bool) -> CheckOutcome {
        let damage = self.inspect(id);
        if damage.unrepairable {
            return CheckOutcome::Broken;
        }
        if !damage.any_repairable() {
            return CheckOutcome::Ok;
        }
        if !fix {
            warn!(object = ?id, ?damage, "integrity damage found");
            return CheckOutcome::Broken;
        }
        self.repair(id, &damage);
        warn!(object = ?id, ?damage, "integrity damage repaired");
        CheckOutcome::Repaired
    }

    fn inspect(&self, id: ObjectId) -> Damage {
        let mut damage = Damage::default();
        let Some(object) = self.registry.get(id) else {
            return damage;
        };
        let live: Vec<PlayerId> = self.live_seats();

        match object {
            GameObject::Unit(u) => {
                if !self.registry.contains(u.location) {
                    warn!(object = ?id, location = ?u.location, "unit location missing");
                    damage.unrepairable = true;
                }
                if u.mission.is_some_and(|m| !self.registry.contains(m.target)) {
                    damage.clear_mission = true;
                }
            }
            GameObject::Settlement(s) => {
                if !self.registry.contains(s.tile) {
                    warn!(object = ?id, tile = ?s.tile, "settlement tile missing");
                    damage.unrepairable = true;
                }
                damage.dangling_wishes = s
                    .wishes
                    .iter()
                    .filter(|w| !self.registry.contains(w.source))
                    .map(|w| w.source)
                    .collect();
            }
            GameObject::Building(b) => {
                if !self.registry.contains(b.settlement) {
                    warn!(object = ?id, "building settlement missing");
                    damage.unrepairable = true;
                }
            }
            GameObject::Tile(t) => {
                if t.settlement.is_some_and(|s| !self.registry.contains(s)) {
                    damage.clear_settlement_link = true;
                }
                if t.owner.is_some_and(|seat| !live.contains(&seat)) {
                    damage.clear_tile_owner = true;
                }
            }
            GameObject::Game(_) | GameObject::Player(_) => {}
        }

        damage
    }

    fn repair(&mut self, id: ObjectId, damage: &Damage) {
        match self.registry.get_mut(id) {
            Some(GameObject::Unit(u)) => {
                if damage.clear_mission {
                    u.mission = None;
                }
            }
            Some(GameObject::Settlement(s)) => {
                if !damage.dangling_wishes.is_empty() {
                    s.wishes
                        .retain(|w| !damage.dangling_wishes.contains(&w.source));
                }
            }
            Some(GameObject::Tile(t)) => {
                if damage.clear_settlement_link {
                    t.settlement = None;
                }
                if damage.clear_tile_owner {
                    t.owner = None;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_rules, ChangeSet, PlayerSpec, RulesSource, SessionConfig};
    use windward_protocol::{GoodsKind, Mission, MissionKind, Wish};

    fn session() -> GameSession {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let config = SessionConfig {
            width: 12,
            height: 10,
            seed: 3,
            players: vec![
                PlayerSpec {
                    name: "A".into(),
                    nation: "Albion".into(),
                    is_ai: false,
                },
                PlayerSpec {
                    name: "B".into(),
                    nation: "Verdania".into(),
                    is_ai: true,
                },
            ],
        };
        GameSession::bootstrap(&config, rules, 3)
    }

    fn some_unit(session: &GameSession, seat: windward_protocol::PlayerId) -> ObjectId {
        session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Unit(u) if u.owner == seat => Some(id),
                _ => None,
            })
            .expect("unit exists")
    }

    #[test]
    fn clean_session_sweeps_clean() {
        let mut session = session();
        let report = session.integrity_sweep(true);
        assert!(report.repaired.is_empty());
        assert!(report.broken.is_empty());
        assert!(report.checked > 0);
    }

    #[test]
    fn dangling_mission_is_repaired() {
        let mut session = session();
        let carrier = some_unit(&session, windward_protocol::PlayerId(0));
        let target = some_unit(&session, windward_protocol::PlayerId(1));

        if let Some(GameObject::Unit(u)) = session.registry.get_mut(carrier) {
            u.mission = Some(Mission {
                kind: MissionKind::Transport,
                target,
            });
        }
        let mut scratch = ChangeSet::new();
        session.registry.dispose(target, &mut scratch);

        assert_eq!(session.check_object(carrier, false), CheckOutcome::Broken);
        assert_eq!(session.check_object(carrier, true), CheckOutcome::Repaired);
        assert_eq!(session.check_object(carrier, false), CheckOutcome::Ok);

        match session.registry.get(carrier) {
            Some(GameObject::Unit(u)) => assert!(u.mission.is_none()),
            other => panic!("carrier missing: {other:?}"),
        }
    }

    #[test]
    fn dangling_wish_is_repaired() {
        let mut session = session();
        let tile = session
            .tile_at(windward_protocol::Coord::new(3, 3))
            .expect("tile");
        let settlement = session.registry.register(|id| {
            GameObject::Settlement(crate::Settlement {
                id,
                name: "New Falmouth".into(),
                owner: windward_protocol::PlayerId(0),
                tile,
                population: 3,
                production_bonus: 0,
                food: 0,
                stores: Default::default(),
                wishes: vec![Wish {
                    goods: GoodsKind::Timber,
                    source: ObjectId(60_000),
                }],
            })
        });

        let report = session.integrity_sweep(true);
        assert!(report.repaired.contains(&settlement));
        match session.registry.get(settlement) {
            Some(GameObject::Settlement(s)) => assert!(s.wishes.is_empty()),
            other => panic!("settlement missing: {other:?}"),
        }
    }

    #[test]
    fn dead_seat_claim_is_cleared() {
        let mut session = session();
        let tile = session
            .tile_at(windward_protocol::Coord::new(4, 4))
            .expect("tile");
        if let Some(GameObject::Tile(t)) = session.registry.get_mut(tile) {
            t.owner = Some(windward_protocol::PlayerId(1));
        }
        if let Some(p) = session.player_mut(windward_protocol::PlayerId(1)) {
            p.dead = true;
        }

        assert_eq!(session.check_object(tile, true), CheckOutcome::Repaired);
        match session.registry.get(tile) {
            Some(GameObject::Tile(t)) => assert!(t.owner.is_none()),
            other => panic!("tile missing: {other:?}"),
        }
    }
}
