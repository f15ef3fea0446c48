use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use windward_protocol::{Coord, GameResult, ObjectId, PlayerId};

use crate::{
    AssetScore, GameObject, GameRng, GameSession, Knowledge, KnowledgeMap, Registry, Rules,
    TurnState,
};

pub const SAVE_VERSION: u32 = 1;

/// Durable representation of one game session: every live object with
/// its exact id, the disposed-id set, per-observer knowledge and
/// known-object sets, turn state and the rng stream. Loading
/// reconstructs identifiers exactly, so weak references issued before
/// the save re-resolve (or report not-found) identically afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub next_id: u32,
    pub objects: Vec<GameObject>,
    pub disposed: Vec<ObjectId>,
    pub knowledge: BTreeMap<PlayerId, Knowledge>,
    pub known: BTreeMap<PlayerId, BTreeSet<ObjectId>>,
    pub turn: TurnState,
    pub rng: GameRng,
    pub result: Option<GameResult>,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("save encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u32),
}

impl GameSession {
    pub fn to_save(&self) -> SaveGame {
        SaveGame {
            version: SAVE_VERSION,
            width: self.width,
            height: self.height,
            next_id: self.registry.next_id(),
            objects: self.registry.objects().values().cloned().collect(),
            disposed: self.registry.disposed_ids().iter().copied().collect(),
            knowledge: self.knowledge.players().clone(),
            known: self.known.clone(),
            turn: self.turn.clone(),
            rng: self.rng,
            result: self.result.clone(),
        }
    }

    pub fn from_save(save: SaveGame, rules: Rules) -> Result<GameSession, SaveError> {
        if save.version != SAVE_VERSION {
            return Err(SaveError::UnsupportedVersion(save.version));
        }

        let mut objects = BTreeMap::new();
        let mut tiles_by_coord: BTreeMap<Coord, ObjectId> = BTreeMap::new();
        for object in save.objects {
            if let GameObject::Tile(t) = &object {
                tiles_by_coord.insert(t.coord, t.id);
            }
            objects.insert(object.id(), object);
        }
        let registry = Registry::restore(
            save.next_id,
            objects,
            save.disposed.into_iter().collect(),
        );

        Ok(GameSession {
            rules,
            registry,
            knowledge: KnowledgeMap::restore(save.knowledge),
            turn: save.turn,
            rng: save.rng,
            known: save.known,
            tiles_by_coord,
            width: save.width,
            height: save.height,
            result: save.result,
            score_policy: Arc::new(AssetScore),
        })
    }
}

pub fn write_save(path: &Path, save: &SaveGame) -> Result<(), SaveError> {
    let json = serde_json::to_vec_pretty(save)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_save(path: &Path) -> Result<SaveGame, SaveError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_rules, PlayerSpec, RulesSource, SessionConfig};
    use windward_protocol::Action;

    fn config() -> SessionConfig {
        SessionConfig {
            width: 14,
            height: 10,
            seed: 21,
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
        }
    }

    #[test]
    fn save_round_trip_preserves_ids_and_checksum() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut session = GameSession::bootstrap(&config(), rules.clone(), 21);

        // Mutate a little so the save is not pristine.
        session
            .act(windward_protocol::PlayerId(0), Action::EndTurn)
            .unwrap();

        let before = session.checksum();
        let save = session.to_save();
        let json = serde_json::to_string(&save).unwrap();
        let restored: SaveGame = serde_json::from_str(&json).unwrap();
        let reloaded = GameSession::from_save(restored, rules).unwrap();

        assert_eq!(reloaded.checksum(), before);
        assert_eq!(reloaded.turn_number(), session.turn_number());
        assert_eq!(reloaded.current_player(), session.current_player());
        assert_eq!(reloaded.registry.len(), session.registry.len());
    }

    #[test]
    fn disposed_ids_stay_unresolvable_after_load() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut session = GameSession::bootstrap(&config(), rules.clone(), 21);

        let unit = session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Unit(_) => Some(id),
                _ => None,
            })
            .unwrap();
        let mut scratch = crate::ChangeSet::new();
        session.registry.dispose(unit, &mut scratch);

        let reloaded = GameSession::from_save(session.to_save(), rules).unwrap();
        assert!(reloaded.registry.is_disposed(unit));
        assert!(reloaded.registry.get(unit).is_none());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let session = GameSession::bootstrap(&config(), rules.clone(), 21);
        let mut save = session.to_save();
        save.version = 99;
        assert!(matches!(
            GameSession::from_save(save, rules),
            Err(SaveError::UnsupportedVersion(99))
        ));
    }
}
