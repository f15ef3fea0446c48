use std::collections::BTreeSet;

use windward_protocol::{Field, FieldValue, ObjectDelta, ObjectId, PlayerId};

use crate::{sight_any, GameObject, KnowledgeMap, Recorded, RecordedKind, Registry, Sight};

/// Project an ordered, compacted change list for one observer.
///
/// `known` is the set of objects this observer has already been told
/// about; it is updated as adds and removals are emitted. The projected
/// list never references an object outside that set: a change about an
/// unknown-but-visible object is upgraded to an Add carrying the view,
/// and a removal of an unknown object is dropped entirely.
pub(crate) fn project(
    registry: &Registry,
    knowledge: &KnowledgeMap,
    known: &mut BTreeSet<ObjectId>,
    observer: PlayerId,
    ordered: &[Recorded],
) -> Vec<ObjectDelta> {
    let mut out = Vec::new();

    for entry in ordered {
        let subject = entry.kind.subject();
        let level = sight_any(registry, knowledge, observer, subject, &entry.sees);

        match &entry.kind {
            RecordedKind::Remove { subject } => {
                if level > Sight::None && known.remove(subject) {
                    out.push(ObjectDelta::Removed { object: *subject });
                }
            }
            RecordedKind::Add { subject } | RecordedKind::Update { subject } => {
                if level == Sight::None {
                    continue;
                }
                let Some(object) = registry.get(*subject) else {
                    continue;
                };
                let view = object.view(registry, level);
                if known.insert(*subject) {
                    out.push(ObjectDelta::Added { view });
                } else {
                    out.push(ObjectDelta::Updated { view });
                }
            }
            RecordedKind::Fields { subject, fields } => {
                if level == Sight::None {
                    continue;
                }
                let Some(object) = registry.get(*subject) else {
                    continue;
                };
                if !known.contains(subject) {
                    known.insert(*subject);
                    out.push(ObjectDelta::Added {
                        view: object.view(registry, level),
                    });
                    continue;
                }
                let values: Vec<FieldValue> = fields
                    .iter()
                    .filter(|f| level == Sight::Full || f.summary_visible())
                    .filter_map(|f| field_value(object, *f))
                    .collect();
                if !values.is_empty() {
                    out.push(ObjectDelta::FieldsUpdated {
                        object: *subject,
                        values,
                    });
                }
            }
            RecordedKind::OwnerChange {
                subject,
                previous,
                owner,
            } => {
                if level == Sight::None {
                    continue;
                }
                if !known.contains(subject) {
                    if let Some(object) = registry.get(*subject) {
                        known.insert(*subject);
                        out.push(ObjectDelta::Added {
                            view: object.view(registry, level),
                        });
                    }
                    continue;
                }
                out.push(ObjectDelta::OwnerChanged {
                    object: *subject,
                    previous: *previous,
                    owner: *owner,
                });
            }
            RecordedKind::Message { message } => {
                if level > Sight::None {
                    out.push(ObjectDelta::Note {
                        message: message.clone(),
                    });
                }
            }
            RecordedKind::TurnAdvance { turn, current } => {
                out.push(ObjectDelta::TurnAdvanced {
                    turn: *turn,
                    current: *current,
                });
            }
        }
    }

    out
}

/// Read the current value of one field off the live object. Field keys
/// are recorded in the change set; values are only materialized here, at
/// serialization time, so merged partial updates carry final state.
pub(crate) fn field_value(object: &GameObject, field: Field) -> Option<FieldValue> {
    match (object, field) {
        (GameObject::Unit(u), Field::MovesLeft) => Some(FieldValue::MovesLeft(u.moves_left)),
        (GameObject::Settlement(s), Field::Population) => {
            Some(FieldValue::Population(s.population))
        }
        (GameObject::Settlement(s), Field::ProductionBonus) => {
            Some(FieldValue::ProductionBonus(s.production_bonus))
        }
        (GameObject::Settlement(s), Field::Stores) => Some(FieldValue::Stores(s.stores.clone())),
        (GameObject::Player(p), Field::Gold) => Some(FieldValue::Gold(p.gold)),
        (GameObject::Player(p), Field::Dead) => Some(FieldValue::Dead(p.dead)),
        (GameObject::Tile(t), Field::TileOwner) => Some(FieldValue::TileOwner(t.owner)),
        (GameObject::Game(g), Field::SuccessionDone) => {
            Some(FieldValue::SuccessionDone(g.succession_done))
        }
        _ => None,
    }
}
