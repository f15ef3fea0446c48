use windward_protocol::{ObjectId, PlayerId, See};

use crate::{KnowledgeMap, Registry};

/// How much of a change an observer is entitled to receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sight {
    None,
    Summary,
    Full,
}

/// Evaluate one visibility policy for one observer against current
/// knowledge. Always called at serialization time: knowledge may have
/// changed between recording and flushing (a capture reveals tiles
/// before its changes leave the server).
pub fn sight(
    registry: &Registry,
    knowledge: &KnowledgeMap,
    observer: PlayerId,
    subject: Option<ObjectId>,
    see: &See,
) -> Sight {
    let owner = subject.and_then(|id| registry.owning_player(id));
    let is_owner = owner == Some(observer);

    match see {
        See::All => {
            if is_owner {
                Sight::Full
            } else {
                Sight::Summary
            }
        }
        See::OwnerOnly => {
            if is_owner {
                Sight::Full
            } else {
                Sight::None
            }
        }
        See::Perceived => {
            let Some(subject) = subject else {
                // A perception-gated change with no subject has no
                // location to perceive; nobody receives it.
                return Sight::None;
            };
            let base = match registry.location_tile(subject) {
                Some(tile) => {
                    if knowledge.is_visible(observer, tile) {
                        Sight::Full
                    } else if knowledge.is_explored(observer, tile) {
                        Sight::Summary
                    } else {
                        Sight::None
                    }
                }
                // Location-independent (players, the game root) or
                // already disposed: presence is common knowledge.
                None => Sight::Summary,
            };
            if is_owner {
                // Ownership overrides staleness: an owner is always
                // entitled to at least a summary of their own objects.
                base.max(Sight::Summary)
            } else {
                base
            }
        }
        See::Only { players } => {
            if players.contains(&observer) {
                Sight::Full
            } else {
                Sight::None
            }
        }
    }
}

/// Most permissive result across every policy attached to a (possibly
/// merged) change: an observer entitled to information through any valid
/// path must not be under-delivered.
pub fn sight_any(
    registry: &Registry,
    knowledge: &KnowledgeMap,
    observer: PlayerId,
    subject: Option<ObjectId>,
    sees: &[See],
) -> Sight {
    sees.iter()
        .map(|see| sight(registry, knowledge, observer, subject, see))
        .max()
        .unwrap_or(Sight::None)
}
