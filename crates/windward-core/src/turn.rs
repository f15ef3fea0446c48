use serde::{Deserialize, Serialize};
use tracing::debug;

use windward_protocol::{ChangePriority, Field, GoodsKind, Message, ObjectId, PlayerId, See, Wish};

use crate::{succession, victory, ActionError, ChangeSet, GameObject, GameSession};

/// Turn engine phase. `Awaiting` is the only phase in which actions are
/// accepted; the other phases exist within one `advance` call and guard
/// against re-entrant advancement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Awaiting,
    Advancing,
    GlobalEvents,
    Terminated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    /// Fixed join order; the current-player pointer cycles over this.
    pub order: Vec<PlayerId>,
    pub current: usize,
    pub phase: Phase,
}

impl TurnState {
    pub fn new(order: Vec<PlayerId>) -> Self {
        Self {
            order,
            current: 0,
            phase: Phase::Awaiting,
        }
    }

    pub fn current_seat(&self) -> PlayerId {
        self.order[self.current]
    }
}

/// Advance past the current player's turn.
///
/// The current-player pointer only ever lands on a live player; wrapping
/// past the end of the join order increments the turn counter and runs
/// every live player's new-round bookkeeping before global events
/// (victory, succession) are evaluated.
pub(crate) fn advance(session: &mut GameSession, changes: &mut ChangeSet) -> Result<(), ActionError> {
    if session.turn.phase != Phase::Awaiting {
        return Err(ActionError::TurnInProgress);
    }
    session.turn.phase = Phase::Advancing;

    let (_, wrapped) = next_live(session, session.turn.current);
    if wrapped {
        new_round(session, changes);
    }

    session.turn.phase = Phase::GlobalEvents;
    succession::run(session, changes);

    if let Some(result) = victory::check(session) {
        changes.push_message(
            See::All,
            Message::new("game.ended").arg("turn", session.turn_number().to_string()),
        );
        session.result = Some(result);
        session.turn.phase = Phase::Terminated;
        return Ok(());
    }

    // Re-resolve after global events: succession may have killed the
    // seat the pointer would otherwise have landed on.
    let (next, _) = next_live(session, session.turn.current);
    let Some(next) = next else {
        // Every seat is dead and no victory predicate claimed the game;
        // terminate rather than spin looking for a live player.
        session.result = Some(victory::drawn(session));
        session.turn.phase = Phase::Terminated;
        return Ok(());
    };

    session.turn.current = next;
    session.turn.phase = Phase::Awaiting;
    changes.push_turn_advance(session.turn_number(), session.turn.order[next]);
    Ok(())
}

/// The next live seat index strictly after `from`, cycling through the
/// join order, plus whether the search wrapped past the end (a completed
/// round). `None` when no seat is live.
fn next_live(session: &GameSession, from: usize) -> (Option<usize>, bool) {
    let order = &session.turn.order;
    let len = order.len();
    let mut wrapped = false;
    for step in 1..=len {
        let probe = from + step;
        if probe >= len {
            wrapped = true;
        }
        let index = probe % len;
        if session.is_live(order[index]) {
            return (Some(index), wrapped);
        }
    }
    (None, wrapped)
}

/// Every live player's end-of-round bookkeeping, collected into the same
/// "new turn" change set: movement refresh, settlement food and stores,
/// population growth, restock wishes.
fn new_round(session: &mut GameSession, changes: &mut ChangeSet) {
    if let Some(game) = session.game_mut() {
        game.turn += 1;
    }
    debug!(turn = session.turn_number(), "new round");

    let unit_ids: Vec<ObjectId> = session
        .registry
        .iter()
        .filter_map(|(id, o)| matches!(o, GameObject::Unit(_)).then_some(id))
        .collect();
    for id in unit_ids {
        let Some(GameObject::Unit(unit)) = session.registry.get(id) else {
            continue;
        };
        if !session.is_live(unit.owner) {
            continue;
        }
        let moves = session.rules.unit(unit.kind).moves;
        if let Some(GameObject::Unit(unit)) = session.registry.get_mut(id) {
            unit.moves_left = moves;
        }
        changes.push_fields(id, &[Field::MovesLeft], ChangePriority::State, See::OwnerOnly);
    }

    let settlement_ids: Vec<ObjectId> = session
        .registry
        .iter()
        .filter_map(|(id, o)| matches!(o, GameObject::Settlement(_)).then_some(id))
        .collect();
    for id in settlement_ids {
        let Some(GameObject::Settlement(s)) = session.registry.get(id) else {
            continue;
        };
        if !session.is_live(s.owner) {
            continue;
        }
        let owner = s.owner;
        let food_yield = session.rules.settlement.food_yield as i32 + s.production_bonus;
        let growth_food = session.rules.settlement.growth_food;

        let mut grew = false;
        if let Some(GameObject::Settlement(s)) = session.registry.get_mut(id) {
            s.food = s.food.saturating_add_signed(food_yield);
            if s.food >= growth_food {
                s.food -= growth_food;
                s.population += 1;
                grew = true;
            }
            *s.stores.entry(GoodsKind::Timber).or_insert(0) += s.population;
        }

        changes.push_fields(id, &[Field::Stores], ChangePriority::State, See::OwnerOnly);
        if grew {
            changes.push_fields(id, &[Field::Population], ChangePriority::State, See::Perceived);
        }

        restock_wish(session, id, owner);
    }
}

/// A growing settlement records a standing request for timber from a
/// sister settlement. The source is a weak reference; the integrity
/// checker clears it if the source is later razed.
fn restock_wish(session: &mut GameSession, id: ObjectId, owner: PlayerId) {
    let Some(GameObject::Settlement(s)) = session.registry.get(id) else {
        return;
    };
    if s.population < 3 || !s.wishes.is_empty() {
        return;
    }
    let source = session.registry.iter().find_map(|(other, o)| match o {
        GameObject::Settlement(sister) if sister.owner == owner && other != id => Some(other),
        _ => None,
    });
    let Some(source) = source else { return };
    if let Some(GameObject::Settlement(s)) = session.registry.get_mut(id) {
        s.wishes.push(Wish {
            goods: GoodsKind::Timber,
            source,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_rules, PlayerSpec, RulesSource, SessionConfig};
    use windward_protocol::Action;

    fn config(players: usize) -> SessionConfig {
        SessionConfig {
            width: 16,
            height: 12,
            seed: 11,
            players: (0..players)
                .map(|i| PlayerSpec {
                    name: format!("Player {i}"),
                    nation: format!("Nation {i}"),
                    is_ai: false,
                })
                .collect(),
        }
    }

    fn session(players: usize) -> GameSession {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        GameSession::bootstrap(&config(players), rules, 11)
    }

    #[test]
    fn pointer_visits_only_live_players_and_counts_full_cycles() {
        let mut session = session(3);
        assert_eq!(session.current_player(), PlayerId(0));
        assert_eq!(session.turn_number(), 1);

        // Kill the middle seat; rotation must skip it.
        if let Some(p) = session.player_mut(PlayerId(1)) {
            p.dead = true;
        }

        session.act(PlayerId(0), Action::EndTurn).unwrap();
        assert_eq!(session.current_player(), PlayerId(2));
        assert_eq!(session.turn_number(), 1);

        session.act(PlayerId(2), Action::EndTurn).unwrap();
        assert_eq!(session.current_player(), PlayerId(0));
        assert_eq!(session.turn_number(), 2);

        for _ in 0..4 {
            let current = session.current_player();
            assert!(session.is_live(current));
            session.act(current, Action::EndTurn).unwrap();
        }
        assert_eq!(session.turn_number(), 4);
    }

    #[test]
    fn out_of_turn_actions_are_rejected() {
        let mut session = session(2);
        let err = session.act(PlayerId(1), Action::EndTurn).unwrap_err();
        assert_eq!(err, ActionError::NotYourTurn(PlayerId(1)));
    }

    #[test]
    fn advancement_is_not_reentrant() {
        let mut session = session(2);
        session.turn.phase = Phase::GlobalEvents;
        let err = session.act(PlayerId(0), Action::EndTurn).unwrap_err();
        assert_eq!(err, ActionError::TurnInProgress);
    }

    #[test]
    fn new_round_refreshes_movement() {
        let mut session = session(2);
        let unit = session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Unit(u) if u.owner == PlayerId(0) => Some(id),
                _ => None,
            })
            .unwrap();
        if let Some(GameObject::Unit(u)) = session.registry.get_mut(unit) {
            u.moves_left = 0;
        }

        session.act(PlayerId(0), Action::EndTurn).unwrap();
        session.act(PlayerId(1), Action::EndTurn).unwrap();

        match session.registry.get(unit) {
            Some(GameObject::Unit(u)) => assert!(u.moves_left > 0),
            other => panic!("unit vanished: {other:?}"),
        }
    }

    #[test]
    fn turn_advance_notification_is_last_in_batch() {
        let mut session = session(2);
        let flush = session.act(PlayerId(0), Action::EndTurn).unwrap();
        let batch = &flush.deltas[&PlayerId(0)];
        let last = batch.last().expect("non-empty batch");
        assert!(matches!(
            last,
            windward_protocol::ObjectDelta::TurnAdvanced { .. }
        ));
    }
}
