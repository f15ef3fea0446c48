use tracing::info;

use windward_protocol::{ChangePriority, Field, Message, ObjectId, PlayerId, See};

use crate::{ChangeSet, GameObject, GameSession};

/// Strength scoring for the transfer-of-power event. The exact formula
/// is a policy, not a constant: sessions may install their own.
pub trait ScorePolicy: Send + Sync {
    fn score(&self, session: &GameSession, seat: PlayerId) -> i64;
}

/// Default scoring: weighted assets (units, settlements, buildings) plus
/// a fraction of the treasury, with weights from the ruleset.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssetScore;

impl ScorePolicy for AssetScore {
    fn score(&self, session: &GameSession, seat: PlayerId) -> i64 {
        let rules = &session.rules().succession;
        let mut units = 0i64;
        let mut settlements = 0i64;
        let mut buildings = 0i64;
        let mut gold = 0i64;
        for (_, object) in session.registry.iter() {
            match object {
                GameObject::Unit(u) if u.owner == seat => units += 1,
                GameObject::Settlement(s) if s.owner == seat => {
                    settlements += 1;
                    buildings += session.registry.children_of_kind(s.id, "building").len() as i64;
                }
                GameObject::Player(p) if p.seat == seat => gold = p.gold as i64,
                _ => {}
            }
        }
        units * rules.unit_weight
            + settlements * rules.settlement_weight
            + buildings * rules.building_weight
            + gold / rules.gold_divisor.max(1)
    }
}

/// The transfer-of-power rule: once any live player's strength reaches
/// the configured threshold, the weakest eligible AI player cedes every
/// settlement, claimed tile, unit and mission to the strongest AI player
/// and is killed. Fires at most once per game; the flag lives on the
/// game root so saves carry it.
pub(crate) fn run(session: &mut GameSession, changes: &mut ChangeSet) {
    let rules = session.rules.succession.clone();
    if !rules.enabled {
        return;
    }
    let already_done = match session.registry.get(ObjectId::ROOT) {
        Some(GameObject::Game(g)) => g.succession_done,
        _ => true,
    };
    if already_done || session.turn_number() < rules.earliest_turn {
        return;
    }

    let policy = session.score_policy.clone();
    let live = session.live_seats();
    let armed = live
        .iter()
        .any(|seat| policy.score(session, *seat) >= rules.strong_threshold);
    if !armed {
        return;
    }

    // Humans can arm the event, but assets only move between AI players.
    // Ties break toward the lower seat so reruns are deterministic.
    let mut weakest: Option<(PlayerId, i64)> = None;
    let mut strongest: Option<(PlayerId, i64)> = None;
    for seat in live.iter().filter(|seat| session.is_ai(**seat)) {
        let score = policy.score(session, *seat);
        if score <= rules.weak_threshold && weakest.is_none_or(|(_, s)| score < s) {
            weakest = Some((*seat, score));
        }
        if strongest.is_none_or(|(_, s)| score > s) {
            strongest = Some((*seat, score));
        }
    }
    let (Some((loser, loser_score)), Some((winner, winner_score))) = (weakest, strongest) else {
        return;
    };
    if loser == winner {
        return;
    }

    info!(
        ?loser,
        loser_score, ?winner, winner_score, "transfer of power"
    );

    let settlements: Vec<ObjectId> = session
        .registry
        .iter()
        .filter_map(|(id, o)| match o {
            GameObject::Settlement(s) if s.owner == loser => Some(id),
            _ => None,
        })
        .collect();
    for id in settlements {
        if let Some(GameObject::Settlement(s)) = session.registry.get_mut(id) {
            s.owner = winner;
        }
        changes.push_owner_change(id, Some(loser), winner, See::Perceived);
    }

    let tiles: Vec<ObjectId> = session
        .registry
        .iter()
        .filter_map(|(id, o)| match o {
            GameObject::Tile(t) if t.owner == Some(loser) => Some(id),
            _ => None,
        })
        .collect();
    for id in tiles {
        if let Some(GameObject::Tile(t)) = session.registry.get_mut(id) {
            t.owner = Some(winner);
        }
        changes.push_fields(id, &[Field::TileOwner], ChangePriority::Ownership, See::Perceived);
    }

    // Units carry their missions with them.
    let units: Vec<ObjectId> = session
        .registry
        .iter()
        .filter_map(|(id, o)| match o {
            GameObject::Unit(u) if u.owner == loser => Some(id),
            _ => None,
        })
        .collect();
    for id in units {
        if let Some(GameObject::Unit(u)) = session.registry.get_mut(id) {
            u.owner = winner;
        }
        changes.push_owner_change(id, Some(loser), winner, See::Perceived);
    }

    if let Some(game) = session.game_mut() {
        game.succession_done = true;
    }
    changes.push_fields(
        ObjectId::ROOT,
        &[Field::SuccessionDone],
        ChangePriority::State,
        See::All,
    );

    let loser_nation = session
        .player(loser)
        .map(|p| p.nation.clone())
        .unwrap_or_default();
    let winner_nation = session
        .player(winner)
        .map(|p| p.nation.clone())
        .unwrap_or_default();
    changes.push_message(
        See::All,
        Message::new("succession")
            .arg("loser", loser_nation)
            .arg("winner", winner_nation),
    );

    // The REMOVE-equivalent kill: the loser's seat stays in the join
    // order but is dead, so the turn engine never hands it control.
    let loser_object = session.player_object(loser);
    if let Some(p) = session.player_mut(loser) {
        p.dead = true;
    }
    if let Some(id) = loser_object {
        changes.push_fields(id, &[Field::Dead], ChangePriority::Ownership, See::All);
    }
}
