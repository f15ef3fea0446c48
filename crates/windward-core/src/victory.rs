use windward_protocol::{GameResult, VictoryReason};

use crate::GameSession;

/// Evaluate the configured victory predicates against current state.
/// Called from the global-events phase of every turn advance.
pub(crate) fn check(session: &GameSession) -> Option<GameResult> {
    let settings = &session.rules.victory;
    let live = session.live_seats();

    if settings.elimination && live.len() == 1 {
        return Some(GameResult {
            winner: Some(live[0]),
            reason: VictoryReason::Elimination,
            turn: session.turn_number(),
            scores: scores(session),
        });
    }

    if settings.turn_limit > 0 && session.turn_number() > settings.turn_limit {
        let winner = scores(session)
            .into_iter()
            .filter(|(seat, _)| session.is_live(*seat))
            .max_by_key(|&(seat, score)| (score, std::cmp::Reverse(seat)))
            .map(|(seat, _)| seat);
        return Some(GameResult {
            winner,
            reason: VictoryReason::TurnLimit,
            turn: session.turn_number(),
            scores: scores(session),
        });
    }

    None
}

/// Terminal state when no live player remains and no predicate fired.
pub(crate) fn drawn(session: &GameSession) -> GameResult {
    GameResult {
        winner: None,
        reason: VictoryReason::Elimination,
        turn: session.turn_number(),
        scores: scores(session),
    }
}

fn scores(session: &GameSession) -> Vec<(windward_protocol::PlayerId, i64)> {
    let policy = session.score_policy.clone();
    session
        .seats()
        .to_vec()
        .into_iter()
        .map(|seat| (seat, policy.score(session, seat)))
        .collect()
}
