use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use windward_protocol::{
    wire, Action, ClientState, Coord, EntityView, GameResult, ObjectDelta, ObjectId, PlayerId,
    See, Terrain, UnitKind,
};

use crate::{
    actions, projection, turn, ActionError, AssetScore, ChangeSet, Game, GameObject, GameRng,
    KnowledgeMap, Phase, Player, Registry, Rules, ScorePolicy, Sight, Tile, TurnState, Unit,
};

/// Everything needed to start a fresh game.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub players: Vec<PlayerSpec>,
}

#[derive(Clone, Debug)]
pub struct PlayerSpec {
    pub name: String,
    pub nation: String,
    pub is_ai: bool,
}

/// Result of one flushed operation: the per-observer filtered change
/// batches, plus the game result if this operation ended the game.
#[derive(Clone, Debug)]
pub struct Flush {
    pub deltas: BTreeMap<PlayerId, Vec<ObjectDelta>>,
    pub result: Option<GameResult>,
}

/// One game's mutable state, owned by the single-writer loop.
///
/// Never a process-wide singleton: independent sessions are independent
/// values and may run in parallel. All mutation flows through `act`,
/// which validates, applies, collects changes and flushes one operation
/// to completion before returning.
pub struct GameSession {
    pub(crate) rules: Rules,
    pub(crate) registry: Registry,
    pub(crate) knowledge: KnowledgeMap,
    pub(crate) turn: TurnState,
    pub(crate) rng: GameRng,
    /// Per-observer set of objects already delivered; the projection
    /// layer keeps deltas closed over this set.
    pub(crate) known: BTreeMap<PlayerId, BTreeSet<ObjectId>>,
    pub(crate) tiles_by_coord: BTreeMap<Coord, ObjectId>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) result: Option<GameResult>,
    pub(crate) score_policy: Arc<dyn ScorePolicy>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("turn", &self.turn)
            .field("objects", &self.registry.len())
            .field("result", &self.result)
            .finish()
    }
}

impl GameSession {
    /// Start a new game: root object, a bordered map with deterministic
    /// terrain, one player entity per seat and each seat's starting
    /// party (settler, soldier, scout) on a cleared tile.
    pub fn bootstrap(config: &SessionConfig, rules: Rules, seed: u64) -> Self {
        let mut registry = Registry::new();
        let mut rng = GameRng::seed_from_u64(seed);

        let root = registry.register(|id| {
            GameObject::Game(Game {
                id,
                turn: 1,
                succession_done: false,
            })
        });
        debug_assert_eq!(root, ObjectId::ROOT);

        let mut tiles_by_coord = BTreeMap::new();
        for y in 0..config.height as i32 {
            for x in 0..config.width as i32 {
                let coord = Coord::new(x, y);
                let border = x == 0
                    || y == 0
                    || x == config.width as i32 - 1
                    || y == config.height as i32 - 1;
                let terrain = if border {
                    Terrain::Ocean
                } else {
                    match rng.next_below(10) {
                        0..=5 => Terrain::Plains,
                        6..=7 => Terrain::Forest,
                        8 => Terrain::Hills,
                        _ => Terrain::Mountains,
                    }
                };
                let id = registry.register(|id| {
                    GameObject::Tile(Tile {
                        id,
                        coord,
                        terrain,
                        owner: None,
                        settlement: None,
                    })
                });
                tiles_by_coord.insert(coord, id);
            }
        }

        let mut order = Vec::new();
        for (index, spec) in config.players.iter().enumerate() {
            let seat = PlayerId(index as u8);
            registry.register(|id| {
                GameObject::Player(Player {
                    id,
                    seat,
                    name: spec.name.clone(),
                    nation: spec.nation.clone(),
                    is_ai: spec.is_ai,
                    dead: false,
                    gold: rules.starting_gold,
                })
            });
            order.push(seat);
        }

        let mut session = Self {
            rules,
            registry,
            knowledge: KnowledgeMap::default(),
            turn: TurnState::new(order.clone()),
            rng,
            known: BTreeMap::new(),
            tiles_by_coord,
            width: config.width,
            height: config.height,
            result: None,
            score_policy: Arc::new(AssetScore),
        };

        for (index, seat) in order.iter().enumerate() {
            let start = session.starting_coord(index, config.players.len());
            session.clear_tile(start);
            for kind in [UnitKind::Settler, UnitKind::Soldier, UnitKind::Scout] {
                session.spawn_unit(*seat, kind, start);
            }
        }

        // Initial knowledge; bootstrap changes are not delivered to
        // anyone, the first sync carries the filtered snapshot instead.
        let mut scratch = ChangeSet::new();
        session.knowledge.recompute(
            &session.registry,
            &session.rules,
            &session.tiles_by_coord,
            &mut scratch,
        );
        session
    }

    fn starting_coord(&self, index: usize, count: usize) -> Coord {
        let span = (self.width as i32 - 4).max(1);
        let step = span / count.max(1) as i32;
        Coord::new(2 + step / 2 + step * index as i32, self.height as i32 / 2)
    }

    /// Force a tile passable so a starting party always has footing.
    fn clear_tile(&mut self, coord: Coord) {
        if let Some(&id) = self.tiles_by_coord.get(&coord) {
            if let Some(GameObject::Tile(t)) = self.registry.get_mut(id) {
                t.terrain = Terrain::Plains;
            }
        }
    }

    pub(crate) fn spawn_unit(&mut self, seat: PlayerId, kind: UnitKind, coord: Coord) -> ObjectId {
        let moves = self.rules.unit(kind).moves;
        let location = self
            .tiles_by_coord
            .get(&coord)
            .copied()
            .unwrap_or(ObjectId::ROOT);
        self.registry.register(|id| {
            GameObject::Unit(Unit {
                id,
                kind,
                owner: seat,
                location,
                moves_left: moves,
                mission: None,
            })
        })
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn turn_number(&self) -> u32 {
        match self.registry.get(ObjectId::ROOT) {
            Some(GameObject::Game(g)) => g.turn,
            _ => 0,
        }
    }

    pub fn current_player(&self) -> PlayerId {
        self.turn.current_seat()
    }

    pub fn phase(&self) -> &Phase {
        &self.turn.phase
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    pub fn is_over(&self) -> bool {
        self.result.is_some()
    }

    pub fn seats(&self) -> &[PlayerId] {
        &self.turn.order
    }

    pub fn live_seats(&self) -> Vec<PlayerId> {
        self.turn
            .order
            .iter()
            .copied()
            .filter(|seat| self.is_live(*seat))
            .collect()
    }

    pub fn is_live(&self, seat: PlayerId) -> bool {
        self.player(seat).map(|p| !p.dead).unwrap_or(false)
    }

    pub fn is_ai(&self, seat: PlayerId) -> bool {
        self.player(seat).map(|p| p.is_ai).unwrap_or(false)
    }

    pub(crate) fn player(&self, seat: PlayerId) -> Option<&Player> {
        self.registry.iter().find_map(|(_, o)| match o {
            GameObject::Player(p) if p.seat == seat => Some(p),
            _ => None,
        })
    }

    pub(crate) fn player_object(&self, seat: PlayerId) -> Option<ObjectId> {
        self.player(seat).map(|p| p.id)
    }

    pub(crate) fn player_mut(&mut self, seat: PlayerId) -> Option<&mut Player> {
        let id = self.player_object(seat)?;
        match self.registry.get_mut(id) {
            Some(GameObject::Player(p)) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn game_mut(&mut self) -> Option<&mut Game> {
        match self.registry.get_mut(ObjectId::ROOT) {
            Some(GameObject::Game(g)) => Some(g),
            _ => None,
        }
    }

    pub fn tile_at(&self, coord: Coord) -> Option<ObjectId> {
        self.tiles_by_coord.get(&coord).copied()
    }

    /// Unit count for a seat (turn-timer sizing).
    pub fn unit_count(&self, seat: PlayerId) -> u32 {
        self.registry
            .iter()
            .filter(|(_, o)| matches!(o, GameObject::Unit(u) if u.owner == seat))
            .count() as u32
    }

    /// Settlement count for a seat (turn-timer sizing).
    pub fn settlement_count(&self, seat: PlayerId) -> u32 {
        self.registry
            .iter()
            .filter(|(_, o)| matches!(o, GameObject::Settlement(s) if s.owner == seat))
            .count() as u32
    }

    /// Validate and execute one action for `player`, flushing the
    /// resulting change set into per-observer batches.
    ///
    /// Rejections happen before the first mutation; a returned error
    /// means the session is untouched.
    pub fn act(&mut self, player: PlayerId, action: Action) -> Result<Flush, ActionError> {
        if self.result.is_some() {
            return Err(ActionError::GameOver);
        }
        if !matches!(self.turn.phase, Phase::Awaiting) {
            return Err(ActionError::TurnInProgress);
        }
        if self.current_player() != player {
            return Err(ActionError::NotYourTurn(player));
        }

        let mut changes = ChangeSet::new();
        let spotted_before = self.perceived_foreign_objects();

        match action {
            Action::EndTurn => turn::advance(self, &mut changes)?,
            other => actions::apply(self, player, other, &mut changes)?,
        }

        Ok(self.flush(changes, spotted_before))
    }

    /// Serialize one completed operation: refresh knowledge, record
    /// newly spotted foreign objects, compact, and project per observer.
    pub(crate) fn flush(
        &mut self,
        mut changes: ChangeSet,
        spotted_before: BTreeMap<PlayerId, BTreeSet<ObjectId>>,
    ) -> Flush {
        self.knowledge.recompute(
            &self.registry,
            &self.rules,
            &self.tiles_by_coord,
            &mut changes,
        );

        let spotted_after = self.perceived_foreign_objects();
        for (seat, after) in &spotted_after {
            let before = spotted_before.get(seat);
            for subject in after {
                if before.is_none_or(|b| !b.contains(subject)) {
                    changes.push_add(*subject, See::only(*seat));
                }
            }
        }

        let ordered = changes.ordered();
        let mut deltas = BTreeMap::new();
        for seat in self.turn.order.clone() {
            let known = self.known.entry(seat).or_default();
            let batch = projection::project(&self.registry, &self.knowledge, known, seat, &ordered);
            deltas.insert(seat, batch);
        }

        Flush {
            deltas,
            result: self.result.clone(),
        }
    }

    /// Foreign units and settlements on tiles each observer currently
    /// sees; diffed across an operation to emit spotted-object adds.
    pub(crate) fn perceived_foreign_objects(&self) -> BTreeMap<PlayerId, BTreeSet<ObjectId>> {
        let mut out: BTreeMap<PlayerId, BTreeSet<ObjectId>> = BTreeMap::new();
        for seat in &self.turn.order {
            let mut set = BTreeSet::new();
            for (id, object) in self.registry.iter() {
                let foreign = match object {
                    GameObject::Unit(u) => u.owner != *seat,
                    GameObject::Settlement(s) => s.owner != *seat,
                    _ => continue,
                };
                if !foreign {
                    continue;
                }
                if let Some(tile) = self.registry.location_tile(id) {
                    if self.knowledge.is_visible(*seat, tile) {
                        set.insert(id);
                    }
                }
            }
            out.insert(*seat, set);
        }
        out
    }

    /// Filtered full state for `observer`, for initial sync and
    /// reconnection. Resets the observer's known-object set to exactly
    /// what this snapshot delivers.
    pub fn sync(&mut self, observer: PlayerId) -> ClientState {
        let mut views: Vec<EntityView> = Vec::new();
        let mut delivered = BTreeSet::new();
        for (id, object) in self.registry.iter() {
            let see = default_see(object);
            let level = crate::sight(&self.registry, &self.knowledge, observer, Some(id), &see);
            if level > Sight::None {
                views.push(object.view(&self.registry, level));
                delivered.insert(id);
            }
        }
        self.known.insert(observer, delivered);
        ClientState {
            observer,
            turn: self.turn_number(),
            current_player: self.current_player(),
            views,
        }
    }

    /// Deterministic hash of the full authoritative state, for desync
    /// detection between server and mirrors.
    pub fn checksum(&self) -> u64 {
        let save = self.to_save();
        let bytes = serde_json::to_vec(&save).expect("state serializes");
        wire::hash_bytes_fnv1a64(&bytes)
    }

    /// Replace the succession scoring policy (see DESIGN notes).
    pub fn set_score_policy(&mut self, policy: Arc<dyn ScorePolicy>) {
        self.score_policy = policy;
    }
}

/// The policy used when a change carries no explicit one: how much of an
/// object the initial sync shows.
pub(crate) fn default_see(object: &GameObject) -> See {
    match object {
        GameObject::Game(_) | GameObject::Player(_) => See::All,
        GameObject::Tile(_) | GameObject::Unit(_) | GameObject::Settlement(_) => See::Perceived,
        GameObject::Building(_) => See::OwnerOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_rules, projection, RulesSource};
    use std::collections::BTreeSet;
    use windward_protocol::{ChangePriority, Field, UnitView};

    const A: PlayerId = PlayerId(0);
    const B: PlayerId = PlayerId(1);

    fn two_player_config() -> SessionConfig {
        SessionConfig {
            width: 18,
            height: 12,
            seed: 42,
            players: vec![
                PlayerSpec {
                    name: "Alice".into(),
                    nation: "Albion".into(),
                    is_ai: false,
                },
                PlayerSpec {
                    name: "Bert".into(),
                    nation: "Verdania".into(),
                    is_ai: false,
                },
            ],
        }
    }

    fn synced_session() -> GameSession {
        let rules = load_rules(RulesSource::Embedded).expect("rules load");
        let mut session = GameSession::bootstrap(&two_player_config(), rules, 42);
        session.sync(A);
        session.sync(B);
        session
    }

    fn scout_of(session: &GameSession, seat: PlayerId) -> (ObjectId, Coord) {
        session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Unit(u) if u.owner == seat && u.kind == UnitKind::Scout => {
                    let tile = session.registry.location_tile(id)?;
                    match session.registry.get(tile) {
                        Some(GameObject::Tile(t)) => Some((id, t.coord)),
                        _ => None,
                    }
                }
                _ => None,
            })
            .expect("scout exists")
    }

    fn passable_neighbor(session: &GameSession, from: Coord) -> Coord {
        from.neighbors()
            .into_iter()
            .find(|c| {
                session
                    .tile_at(*c)
                    .and_then(|id| match session.registry.get(id) {
                        Some(GameObject::Tile(t)) => Some(t.terrain.is_passable_on_foot()),
                        _ => None,
                    })
                    .unwrap_or(false)
            })
            .expect("some passable neighbor")
    }

    #[test]
    fn move_into_unexplored_reaches_only_the_mover() {
        let mut session = synced_session();
        let (scout, from) = scout_of(&session, A);
        let to = passable_neighbor(&session, from);

        let flush = session.act(A, Action::Move { unit: scout, to }).unwrap();

        let a_batch = &flush.deltas[&A];
        assert!(
            a_batch.iter().any(|d| matches!(
                d,
                ObjectDelta::Updated {
                    view: windward_protocol::EntityView::Unit(UnitView {
                        object,
                        moves_left: Some(_),
                        ..
                    })
                } if *object == scout
            )),
            "mover gets a full unit update: {a_batch:?}"
        );
        // Newly explored terrain arrives as full tile adds.
        assert!(a_batch
            .iter()
            .any(|d| matches!(d, ObjectDelta::Added { view: windward_protocol::EntityView::Tile(_) })));

        // A rival with no contact receives nothing for this operation.
        let b_batch = &flush.deltas[&B];
        assert!(b_batch.is_empty(), "rival batch not empty: {b_batch:?}");
    }

    #[test]
    fn rival_never_hears_about_uncontacted_objects() {
        let mut session = synced_session();
        let a_objects: BTreeSet<ObjectId> = session
            .registry
            .iter()
            .filter_map(|(id, o)| match o {
                GameObject::Unit(u) if u.owner == A => Some(id),
                _ => None,
            })
            .collect();

        // B's starting position is far from A's; several of A's moves
        // must never leak to B.
        for _ in 0..3 {
            let (scout, from) = scout_of(&session, A);
            let to = passable_neighbor(&session, from);
            let flush = session.act(A, Action::Move { unit: scout, to }).unwrap();
            for delta in &flush.deltas[&B] {
                if let Some(subject) = delta.subject() {
                    assert!(
                        !a_objects.contains(&subject),
                        "leak to rival: {delta:?}"
                    );
                }
            }
            session.act(A, Action::EndTurn).unwrap();
            session.act(B, Action::EndTurn).unwrap();
        }
    }

    #[test]
    fn every_batch_is_closed_over_known_objects() {
        let mut session = synced_session();
        let mut mirrors: BTreeMap<PlayerId, BTreeSet<ObjectId>> = BTreeMap::new();
        for seat in [A, B] {
            let state = session.sync(seat);
            mirrors.insert(seat, state.views.iter().map(|v| v.object()).collect());
        }

        for _ in 0..6 {
            let current = session.current_player();
            let (scout, from) = scout_of(&session, current);
            let to = passable_neighbor(&session, from);
            let mut flushes = Vec::new();
            if let Ok(flush) = session.act(current, Action::Move { unit: scout, to }) {
                flushes.push(flush);
            }
            flushes.push(session.act(current, Action::EndTurn).unwrap());

            for flush in flushes {
                for (seat, batch) in &flush.deltas {
                    let mirror = mirrors.entry(*seat).or_default();
                    for delta in batch {
                        match delta {
                            ObjectDelta::Added { view } => {
                                mirror.insert(view.object());
                            }
                            ObjectDelta::Removed { object } => {
                                assert!(
                                    mirror.remove(object),
                                    "removal of unknown {object:?} for {seat:?}"
                                );
                            }
                            ObjectDelta::Updated { view } => {
                                assert!(
                                    mirror.contains(&view.object()),
                                    "update for unknown {:?}",
                                    view.object()
                                );
                            }
                            ObjectDelta::FieldsUpdated { object, .. }
                            | ObjectDelta::OwnerChanged { object, .. } => {
                                assert!(
                                    mirror.contains(object),
                                    "reference to unknown {object:?}"
                                );
                            }
                            ObjectDelta::Note { .. } | ObjectDelta::TurnAdvanced { .. } => {}
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn settlement_partials_in_one_operation_merge_for_delivery() {
        let mut session = synced_session();
        let settler = session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Unit(u) if u.owner == A && u.kind == UnitKind::Settler => Some(id),
                _ => None,
            })
            .expect("settler exists");
        session
            .act(
                A,
                Action::FoundSettlement {
                    unit: settler,
                    name: "Port Reach".into(),
                },
            )
            .unwrap();
        let settlement = session
            .registry
            .iter()
            .find_map(|(id, o)| match o {
                GameObject::Settlement(_) => Some(id),
                _ => None,
            })
            .expect("settlement exists");
        // The sync above did not include it; refresh A's mirror.
        session.sync(A);

        // One operation touches population and production bonus.
        let mut changes = ChangeSet::new();
        changes.push_fields(
            settlement,
            &[Field::Population],
            ChangePriority::State,
            See::Perceived,
        );
        changes.push_fields(
            settlement,
            &[Field::ProductionBonus],
            ChangePriority::State,
            See::OwnerOnly,
        );
        let ordered = changes.ordered();

        let mut known = session.known.get(&A).cloned().unwrap_or_default();
        let batch = projection::project(&session.registry, &session.knowledge, &mut known, A, &ordered);

        let fields: Vec<_> = batch
            .iter()
            .filter_map(|d| match d {
                ObjectDelta::FieldsUpdated { object, values } if *object == settlement => {
                    Some(values)
                }
                _ => None,
            })
            .collect();
        assert_eq!(fields.len(), 1, "exactly one merged partial: {batch:?}");
        assert_eq!(fields[0].len(), 2, "both fields present: {:?}", fields[0]);
    }

    #[test]
    fn rejected_action_has_zero_side_effects() {
        let mut session = synced_session();
        let checksum = session.checksum();
        let (scout, from) = scout_of(&session, A);

        let err = session
            .act(
                A,
                Action::Move {
                    unit: scout,
                    to: Coord::new(from.x + 3, from.y),
                },
            )
            .unwrap_err();
        assert_eq!(err, ActionError::NotAdjacent);
        assert_eq!(session.checksum(), checksum);

        let err = session
            .act(A, Action::Move { unit: ObjectId(40_000), to: from })
            .unwrap_err();
        assert_eq!(err, ActionError::UnknownObject(ObjectId(40_000)));
        assert_eq!(session.checksum(), checksum);
    }

    #[test]
    fn foreign_unit_actions_are_rejected_as_ownership_errors() {
        let mut session = synced_session();
        let (b_scout, _) = scout_of(&session, B);
        let err = session
            .act(
                A,
                Action::Move {
                    unit: b_scout,
                    to: Coord::new(1, 1),
                },
            )
            .unwrap_err();
        assert_eq!(err, ActionError::NotYours(b_scout));
        assert_eq!(err.category(), crate::ErrorCategory::Ownership);
    }
}
