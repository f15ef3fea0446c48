use std::collections::{BTreeMap, BTreeSet};

use windward_protocol::{ObjectId, PlayerId, See};

use crate::{ChangeSet, GameObject};

/// The single source of truth for every live game object.
///
/// Ids are allocated monotonically and never reused, so a disposed id
/// resolves to nothing forever. Iteration order is ascending id, which
/// keeps every walk over the registry deterministic.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    next_id: u32,
    objects: BTreeMap<ObjectId, GameObject>,
    disposed: BTreeSet<ObjectId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new object built around a freshly allocated id.
    pub fn register(&mut self, build: impl FnOnce(ObjectId) -> GameObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let object = build(id);
        debug_assert_eq!(object.id(), id);
        self.objects.insert(id, object);
        id
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn is_disposed(&self, id: ObjectId) -> bool {
        self.disposed.contains(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &GameObject)> {
        self.objects.iter().map(|(id, o)| (*id, o))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects whose containment parent is `id`, ascending by id.
    pub fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|o| o.parent() == Some(id))
            .map(GameObject::id)
            .collect()
    }

    /// Same as `children` but restricted to one kind name.
    pub fn children_of_kind(&self, id: ObjectId, kind: &str) -> Vec<ObjectId> {
        self.objects
            .values()
            .filter(|o| o.parent() == Some(id) && o.kind_name() == kind)
            .map(GameObject::id)
            .collect()
    }

    /// Walk the containment chain up to the seat controlling `id`.
    pub fn owning_player(&self, id: ObjectId) -> Option<PlayerId> {
        let mut current = id;
        // The tree is shallow (building -> settlement -> tile -> game);
        // the bound guards against a corrupted parent cycle.
        for _ in 0..8 {
            let object = self.get(current)?;
            if let Some(seat) = object.direct_owner() {
                return Some(seat);
            }
            current = object.parent()?;
        }
        None
    }

    /// The tile an object ultimately sits on, following carriers.
    pub fn location_tile(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = id;
        for _ in 0..8 {
            match self.get(current)? {
                GameObject::Tile(t) => return Some(t.id),
                GameObject::Unit(u) => current = u.location,
                GameObject::Settlement(s) => return Some(s.tile),
                GameObject::Building(b) => current = b.settlement,
                GameObject::Game(_) | GameObject::Player(_) => return None,
            }
        }
        None
    }

    /// Dispose an object and everything it exclusively owns.
    ///
    /// Idempotent: disposing an already-disposed (or never-registered) id
    /// is a no-op. Cascades along containment edges only — weak
    /// references are left dangling on purpose and resolve to nothing
    /// afterwards. Every disposal appends a Remove change to the active
    /// set so mirrors learn about it.
    pub fn dispose(&mut self, id: ObjectId, changes: &mut ChangeSet) {
        if self.disposed.contains(&id) || !self.objects.contains_key(&id) {
            return;
        }
        // Mark first so a corrupted parent edge cannot recurse forever.
        self.disposed.insert(id);
        for child in self.children(id) {
            self.dispose(child, changes);
        }
        if let Some(object) = self.objects.remove(&id) {
            changes.push_remove(id, removal_see(&object));
        }
    }

    pub(crate) fn restore(
        next_id: u32,
        objects: BTreeMap<ObjectId, GameObject>,
        disposed: BTreeSet<ObjectId>,
    ) -> Self {
        Self {
            next_id,
            objects,
            disposed,
        }
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.next_id
    }

    pub(crate) fn objects(&self) -> &BTreeMap<ObjectId, GameObject> {
        &self.objects
    }

    pub(crate) fn disposed_ids(&self) -> &BTreeSet<ObjectId> {
        &self.disposed
    }
}

/// Who is told that an object went away.
fn removal_see(object: &GameObject) -> See {
    match object {
        GameObject::Game(_) | GameObject::Player(_) | GameObject::Tile(_) => See::All,
        GameObject::Unit(_) | GameObject::Settlement(_) => See::Perceived,
        GameObject::Building(_) => See::OwnerOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordedKind, Settlement, Unit};
    use windward_protocol::{Coord, Terrain, UnitKind};

    fn tile(registry: &mut Registry, coord: Coord) -> ObjectId {
        registry.register(|id| {
            GameObject::Tile(crate::Tile {
                id,
                coord,
                terrain: Terrain::Plains,
                owner: None,
                settlement: None,
            })
        })
    }

    fn unit_on(registry: &mut Registry, location: ObjectId, owner: PlayerId) -> ObjectId {
        registry.register(|id| {
            GameObject::Unit(Unit {
                id,
                kind: UnitKind::Soldier,
                owner,
                location,
                moves_left: 1,
                mission: None,
            })
        })
    }

    #[test]
    fn ids_are_never_reused() {
        let mut registry = Registry::new();
        let t = tile(&mut registry, Coord::new(0, 0));
        let u = unit_on(&mut registry, t, PlayerId(0));

        let mut cs = ChangeSet::new();
        registry.dispose(u, &mut cs);
        assert!(registry.is_disposed(u));
        assert!(registry.get(u).is_none());

        let u2 = unit_on(&mut registry, t, PlayerId(0));
        assert!(u2 > u);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut registry = Registry::new();
        let t = tile(&mut registry, Coord::new(0, 0));
        let u = unit_on(&mut registry, t, PlayerId(0));

        let mut cs = ChangeSet::new();
        registry.dispose(u, &mut cs);
        registry.dispose(u, &mut cs);
        registry.dispose(ObjectId(999), &mut cs);

        let removes = cs
            .ordered()
            .iter()
            .filter(|e| matches!(e.kind, RecordedKind::Remove { .. }))
            .count();
        assert_eq!(removes, 1);
    }

    #[test]
    fn dispose_cascades_containment_only() {
        let mut registry = Registry::new();
        let t = tile(&mut registry, Coord::new(1, 1));
        let carrier = unit_on(&mut registry, t, PlayerId(0));
        let aboard = unit_on(&mut registry, carrier, PlayerId(0));
        let bystander = unit_on(&mut registry, t, PlayerId(1));

        let mut cs = ChangeSet::new();
        registry.dispose(carrier, &mut cs);

        assert!(registry.is_disposed(carrier));
        assert!(registry.is_disposed(aboard));
        assert!(registry.contains(bystander));
    }

    #[test]
    fn owning_player_walks_containment() {
        let mut registry = Registry::new();
        let t = tile(&mut registry, Coord::new(2, 2));
        let s = registry.register(|id| {
            GameObject::Settlement(Settlement {
                id,
                name: "Port Reach".into(),
                owner: PlayerId(1),
                tile: t,
                population: 1,
                production_bonus: 0,
                food: 0,
                stores: Default::default(),
                wishes: Vec::new(),
            })
        });
        let b = registry.register(|id| {
            GameObject::Building(crate::Building {
                id,
                settlement: s,
                kind: windward_protocol::BuildingKind::TownHall,
                level: 1,
            })
        });

        assert_eq!(registry.owning_player(b), Some(PlayerId(1)));
        assert_eq!(registry.location_tile(b), Some(t));
    }
}
