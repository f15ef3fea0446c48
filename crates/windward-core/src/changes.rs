use std::collections::{BTreeMap, BTreeSet};

use windward_protocol::{ChangePriority, Field, Message, ObjectId, PlayerId, See};

/// One recorded mutation. Immutable once appended: compaction merges and
/// drops entries but never rewrites history in place.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub kind: RecordedKind,
    pub priority: ChangePriority,
    /// All visibility policies attached to this (possibly merged) change;
    /// the most permissive path wins at projection time.
    pub sees: Vec<See>,
    pub seq: u64,
}

#[derive(Clone, Debug)]
pub enum RecordedKind {
    Add {
        subject: ObjectId,
    },
    Remove {
        subject: ObjectId,
    },
    Update {
        subject: ObjectId,
    },
    Fields {
        subject: ObjectId,
        fields: BTreeSet<Field>,
    },
    OwnerChange {
        subject: ObjectId,
        previous: Option<PlayerId>,
        owner: PlayerId,
    },
    Message {
        message: Message,
    },
    TurnAdvance {
        turn: u32,
        current: PlayerId,
    },
}

impl RecordedKind {
    pub fn subject(&self) -> Option<ObjectId> {
        match self {
            RecordedKind::Add { subject }
            | RecordedKind::Remove { subject }
            | RecordedKind::Update { subject }
            | RecordedKind::Fields { subject, .. }
            | RecordedKind::OwnerChange { subject, .. } => Some(*subject),
            RecordedKind::Message { .. } | RecordedKind::TurnAdvance { .. } => None,
        }
    }
}

/// Ordered multiset of changes scoped to one logical operation: one
/// action, one combat resolution, one turn advance. Entries flush in
/// `(priority, insertion order)` after compaction, keeping wire cost
/// proportional to logical change rather than to the number of
/// intermediate mutation calls.
#[derive(Debug, Default)]
pub struct ChangeSet {
    entries: Vec<Recorded>,
    next_seq: u64,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn push(&mut self, kind: RecordedKind, priority: ChangePriority, see: See) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Recorded {
            kind,
            priority,
            sees: vec![see],
            seq,
        });
    }

    pub fn push_add(&mut self, subject: ObjectId, see: See) {
        self.push(RecordedKind::Add { subject }, ChangePriority::State, see);
    }

    pub fn push_remove(&mut self, subject: ObjectId, see: See) {
        self.push(RecordedKind::Remove { subject }, ChangePriority::Removal, see);
    }

    pub fn push_update(&mut self, subject: ObjectId, priority: ChangePriority, see: See) {
        self.push(RecordedKind::Update { subject }, priority, see);
    }

    pub fn push_fields(
        &mut self,
        subject: ObjectId,
        fields: &[Field],
        priority: ChangePriority,
        see: See,
    ) {
        self.push(
            RecordedKind::Fields {
                subject,
                fields: fields.iter().copied().collect(),
            },
            priority,
            see,
        );
    }

    pub fn push_owner_change(
        &mut self,
        subject: ObjectId,
        previous: Option<PlayerId>,
        owner: PlayerId,
        see: See,
    ) {
        self.push(
            RecordedKind::OwnerChange {
                subject,
                previous,
                owner,
            },
            ChangePriority::Ownership,
            see,
        );
    }

    pub fn push_message(&mut self, see: See, message: Message) {
        self.push(RecordedKind::Message { message }, ChangePriority::State, see);
    }

    pub fn push_turn_advance(&mut self, turn: u32, current: PlayerId) {
        self.push(
            RecordedKind::TurnAdvance { turn, current },
            ChangePriority::Trivial,
            See::All,
        );
    }

    /// Compact and order the set for projection.
    ///
    /// Compaction rules:
    /// - a Remove for a subject discards every other change for it;
    /// - partial updates for one subject merge into one change with the
    ///   union of field keys, the latest priority, and every policy;
    /// - a full Update (or an Add, which delivers the whole view anyway)
    ///   supersedes partial updates for the subject;
    /// - duplicate Add/Update entries for one subject collapse.
    ///
    /// Ordering: stable sort by `(priority, seq)`, so removals flush
    /// first, ownership next, then state, then trivia.
    pub fn ordered(&self) -> Vec<Recorded> {
        let removed: BTreeSet<ObjectId> = self
            .entries
            .iter()
            .filter_map(|e| match e.kind {
                RecordedKind::Remove { subject } => Some(subject),
                _ => None,
            })
            .collect();

        let whole_view: BTreeSet<ObjectId> = self
            .entries
            .iter()
            .filter_map(|e| match e.kind {
                RecordedKind::Add { subject } | RecordedKind::Update { subject } => Some(subject),
                _ => None,
            })
            .collect();

        let mut out: Vec<Recorded> = Vec::with_capacity(self.entries.len());
        // subject -> index in `out`, per mergeable kind
        let mut field_slot: BTreeMap<ObjectId, usize> = BTreeMap::new();
        let mut add_slot: BTreeMap<ObjectId, usize> = BTreeMap::new();
        let mut update_slot: BTreeMap<ObjectId, usize> = BTreeMap::new();
        let mut remove_slot: BTreeMap<ObjectId, usize> = BTreeMap::new();
        let mut owner_slot: BTreeMap<ObjectId, usize> = BTreeMap::new();

        for entry in &self.entries {
            let subject = entry.kind.subject();
            if let Some(s) = subject {
                if removed.contains(&s) && !matches!(entry.kind, RecordedKind::Remove { .. }) {
                    continue;
                }
            }
            match &entry.kind {
                RecordedKind::Fields { subject, fields } => {
                    if whole_view.contains(subject) {
                        continue;
                    }
                    if let Some(&i) = field_slot.get(subject) {
                        let slot = &mut out[i];
                        if let RecordedKind::Fields { fields: merged, .. } = &mut slot.kind {
                            merged.extend(fields.iter().copied());
                        }
                        slot.priority = entry.priority;
                        slot.sees.extend(entry.sees.iter().cloned());
                    } else {
                        field_slot.insert(*subject, out.len());
                        out.push(entry.clone());
                    }
                }
                RecordedKind::Add { subject } => {
                    // Whole-view changes collapse to one entry per subject
                    // regardless of which kind came first: views snapshot
                    // the live object at projection time.
                    if let Some(&i) = update_slot.get(subject) {
                        out[i].sees.extend(entry.sees.iter().cloned());
                        continue;
                    }
                    merge_or_push(&mut out, &mut add_slot, *subject, entry);
                }
                RecordedKind::Update { subject } => {
                    if let Some(&i) = add_slot.get(subject) {
                        out[i].sees.extend(entry.sees.iter().cloned());
                        continue;
                    }
                    merge_or_push(&mut out, &mut update_slot, *subject, entry);
                }
                RecordedKind::Remove { subject } => {
                    merge_or_push(&mut out, &mut remove_slot, *subject, entry);
                }
                RecordedKind::OwnerChange { subject, .. } => {
                    if let Some(&i) = owner_slot.get(subject) {
                        // Later transfer wins; keep the original `previous`.
                        let slot = &mut out[i];
                        if let (
                            RecordedKind::OwnerChange { owner: merged, .. },
                            RecordedKind::OwnerChange { owner, .. },
                        ) = (&mut slot.kind, &entry.kind)
                        {
                            *merged = *owner;
                        }
                        slot.sees.extend(entry.sees.iter().cloned());
                    } else {
                        owner_slot.insert(*subject, out.len());
                        out.push(entry.clone());
                    }
                }
                RecordedKind::Message { .. } | RecordedKind::TurnAdvance { .. } => {
                    out.push(entry.clone());
                }
            }
        }

        out.sort_by_key(|e| (e.priority, e.seq));
        out
    }
}

fn merge_or_push(
    out: &mut Vec<Recorded>,
    slots: &mut BTreeMap<ObjectId, usize>,
    subject: ObjectId,
    entry: &Recorded,
) {
    if let Some(&i) = slots.get(&subject) {
        out[i].sees.extend(entry.sees.iter().cloned());
    } else {
        slots.insert(subject, out.len());
        out.push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLEMENT: ObjectId = ObjectId(7);
    const UNIT: ObjectId = ObjectId(9);

    #[test]
    fn removal_sorts_before_everything_referencing_the_subject() {
        let mut cs = ChangeSet::new();
        cs.push_fields(UNIT, &[Field::MovesLeft], ChangePriority::State, See::OwnerOnly);
        cs.push_message(See::All, Message::new("battle"));
        cs.push_remove(ObjectId(3), See::Perceived);
        cs.push_turn_advance(4, PlayerId(0));

        let ordered = cs.ordered();
        assert!(matches!(ordered[0].kind, RecordedKind::Remove { subject } if subject == ObjectId(3)));
        assert!(matches!(
            ordered.last().map(|e| &e.kind),
            Some(RecordedKind::TurnAdvance { .. })
        ));
    }

    #[test]
    fn partial_updates_merge_into_field_union() {
        let mut cs = ChangeSet::new();
        cs.push_fields(
            SETTLEMENT,
            &[Field::Population],
            ChangePriority::State,
            See::Perceived,
        );
        cs.push_fields(
            SETTLEMENT,
            &[Field::ProductionBonus],
            ChangePriority::State,
            See::OwnerOnly,
        );

        let ordered = cs.ordered();
        assert_eq!(ordered.len(), 1);
        match &ordered[0].kind {
            RecordedKind::Fields { fields, .. } => {
                assert_eq!(
                    fields.iter().copied().collect::<Vec<_>>(),
                    vec![Field::Population, Field::ProductionBonus]
                );
            }
            other => panic!("expected merged fields, got {other:?}"),
        }
        assert_eq!(ordered[0].sees.len(), 2);
    }

    #[test]
    fn identical_partial_appends_are_idempotent() {
        let mut cs = ChangeSet::new();
        for _ in 0..2 {
            cs.push_fields(
                SETTLEMENT,
                &[Field::Population],
                ChangePriority::State,
                See::Perceived,
            );
        }

        let ordered = cs.ordered();
        assert_eq!(ordered.len(), 1);
        match &ordered[0].kind {
            RecordedKind::Fields { fields, .. } => {
                assert_eq!(fields.len(), 1);
                assert!(fields.contains(&Field::Population));
            }
            other => panic!("expected fields, got {other:?}"),
        }
    }

    #[test]
    fn full_update_supersedes_partials() {
        let mut cs = ChangeSet::new();
        cs.push_fields(UNIT, &[Field::MovesLeft], ChangePriority::State, See::OwnerOnly);
        cs.push_update(UNIT, ChangePriority::State, See::Perceived);

        let ordered = cs.ordered();
        assert_eq!(ordered.len(), 1);
        assert!(matches!(ordered[0].kind, RecordedKind::Update { subject } if subject == UNIT));
    }

    #[test]
    fn remove_discards_every_other_change_for_the_subject() {
        let mut cs = ChangeSet::new();
        cs.push_update(UNIT, ChangePriority::State, See::Perceived);
        cs.push_fields(UNIT, &[Field::MovesLeft], ChangePriority::State, See::OwnerOnly);
        cs.push_remove(UNIT, See::Perceived);
        cs.push_message(See::All, Message::new("casualty"));

        let ordered = cs.ordered();
        assert_eq!(ordered.len(), 2);
        assert!(matches!(ordered[0].kind, RecordedKind::Remove { subject } if subject == UNIT));
        assert!(matches!(ordered[1].kind, RecordedKind::Message { .. }));
    }

    #[test]
    fn merged_partial_keeps_latest_priority() {
        let mut cs = ChangeSet::new();
        cs.push_fields(
            SETTLEMENT,
            &[Field::Population],
            ChangePriority::Trivial,
            See::All,
        );
        cs.push_fields(
            SETTLEMENT,
            &[Field::ProductionBonus],
            ChangePriority::State,
            See::All,
        );

        let ordered = cs.ordered();
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].priority, ChangePriority::State);
    }
}
