use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EntityView, GoodsKind, ObjectId, PlayerId};

/// Flush-order class of a recorded change. Variants sort ascending, so
/// removals always reach a client before anything that could reference
/// the removed object's slot, ownership transfers before dependent state,
/// and bare notifications (turn-number bumps) last.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangePriority {
    Removal,
    Ownership,
    State,
    Trivial,
}

/// Visibility policy attached to a recorded change: which observers may
/// receive it, evaluated against *current* knowledge at serialization
/// time (knowledge can change within the same operation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum See {
    /// Every observer; the subject's owner gets full detail, others a summary.
    All,
    /// Only the observer owning the subject's containment chain.
    OwnerOnly,
    /// Observers with current line of sight get full detail; observers
    /// who have explored the location but lost sight get a summary.
    Perceived,
    /// Exactly the named observers, full detail.
    Only { players: Vec<PlayerId> },
}

impl See {
    pub fn only(player: PlayerId) -> Self {
        See::Only {
            players: vec![player],
        }
    }
}

/// Closed set of field-level update keys. Values are read from the live
/// entity at serialization time, so merged partial updates always carry
/// final values.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    MovesLeft,
    Population,
    ProductionBonus,
    Stores,
    Gold,
    TileOwner,
    Dead,
    SuccessionDone,
}

impl Field {
    /// Whether the field may be delivered in a summary-level projection.
    pub fn summary_visible(self) -> bool {
        matches!(
            self,
            Field::Population | Field::TileOwner | Field::Dead | Field::SuccessionDone
        )
    }
}

/// A field key together with its current value, as delivered to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    MovesLeft(u8),
    Population(u32),
    ProductionBonus(i32),
    Stores(BTreeMap<GoodsKind, u32>),
    Gold(i32),
    TileOwner(Option<PlayerId>),
    Dead(bool),
    SuccessionDone(bool),
}

impl FieldValue {
    pub fn field(&self) -> Field {
        match self {
            FieldValue::MovesLeft(_) => Field::MovesLeft,
            FieldValue::Population(_) => Field::Population,
            FieldValue::ProductionBonus(_) => Field::ProductionBonus,
            FieldValue::Stores(_) => Field::Stores,
            FieldValue::Gold(_) => Field::Gold,
            FieldValue::TileOwner(_) => Field::TileOwner,
            FieldValue::Dead(_) => Field::Dead,
            FieldValue::SuccessionDone(_) => Field::SuccessionDone,
        }
    }
}

/// Templated text shown to players; clients localize by key and splice
/// the named arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub key: String,
    #[serde(default)]
    pub args: Vec<(String, String)>,
}

impl Message {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.push((name.into(), value.into()));
        self
    }
}

/// One entry of a projected, per-observer change list. Carries enough
/// type information for the receiver to apply add/remove/update
/// semantics to its local mirror without further round trips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectDelta {
    /// A previously unknown object; `view` is full or summary depending
    /// on what the observer is entitled to.
    Added { view: EntityView },
    /// Whole-object refresh of an already known object.
    Updated { view: EntityView },
    /// Field-level refresh of an already known object.
    FieldsUpdated {
        object: ObjectId,
        values: Vec<FieldValue>,
    },
    /// Containment-visible ownership transfer.
    OwnerChanged {
        object: ObjectId,
        previous: Option<PlayerId>,
        owner: PlayerId,
    },
    /// The object no longer exists; drop it from the mirror.
    Removed { object: ObjectId },
    /// Player-facing message, no state attached.
    Note { message: Message },
    /// Turn counter / current player moved on.
    TurnAdvanced { turn: u32, current: PlayerId },
}

impl ObjectDelta {
    /// The object this delta is about, if any.
    pub fn subject(&self) -> Option<ObjectId> {
        match self {
            ObjectDelta::Added { view } | ObjectDelta::Updated { view } => Some(view.object()),
            ObjectDelta::FieldsUpdated { object, .. }
            | ObjectDelta::OwnerChanged { object, .. }
            | ObjectDelta::Removed { object } => Some(*object),
            ObjectDelta::Note { .. } | ObjectDelta::TurnAdvanced { .. } => None,
        }
    }
}
