use thiserror::Error;

use windward_protocol::{ObjectId, PlayerId};

/// Why an action request was rejected. Every variant is raised before the
/// first mutation of the operation, so a rejected action has zero side
/// effects.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("object {0:?} does not exist")]
    UnknownObject(ObjectId),
    #[error("object {0:?} is not controlled by the acting player")]
    NotYours(ObjectId),
    #[error("it is not {0:?}'s turn")]
    NotYourTurn(PlayerId),
    #[error("turn advancement already in progress")]
    TurnInProgress,
    #[error("the game has ended")]
    GameOver,
    #[error("unit has no movement points left")]
    NoMovesLeft,
    #[error("destination is not adjacent")]
    NotAdjacent,
    #[error("destination is off the map")]
    OffMap,
    #[error("terrain is impassable for this unit")]
    Impassable,
    #[error("unit is aboard a carrier; disembark first")]
    AboardCarrier,
    #[error("only a settler can found a settlement")]
    NotASettler,
    #[error("tile already hosts a settlement")]
    TileOccupied,
    #[error("settlement already has that building")]
    AlreadyBuilt,
    #[error("not enough gold: need {needed}, have {available}")]
    NotEnoughGold { needed: i32, available: i32 },
    #[error("that unit is not a carrier")]
    NotACarrier,
    #[error("carrier is at capacity")]
    CarrierFull,
    #[error("unit is not aboard that carrier")]
    NotAboard,
    #[error("carriers cannot be trained inland")]
    NoDock,
}

/// Coarse classification used to build client-visible rejections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A precondition failed; the request was well-formed but illegal.
    Validation,
    /// The request named an object that does not exist (stale id).
    NotFound,
    /// The request named an object the actor does not control.
    Ownership,
    /// The request arrived at the wrong point of the turn cycle.
    Sequencing,
}

impl ActionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ActionError::UnknownObject(_) => ErrorCategory::NotFound,
            ActionError::NotYours(_) => ErrorCategory::Ownership,
            ActionError::NotYourTurn(_)
            | ActionError::TurnInProgress
            | ActionError::GameOver => ErrorCategory::Sequencing,
            _ => ErrorCategory::Validation,
        }
    }
}
