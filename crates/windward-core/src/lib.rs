mod actions;
mod changes;
mod error;
mod integrity;
mod knowledge;
mod object;
mod projection;
mod registry;
mod rng;
mod rules;
mod save;
mod session;
mod succession;
mod turn;
mod victory;
mod visibility;

pub use crate::actions::*;
pub use crate::changes::*;
pub use crate::error::*;
pub use crate::integrity::*;
pub use crate::knowledge::*;
pub use crate::object::*;
pub use crate::registry::*;
pub use crate::rng::*;
pub use crate::rules::*;
pub use crate::save::*;
pub use crate::session::*;
pub use crate::succession::*;
pub use crate::turn::*;
pub use crate::victory::*;
pub use crate::visibility::*;
