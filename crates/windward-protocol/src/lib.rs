mod action;
mod change;
mod grid;
mod ids;
mod types;
mod view;
pub mod wire;

pub use crate::action::*;
pub use crate::change::*;
pub use crate::grid::*;
pub use crate::ids::*;
pub use crate::types::*;
pub use crate::view::*;
