//! Prelude module for convenient imports

pub use crate::config::SolveOptions;
pub use crate::dof::{Dof, DofKey};
pub use crate::elements::{Anchor, Element, Spring};
pub use crate::error::{IbexError, Result};
pub use crate::solvers::{LdltSolver, LinearSolver, LsmrSolver};
pub use crate::sparse::{SparseMatrix, SparsityPattern};
pub use crate::system::{StoppingReason, System};
pub use nalgebra as na;
