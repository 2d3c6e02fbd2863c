//! # Ibex Equation Solver Core
//!
//! Ibex is the equation assembly and nonlinear solver core underneath
//! finite-element-style analysis tools. Client code supplies *elements* —
//! local contributors of a small dense matrix and vector over a handful of
//! degrees of freedom — and Ibex reconciles their DoFs into a global
//! ordering, derives the sparsity pattern of the global left-hand side,
//! assembles the system serially or in parallel, and drives a Newton
//! iteration around a pluggable sparse linear solver.
//!
//! ## Features
//!
//! - Value-based DoF identity with free/fixed partitioning
//! - Exact-fit column-compressed upper-triangle storage for the global LHS
//! - Serial and parallel assembly with per-worker accumulators
//! - Direct (LDLᵀ) and iterative (LSMR) reference linear solvers
//! - Newton driver with residual and correction-norm stopping tests
//!
//! ## Example
//!
//! ```rust
//! use ibex::prelude::*;
//!
//! // A spring between a fixed support and a loaded free DoF
//! let support = Dof::fixed(0, 0);
//! let tip = Dof::new(1, 0).with_target(10.0);
//!
//! let elements: Vec<Box<dyn Element>> = vec![
//!     Box::new(Spring::new(support, tip, 5.0)),
//! ];
//!
//! let options = SolveOptions::default();
//! let mut system = System::new(elements, &options)?;
//! let reason = system.solve(&options)?;
//!
//! assert_eq!(reason.code(), 0);
//! let tip = system.dof(tip.key).unwrap();
//! assert!((tip.delta - 2.0).abs() < 1e-6);
//! # Ok::<(), ibex::IbexError>(())
//! ```

pub mod assembly;
pub mod config;
pub mod dof;
pub mod dofmap;
pub mod elements;
pub mod error;
pub mod prelude;
pub mod solvers;
pub mod sparse;
pub mod system;

pub use config::SolveOptions;
pub use dof::{Dof, DofKey};
pub use elements::Element;
pub use error::{IbexError, Result};
pub use system::{StoppingReason, System};

// Re-export common types for convenience
pub use nalgebra as na;
