//! Equation system and Newton driver

use crate::assembly;
use crate::config::SolveOptions;
use crate::dof::{Dof, DofKey};
use crate::dofmap::DofMap;
use crate::elements::Element;
use crate::error::Result;
use crate::solvers::{self, LinearSolver};
use crate::sparse::{SparseMatrix, SparsityPattern};
use log::{debug, info};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Why the Newton iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoppingReason {
    NotSolved,
    ResidualBelowTol,
    StepBelowTol,
    IterationLimit,
}

impl StoppingReason {
    /// Numeric code: `-1`, `0`, `1`, `2`.
    pub fn code(self) -> i32 {
        match self {
            StoppingReason::NotSolved => -1,
            StoppingReason::ResidualBelowTol => 0,
            StoppingReason::StepBelowTol => 1,
            StoppingReason::IterationLimit => 2,
        }
    }
}

impl fmt::Display for StoppingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            StoppingReason::NotSolved => "Not solved",
            StoppingReason::ResidualBelowTol => "A solution was found, given rtol",
            StoppingReason::StepBelowTol => "A solution was found, given xtol",
            StoppingReason::IterationLimit => "The iteration limit was reached",
        };
        write!(f, "{}", message)
    }
}

/// The assembled equation system and its Newton driver.
///
/// Construction reconciles the elements' DoFs into the global ordering,
/// derives the sparsity pattern of the free-block LHS and hands the
/// skeleton to the linear solver for symbolic analysis. Structure is
/// immutable afterwards; `solve` re-assembles values as often as needed.
pub struct System {
    elements: Vec<Box<dyn Element>>,
    map: DofMap,
    lhs: SparseMatrix,
    rhs: DVector<f64>,
    x: DVector<f64>,
    target: DVector<f64>,
    residual: DVector<f64>,
    solver: Box<dyn LinearSolver>,
    stopping_reason: StoppingReason,
}

impl System {
    /// Build the system from an ordered element list.
    ///
    /// Fails if `options.linear_solver` names no known solver; this is a
    /// configuration error and is not deferred to `solve`.
    pub fn new(elements: Vec<Box<dyn Element>>, options: &SolveOptions) -> Result<Self> {
        let mut solver = solvers::from_name(&options.linear_solver)?;

        let map = DofMap::build(&elements);
        let n_free = map.n_free();
        let pattern = Arc::new(SparsityPattern::from_incidence(map.tables(), n_free));
        let lhs = SparseMatrix::zeros(pattern);

        solver.analyze_pattern(&lhs)?;

        info!(
            "system with {} elements, {} dofs ({} free), {} structural nonzeros",
            elements.len(),
            map.len(),
            n_free,
            lhs.nnz()
        );

        Ok(Self {
            elements,
            map,
            lhs,
            rhs: DVector::zeros(n_free),
            x: DVector::zeros(n_free),
            target: DVector::zeros(n_free),
            residual: DVector::zeros(n_free),
            solver,
            stopping_reason: StoppingReason::NotSolved,
        })
    }

    /// Zero and re-assemble the LHS and RHS from the current DoF values.
    pub fn assemble(&mut self, options: &SolveOptions) -> Result<()> {
        assembly::assemble(
            &self.elements,
            &self.map,
            options,
            &mut self.lhs,
            &mut self.rhs,
        )
    }

    /// Run the Newton iteration until a tolerance or the iteration limit
    /// is reached.
    ///
    /// Each pass assembles the system, compares the residual `rhs − λ·target`
    /// against `rtol`, solves for the correction, subtracts it from the free
    /// DoF values and compares the correction norm against `xtol`. The final
    /// residual is written back into the free DoFs' `residual` field. Solver
    /// failures (e.g. a singular matrix) abort the iteration and surface
    /// unchanged.
    pub fn solve(&mut self, options: &SolveOptions) -> Result<StoppingReason> {
        let mut options = options.clone();
        let n_free = self.map.n_free();

        for i in 0..n_free {
            self.target[i] = options.lambda * self.map.dofs()[i].target;
        }

        self.stopping_reason = StoppingReason::NotSolved;
        let mut iteration = 0;

        loop {
            if iteration >= options.maxiter {
                self.stopping_reason = StoppingReason::IterationLimit;
                break;
            }

            options.iteration = iteration;
            self.assemble(&options)?;

            self.residual = &self.rhs - &self.target;
            let rnorm = self.residual.norm();
            debug!("iteration {}: residual norm {:.3e}", iteration, rnorm);

            if rnorm < options.rtol {
                self.stopping_reason = StoppingReason::ResidualBelowTol;
                break;
            }

            self.solver.set_matrix(&self.lhs)?;
            self.solver.solve(&self.residual, &mut self.x)?;

            for i in 0..n_free {
                self.map.dof_mut(i).delta -= self.x[i];
            }

            if self.x.norm() < options.xtol {
                self.stopping_reason = StoppingReason::StepBelowTol;
                break;
            }

            iteration += 1;
        }

        for i in 0..n_free {
            self.map.dof_mut(i).residual = self.residual[i];
        }

        info!(
            "solve finished after {} iteration(s): {}",
            iteration, self.stopping_reason
        );
        Ok(self.stopping_reason)
    }

    /// Total DoF count `N`.
    pub fn dof_count(&self) -> usize {
        self.map.len()
    }

    /// Free DoF count `F`.
    pub fn free_count(&self) -> usize {
        self.map.n_free()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Structural nonzero count of the free-block LHS.
    pub fn nnz(&self) -> usize {
        self.lhs.nnz()
    }

    /// The global DoF vector, free block first, with current values.
    pub fn dofs(&self) -> &[Dof] {
        self.map.dofs()
    }

    /// Look up a DoF by identity key.
    pub fn dof(&self, key: DofKey) -> Option<&Dof> {
        self.map.index_of(key).map(|i| &self.map.dofs()[i])
    }

    /// The assembled left-hand side (valid after `assemble` or `solve`).
    pub fn lhs(&self) -> &SparseMatrix {
        &self.lhs
    }

    /// The assembled right-hand side (valid after `assemble` or `solve`).
    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// The stopping reason of the last `solve`.
    pub fn stopping_reason(&self) -> StoppingReason {
        self.stopping_reason
    }
}
