//! Element contract and built-in element implementations

use crate::config::SolveOptions;
use crate::dof::Dof;
use nalgebra::{DMatrix, DVector};

/// A local contributor to the global equation system.
///
/// An element owns an ordered set of DoFs and can evaluate its local
/// left-hand side (a small dense `k×k` matrix) and right-hand side (a dense
/// `k` vector) for the current DoF values. The local LHS is interpreted
/// symmetrically: the assembler only reads its upper triangle.
///
/// The DoF list must be stable for the element's lifetime; the system
/// queries it exactly once at construction and caches the result.
pub trait Element: Send + Sync {
    /// The element's DoFs in local order.
    fn dofs(&self) -> Vec<Dof>;

    /// Evaluate the local LHS and RHS.
    ///
    /// `dofs` holds the element's own DoFs in local order with their current
    /// values, handed over by the owning system on every call. `options` is
    /// the active solve configuration, with `options.iteration` set to the
    /// current Newton iteration.
    fn compute(&self, dofs: &[Dof], options: &SolveOptions) -> (DMatrix<f64>, DVector<f64>);
}

/// Linear spring between two DoFs.
///
/// Contributes the stiffness `k·[[1, −1], [−1, 1]]` and the internal force
/// for the current elongation, so a system of springs converges in a single
/// Newton step.
pub struct Spring {
    pub a: Dof,
    pub b: Dof,
    pub stiffness: f64,
}

impl Spring {
    pub fn new(a: Dof, b: Dof, stiffness: f64) -> Self {
        Self { a, b, stiffness }
    }
}

impl Element for Spring {
    fn dofs(&self) -> Vec<Dof> {
        vec![self.a, self.b]
    }

    fn compute(&self, dofs: &[Dof], _options: &SolveOptions) -> (DMatrix<f64>, DVector<f64>) {
        let k = self.stiffness;
        let lhs = DMatrix::from_row_slice(2, 2, &[k, -k, -k, k]);
        let force = k * (dofs[0].delta - dofs[1].delta);
        let rhs = DVector::from_vec(vec![force, -force]);
        (lhs, rhs)
    }
}

/// Grounded spring on a single DoF.
pub struct Anchor {
    pub dof: Dof,
    pub stiffness: f64,
}

impl Anchor {
    pub fn new(dof: Dof, stiffness: f64) -> Self {
        Self { dof, stiffness }
    }
}

impl Element for Anchor {
    fn dofs(&self) -> Vec<Dof> {
        vec![self.dof]
    }

    fn compute(&self, dofs: &[Dof], _options: &SolveOptions) -> (DMatrix<f64>, DVector<f64>) {
        let k = self.stiffness;
        let lhs = DMatrix::from_element(1, 1, k);
        let rhs = DVector::from_element(1, k * dofs[0].delta);
        (lhs, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spring_internal_force() {
        let a = Dof::new(0, 0).with_delta(0.3);
        let b = Dof::new(1, 0).with_delta(0.1);
        let spring = Spring::new(a, b, 10.0);

        let dofs = spring.dofs();
        assert_eq!(dofs.len(), 2);

        let (lhs, rhs) = spring.compute(&[a, b], &SolveOptions::default());
        assert_eq!(lhs[(0, 0)], 10.0);
        assert_eq!(lhs[(0, 1)], -10.0);
        assert_eq!(rhs[0], 2.0);
        assert_eq!(rhs[1], -2.0);
    }
}
