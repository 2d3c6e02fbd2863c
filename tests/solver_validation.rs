//! Linear solver validation on assembled systems

use ibex::prelude::*;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random spring mesh grounded by anchors: the assembled LHS is symmetric
/// positive definite.
fn random_spd_system(n_dofs: usize, n_springs: usize, seed: u64) -> System {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut elements: Vec<Box<dyn Element>> = Vec::new();

    for i in 0..n_dofs {
        elements.push(Box::new(Anchor::new(
            Dof::new(i, 0),
            rng.gen_range(1.0..5.0),
        )));
    }
    for _ in 0..n_springs {
        let a = rng.gen_range(0..n_dofs);
        let mut b = rng.gen_range(0..n_dofs);
        if a == b {
            b = (b + 1) % n_dofs;
        }
        elements.push(Box::new(Spring::new(
            Dof::new(a, 0),
            Dof::new(b, 0),
            rng.gen_range(0.5..2.0),
        )));
    }

    System::new(elements, &SolveOptions::default()).unwrap()
}

#[test]
fn test_ldlt_matches_dense_solve() {
    let options = SolveOptions::default();
    let mut system = random_spd_system(40, 120, 3);
    system.assemble(&options).unwrap();

    let b = DVector::from_fn(system.free_count(), |i, _| ((i % 7) as f64) - 3.0);

    let mut solver = LdltSolver::new();
    solver.analyze_pattern(system.lhs()).unwrap();
    solver.set_matrix(system.lhs()).unwrap();
    let mut x = DVector::zeros(system.free_count());
    solver.solve(&b, &mut x).unwrap();

    let dense = system.lhs().to_dense();
    let expected = dense.lu().solve(&b).unwrap();
    assert!((&x - &expected).norm() < 1e-9 * expected.norm().max(1.0));
}

#[test]
fn test_lsmr_matches_dense_solve() {
    let options = SolveOptions::default();
    let mut system = random_spd_system(25, 60, 11);
    system.assemble(&options).unwrap();

    let b = DVector::from_fn(system.free_count(), |i, _| (i as f64).sin());

    let mut solver = LsmrSolver::new();
    solver.analyze_pattern(system.lhs()).unwrap();
    solver.set_matrix(system.lhs()).unwrap();
    let mut x = DVector::zeros(system.free_count());
    solver.solve(&b, &mut x).unwrap();

    let dense = system.lhs().to_dense();
    let expected = dense.lu().solve(&b).unwrap();
    assert!((&x - &expected).norm() < 1e-6 * expected.norm().max(1.0));
}

#[test]
fn test_lsmr_iteration_cap() {
    let options = SolveOptions::default();
    let mut system = random_spd_system(30, 80, 5);
    system.assemble(&options).unwrap();

    let b = DVector::from_element(system.free_count(), 1.0);

    let mut solver = LsmrSolver::new();
    solver.max_iterations = 1;
    solver.set_matrix(system.lhs()).unwrap();
    let mut x = DVector::zeros(system.free_count());
    assert!(matches!(
        solver.solve(&b, &mut x),
        Err(IbexError::ConvergenceFailure { iterations: 1 })
    ));
}

#[test]
fn test_solver_refuses_unset_matrix() {
    let mut solver = LsmrSolver::new();
    let b = DVector::zeros(3);
    let mut x = DVector::zeros(3);
    assert!(matches!(
        solver.solve(&b, &mut x),
        Err(IbexError::SolverNotReady)
    ));
}

#[test]
fn test_newton_on_a_mildly_nonlinear_element() {
    use nalgebra::DMatrix;

    // scalar equation u³ + u − 1 = 0, tangent 3u² + 1
    struct Cubic {
        dof: Dof,
    }

    impl Element for Cubic {
        fn dofs(&self) -> Vec<Dof> {
            vec![self.dof]
        }

        fn compute(&self, dofs: &[Dof], _options: &SolveOptions) -> (DMatrix<f64>, DVector<f64>) {
            let u = dofs[0].delta;
            let lhs = DMatrix::from_element(1, 1, 3.0 * u * u + 1.0);
            let rhs = DVector::from_element(1, u * u * u + u - 1.0);
            (lhs, rhs)
        }
    }

    let dof = Dof::new(0, 0);
    let elements: Vec<Box<dyn Element>> = vec![Box::new(Cubic { dof })];

    let options = SolveOptions::default();
    let mut system = System::new(elements, &options).unwrap();
    let reason = system.solve(&options).unwrap();

    assert_eq!(reason, StoppingReason::ResidualBelowTol);
    let root = system.dof(dof.key).unwrap().delta;
    assert!((root.powi(3) + root - 1.0).abs() < 1e-7);
}
