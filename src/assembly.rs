//! Global assembly of element contributions
//!
//! Serial assembly walks the elements in input order. Parallel assembly
//! fans the element range out over a worker pool; every worker accumulates
//! into a sibling of the shared LHS (same structure, own value array) and
//! the partial results are joined pairwise by pointwise addition. Floating
//! point addition is not associative, so parallel results are reproducible
//! only up to the reduction order — callers that need bitwise determinism
//! use serial mode.

use crate::config::SolveOptions;
use crate::dofmap::{DofMap, IndexTable};
use crate::elements::Element;
use crate::error::{IbexError, Result};
use crate::sparse::SparseMatrix;
use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Scatter one element's local contribution into the global LHS and RHS.
///
/// The table is sorted by global index, so the first fixed entry ends the
/// scan of its row or column: everything after it is fixed too. Local LHS
/// reads are normalised to the upper triangle of the local matrix.
fn scatter(
    table: &IndexTable,
    local_lhs: &DMatrix<f64>,
    local_rhs: &DVector<f64>,
    n_free: usize,
    lhs: &mut SparseMatrix,
    rhs: &mut DVector<f64>,
) {
    let entries = table.entries();
    for (i, &(row_local, row)) in entries.iter().enumerate() {
        if row >= n_free {
            break;
        }
        rhs[row] += local_rhs[row_local];
        for &(col_local, col) in &entries[i..] {
            if col >= n_free {
                break;
            }
            let (a, b) = if row_local <= col_local {
                (row_local, col_local)
            } else {
                (col_local, row_local)
            };
            lhs.add(row, col, local_lhs[(a, b)]);
        }
    }
}

/// Zero and re-assemble the system by a straight loop over the elements.
pub fn assemble_serial(
    elements: &[Box<dyn Element>],
    map: &DofMap,
    options: &SolveOptions,
    lhs: &mut SparseMatrix,
    rhs: &mut DVector<f64>,
) {
    lhs.clear();
    rhs.fill(0.0);

    for (element, table) in elements.iter().zip(map.tables()) {
        let local_dofs = table.gather(map.dofs());
        let (local_lhs, local_rhs) = element.compute(&local_dofs, options);
        scatter(table, &local_lhs, &local_rhs, map.n_free(), lhs, rhs);
    }
}

/// Per-worker accumulator: a sibling of the shared LHS plus a dense RHS.
struct Accumulator {
    lhs: SparseMatrix,
    rhs: DVector<f64>,
}

impl Accumulator {
    fn join(mut self, other: Accumulator) -> Accumulator {
        self.lhs.join(&other.lhs);
        self.rhs += other.rhs;
        self
    }
}

/// Zero and re-assemble the system in parallel over the elements.
///
/// `options.threads` selects the worker count; `0` runs on the global
/// rayon pool.
pub fn assemble_parallel(
    elements: &[Box<dyn Element>],
    map: &DofMap,
    options: &SolveOptions,
    lhs: &mut SparseMatrix,
    rhs: &mut DVector<f64>,
) -> Result<()> {
    let pattern = lhs.pattern().clone();
    let n_free = map.n_free();

    let run = || {
        let identity = || Accumulator {
            lhs: SparseMatrix::zeros(pattern.clone()),
            rhs: DVector::zeros(n_free),
        };
        elements
            .par_iter()
            .zip(map.tables().par_iter())
            .fold(&identity, |mut acc, (element, table)| {
                let local_dofs = table.gather(map.dofs());
                let (local_lhs, local_rhs) = element.compute(&local_dofs, options);
                scatter(table, &local_lhs, &local_rhs, n_free, &mut acc.lhs, &mut acc.rhs);
                acc
            })
            .reduce(&identity, Accumulator::join)
    };

    let acc = if options.threads == 0 {
        run()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
            .map_err(|e| IbexError::ThreadPoolError(e.to_string()))?;
        pool.install(run)
    };

    lhs.values_mut().copy_from_slice(acc.lhs.values());
    rhs.copy_from(&acc.rhs);

    debug!(
        "assembled {} elements in parallel ({} nonzeros)",
        elements.len(),
        lhs.nnz()
    );

    Ok(())
}

/// Assemble in the mode requested by the options.
pub fn assemble(
    elements: &[Box<dyn Element>],
    map: &DofMap,
    options: &SolveOptions,
    lhs: &mut SparseMatrix,
    rhs: &mut DVector<f64>,
) -> Result<()> {
    if options.parallel {
        assemble_parallel(elements, map, options, lhs, rhs)
    } else {
        assemble_serial(elements, map, options, lhs, rhs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::Dof;
    use crate::elements::Spring;
    use crate::sparse::SparsityPattern;
    use std::sync::Arc;

    fn spring_chain(n_dofs: usize, fix_last: bool) -> Vec<Box<dyn Element>> {
        let mut elements: Vec<Box<dyn Element>> = Vec::new();
        for i in 0..n_dofs - 1 {
            let a = Dof::new(i, 0);
            let b = if fix_last && i + 1 == n_dofs - 1 {
                Dof::fixed(i + 1, 0)
            } else {
                Dof::new(i + 1, 0)
            };
            elements.push(Box::new(Spring::new(a, b, 2.0)));
        }
        elements
    }

    fn build(elements: &[Box<dyn Element>]) -> (DofMap, SparseMatrix, DVector<f64>) {
        let map = DofMap::build(elements);
        let pattern = Arc::new(SparsityPattern::from_incidence(map.tables(), map.n_free()));
        let lhs = SparseMatrix::zeros(pattern);
        let rhs = DVector::zeros(map.n_free());
        (map, lhs, rhs)
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let elements = spring_chain(5, false);
        let (map, mut lhs, mut rhs) = build(&elements);
        let options = SolveOptions::default();

        assemble_serial(&elements, &map, &options, &mut lhs, &mut rhs);
        let first_lhs = lhs.values().to_vec();
        let first_rhs = rhs.clone();

        for _ in 0..3 {
            assemble_serial(&elements, &map, &options, &mut lhs, &mut rhs);
        }
        assert_eq!(lhs.values(), &first_lhs[..]);
        assert_eq!(rhs, first_rhs);
    }

    #[test]
    fn test_fixed_dof_rows_are_skipped() {
        // a - b with b fixed: the assembled LHS is 1x1
        let elements = spring_chain(2, true);
        let (map, mut lhs, mut rhs) = build(&elements);
        assert_eq!(map.n_free(), 1);
        assert_eq!(lhs.nnz(), 1);

        assemble_serial(&elements, &map, &SolveOptions::default(), &mut lhs, &mut rhs);
        assert_eq!(lhs.get(0, 0), 2.0);
        assert_eq!(rhs[0], 0.0);
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let elements = spring_chain(20, false);
        let (map, mut lhs, mut rhs) = build(&elements);

        let serial = SolveOptions::default();
        assemble_serial(&elements, &map, &serial, &mut lhs, &mut rhs);
        let serial_lhs = lhs.values().to_vec();
        let serial_rhs = rhs.clone();

        let parallel = SolveOptions {
            parallel: true,
            threads: 3,
            ..SolveOptions::default()
        };
        assemble_parallel(&elements, &map, &parallel, &mut lhs, &mut rhs).unwrap();

        for (a, b) in lhs.values().iter().zip(serial_lhs.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!((rhs - serial_rhs).norm() < 1e-12);
    }
}

/// Benchmarking utilities for assembly
#[cfg(feature = "benchmarks")]
pub mod benchmarks {
    use super::*;
    use crate::dof::Dof;
    use crate::elements::Spring;
    use crate::sparse::SparsityPattern;
    use criterion::{BenchmarkId, Criterion};
    use std::sync::Arc;

    pub fn benchmark_assembly(c: &mut Criterion) {
        let mut group = c.benchmark_group("assembly");

        for num_elements in [100, 1_000, 10_000].iter() {
            let elements: Vec<Box<dyn Element>> = (0..*num_elements)
                .map(|i| {
                    Box::new(Spring::new(Dof::new(i, 0), Dof::new(i + 1, 0), 1.0))
                        as Box<dyn Element>
                })
                .collect();
            let map = DofMap::build(&elements);
            let pattern = Arc::new(SparsityPattern::from_incidence(map.tables(), map.n_free()));
            let mut lhs = SparseMatrix::zeros(pattern);
            let mut rhs = nalgebra::DVector::zeros(map.n_free());

            let serial = SolveOptions::default();
            group.bench_with_input(
                BenchmarkId::new("serial", num_elements),
                num_elements,
                |bench, _| {
                    bench.iter(|| assemble_serial(&elements, &map, &serial, &mut lhs, &mut rhs))
                },
            );

            let parallel = SolveOptions {
                parallel: true,
                ..SolveOptions::default()
            };
            group.bench_with_input(
                BenchmarkId::new("parallel", num_elements),
                num_elements,
                |bench, _| {
                    bench.iter(|| assemble_parallel(&elements, &map, &parallel, &mut lhs, &mut rhs))
                },
            );
        }

        group.finish();
    }
}
