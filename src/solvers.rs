//! Sparse linear solvers for the Newton driver
//!
//! Both reference solvers consume the upper-triangle symmetric view the
//! assembler produces. The direct [`LdltSolver`] factorizes `A = L·D·Lᵀ`
//! with a simplicial up-looking scheme; the iterative [`LsmrSolver`] runs
//! LSMR (Fong & Saunders) on the symmetric operator.

use crate::error::{IbexError, Result};
use crate::sparse::SparseMatrix;
use log::debug;
use nalgebra::DVector;

/// Contract between the system and a sparse linear solver.
///
/// `analyze_pattern` is called exactly once with the structural skeleton;
/// `set_matrix` each Newton iteration with fresh values in the same
/// structure; `solve` computes `M·x = b` into `x`.
pub trait LinearSolver: Send {
    fn analyze_pattern(&mut self, matrix: &SparseMatrix) -> Result<()>;

    fn set_matrix(&mut self, matrix: &SparseMatrix) -> Result<()>;

    fn solve(&mut self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<()>;
}

/// Look up a solver implementation by its configuration name.
pub fn from_name(name: &str) -> Result<Box<dyn LinearSolver>> {
    match name {
        "ldlt" => Ok(Box::new(LdltSolver::new())),
        "lsmr" => Ok(Box::new(LsmrSolver::new())),
        other => Err(IbexError::UnknownSolver(other.to_string())),
    }
}

/// Direct solver: simplicial LDLᵀ factorization.
///
/// Expects a symmetric positive-definite or quasi-definite matrix stored as
/// its upper triangle. The symbolic analysis builds the elimination tree
/// and column counts of `L` once; each `set_matrix` call refactorizes
/// numerically into the same structure.
pub struct LdltSolver {
    n: usize,
    parent: Vec<isize>,
    l_colptr: Vec<usize>,
    l_rowidx: Vec<usize>,
    l_values: Vec<f64>,
    l_nz: Vec<usize>,
    diag: Vec<f64>,
    // workspaces reused across factorizations
    flag: Vec<usize>,
    y: Vec<f64>,
    pattern_ws: Vec<usize>,
    analyzed: bool,
    factorized: bool,
}

impl LdltSolver {
    pub fn new() -> Self {
        Self {
            n: 0,
            parent: Vec::new(),
            l_colptr: Vec::new(),
            l_rowidx: Vec::new(),
            l_values: Vec::new(),
            l_nz: Vec::new(),
            diag: Vec::new(),
            flag: Vec::new(),
            y: Vec::new(),
            pattern_ws: Vec::new(),
            analyzed: false,
            factorized: false,
        }
    }
}

impl Default for LdltSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSolver for LdltSolver {
    /// Symbolic factorization: elimination tree and per-column counts of
    /// `L` from the structural skeleton alone.
    fn analyze_pattern(&mut self, matrix: &SparseMatrix) -> Result<()> {
        let n = matrix.n();
        self.n = n;
        self.parent = vec![-1; n];
        self.flag = vec![0; n];
        self.l_nz = vec![0; n];
        let mut col_counts = vec![0usize; n];

        for k in 0..n {
            self.flag[k] = k;
            self.parent[k] = -1;
            for &row in matrix.pattern().column(k) {
                let mut i = row;
                while i < k && self.flag[i] != k {
                    if self.parent[i] == -1 {
                        self.parent[i] = k as isize;
                    }
                    col_counts[i] += 1;
                    self.flag[i] = k;
                    i = self.parent[i] as usize;
                }
            }
        }

        self.l_colptr = Vec::with_capacity(n + 1);
        let mut nnz = 0;
        for &count in &col_counts {
            self.l_colptr.push(nnz);
            nnz += count;
        }
        self.l_colptr.push(nnz);

        self.l_rowidx = vec![0; nnz];
        self.l_values = vec![0.0; nnz];
        self.diag = vec![0.0; n];
        self.y = vec![0.0; n];
        self.pattern_ws = vec![0; n];
        self.analyzed = true;
        self.factorized = false;

        debug!("ldlt symbolic analysis: {} nonzeros in L", nnz);
        Ok(())
    }

    /// Numeric factorization, up-looking over the columns.
    fn set_matrix(&mut self, matrix: &SparseMatrix) -> Result<()> {
        if !self.analyzed {
            return Err(IbexError::SolverNotReady);
        }

        let n = self.n;
        let pattern = matrix.pattern();
        let values = matrix.values();

        for k in 0..n {
            // nonzero pattern of row k of L, in topological etree order
            self.flag[k] = k;
            self.y[k] = 0.0;
            self.l_nz[k] = 0;
            let mut top = n;

            let (lo, hi) = (pattern.col_ptr()[k], pattern.col_ptr()[k + 1]);
            for p in lo..hi {
                let row = pattern.row_idx()[p];
                self.y[row] += values[p];
                let mut i = row;
                let mut len = 0;
                while self.flag[i] != k {
                    self.pattern_ws[len] = i;
                    len += 1;
                    self.flag[i] = k;
                    i = self.parent[i] as usize;
                }
                while len > 0 {
                    len -= 1;
                    top -= 1;
                    self.pattern_ws[top] = self.pattern_ws[len];
                }
            }

            // sparse triangular solve for the values of row k of L
            self.diag[k] = self.y[k];
            self.y[k] = 0.0;
            for t in top..n {
                let i = self.pattern_ws[t];
                let yi = self.y[i];
                self.y[i] = 0.0;

                let p2 = self.l_colptr[i] + self.l_nz[i];
                for p in self.l_colptr[i]..p2 {
                    let row = self.l_rowidx[p];
                    self.y[row] -= self.l_values[p] * yi;
                }
                let l_ki = yi / self.diag[i];
                self.diag[k] -= l_ki * yi;
                self.l_rowidx[p2] = k;
                self.l_values[p2] = l_ki;
                self.l_nz[i] += 1;
            }

            if self.diag[k] == 0.0 {
                self.factorized = false;
                return Err(IbexError::SingularMatrix);
            }
        }

        self.factorized = true;
        Ok(())
    }

    /// Forward, diagonal and backward substitution.
    fn solve(&mut self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<()> {
        if !self.factorized {
            return Err(IbexError::SolverNotReady);
        }

        x.copy_from(b);

        // L·y = b (unit lower triangular, stored by columns)
        for j in 0..self.n {
            let xj = x[j];
            for p in self.l_colptr[j]..self.l_colptr[j + 1] {
                x[self.l_rowidx[p]] -= self.l_values[p] * xj;
            }
        }
        // D·z = y
        for i in 0..self.n {
            x[i] /= self.diag[i];
        }
        // Lᵀ·x = z
        for j in (0..self.n).rev() {
            let mut xj = x[j];
            for p in self.l_colptr[j]..self.l_colptr[j + 1] {
                xj -= self.l_values[p] * x[self.l_rowidx[p]];
            }
            x[j] = xj;
        }

        Ok(())
    }
}

/// Iterative least-squares solver: LSMR on the symmetric operator.
///
/// Accepts the same upper-triangle matrix view as [`LdltSolver`]; transpose
/// products reuse the symmetric matrix-vector kernel. Stops on the
/// standard backward-error tests controlled by `atol`/`btol`.
pub struct LsmrSolver {
    matrix: Option<SparseMatrix>,
    pub atol: f64,
    pub btol: f64,
    /// Iteration cap; `0` selects `10·n + 10`.
    pub max_iterations: usize,
}

impl LsmrSolver {
    pub fn new() -> Self {
        Self {
            matrix: None,
            atol: 1e-10,
            btol: 1e-10,
            max_iterations: 0,
        }
    }
}

impl Default for LsmrSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable symmetric orthogonalization: `(c, s, r)` with `c·a + s·b = r`
/// and `s·a − c·b = 0`.
fn sym_ortho(a: f64, b: f64) -> (f64, f64, f64) {
    if b == 0.0 {
        (if a == 0.0 { 1.0 } else { a.signum() }, 0.0, a.abs())
    } else if a == 0.0 {
        (0.0, b.signum(), b.abs())
    } else if b.abs() > a.abs() {
        let tau = a / b;
        let s = b.signum() / (1.0 + tau * tau).sqrt();
        let c = s * tau;
        (c, s, b / s)
    } else {
        let tau = b / a;
        let c = a.signum() / (1.0 + tau * tau).sqrt();
        let s = c * tau;
        (c, s, a / c)
    }
}

impl LinearSolver for LsmrSolver {
    fn analyze_pattern(&mut self, _matrix: &SparseMatrix) -> Result<()> {
        Ok(())
    }

    fn set_matrix(&mut self, matrix: &SparseMatrix) -> Result<()> {
        self.matrix = Some(matrix.clone());
        Ok(())
    }

    fn solve(&mut self, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<()> {
        let matrix = self.matrix.as_ref().ok_or(IbexError::SolverNotReady)?;
        let n = matrix.n();

        x.fill(0.0);
        let normb = b.norm();
        if normb == 0.0 {
            return Ok(());
        }

        let mut scratch = DVector::zeros(n);

        // Golub-Kahan bidiagonalization start
        let mut u = b.clone();
        let mut beta = normb;
        u /= beta;

        let mut v = DVector::zeros(n);
        matrix.sym_matvec(&u, &mut v);
        let mut alpha = v.norm();
        if alpha == 0.0 {
            // b is orthogonal to the range: x = 0 is the least-squares answer
            return Ok(());
        }
        v /= alpha;

        let mut h = v.clone();
        let mut hbar = DVector::zeros(n);

        let mut zetabar = alpha * beta;
        let mut alphabar = alpha;
        let mut rho = 1.0;
        let mut rhobar = 1.0;
        let mut cbar = 1.0;
        let mut sbar = 0.0;
        let mut zeta = 0.0;

        // residual-norm estimate state
        let mut betadd = beta;
        let mut betad = 0.0;
        let mut rhodold = 1.0;
        let mut tautildeold = 0.0;
        let mut thetatilde = 0.0;

        let mut norm_a2 = alpha * alpha;

        let maxiter = if self.max_iterations > 0 {
            self.max_iterations
        } else {
            10 * n + 10
        };

        for _iteration in 0..maxiter {
            // continue the bidiagonalization
            matrix.sym_matvec(&v, &mut scratch);
            u.axpy(1.0, &scratch, -alpha);
            beta = u.norm();
            if beta > 0.0 {
                u /= beta;
            }

            matrix.sym_matvec(&u, &mut scratch);
            v.axpy(1.0, &scratch, -beta);
            alpha = v.norm();
            if alpha > 0.0 {
                v /= alpha;
            }

            // rotate the lower bidiagonal to upper
            let rhoold = rho;
            let (c, s, rho_new) = sym_ortho(alphabar, beta);
            rho = rho_new;
            let thetanew = s * alpha;
            alphabar = c * alpha;

            let rhobarold = rhobar;
            let zetaold = zeta;
            let thetabar = sbar * rho;
            let (cbar_new, sbar_new, rhobar_new) = sym_ortho(cbar * rho, thetanew);
            cbar = cbar_new;
            sbar = sbar_new;
            rhobar = rhobar_new;
            zeta = cbar * zetabar;
            zetabar = -sbar * zetabar;

            // update the search directions and the solution
            hbar *= -(thetabar * rho / (rhoold * rhobarold));
            hbar += &h;
            x.axpy(zeta / (rho * rhobar), &hbar, 1.0);
            h *= -(thetanew / rho);
            h += &v;

            // estimate ‖r‖ without forming the residual
            let betahat = c * betadd;
            betadd = -s * betadd;
            let thetatildeold = thetatilde;
            let (ctildeold, stildeold, rhotildeold) = sym_ortho(rhodold, thetabar);
            thetatilde = stildeold * rhobar;
            rhodold = ctildeold * rhobar;
            betad = -stildeold * betad + ctildeold * betahat;
            tautildeold = (zetaold - thetatildeold * tautildeold) / rhotildeold;
            let taud = (zeta - thetatilde * tautildeold) / rhodold;
            let normr = ((betad - taud) * (betad - taud) + betadd * betadd).sqrt();

            norm_a2 += beta * beta;
            let norm_a = norm_a2.sqrt();
            norm_a2 += alpha * alpha;

            let normar = zetabar.abs();
            if normar == 0.0 {
                return Ok(());
            }
            let normx = x.norm();

            let test1 = normr / normb;
            let test2 = normar / (norm_a * normr);
            let t1 = test1 / (1.0 + norm_a * normx / normb);
            let rtol = self.btol + self.atol * norm_a * normx / normb;

            if test1 <= rtol || test2 <= self.atol || 1.0 + test2 <= 1.0 || 1.0 + t1 <= 1.0 {
                return Ok(());
            }
        }

        Err(IbexError::ConvergenceFailure {
            iterations: maxiter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::Dof;
    use crate::dofmap::DofMap;
    use crate::elements::{Element, Spring};
    use crate::sparse::SparsityPattern;
    use std::sync::Arc;

    /// Tridiagonal SPD test matrix: 2 on the diagonal, -1 off it.
    fn tridiagonal(n: usize) -> SparseMatrix {
        let elements: Vec<Box<dyn Element>> = (0..n - 1)
            .map(|i| {
                Box::new(Spring::new(Dof::new(i, 0), Dof::new(i + 1, 0), 1.0)) as Box<dyn Element>
            })
            .collect();
        let map = DofMap::build(&elements);
        let pattern = Arc::new(SparsityPattern::from_incidence(map.tables(), map.n_free()));
        let mut m = SparseMatrix::zeros(pattern);
        for i in 0..n {
            m.add(i, i, 2.0);
        }
        for i in 0..n - 1 {
            m.add(i, i + 1, -1.0);
        }
        m
    }

    fn residual(m: &SparseMatrix, x: &DVector<f64>, b: &DVector<f64>) -> f64 {
        let mut ax = DVector::zeros(m.n());
        m.sym_matvec(x, &mut ax);
        (ax - b).norm()
    }

    #[test]
    fn test_ldlt_solves_tridiagonal() {
        let m = tridiagonal(8);
        let b = DVector::from_fn(8, |i, _| (i + 1) as f64);

        let mut solver = LdltSolver::new();
        solver.analyze_pattern(&m).unwrap();
        solver.set_matrix(&m).unwrap();

        let mut x = DVector::zeros(8);
        solver.solve(&b, &mut x).unwrap();
        assert!(residual(&m, &x, &b) < 1e-10);
    }

    #[test]
    fn test_ldlt_refactorizes() {
        let mut m = tridiagonal(5);
        let b = DVector::from_element(5, 1.0);

        let mut solver = LdltSolver::new();
        solver.analyze_pattern(&m).unwrap();
        solver.set_matrix(&m).unwrap();
        let mut x1 = DVector::zeros(5);
        solver.solve(&b, &mut x1).unwrap();

        // same structure, scaled values
        for value in m.values_mut() {
            *value *= 4.0;
        }
        solver.set_matrix(&m).unwrap();
        let mut x2 = DVector::zeros(5);
        solver.solve(&b, &mut x2).unwrap();

        assert!((&x1 - &x2 * 4.0).norm() < 1e-10);
        assert!(residual(&m, &x2, &b) < 1e-10);
    }

    #[test]
    fn test_ldlt_reports_singular_matrix() {
        let m = tridiagonal(3); // structure only; leave values at zero
        let zeroed = m.same_pattern_zeroed();

        let mut solver = LdltSolver::new();
        solver.analyze_pattern(&zeroed).unwrap();
        assert!(matches!(
            solver.set_matrix(&zeroed),
            Err(IbexError::SingularMatrix)
        ));
    }

    #[test]
    fn test_ldlt_requires_analysis_first() {
        let m = tridiagonal(3);
        let mut solver = LdltSolver::new();
        assert!(matches!(
            solver.set_matrix(&m),
            Err(IbexError::SolverNotReady)
        ));
    }

    #[test]
    fn test_lsmr_matches_ldlt() {
        let m = tridiagonal(10);
        let b = DVector::from_fn(10, |i, _| ((i * 7 % 5) as f64) - 2.0);

        let mut direct = LdltSolver::new();
        direct.analyze_pattern(&m).unwrap();
        direct.set_matrix(&m).unwrap();
        let mut x_direct = DVector::zeros(10);
        direct.solve(&b, &mut x_direct).unwrap();

        let mut iterative = LsmrSolver::new();
        iterative.analyze_pattern(&m).unwrap();
        iterative.set_matrix(&m).unwrap();
        let mut x_iterative = DVector::zeros(10);
        iterative.solve(&b, &mut x_iterative).unwrap();

        assert!((x_direct - x_iterative).norm() < 1e-7);
    }

    #[test]
    fn test_lsmr_zero_rhs() {
        let m = tridiagonal(4);
        let mut solver = LsmrSolver::new();
        solver.set_matrix(&m).unwrap();

        let b = DVector::zeros(4);
        let mut x = DVector::from_element(4, 9.0);
        solver.solve(&b, &mut x).unwrap();
        assert_eq!(x, DVector::zeros(4));
    }

    #[test]
    fn test_unknown_solver_name() {
        assert!(matches!(
            from_name("gauss"),
            Err(IbexError::UnknownSolver(_))
        ));
        assert!(from_name("ldlt").is_ok());
        assert!(from_name("lsmr").is_ok());
    }
}
