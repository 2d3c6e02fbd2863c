//! Solver configuration options

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Option bag consumed by [`System::solve`](crate::system::System::solve).
///
/// `iteration` is written by the Newton driver before each assembly pass so
/// that element `compute` implementations can observe the iteration count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Linear solver name: `"ldlt"` (direct) or `"lsmr"` (iterative).
    pub linear_solver: String,
    /// Load factor applied to the DoF targets.
    pub lambda: f64,
    /// Upper bound on Newton iterations.
    pub maxiter: usize,
    /// Residual-norm stopping tolerance.
    pub rtol: f64,
    /// Correction-norm stopping tolerance.
    pub xtol: f64,
    /// Assemble element contributions in parallel.
    ///
    /// Serial assembly is the default and the only bitwise-deterministic
    /// mode; parallel results can differ in the last bits depending on the
    /// reduction order.
    pub parallel: bool,
    /// Worker count for parallel assembly; `0` picks the rayon default.
    pub threads: usize,
    /// Current Newton iteration, injected by the driver.
    pub iteration: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            linear_solver: "ldlt".to_string(),
            lambda: 1.0,
            maxiter: 100,
            rtol: 1e-7,
            xtol: 1e-7,
            parallel: false,
            threads: 0,
            iteration: 0,
        }
    }
}

impl SolveOptions {
    /// Parse an options bag from a JSON document; missing keys take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
