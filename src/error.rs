//! Error types for Ibex

use thiserror::Error;

/// Main error type for Ibex operations
#[derive(Error, Debug)]
pub enum IbexError {
    #[error("Unknown linear solver: {0}")]
    UnknownSolver(String),

    #[error("Singular matrix encountered")]
    SingularMatrix,

    #[error("Linear solver used before factorization")]
    SolverNotReady,

    #[error("Linear solver convergence failed after {iterations} iterations")]
    ConvergenceFailure { iterations: usize },

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for Ibex operations
pub type Result<T> = std::result::Result<T, IbexError>;
