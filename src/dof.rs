//! Degrees of freedom and their identity

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Value-based identity of a degree of freedom.
///
/// Two DoFs created independently by different elements refer to the same
/// unknown exactly when their keys compare equal. The key is a compact
/// record of the owning object and a channel tag (e.g. node 7, direction y),
/// so deduplication works across elements without shared ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DofKey {
    pub object: usize,
    pub channel: usize,
}

impl DofKey {
    pub fn new(object: usize, channel: usize) -> Self {
        Self { object, channel }
    }
}

/// A scalar unknown in the equation system.
///
/// Carries the current value (`delta`), the load target, the fixed flag and
/// a `residual` scratch field the driver fills after a solve. Equality and
/// hashing consider the identity key only; the numeric fields are state,
/// not identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dof {
    pub key: DofKey,
    pub delta: f64,
    pub target: f64,
    pub fixed: bool,
    pub residual: f64,
}

impl Dof {
    /// Create a free DoF with zero value and target.
    pub fn new(object: usize, channel: usize) -> Self {
        Self {
            key: DofKey::new(object, channel),
            delta: 0.0,
            target: 0.0,
            fixed: false,
            residual: 0.0,
        }
    }

    /// Create a fixed DoF (boundary condition); its value never changes.
    pub fn fixed(object: usize, channel: usize) -> Self {
        Self {
            key: DofKey::new(object, channel),
            delta: 0.0,
            target: 0.0,
            fixed: true,
            residual: 0.0,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }
}

impl PartialEq for Dof {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Dof {}

impl Hash for Dof {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
