// src/optimizer/mod.rs
//
// Seam between the episode controller and the network optimizer engine.
//
// The controller never inspects graph internals. It only:
// - asks a factory to open a circuit description,
// - applies one of four graph-rewriting primitives,
// - reads scalar metrics back,
// - persists the final network for post-episode artifacts.
//
// Implementations:
// - SyntheticOptimizer: seeded stand-in engine driven by YAML circuit profiles
// - ScriptedOptimizer: exact, queue-driven metric sequences for tests/replay
//
// A native engine (or a Python handle, see migopt_env) plugs in by
// implementing NetworkOptimizer + OptimizerFactory; nothing in the core
// locates engines through process-wide state.

pub mod scripted;
pub mod synthetic;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::CircuitMetrics;

pub use scripted::{OperationLog, ScriptedFactory, ScriptedOptimizer};
pub use synthetic::{CircuitProfile, Headroom, SyntheticFactory, SyntheticOptimizer};

/// Equivalence-preserving graph-rewriting primitive offered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    /// Algebraic rewriting.
    Rewrite,
    /// Depth-oriented balancing / restructuring.
    Balance,
    /// Resubstitution of nodes by existing divisors.
    Resubstitute,
    /// Cone refactoring.
    Refactor,
}

impl Primitive {
    /// Human-readable name (reported as `action_name`).
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Rewrite => "Rewrite",
            Primitive::Balance => "Balance",
            Primitive::Resubstitute => "Resubstitute",
            Primitive::Refactor => "Refactor",
        }
    }

    /// Engine method name for this primitive (`rewrite`, `balance`, ...).
    pub fn method_name(&self) -> &'static str {
        match self {
            Primitive::Rewrite => "rewrite",
            Primitive::Balance => "balance",
            Primitive::Resubstitute => "resubstitute",
            Primitive::Refactor => "refactor",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure to open a circuit description.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The description could not be read at all.
    Io { path: String, source: String },
    /// The description was read but could not be parsed into a network.
    Malformed { path: String, message: String },
    /// The network parsed but has zero nodes.
    EmptyNetwork { path: String },
}

impl LoadError {
    pub fn path(&self) -> &str {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Malformed { path, .. }
            | LoadError::EmptyNetwork { path } => path,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => {
                write!(f, "Failed to read circuit '{}': {}", path, source)
            }
            LoadError::Malformed { path, message } => {
                write!(f, "Malformed circuit '{}': {}", path, message)
            }
            LoadError::EmptyNetwork { path } => {
                write!(f, "Circuit '{}' has no nodes", path)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Failure raised by a live engine handle.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// Internal fault while applying a primitive or reading metrics.
    /// The network is of unknown validity afterwards.
    Fault { operation: String, message: String },
    /// Persisting the network failed.
    Save { path: String, message: String },
}

impl OptimizerError {
    pub fn fault(operation: impl Into<String>, message: impl Into<String>) -> Self {
        OptimizerError::Fault {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::Fault { operation, message } => {
                write!(f, "Optimizer fault during {}: {}", operation, message)
            }
            OptimizerError::Save { path, message } => {
                write!(f, "Failed to save circuit to '{}': {}", path, message)
            }
        }
    }
}

impl std::error::Error for OptimizerError {}

/// One live network session.
///
/// Handles are `Send` so a controller can be moved onto a worker thread, but
/// they are never shared between controllers.
pub trait NetworkOptimizer: Send {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Read area, depth and switching activity of the current network.
    fn metrics(&self) -> Result<CircuitMetrics, OptimizerError>;

    /// Apply one primitive in place. May legitimately leave the network
    /// unchanged.
    fn apply(&mut self, op: Primitive) -> Result<(), OptimizerError>;

    /// Persist the current network.
    fn save(&self, path: &Path) -> Result<(), OptimizerError>;
}

/// Opens circuit descriptions into live handles.
pub trait OptimizerFactory: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn NetworkOptimizer>, LoadError>;
}

impl<F> OptimizerFactory for F
where
    F: Fn(&Path) -> Result<Box<dyn NetworkOptimizer>, LoadError> + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<Box<dyn NetworkOptimizer>, LoadError> {
        self(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names() {
        assert_eq!(Primitive::Rewrite.name(), "Rewrite");
        assert_eq!(Primitive::Resubstitute.method_name(), "resubstitute");
        assert_eq!(Primitive::Refactor.to_string(), "Refactor");
    }

    #[test]
    fn test_closure_factory() {
        let factory = |path: &Path| -> Result<Box<dyn NetworkOptimizer>, LoadError> {
            Err(LoadError::EmptyNetwork {
                path: path.display().to_string(),
            })
        };
        let err = factory.load(Path::new("x.aig")).err().unwrap();
        assert_eq!(err.path(), "x.aig");
        assert!(err.to_string().contains("no nodes"));
    }
}
