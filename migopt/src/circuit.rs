// src/circuit.rs
//
// Circuit state proxy: one live optimizer handle plus the metrics read after
// the most recent operation.
//
// Guarantees:
// - a proxy only exists for a network with at least one node
// - `metrics()` always reflects the last completed `apply`
// - the handle is owned exclusively; dropping the proxy releases it

use std::fmt;
use std::path::{Path, PathBuf};

use crate::optimizer::{LoadError, NetworkOptimizer, OptimizerError, OptimizerFactory, Primitive};
use crate::types::CircuitMetrics;

pub struct CircuitState {
    path: PathBuf,
    handle: Box<dyn NetworkOptimizer>,
    metrics: CircuitMetrics,
}

impl CircuitState {
    /// Open `path` through `factory` and read its initial metrics.
    ///
    /// A metric query failure at load time means the description did not
    /// produce a usable network, so it is reported as malformed.
    pub fn load(factory: &dyn OptimizerFactory, path: &Path) -> Result<Self, LoadError> {
        let handle = factory.load(path)?;
        let metrics = handle.metrics().map_err(|e| LoadError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if metrics.area == 0 {
            return Err(LoadError::EmptyNetwork {
                path: path.display().to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            handle,
            metrics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engine_name(&self) -> &str {
        self.handle.name()
    }

    /// Metrics as of the last completed operation.
    pub fn metrics(&self) -> CircuitMetrics {
        self.metrics
    }

    /// Apply one primitive and return the freshly read metrics.
    pub fn apply(&mut self, op: Primitive) -> Result<CircuitMetrics, OptimizerError> {
        self.handle.apply(op)?;
        self.refresh()
    }

    /// Re-read metrics from the handle.
    pub fn refresh(&mut self) -> Result<CircuitMetrics, OptimizerError> {
        self.metrics = self.handle.metrics()?;
        Ok(self.metrics)
    }

    pub fn save(&self, path: &Path) -> Result<(), OptimizerError> {
        self.handle.save(path)
    }
}

impl fmt::Debug for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitState")
            .field("path", &self.path)
            .field("engine", &self.handle.name())
            .field("metrics", &self.metrics)
            .finish()
    }
}
