// src/optimizer/scripted.rs
//
// Queue-driven optimizer for tests and replay.
//
// Each primitive owns a FIFO of outcomes. Applying the primitive pops the
// next outcome: either the metrics the network moves to, or a fault. An
// empty queue leaves the network unchanged, so scripts only need to spell out
// the steps that matter.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::synthetic::{CircuitProfile, Headroom};
use super::{LoadError, NetworkOptimizer, OptimizerError, OptimizerFactory, Primitive};
use crate::types::CircuitMetrics;

/// What a scripted primitive does when applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// The network moves to these metrics.
    Metrics(CircuitMetrics),
    /// The engine raises an internal fault.
    Fault(String),
}

/// Shared record of every primitive applied, in order.
///
/// Cloned handles observe the same log, so a test can keep one while the
/// optimizer is owned by an environment.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    inner: Arc<Mutex<Vec<Primitive>>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: Primitive) {
        if let Ok(mut ops) = self.inner.lock() {
            ops.push(op);
        }
    }

    pub fn snapshot(&self) -> Vec<Primitive> {
        self.inner.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|ops| ops.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedOptimizer {
    current: CircuitMetrics,
    scripts: HashMap<Primitive, VecDeque<ScriptedOutcome>>,
    metrics_fault: Option<String>,
    log: OperationLog,
}

impl ScriptedOptimizer {
    pub fn new(initial: CircuitMetrics) -> Self {
        Self {
            current: initial,
            scripts: HashMap::new(),
            metrics_fault: None,
            log: OperationLog::new(),
        }
    }

    /// Queue the metrics the next `op` moves the network to.
    pub fn with_outcome(mut self, op: Primitive, metrics: CircuitMetrics) -> Self {
        self.scripts
            .entry(op)
            .or_default()
            .push_back(ScriptedOutcome::Metrics(metrics));
        self
    }

    pub fn with_outcomes<I>(mut self, op: Primitive, outcomes: I) -> Self
    where
        I: IntoIterator<Item = CircuitMetrics>,
    {
        let queue = self.scripts.entry(op).or_default();
        queue.extend(outcomes.into_iter().map(ScriptedOutcome::Metrics));
        self
    }

    /// Queue a fault for the next `op`.
    pub fn with_fault(mut self, op: Primitive, message: impl Into<String>) -> Self {
        self.scripts
            .entry(op)
            .or_default()
            .push_back(ScriptedOutcome::Fault(message.into()));
        self
    }

    /// Make every metric query fail.
    pub fn with_metrics_fault(mut self, message: impl Into<String>) -> Self {
        self.metrics_fault = Some(message.into());
        self
    }

    pub fn with_log(mut self, log: OperationLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> OperationLog {
        self.log.clone()
    }
}

impl NetworkOptimizer for ScriptedOptimizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn metrics(&self) -> Result<CircuitMetrics, OptimizerError> {
        match &self.metrics_fault {
            Some(message) => Err(OptimizerError::fault("metrics", message.clone())),
            None => Ok(self.current),
        }
    }

    fn apply(&mut self, op: Primitive) -> Result<(), OptimizerError> {
        self.log.record(op);
        let next = self.scripts.get_mut(&op).and_then(|queue| queue.pop_front());
        match next {
            Some(ScriptedOutcome::Metrics(metrics)) => {
                self.current = metrics;
                Ok(())
            }
            Some(ScriptedOutcome::Fault(message)) => {
                Err(OptimizerError::fault(op.method_name(), message))
            }
            None => Ok(()),
        }
    }

    /// Writes the current metrics as a synthetic circuit profile with no
    /// headroom left.
    fn save(&self, path: &Path) -> Result<(), OptimizerError> {
        let label = path.display().to_string();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scripted".to_string());
        let profile = CircuitProfile {
            name: stem,
            area: self.current.area,
            depth: self.current.depth,
            switching_activity: Some(self.current.switching_activity),
            headroom: Headroom::exhausted(),
            seed: None,
        };
        let yaml = profile.to_yaml_string().map_err(|e| OptimizerError::Save {
            path: label.clone(),
            message: e.to_string(),
        })?;
        fs::write(path, yaml).map_err(|e| OptimizerError::Save {
            path: label,
            message: e.to_string(),
        })
    }
}

/// Factory serving pre-built scripted optimizers by path.
///
/// Every load hands out a fresh clone of the registered script, so repeated
/// resets on the same path replay the same sequence. Unknown paths fail with
/// [`LoadError::Io`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    circuits: HashMap<PathBuf, ScriptedOptimizer>,
    malformed: HashMap<PathBuf, String>,
    loads: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_circuit(mut self, path: impl Into<PathBuf>, optimizer: ScriptedOptimizer) -> Self {
        self.circuits.insert(path.into(), optimizer);
        self
    }

    /// Register a path whose load fails as malformed.
    pub fn with_malformed(mut self, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        self.malformed.insert(path.into(), message.into());
        self
    }

    /// Every path passed to `load`, in call order.
    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl OptimizerFactory for ScriptedFactory {
    fn load(&self, path: &Path) -> Result<Box<dyn NetworkOptimizer>, LoadError> {
        if let Ok(mut loads) = self.loads.lock() {
            loads.push(path.to_path_buf());
        }
        let label = path.display().to_string();
        if let Some(message) = self.malformed.get(path) {
            return Err(LoadError::Malformed {
                path: label,
                message: message.clone(),
            });
        }
        match self.circuits.get(path) {
            Some(optimizer) => Ok(Box::new(optimizer.clone())),
            None => Err(LoadError::Io {
                path: label,
                source: "no such scripted circuit".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_pop_in_order_then_noop() {
        let mut opt = ScriptedOptimizer::new(CircuitMetrics::new(100, 20, 50.0)).with_outcomes(
            Primitive::Rewrite,
            [
                CircuitMetrics::new(90, 20, 45.0),
                CircuitMetrics::new(85, 19, 42.0),
            ],
        );

        opt.apply(Primitive::Rewrite).unwrap();
        assert_eq!(opt.metrics().unwrap().area, 90);
        opt.apply(Primitive::Rewrite).unwrap();
        assert_eq!(opt.metrics().unwrap().area, 85);
        opt.apply(Primitive::Rewrite).unwrap();
        assert_eq!(opt.metrics().unwrap().area, 85);
        opt.apply(Primitive::Balance).unwrap();
        assert_eq!(opt.metrics().unwrap().depth, 19);
    }

    #[test]
    fn test_fault_surfaces_with_method_name() {
        let mut opt = ScriptedOptimizer::new(CircuitMetrics::new(10, 3, 1.0))
            .with_fault(Primitive::Refactor, "segfault in cut enumeration");
        let err = opt.apply(Primitive::Refactor).unwrap_err();
        assert!(err.to_string().contains("refactor"));
    }

    #[test]
    fn test_log_shared_across_clones() {
        let log = OperationLog::new();
        let opt = ScriptedOptimizer::new(CircuitMetrics::new(10, 3, 1.0)).with_log(log.clone());
        let mut clone = opt.clone();
        clone.apply(Primitive::Balance).unwrap();
        clone.apply(Primitive::Rewrite).unwrap();
        assert_eq!(log.snapshot(), vec![Primitive::Balance, Primitive::Rewrite]);
    }

    #[test]
    fn test_factory_loads_fresh_clone() {
        let script = ScriptedOptimizer::new(CircuitMetrics::new(100, 20, 50.0))
            .with_outcome(Primitive::Rewrite, CircuitMetrics::new(90, 20, 45.0));
        let factory = ScriptedFactory::new()
            .with_circuit("a.aig", script)
            .with_malformed("b.aig", "bad header");

        let mut first = factory.load(Path::new("a.aig")).unwrap();
        first.apply(Primitive::Rewrite).unwrap();
        assert_eq!(first.metrics().unwrap().area, 90);

        let second = factory.load(Path::new("a.aig")).unwrap();
        assert_eq!(second.metrics().unwrap().area, 100);

        let err = factory.load(Path::new("b.aig")).err().unwrap();
        assert!(matches!(err, LoadError::Malformed { .. }));
        let err = factory.load(Path::new("c.aig")).err().unwrap();
        assert!(matches!(err, LoadError::Io { .. }));

        assert_eq!(factory.loads().len(), 4);
    }
}
