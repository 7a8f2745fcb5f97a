// migopt_env/src/lib.rs
//
// Python bindings for the migopt episode controller.
//
// Provides a Gym-style API for training RL agents:
// - Env: single controller with reset(seed) and step(action)
// - VecEnv: independent controllers for parallel rollouts
//
// The optimizer engine is injected at construction: either the built-in
// synthetic engine (engine="synthetic", YAML circuit profiles) or a Python
// callable `loader(path) -> handle` whose handle exposes get_node_count(),
// get_depth(), get_switching_activity(), rewrite(), balance(),
// resubstitute(), refactor() and save(path).
//
// All operations are deterministic given seeds and a deterministic engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pyo3::exceptions::{PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use migopt::optimizer::{
    LoadError, NetworkOptimizer, OptimizerError, OptimizerFactory, Primitive, SyntheticFactory,
};
use migopt::rl::{
    EnvError, Observation, OptEnv as RustOptEnv, StepInfo, StepResult, VecEnv as RustVecEnv,
    ACTION_TABLE, ACTION_VERSION, NUM_ACTIONS, OBS_DIM, OBS_VERSION,
};
use migopt::{CircuitMetrics, Config, OptMode, RewardStrategyKind};

// --- Python-backed engine ----------------------------------------------------

/// Engine handle living on the Python side.
struct PyNetworkOptimizer {
    handle: Py<PyAny>,
}

impl PyNetworkOptimizer {
    fn read_metrics(&self, py: Python<'_>) -> PyResult<CircuitMetrics> {
        let h = self.handle.bind(py);
        let area: u64 = h.call_method0("get_node_count")?.extract()?;
        let depth: u64 = h.call_method0("get_depth")?.extract()?;
        let switching_activity: f64 = if h.hasattr("get_switching_activity")? {
            h.call_method0("get_switching_activity")?.extract()?
        } else {
            0.0
        };
        Ok(CircuitMetrics::new(area, depth, switching_activity))
    }
}

impl NetworkOptimizer for PyNetworkOptimizer {
    fn name(&self) -> &str {
        "python"
    }

    fn metrics(&self) -> Result<CircuitMetrics, OptimizerError> {
        Python::with_gil(|py| self.read_metrics(py))
            .map_err(|e| OptimizerError::fault("metrics", e.to_string()))
    }

    fn apply(&mut self, op: Primitive) -> Result<(), OptimizerError> {
        Python::with_gil(|py| {
            self.handle
                .bind(py)
                .call_method0(op.method_name())
                .map(|_| ())
        })
        .map_err(|e| OptimizerError::fault(op.method_name(), e.to_string()))
    }

    fn save(&self, path: &Path) -> Result<(), OptimizerError> {
        let target = path.display().to_string();
        Python::with_gil(|py| {
            self.handle
                .bind(py)
                .call_method1("save", (target.as_str(),))
                .map(|_| ())
        })
        .map_err(|e| OptimizerError::Save {
            path: target.clone(),
            message: e.to_string(),
        })
    }
}

/// Factory calling a Python `loader(path)`.
struct PyOptimizerFactory {
    loader: Py<PyAny>,
}

impl OptimizerFactory for PyOptimizerFactory {
    fn load(&self, path: &Path) -> Result<Box<dyn NetworkOptimizer>, LoadError> {
        let label = path.display().to_string();
        Python::with_gil(|py| match self.loader.call1(py, (label.as_str(),)) {
            Ok(handle) if handle.is_none(py) => Err(LoadError::Malformed {
                path: label.clone(),
                message: "loader returned None".to_string(),
            }),
            Ok(handle) => Ok(Box::new(PyNetworkOptimizer { handle }) as Box<dyn NetworkOptimizer>),
            Err(e) if e.is_instance_of::<PyOSError>(py) => Err(LoadError::Io {
                path: label.clone(),
                source: e.to_string(),
            }),
            Err(e) => Err(LoadError::Malformed {
                path: label.clone(),
                message: e.to_string(),
            }),
        })
    }
}

fn build_factory(engine: &str, loader: Option<Py<PyAny>>) -> PyResult<Arc<dyn OptimizerFactory>> {
    match (loader, engine) {
        (Some(loader), _) => Ok(Arc::new(PyOptimizerFactory { loader })),
        (None, "synthetic") => Ok(Arc::new(SyntheticFactory)),
        (None, other) => Err(PyValueError::new_err(format!(
            "Unknown engine: {}. Use 'synthetic' or pass loader=callable",
            other
        ))),
    }
}

fn build_config(mode: &str, strategy: &str, max_steps: u32) -> PyResult<Config> {
    let mode = OptMode::parse(mode).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown mode: {}. Use 'depth', 'area', or 'balanced'",
            mode
        ))
    })?;
    let strategy = RewardStrategyKind::parse(strategy).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown strategy: {}. Use 'mode_weighted' or 'dynamic_threshold'",
            strategy
        ))
    })?;

    let mut cfg = Config::for_mode(mode);
    cfg.strategy = strategy;
    cfg.max_steps = max_steps;
    cfg.validate().map_err(PyValueError::new_err)?;
    Ok(cfg)
}

fn env_err(e: EnvError) -> PyErr {
    match e {
        EnvError::InvalidAction { .. } | EnvError::BatchSize { .. } => {
            PyValueError::new_err(e.to_string())
        }
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

// --- Conversions ---------------------------------------------------------------

fn observation_to_list(py: Python<'_>, obs: &Observation) -> Py<PyList> {
    PyList::new_bound(py, obs.as_slice()).into()
}

fn step_info_to_dict(py: Python<'_>, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("raw_area", info.raw_area)?;
    dict.set_item("raw_depth", info.raw_depth)?;
    dict.set_item("switching_activity", info.switching_activity)?;
    dict.set_item("action_name", info.action_name.as_str())?;
    dict.set_item("is_success", info.is_success)?;
    dict.set_item("mode", info.mode.as_str())?;
    dict.set_item("step", info.step)?;
    dict.set_item(
        "termination_reason",
        info.termination_reason.map(|r| r.as_str()),
    )?;
    dict.set_item("circuit", info.circuit.as_str())?;

    let c = &info.reward_components;
    let components = PyDict::new_bound(py);
    components.set_item("base", c.base)?;
    components.set_item("regression_penalty", c.regression_penalty)?;
    components.set_item("noop_penalty", c.noop_penalty)?;
    components.set_item("repeat_penalty", c.repeat_penalty)?;
    components.set_item("bloat_pressure", c.bloat_pressure)?;
    components.set_item("trade_bonus", c.trade_bonus)?;
    components.set_item("step_cost", c.step_cost)?;
    components.set_item("terminal", c.terminal)?;
    dict.set_item("reward_components", components)?;

    Ok(dict.into())
}

fn reset_info(py: Python<'_>, env: &RustOptEnv) -> PyResult<Py<PyDict>> {
    let m = env.metrics();
    let dict = PyDict::new_bound(py);
    dict.set_item("raw_area", m.area)?;
    dict.set_item("raw_depth", m.depth)?;
    dict.set_item("switching_activity", m.switching_activity)?;
    dict.set_item("mode", env.mode().as_str())?;
    dict.set_item("seed", env.seed())?;
    dict.set_item("episode_id", env.episode_id())?;
    dict.set_item(
        "circuit",
        env.circuit_path().map(|p| p.display().to_string()),
    )?;
    Ok(dict.into())
}

type PyStep = (Py<PyList>, f64, bool, bool, Py<PyDict>);

fn step_to_tuple(py: Python<'_>, r: &StepResult) -> PyResult<PyStep> {
    Ok((
        observation_to_list(py, &r.observation),
        r.reward,
        r.terminated,
        r.truncated,
        step_info_to_dict(py, &r.info)?,
    ))
}

// --- Env -------------------------------------------------------------------------

/// Gym-style environment wrapper.
///
/// Provides the standard RL interface:
/// - reset(seed) -> (observation, info)
/// - step(action) -> (observation, reward, terminated, truncated, info)
#[pyclass]
pub struct Env {
    inner: RustOptEnv,
}

#[pymethods]
impl Env {
    /// Create a new environment.
    ///
    /// Args:
    ///     circuits: Training circuit paths sampled on reset
    ///     mode: "depth", "area" or "balanced" (default: "balanced")
    ///     strategy: "mode_weighted" or "dynamic_threshold" (default: "mode_weighted")
    ///     max_steps: Episode horizon (default: 40)
    ///     seed: Construction seed for reset(None) (default: 0)
    ///     engine: Built-in engine name (default: "synthetic")
    ///     loader: Optional callable path -> engine handle; overrides engine
    #[new]
    #[pyo3(signature = (circuits, mode="balanced", strategy="mode_weighted", max_steps=40, seed=0, engine="synthetic", loader=None))]
    fn new(
        circuits: Vec<PathBuf>,
        mode: &str,
        strategy: &str,
        max_steps: u32,
        seed: u64,
        engine: &str,
        loader: Option<Py<PyAny>>,
    ) -> PyResult<Self> {
        let cfg = build_config(mode, strategy, max_steps)?;
        let factory = build_factory(engine, loader)?;
        Ok(Self {
            inner: RustOptEnv::new(cfg, factory, circuits, seed),
        })
    }

    /// Reset on a sampled circuit.
    ///
    /// Returns:
    ///     (observation, info)
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, py: Python<'_>, seed: Option<u64>) -> PyResult<(Py<PyList>, Py<PyDict>)> {
        let inner = &mut self.inner;
        let obs = py.allow_threads(|| inner.reset(seed)).map_err(env_err)?;
        Ok((observation_to_list(py, &obs), reset_info(py, &self.inner)?))
    }

    /// Reset on a specific circuit (evaluation).
    fn reset_on(&mut self, py: Python<'_>, path: PathBuf) -> PyResult<(Py<PyList>, Py<PyDict>)> {
        let inner = &mut self.inner;
        let obs = py
            .allow_threads(|| inner.reset_on(&path))
            .map_err(env_err)?;
        Ok((observation_to_list(py, &obs), reset_info(py, &self.inner)?))
    }

    /// Apply an action id (0=Rewrite, 1=Balance, 2=Resubstitute, 3=Refactor).
    fn step(&mut self, py: Python<'_>, action: u32) -> PyResult<PyStep> {
        let inner = &mut self.inner;
        let result = py.allow_threads(|| inner.step(action)).map_err(env_err)?;
        step_to_tuple(py, &result)
    }

    /// Persist the current network.
    fn save(&self, path: PathBuf) -> PyResult<()> {
        self.inner.save_circuit(&path).map_err(env_err)
    }

    #[getter]
    fn observation_dim(&self) -> usize {
        OBS_DIM
    }

    #[getter]
    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    #[getter]
    fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }

    #[getter]
    fn episode_id(&self) -> u64 {
        self.inner.episode_id()
    }

    #[getter]
    fn mode(&self) -> &'static str {
        self.inner.mode().as_str()
    }
}

// --- VecEnv ----------------------------------------------------------------------

/// Vectorised environment for parallel rollouts.
///
/// Manages N independent controllers; controller i is seeded with
/// base_seed + i.
#[pyclass]
pub struct VecEnv {
    inner: RustVecEnv,
}

#[pymethods]
impl VecEnv {
    #[new]
    #[pyo3(signature = (n, circuits, mode="balanced", strategy="mode_weighted", max_steps=40, base_seed=0, engine="synthetic", loader=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        n: usize,
        circuits: Vec<PathBuf>,
        mode: &str,
        strategy: &str,
        max_steps: u32,
        base_seed: u64,
        engine: &str,
        loader: Option<Py<PyAny>>,
    ) -> PyResult<Self> {
        if n == 0 {
            return Err(PyValueError::new_err("n must be > 0"));
        }
        let cfg = build_config(mode, strategy, max_steps)?;
        let factory = build_factory(engine, loader)?;
        Ok(Self {
            inner: RustVecEnv::new(n, cfg, factory, circuits, base_seed),
        })
    }

    /// Reset all controllers; seeds[i] (if given) seeds controller i.
    #[pyo3(signature = (seeds=None))]
    fn reset_all(&mut self, py: Python<'_>, seeds: Option<Vec<u64>>) -> PyResult<Vec<Py<PyList>>> {
        let inner = &mut self.inner;
        let obs = py
            .allow_threads(|| inner.reset_all(seeds.as_deref()))
            .map_err(env_err)?;
        Ok(obs.iter().map(|o| observation_to_list(py, o)).collect())
    }

    /// Step every controller; `parallel=True` uses one thread per controller.
    #[pyo3(signature = (actions, parallel=false))]
    fn step(&mut self, py: Python<'_>, actions: Vec<u32>, parallel: bool) -> PyResult<Vec<PyStep>> {
        let inner = &mut self.inner;
        let results = py
            .allow_threads(|| {
                if parallel {
                    inner.step_parallel(&actions)
                } else {
                    inner.step(&actions)
                }
            })
            .map_err(env_err)?;
        results.iter().map(|r| step_to_tuple(py, r)).collect()
    }

    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn seeds(&self) -> Vec<u64> {
        self.inner.seeds()
    }

    fn dones(&self) -> Vec<bool> {
        self.inner.dones()
    }
}

// --- Module-level helpers ----------------------------------------------------------

/// Observation schema version.
#[pyfunction]
fn obs_version() -> u32 {
    OBS_VERSION
}

/// Action encoding version.
#[pyfunction]
fn action_version() -> u32 {
    ACTION_VERSION
}

/// Primitive names indexed by action id.
#[pyfunction]
fn action_names() -> Vec<&'static str> {
    ACTION_TABLE.iter().map(|p| p.name()).collect()
}

#[pymodule]
fn migopt_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Env>()?;
    m.add_class::<VecEnv>()?;
    m.add_function(wrap_pyfunction!(obs_version, m)?)?;
    m.add_function(wrap_pyfunction!(action_version, m)?)?;
    m.add_function(wrap_pyfunction!(action_names, m)?)?;
    m.add("OBS_DIM", OBS_DIM)?;
    m.add("NUM_ACTIONS", NUM_ACTIONS)?;
    Ok(())
}
