// src/rl/env.rs
//
// Gym-style episode controller for logic-network optimisation.
//
// This module provides:
// - OptEnv: single controller (reset, step) owning one optimizer handle
// - VecEnv: independent controllers for parallel rollouts
// - Environment: the reset/step surface a policy learner depends on
//
// Lifecycle: Ready -> Running -> Succeeded | Truncated. An optimizer fault
// moves the episode to Faulted and every further step is refused until the
// next reset. Stepping a finished episode performs no optimizer call and
// repeats the terminal flags with zero reward.
//
// All transitions are deterministic given the construction seed, the reset
// seeds and the action sequence.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::circuit::CircuitState;
use crate::config::{Config, OptMode};
use crate::optimizer::{LoadError, OptimizerError, OptimizerFactory, Primitive};
use crate::types::CircuitMetrics;

use super::action_encoding::{ActionId, NUM_ACTIONS};
use super::episode::{EpisodePhase, EpisodeState};
use super::observation::{Observation, OBS_DIM};
use super::reward::{RewardBreakdown, RewardShaper, Termination};
use super::sampler::{CircuitSampler, SamplerError};

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    Success,
    Bloat,
    Stall,
    MaxSteps,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Success => "success",
            TerminationReason::Bloat => "bloat",
            TerminationReason::Stall => "stall",
            TerminationReason::MaxSteps => "max_steps",
        }
    }

    /// Success terminates; everything else truncates.
    pub fn is_terminated(&self) -> bool {
        matches!(self, TerminationReason::Success)
    }
}

impl From<Termination> for TerminationReason {
    fn from(t: Termination) -> Self {
        match t {
            Termination::Success => TerminationReason::Success,
            Termination::Bloat => TerminationReason::Bloat,
            Termination::Stall => TerminationReason::Stall,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvError {
    /// `step` called before the first `reset`.
    NotReset,
    InvalidAction { id: ActionId, num_actions: usize },
    /// The sampler could not open any circuit.
    NoViableCircuit(SamplerError),
    /// An explicitly requested circuit failed to load.
    Load(LoadError),
    /// The optimizer faulted; the episode is poisoned.
    OptimizerFault(OptimizerError),
    /// `step` after an optimizer fault, before a new `reset`.
    Faulted,
    /// Batched call with the wrong number of actions.
    BatchSize { expected: usize, got: usize },
    /// A parallel step worker panicked.
    WorkerPanicked,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::NotReset => write!(f, "step called before reset"),
            EnvError::InvalidAction { id, num_actions } => {
                write!(f, "invalid action {} (expected 0..{})", id, num_actions)
            }
            EnvError::NoViableCircuit(e) => write!(f, "{}", e),
            EnvError::Load(e) => write!(f, "{}", e),
            EnvError::OptimizerFault(e) => write!(f, "{}", e),
            EnvError::Faulted => {
                write!(f, "episode is faulted; reset before stepping again")
            }
            EnvError::BatchSize { expected, got } => {
                write!(f, "expected {} actions, got {}", expected, got)
            }
            EnvError::WorkerPanicked => write!(f, "parallel step worker panicked"),
        }
    }
}

impl std::error::Error for EnvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvError::NoViableCircuit(e) => Some(e),
            EnvError::Load(e) => Some(e),
            EnvError::OptimizerFault(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SamplerError> for EnvError {
    fn from(e: SamplerError) -> Self {
        EnvError::NoViableCircuit(e)
    }
}

/// Additional information returned from a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Gate count after the step.
    pub raw_area: u64,
    /// Logic depth after the step.
    pub raw_depth: u64,
    pub switching_activity: f64,
    /// Primitive applied ("None" on a terminal repeat).
    pub action_name: String,
    pub is_success: bool,
    pub mode: String,
    pub step: u32,
    pub termination_reason: Option<TerminationReason>,
    /// Circuit description the episode runs on.
    pub circuit: String,
    pub reward_components: RewardBreakdown,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    /// Mode goal reached.
    pub terminated: bool,
    /// Cut off by bloat, stall or the step limit.
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// The reset/step surface consumed by a policy learner.
pub trait Environment {
    fn observation_dim(&self) -> usize;
    fn num_actions(&self) -> usize;
    fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError>;
    fn step(&mut self, action: ActionId) -> Result<StepResult, EnvError>;
}

/// Single episode controller.
pub struct OptEnv {
    config: Config,
    factory: Arc<dyn OptimizerFactory>,
    sampler: CircuitSampler,
    shaper: RewardShaper,
    circuit: Option<CircuitState>,
    state: EpisodeState,
    /// Source of seeds for `reset(None)`.
    rng: ChaCha8Rng,
    seed: u64,
    episode_id: u64,
    termination: Option<TerminationReason>,
}

impl OptEnv {
    /// Create a controller drawing training circuits from `circuits`.
    ///
    /// `seed` fixes the sequence of seeds used by `reset(None)`.
    pub fn new(
        config: Config,
        factory: Arc<dyn OptimizerFactory>,
        circuits: Vec<PathBuf>,
        seed: u64,
    ) -> Self {
        let sampler = CircuitSampler::new(circuits, config.sampler.max_attempts, seed);
        let shaper = RewardShaper::new(config.strategy, config.reward.clone());
        let state = EpisodeState::new(config.mode, config.max_steps);

        Self {
            config,
            factory,
            sampler,
            shaper,
            circuit: None,
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            episode_id: 0,
            termination: None,
        }
    }

    /// Start a new episode on a sampled circuit.
    ///
    /// The previous optimizer handle is released before the new one is
    /// acquired.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError> {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.sampler.reseed(seed);

        self.release();
        let circuit = self.sampler.draw(self.factory.as_ref())?;
        Ok(self.start_episode(circuit))
    }

    /// Start a new episode on a specific circuit (evaluation).
    pub fn reset_on(&mut self, path: &Path) -> Result<Observation, EnvError> {
        self.release();
        let circuit = CircuitState::load(self.factory.as_ref(), path).map_err(EnvError::Load)?;
        Ok(self.start_episode(circuit))
    }

    fn release(&mut self) {
        self.circuit = None;
        self.state = EpisodeState::new(self.config.mode, self.config.max_steps);
        self.termination = None;
    }

    fn start_episode(&mut self, circuit: CircuitState) -> Observation {
        self.state.reinitialize(circuit.metrics());
        self.circuit = Some(circuit);
        self.episode_id += 1;
        Observation::from_state(&self.state)
    }

    /// Apply action `action` and advance the episode by one step.
    pub fn step(&mut self, action: ActionId) -> Result<StepResult, EnvError> {
        match self.state.phase {
            EpisodePhase::Ready => return Err(EnvError::NotReset),
            EpisodePhase::Faulted => return Err(EnvError::Faulted),
            EpisodePhase::Succeeded | EpisodePhase::Truncated => {
                return Ok(self.terminal_repeat());
            }
            EpisodePhase::Running => {}
        }

        let op = Primitive::try_from(action).map_err(|_| EnvError::InvalidAction {
            id: action,
            num_actions: NUM_ACTIONS,
        })?;

        let circuit = self.circuit.as_mut().ok_or(EnvError::NotReset)?;
        let next = match circuit.apply(op) {
            Ok(metrics) => metrics,
            Err(e) => {
                self.state.phase = EpisodePhase::Faulted;
                return Err(EnvError::OptimizerFault(e));
            }
        };

        let transition = self.state.record_action(op, next);
        let shaped = self.shaper.shape(&self.state, &transition);

        let reason = match shaped.termination {
            Some(t) => Some(TerminationReason::from(t)),
            None if self.state.at_step_limit() => Some(TerminationReason::MaxSteps),
            None => None,
        };

        if let Some(reason) = reason {
            self.state.phase = if reason.is_terminated() {
                EpisodePhase::Succeeded
            } else {
                EpisodePhase::Truncated
            };
        }
        self.termination = reason;

        Ok(StepResult {
            observation: Observation::from_state(&self.state),
            reward: shaped.reward,
            terminated: reason.map_or(false, |r| r.is_terminated()),
            truncated: reason.map_or(false, |r| !r.is_terminated()),
            info: self.build_step_info(op.name(), shaped.breakdown),
        })
    }

    fn terminal_repeat(&self) -> StepResult {
        StepResult {
            observation: Observation::from_state(&self.state),
            reward: 0.0,
            terminated: self.state.phase == EpisodePhase::Succeeded,
            truncated: self.state.phase == EpisodePhase::Truncated,
            info: self.build_step_info("None", RewardBreakdown::default()),
        }
    }

    fn build_step_info(&self, action_name: &str, breakdown: RewardBreakdown) -> StepInfo {
        StepInfo {
            raw_area: self.state.current.area,
            raw_depth: self.state.current.depth,
            switching_activity: self.state.current.switching_activity,
            action_name: action_name.to_string(),
            is_success: self.termination == Some(TerminationReason::Success),
            mode: self.config.mode.as_str().to_string(),
            step: self.state.step_count,
            termination_reason: self.termination,
            circuit: self
                .circuit
                .as_ref()
                .map(|c| c.path().display().to_string())
                .unwrap_or_default(),
            reward_components: breakdown,
        }
    }

    /// Persist the current network (post-episode artifact).
    pub fn save_circuit(&self, path: &Path) -> Result<(), EnvError> {
        let circuit = self.circuit.as_ref().ok_or(EnvError::NotReset)?;
        circuit.save(path).map_err(EnvError::OptimizerFault)
    }

    pub fn observe(&self) -> Observation {
        Observation::from_state(&self.state)
    }

    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> OptMode {
        self.config.mode
    }

    pub fn shaper(&self) -> &RewardShaper {
        &self.shaper
    }

    /// Seed used by the current episode.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of episodes started so far.
    pub fn episode_id(&self) -> u64 {
        self.episode_id
    }

    pub fn metrics(&self) -> CircuitMetrics {
        self.state.current
    }

    pub fn circuit_path(&self) -> Option<&Path> {
        self.circuit.as_ref().map(|c| c.path())
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.circuit.as_ref().map(|c| c.engine_name())
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Debug for OptEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptEnv")
            .field("mode", &self.config.mode)
            .field("strategy", &self.config.strategy)
            .field("seed", &self.seed)
            .field("episode_id", &self.episode_id)
            .field("circuit", &self.circuit)
            .field("phase", &self.state.phase)
            .finish()
    }
}

impl Environment for OptEnv {
    fn observation_dim(&self) -> usize {
        OBS_DIM
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn reset(&mut self, seed: Option<u64>) -> Result<Observation, EnvError> {
        OptEnv::reset(self, seed)
    }

    fn step(&mut self, action: ActionId) -> Result<StepResult, EnvError> {
        OptEnv::step(self, action)
    }
}

/// Independent controllers, one optimizer handle each.
#[derive(Debug)]
pub struct VecEnv {
    envs: Vec<OptEnv>,
}

impl VecEnv {
    /// Create `n` controllers sharing a factory; controller `i` is seeded
    /// with `base_seed + i`.
    pub fn new(
        n: usize,
        config: Config,
        factory: Arc<dyn OptimizerFactory>,
        circuits: Vec<PathBuf>,
        base_seed: u64,
    ) -> Self {
        let envs = (0..n)
            .map(|i| {
                OptEnv::new(
                    config.clone(),
                    Arc::clone(&factory),
                    circuits.clone(),
                    base_seed.wrapping_add(i as u64),
                )
            })
            .collect();
        Self { envs }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn envs(&self) -> &[OptEnv] {
        &self.envs
    }

    /// Reset all environments; `seeds[i]` (if given) seeds controller `i`.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Result<Vec<Observation>, EnvError> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed)
            })
            .collect()
    }

    /// Step all environments sequentially.
    pub fn step(&mut self, actions: &[ActionId]) -> Result<Vec<StepResult>, EnvError> {
        self.check_batch(actions)?;
        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(*action))
            .collect()
    }

    /// Step all environments, one scoped thread per controller.
    ///
    /// Results are returned in controller order and match `step` exactly.
    pub fn step_parallel(&mut self, actions: &[ActionId]) -> Result<Vec<StepResult>, EnvError> {
        self.check_batch(actions)?;
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .envs
                .iter_mut()
                .zip(actions.iter().copied())
                .map(|(env, action)| scope.spawn(move || env.step(action)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(Err(EnvError::WorkerPanicked)))
                .collect()
        })
    }

    fn check_batch(&self, actions: &[ActionId]) -> Result<(), EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }
        Ok(())
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(|e| e.seed()).collect()
    }

    pub fn dones(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_done()).collect()
    }
}
