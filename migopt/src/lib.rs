//! migopt core library.
//!
//! Wraps an opaque logic-network optimizer (MIG / AIG rewriting engine) as a
//! Markov decision process so a reinforcement-learning agent can choose the
//! order of optimisation primitives. The binaries (`src/main.rs`,
//! `src/bin/*.rs`) are thin harnesses around these components.
//!
//! # Architecture
//!
//! - **Optimizer seam** (`optimizer`): `NetworkOptimizer` handles and the
//!   `OptimizerFactory` that opens them. Ships a seeded synthetic engine and
//!   a scripted test double.
//!
//! - **Circuit state** (`circuit`): one live handle plus the metrics read
//!   after its last primitive.
//!
//! - **MDP layer** (`rl`): action encoding, 11-dim observation encoder,
//!   reward shaper (mode-weighted and dynamic-threshold), episode
//!   controller, circuit sampler, baseline policies and RL telemetry.
//!
//! - **Evaluation** (`eval`): per-circuit rollouts, optimised-network
//!   artifacts, ABC equivalence check, CSV/JSON/log reports.
//!
//! - **Dataset** (`dataset`): circuit discovery, screening and quarantine.

pub mod circuit;
pub mod config;
pub mod dataset;
pub mod eval;
pub mod optimizer;
pub mod rl;
pub mod telemetry;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use circuit::CircuitState;
pub use config::{resolve_effective_mode, Config, EffectiveMode, ModeSource, OptMode};

pub use optimizer::{
    CircuitProfile, LoadError, NetworkOptimizer, OptimizerError, OptimizerFactory, Primitive,
    ScriptedFactory, ScriptedOptimizer, SyntheticFactory, SyntheticOptimizer,
};

pub use types::{CircuitMetrics, InitialMetrics};

pub use rl::{
    decode_action, encode_action, ActionEncodingSpec, ActionId, CircuitSampler, EnvError,
    Environment, EpisodePhase, EpisodeState, HeuristicPolicy, Observation, OptEnv, Policy,
    PolicyKind, RLTelemetry, RewardBreakdown, RewardParams, RewardShaper, RewardStrategyKind,
    SamplerError, StepInfo, StepResult, TerminationReason, VecEnv, ACTION_VERSION, NUM_ACTIONS,
    OBS_DIM, OBS_VERSION,
};

pub use eval::{
    run_evaluation, AbcChecker, EquivalenceChecker, EquivalenceStatus, EvalSummary, RunSpec,
};

pub use telemetry::{TelemetryConfig, TelemetrySink};
