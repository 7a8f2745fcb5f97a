// src/rl/mod.rs
//
// MDP layer: turns an opaque network optimizer into a reset/step environment.
//
// Key components:
// - ActionEncoding: fixed, versioned map from action ids to primitives
// - EpisodeState: per-controller counters and metrics
// - Observation: versioned 11-dim feature vector
// - RewardShaper: mode-weighted and dynamic-threshold strategies
// - CircuitSampler: seeded circuit selection with retry
// - OptEnv / VecEnv: the episode controller(s)
// - Policy: baseline policies for evaluation and rollouts
// - RLTelemetry: step records and episode markers

pub mod action_encoding;
pub mod env;
pub mod episode;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod sampler;
pub mod telemetry;

// Re-exports for convenience
pub use action_encoding::{
    decode_action, encode_action, ActionEncodingSpec, ActionId, ACTION_TABLE, ACTION_VERSION,
    NUM_ACTIONS,
};
pub use env::{EnvError, Environment, OptEnv, StepInfo, StepResult, TerminationReason, VecEnv};
pub use episode::{EpisodePhase, EpisodeState, Transition};
pub use observation::{Observation, OBS_DIM, OBS_VERSION};
pub use policy::{
    HeuristicPolicy, Policy, PolicyKind, RandomPolicy, SequencePolicy, HEURISTIC_POLICY_VERSION,
};
pub use reward::{
    ModeWeights, RewardBreakdown, RewardParams, RewardShaper, RewardStrategyKind, ShapedReward,
    Termination,
};
pub use sampler::{CircuitSampler, SamplerError};
pub use telemetry::{EpisodeMarker, RLTelemetry, StepRecord};
