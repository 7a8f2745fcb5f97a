// src/rl/policy.rs
//
// Policy trait and baseline implementations.
//
// A policy maps an observation to a discrete action id. Learned policies live
// outside this crate (behind the Python bindings); the baselines here drive
// evaluation runs, rollouts and tests:
//
// - HeuristicPolicy: mode-ordered round robin over the primitives, switching
//   to area-recovering primitives while the circuit is bloated
// - RandomPolicy: uniform over actions, seeded per episode
// - SequencePolicy: fixed cycle of action ids

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::OptMode;
use crate::optimizer::Primitive;

use super::action_encoding::{encode_action, ActionId, NUM_ACTIONS};
use super::observation::{index, Observation};

/// Current heuristic policy version.
pub const HEURISTIC_POLICY_VERSION: &str = "heuristic-v1.0.0";

pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Optional identifier (e.g. checkpoint name).
    fn policy_id(&self) -> Option<&str> {
        None
    }

    /// Choose the next action.
    fn act(&mut self, obs: &Observation) -> ActionId;

    /// Called at the start of each episode.
    fn reset_episode(&mut self, seed: u64, episode_id: u64);
}

/// Baseline policy selector used by the CLIs and run specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Heuristic,
    Random,
    Sequence,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Heuristic => "heuristic",
            PolicyKind::Random => "random",
            PolicyKind::Sequence => "sequence",
        }
    }

    pub fn parse(s: &str) -> Option<PolicyKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" | "h" => Some(PolicyKind::Heuristic),
            "random" | "rand" | "r" => Some(PolicyKind::Random),
            "sequence" | "seq" | "s" => Some(PolicyKind::Sequence),
            _ => None,
        }
    }

    /// Build a boxed policy. `sequence` is only used by `Sequence`; an empty
    /// sequence falls back to cycling every action in id order.
    pub fn build(&self, mode: OptMode, seed: u64, sequence: &[ActionId]) -> Box<dyn Policy> {
        match self {
            PolicyKind::Heuristic => Box::new(HeuristicPolicy::new(mode)),
            PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
            PolicyKind::Sequence => {
                let seq = if sequence.is_empty() {
                    (0..NUM_ACTIONS as ActionId).collect()
                } else {
                    sequence.to_vec()
                };
                Box::new(SequencePolicy::new(seq))
            }
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode-ordered round robin.
#[derive(Debug, Clone)]
pub struct HeuristicPolicy {
    mode: OptMode,
    cursor: usize,
    recovery_cursor: usize,
    id: Option<String>,
}

impl HeuristicPolicy {
    pub fn new(mode: OptMode) -> Self {
        Self {
            mode,
            cursor: 0,
            recovery_cursor: 0,
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Primitive rotation for the mode.
    pub fn schedule(mode: OptMode) -> &'static [Primitive] {
        match mode {
            OptMode::Depth => &[
                Primitive::Balance,
                Primitive::Rewrite,
                Primitive::Balance,
                Primitive::Refactor,
                Primitive::Resubstitute,
            ],
            OptMode::Area => &[
                Primitive::Rewrite,
                Primitive::Resubstitute,
                Primitive::Refactor,
                Primitive::Rewrite,
                Primitive::Balance,
            ],
            OptMode::Balanced => &[
                Primitive::Rewrite,
                Primitive::Balance,
                Primitive::Resubstitute,
                Primitive::Refactor,
            ],
        }
    }

    const RECOVERY: [Primitive; 2] = [Primitive::Rewrite, Primitive::Resubstitute];
}

impl Policy for HeuristicPolicy {
    fn version(&self) -> &str {
        HEURISTIC_POLICY_VERSION
    }

    fn policy_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn act(&mut self, obs: &Observation) -> ActionId {
        let bloated = obs
            .as_slice()
            .get(index::BLOAT_FLAG)
            .map_or(false, |v| *v > 0.5);

        if bloated {
            let op = Self::RECOVERY[self.recovery_cursor % Self::RECOVERY.len()];
            self.recovery_cursor += 1;
            return encode_action(op);
        }

        let schedule = Self::schedule(self.mode);
        let op = schedule[self.cursor % schedule.len()];
        self.cursor += 1;
        encode_action(op)
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {
        self.cursor = 0;
        self.recovery_cursor = 0;
    }
}

/// Uniform random actions.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    base_seed: u64,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            base_seed: seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn version(&self) -> &str {
        "random-v1"
    }

    fn act(&mut self, _obs: &Observation) -> ActionId {
        self.rng.gen_range(0..NUM_ACTIONS as ActionId)
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(
            self.base_seed ^ seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ episode_id,
        );
    }
}

/// Fixed cycle of action ids.
#[derive(Debug, Clone)]
pub struct SequencePolicy {
    actions: Vec<ActionId>,
    cursor: usize,
}

impl SequencePolicy {
    pub fn new(actions: Vec<ActionId>) -> Self {
        Self { actions, cursor: 0 }
    }
}

impl Policy for SequencePolicy {
    fn version(&self) -> &str {
        "sequence-v1"
    }

    fn act(&mut self, _obs: &Observation) -> ActionId {
        if self.actions.is_empty() {
            return 0;
        }
        let a = self.actions[self.cursor % self.actions.len()];
        self.cursor += 1;
        a
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {
        self.cursor = 0;
    }
}
