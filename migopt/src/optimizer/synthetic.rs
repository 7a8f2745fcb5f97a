// src/optimizer/synthetic.rs
//
// Synthetic network optimizer.
//
// Stands in for the native engine when it is not linked (CLI smoke runs,
// determinism tests, dataset tooling). A circuit is a small YAML profile:
//
//   name: adder
//   area: 1200
//   depth: 48
//   switching_activity: 530.0   # optional
//   headroom:                   # optional, fractions of the initial metric
//     rewrite: 0.15
//     balance: 0.30
//     resubstitute: 0.10
//     refactor: 0.12
//   seed: 7                     # optional, defaults to a hash of `name`
//
// Each primitive spends a seeded share of its remaining headroom, so
// repeated application shows diminishing returns and eventually becomes a
// no-op. Balance trades a little area for depth; Refactor sometimes adds a
// level of depth. All behaviour is deterministic given the profile.

use std::fs;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{LoadError, NetworkOptimizer, OptimizerError, OptimizerFactory, Primitive};
use crate::types::CircuitMetrics;

/// Budget below which a primitive stops changing the network.
const MIN_BUDGET: f64 = 1e-3;
/// Share of the remaining budget spent per application (uniform).
const TAKE_RANGE: (f64, f64) = (0.3, 0.6);
/// Max relative area growth caused by one Balance.
const BALANCE_AREA_GROWTH: f64 = 0.02;
const REWRITE_DEPTH_CUT_PROB: f64 = 0.25;
const REFACTOR_DEPTH_BUMP_PROB: f64 = 0.3;
/// Switching activity per gate when a profile does not give one.
const DEFAULT_ACTIVITY_PER_GATE: f64 = 0.5;

/// 64-bit FNV-1a, used to derive a stable seed from a circuit name.
pub fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Remaining improvement budget per primitive, as a fraction of the
/// initial metric that primitive targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Headroom {
    /// Area fraction removable by Rewrite.
    pub rewrite: f64,
    /// Depth fraction removable by Balance.
    pub balance: f64,
    /// Area fraction removable by Resubstitute.
    pub resubstitute: f64,
    /// Area fraction removable by Refactor.
    pub refactor: f64,
}

impl Default for Headroom {
    fn default() -> Self {
        Self {
            rewrite: 0.15,
            balance: 0.30,
            resubstitute: 0.10,
            refactor: 0.12,
        }
    }
}

impl Headroom {
    /// No headroom at all: every primitive is a no-op.
    pub fn exhausted() -> Self {
        Self {
            rewrite: 0.0,
            balance: 0.0,
            resubstitute: 0.0,
            refactor: 0.0,
        }
    }

    pub fn get(&self, op: Primitive) -> f64 {
        match op {
            Primitive::Rewrite => self.rewrite,
            Primitive::Balance => self.balance,
            Primitive::Resubstitute => self.resubstitute,
            Primitive::Refactor => self.refactor,
        }
    }

    fn get_mut(&mut self, op: Primitive) -> &mut f64 {
        match op {
            Primitive::Rewrite => &mut self.rewrite,
            Primitive::Balance => &mut self.balance,
            Primitive::Resubstitute => &mut self.resubstitute,
            Primitive::Refactor => &mut self.refactor,
        }
    }
}

/// YAML circuit profile understood by [`SyntheticFactory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitProfile {
    pub name: String,
    pub area: u64,
    pub depth: u64,
    #[serde(default)]
    pub switching_activity: Option<f64>,
    #[serde(default)]
    pub headroom: Headroom,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CircuitProfile {
    pub fn new(name: impl Into<String>, area: u64, depth: u64) -> Self {
        Self {
            name: name.into(),
            area,
            depth,
            switching_activity: None,
            headroom: Headroom::default(),
            seed: None,
        }
    }

    /// Load a profile from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let label = path.as_ref().display().to_string();
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| LoadError::Io {
            path: label.clone(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents, &label)
    }

    /// Parse a profile from a YAML string; `label` names it in errors.
    pub fn from_yaml_str(yaml: &str, label: &str) -> Result<Self, LoadError> {
        let profile: CircuitProfile =
            serde_yaml::from_str(yaml).map_err(|e| LoadError::Malformed {
                path: label.to_string(),
                message: e.to_string(),
            })?;
        profile.validate().map_err(|message| LoadError::Malformed {
            path: label.to_string(),
            message,
        })?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if let Some(sa) = self.switching_activity {
            if !sa.is_finite() || sa < 0.0 {
                return Err(format!("switching_activity must be >= 0, got {}", sa));
            }
        }
        for (field, value) in [
            ("headroom.rewrite", self.headroom.rewrite),
            ("headroom.balance", self.headroom.balance),
            ("headroom.resubstitute", self.headroom.resubstitute),
            ("headroom.refactor", self.headroom.refactor),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", field, value));
            }
        }
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Seeded stand-in for the native engine.
#[derive(Debug, Clone)]
pub struct SyntheticOptimizer {
    name: String,
    seed: u64,
    initial: CircuitMetrics,
    current: CircuitMetrics,
    activity_per_gate: f64,
    remaining: Headroom,
    rng: ChaCha8Rng,
}

impl SyntheticOptimizer {
    pub fn from_profile(profile: &CircuitProfile) -> Self {
        let seed = profile.seed.unwrap_or_else(|| fnv1a64(&profile.name));
        let activity_per_gate = match profile.switching_activity {
            Some(sa) if profile.area > 0 => sa.max(0.0) / profile.area as f64,
            _ => DEFAULT_ACTIVITY_PER_GATE,
        };
        let metrics = CircuitMetrics::new(
            profile.area,
            profile.depth,
            activity_per_gate * profile.area as f64,
        );

        Self {
            name: profile.name.clone(),
            seed,
            initial: metrics,
            current: metrics,
            activity_per_gate,
            remaining: profile.headroom,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Snapshot of the current network as a profile (what `save` writes).
    pub fn profile(&self) -> CircuitProfile {
        CircuitProfile {
            name: self.name.clone(),
            area: self.current.area,
            depth: self.current.depth,
            switching_activity: Some(self.current.switching_activity),
            headroom: self.remaining,
            seed: Some(self.seed),
        }
    }

    pub fn remaining_headroom(&self) -> Headroom {
        self.remaining
    }

    /// Spend a seeded share of the remaining budget for `op`.
    fn take(&mut self, op: Primitive) -> f64 {
        let budget = self.remaining.get(op);
        if budget < MIN_BUDGET {
            return 0.0;
        }
        let share = self.rng.gen_range(TAKE_RANGE.0..TAKE_RANGE.1);
        let take = budget * share;
        *self.remaining.get_mut(op) -= take;
        take
    }

    fn shrink(value: u64, base: u64, fraction: f64) -> u64 {
        let cut = (base as f64 * fraction).round() as u64;
        value.saturating_sub(cut).max(1)
    }
}

impl NetworkOptimizer for SyntheticOptimizer {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn metrics(&self) -> Result<CircuitMetrics, OptimizerError> {
        Ok(self.current)
    }

    fn apply(&mut self, op: Primitive) -> Result<(), OptimizerError> {
        if self.current.area == 0 {
            return Err(OptimizerError::fault(
                op.method_name(),
                "cannot rewrite an empty network",
            ));
        }

        let take = self.take(op);
        if take <= 0.0 {
            return Ok(());
        }

        let mut area = self.current.area;
        let mut depth = self.current.depth;

        match op {
            Primitive::Rewrite => {
                area = Self::shrink(area, self.initial.area, take);
                if depth > 1 && self.rng.gen_bool(REWRITE_DEPTH_CUT_PROB) {
                    depth -= 1;
                }
            }
            Primitive::Balance => {
                let before = depth;
                depth = Self::shrink(depth, self.initial.depth, take);
                if depth < before {
                    let growth = self.rng.gen_range(0.0..BALANCE_AREA_GROWTH);
                    area += (area as f64 * growth).ceil() as u64;
                }
            }
            Primitive::Resubstitute => {
                area = Self::shrink(area, self.initial.area, take);
            }
            Primitive::Refactor => {
                area = Self::shrink(area, self.initial.area, take);
                if self.rng.gen_bool(REFACTOR_DEPTH_BUMP_PROB) {
                    depth += 1;
                }
            }
        }

        self.current = CircuitMetrics::new(area, depth, self.activity_per_gate * area as f64);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<(), OptimizerError> {
        let label = path.display().to_string();
        let yaml = self
            .profile()
            .to_yaml_string()
            .map_err(|e| OptimizerError::Save {
                path: label.clone(),
                message: e.to_string(),
            })?;
        fs::write(path, yaml).map_err(|e| OptimizerError::Save {
            path: label,
            message: e.to_string(),
        })
    }
}

/// Factory opening YAML circuit profiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticFactory;

impl OptimizerFactory for SyntheticFactory {
    fn load(&self, path: &Path) -> Result<Box<dyn NetworkOptimizer>, LoadError> {
        let profile = CircuitProfile::from_yaml_file(path)?;
        Ok(Box::new(SyntheticOptimizer::from_profile(&profile)))
    }
}
