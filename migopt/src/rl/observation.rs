// src/rl/observation.rs
//
// Versioned observation schema for RL policy input.
//
// Layout (0-based):
//   0      area / initial_area
//   1      depth / initial_depth
//   2      relative density (area per level, vs. the initial circuit)
//   3      step_count / max_steps
//   4      min(repeat_count / 5, 1)
//   5      bloat flag (area > initial_area)
//   6..    one-hot of last_action over {none, op0, .., opN-1}
//
// Design requirements:
// - Versioned (obs_version field) for schema evolution
// - Serializable (serde) for logging and replay
// - Pure function of EpisodeState: same state, same vector

use serde::{Deserialize, Serialize};

use super::action_encoding::{encode_last_action, last_action_slot, LAST_ACTION_SLOTS};
use super::episode::EpisodeState;

/// Current observation schema version.
/// Increment when adding/removing/changing features.
pub const OBS_VERSION: u32 = 1;

/// Scalar features ahead of the last-action one-hot.
pub const SCALAR_FEATURES: usize = 6;

/// Observation dimension (11 with four primitives).
pub const OBS_DIM: usize = SCALAR_FEATURES + LAST_ACTION_SLOTS;

/// Guards the density ratio against zero depth.
pub const DENSITY_EPS: f64 = 1e-5;

/// repeat_count at which the repeat feature saturates at 1.0.
pub const REPEAT_SATURATION: f64 = 5.0;

/// Feature indices.
pub mod index {
    pub const AREA_RATIO: usize = 0;
    pub const DEPTH_RATIO: usize = 1;
    pub const DENSITY_RATIO: usize = 2;
    pub const PROGRESS: usize = 3;
    pub const REPEAT: usize = 4;
    pub const BLOAT_FLAG: usize = 5;
    pub const LAST_ACTION: usize = 6;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub obs_version: u32,
    /// Step count at which the observation was taken.
    pub step_index: u32,
    pub features: Vec<f32>,
}

impl Observation {
    /// Encode the current episode state.
    pub fn from_state(state: &EpisodeState) -> Self {
        let initial = &state.initial;
        let area = state.current.area as f64;
        let depth = state.current.depth as f64;

        let density = area / (depth + DENSITY_EPS);
        let initial_density = initial.area / (initial.depth + DENSITY_EPS);

        let mut features = Vec::with_capacity(OBS_DIM);
        features.push((area / initial.area) as f32);
        features.push((depth / initial.depth) as f32);
        features.push((density / initial_density) as f32);
        features.push(state.progress() as f32);
        features.push((state.repeat_count as f64 / REPEAT_SATURATION).min(1.0) as f32);
        features.push(if state.is_bloated() { 1.0 } else { 0.0 });
        features.extend_from_slice(&encode_last_action(state.last_action));

        Self {
            obs_version: OBS_VERSION,
            step_index: state.step_count,
            features,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.features
    }

    pub fn dim(&self) -> usize {
        self.features.len()
    }

    /// Position of the hot entry in the last-action one-hot.
    pub fn last_action_slot(&self) -> Option<usize> {
        self.features[index::LAST_ACTION..]
            .iter()
            .position(|v| *v == 1.0)
    }

    /// Serialize to deterministic JSON bytes.
    ///
    /// Field order follows the struct definition, so equal observations
    /// produce identical bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Expected last-action slot for a state, for cross-checks.
pub fn expected_last_action_index(state: &EpisodeState) -> usize {
    index::LAST_ACTION + last_action_slot(state.last_action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptMode;
    use crate::optimizer::Primitive;
    use crate::types::CircuitMetrics;

    fn state() -> EpisodeState {
        let mut s = EpisodeState::new(OptMode::Balanced, 40);
        s.reinitialize(CircuitMetrics::new(100, 20, 10.0));
        s
    }

    #[test]
    fn test_dim_is_eleven() {
        assert_eq!(OBS_DIM, 11);
        assert_eq!(Observation::from_state(&state()).dim(), OBS_DIM);
    }

    #[test]
    fn test_reset_observation() {
        let obs = Observation::from_state(&state());
        let f = obs.as_slice();
        assert_eq!(f[index::AREA_RATIO], 1.0);
        assert_eq!(f[index::DEPTH_RATIO], 1.0);
        assert!((f[index::DENSITY_RATIO] - 1.0).abs() < 1e-6);
        assert_eq!(f[index::PROGRESS], 0.0);
        assert_eq!(f[index::REPEAT], 0.0);
        assert_eq!(f[index::BLOAT_FLAG], 0.0);
        assert_eq!(obs.last_action_slot(), Some(0));
    }

    #[test]
    fn test_one_hot_tracks_last_action() {
        for (k, op) in crate::rl::action_encoding::ACTION_TABLE.iter().enumerate() {
            let mut s = state();
            s.record_action(*op, CircuitMetrics::new(90, 20, 9.0));
            let obs = Observation::from_state(&s);
            let hot: Vec<usize> = obs
                .as_slice()
                .iter()
                .enumerate()
                .skip(index::LAST_ACTION)
                .filter(|(_, v)| **v == 1.0)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(hot, vec![6 + k + 1]);
            assert_eq!(expected_last_action_index(&s), 6 + k + 1);
        }
    }

    #[test]
    fn test_repeat_feature_saturates() {
        let mut s = state();
        for _ in 0..9 {
            s.record_action(Primitive::Rewrite, CircuitMetrics::new(100, 20, 10.0));
        }
        assert_eq!(s.repeat_count, 8);
        let obs = Observation::from_state(&s);
        assert_eq!(obs.as_slice()[index::REPEAT], 1.0);
    }

    #[test]
    fn test_bloat_flag_and_density() {
        let mut s = state();
        s.record_action(Primitive::Balance, CircuitMetrics::new(120, 10, 12.0));
        let obs = Observation::from_state(&s);
        let f = obs.as_slice();
        assert_eq!(f[index::BLOAT_FLAG], 1.0);
        // (120/10) / (100/20) = 2.4
        assert!((f[index::DENSITY_RATIO] - 2.4).abs() < 1e-4);
        assert!((f[index::PROGRESS] - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_encoding_is_pure() {
        let mut s = state();
        s.record_action(Primitive::Refactor, CircuitMetrics::new(97, 21, 9.5));
        let a = Observation::from_state(&s);
        let b = Observation::from_state(&s);
        assert_eq!(a, b);
        assert_eq!(a.to_canonical_json().unwrap(), b.to_canonical_json().unwrap());
    }
}
