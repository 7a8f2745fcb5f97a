// src/types.rs
//
// Shared metric types used across the optimizer seam, the RL layer and the
// evaluation reports.

use serde::{Deserialize, Serialize};

/// Raw metrics read from a live network after the most recent primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    /// Gate / node count (area proxy).
    pub area: u64,
    /// Longest input-to-output path length (critical path).
    pub depth: u64,
    /// Static switching-activity estimate (power proxy).
    pub switching_activity: f64,
}

impl CircuitMetrics {
    pub fn new(area: u64, depth: u64, switching_activity: f64) -> Self {
        Self {
            area,
            depth,
            switching_activity,
        }
    }

    /// True when area and depth both match `other`.
    ///
    /// Switching activity is deliberately ignored: a primitive that leaves the
    /// structural metrics unchanged counts as a no-op.
    pub fn same_structure(&self, other: &CircuitMetrics) -> bool {
        self.area == other.area && self.depth == other.depth
    }
}

/// Normalisation baseline captured at reset.
///
/// Area and depth are floored to [`InitialMetrics::FLOOR`] so every ratio
/// feature and every initial-normalised reward term has a nonzero
/// denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialMetrics {
    pub area: f64,
    pub depth: f64,
    pub switching_activity: f64,
}

impl InitialMetrics {
    pub const FLOOR: f64 = 1.0;

    pub fn from_metrics(metrics: &CircuitMetrics) -> Self {
        Self {
            area: (metrics.area as f64).max(Self::FLOOR),
            depth: (metrics.depth as f64).max(Self::FLOOR),
            switching_activity: metrics.switching_activity.max(0.0),
        }
    }
}

impl Default for InitialMetrics {
    fn default() -> Self {
        Self::from_metrics(&CircuitMetrics::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_metrics_floor_zero_values() {
        let initial = InitialMetrics::from_metrics(&CircuitMetrics::new(0, 0, 0.0));
        assert_eq!(initial.area, 1.0);
        assert_eq!(initial.depth, 1.0);
    }

    #[test]
    fn test_initial_metrics_keep_nonzero_values() {
        let initial = InitialMetrics::from_metrics(&CircuitMetrics::new(120, 17, 42.5));
        assert_eq!(initial.area, 120.0);
        assert_eq!(initial.depth, 17.0);
        assert_eq!(initial.switching_activity, 42.5);
    }

    #[test]
    fn test_same_structure_ignores_switching_activity() {
        let a = CircuitMetrics::new(10, 4, 3.0);
        let b = CircuitMetrics::new(10, 4, 2.5);
        let c = CircuitMetrics::new(9, 4, 3.0);
        assert!(a.same_structure(&b));
        assert!(!a.same_structure(&c));
    }
}
