// src/rl/episode.rs
//
// Per-controller episode state.
//
// Owned exclusively by one OptEnv; read by the observation encoder and the
// reward shaper, mutated only by the controller. Nothing here touches the
// optimizer handle.

use serde::{Deserialize, Serialize};

use crate::config::OptMode;
use crate::optimizer::Primitive;
use crate::types::{CircuitMetrics, InitialMetrics};

/// Lifecycle of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodePhase {
    /// Constructed, never reset.
    Ready,
    Running,
    /// Mode goal reached.
    Succeeded,
    /// Cut off by bloat, stall or the step limit.
    Truncated,
    /// An optimizer fault left the network in an unknown state.
    Faulted,
}

impl EpisodePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodePhase::Ready => "ready",
            EpisodePhase::Running => "running",
            EpisodePhase::Succeeded => "succeeded",
            EpisodePhase::Truncated => "truncated",
            EpisodePhase::Faulted => "faulted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EpisodePhase::Succeeded | EpisodePhase::Truncated)
    }
}

/// Metrics before and after one action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub action: Primitive,
    pub prev: CircuitMetrics,
    pub cur: CircuitMetrics,
    /// Area and depth both unchanged.
    pub is_noop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    /// Normalisation baseline (area/depth floored to 1.0).
    pub initial: InitialMetrics,
    /// Unfloored metrics read at reset, for reports.
    pub initial_raw: CircuitMetrics,
    pub current: CircuitMetrics,
    pub mode: OptMode,
    pub step_count: u32,
    pub max_steps: u32,
    pub last_action: Option<Primitive>,
    /// Consecutive repeats of `last_action` (0 on the first use).
    pub repeat_count: u32,
    /// Consecutive steps that left area and depth unchanged.
    pub consecutive_noops: u32,
    pub phase: EpisodePhase,
}

impl EpisodeState {
    pub fn new(mode: OptMode, max_steps: u32) -> Self {
        Self {
            initial: InitialMetrics::default(),
            initial_raw: CircuitMetrics::default(),
            current: CircuitMetrics::default(),
            mode,
            step_count: 0,
            max_steps,
            last_action: None,
            repeat_count: 0,
            consecutive_noops: 0,
            phase: EpisodePhase::Ready,
        }
    }

    /// Start a new episode from freshly loaded metrics.
    pub fn reinitialize(&mut self, metrics: CircuitMetrics) {
        self.initial = InitialMetrics::from_metrics(&metrics);
        self.initial_raw = metrics;
        self.current = metrics;
        self.step_count = 0;
        self.last_action = None;
        self.repeat_count = 0;
        self.consecutive_noops = 0;
        self.phase = EpisodePhase::Running;
    }

    /// Record `action` having moved the network to `next`.
    ///
    /// Step and history counters are updated before the reward is shaped, so
    /// the shaper sees the repeat count that includes this action.
    pub fn record_action(&mut self, action: Primitive, next: CircuitMetrics) -> Transition {
        let prev = self.current;
        let is_noop = prev.same_structure(&next);

        self.step_count = self.step_count.saturating_add(1);
        self.repeat_count = if self.last_action == Some(action) {
            self.repeat_count + 1
        } else {
            0
        };
        self.last_action = Some(action);
        self.consecutive_noops = if is_noop { self.consecutive_noops + 1 } else { 0 };
        self.current = next;

        Transition {
            action,
            prev,
            cur: next,
            is_noop,
        }
    }

    pub fn area_ratio(&self) -> f64 {
        self.current.area as f64 / self.initial.area
    }

    pub fn depth_ratio(&self) -> f64 {
        self.current.depth as f64 / self.initial.depth
    }

    /// Area currently above its initial value.
    pub fn is_bloated(&self) -> bool {
        self.current.area as f64 > self.initial.area
    }

    /// Fraction of the horizon used, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.max_steps == 0 {
            return 1.0;
        }
        (self.step_count as f64 / self.max_steps as f64).min(1.0)
    }

    pub fn at_step_limit(&self) -> bool {
        self.step_count >= self.max_steps
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reinitialize_floors_zero_metrics() {
        let mut state = EpisodeState::new(OptMode::Balanced, 10);
        assert_eq!(state.phase, EpisodePhase::Ready);
        state.reinitialize(CircuitMetrics::new(7, 0, 1.0));
        assert_eq!(state.initial.area, 7.0);
        assert_eq!(state.initial.depth, 1.0);
        assert_eq!(state.initial_raw.depth, 0);
        assert_eq!(state.phase, EpisodePhase::Running);
    }

    #[test]
    fn test_repeat_count_resets_on_change() {
        let mut state = EpisodeState::new(OptMode::Balanced, 10);
        state.reinitialize(CircuitMetrics::new(100, 20, 0.0));

        state.record_action(Primitive::Rewrite, CircuitMetrics::new(95, 20, 0.0));
        assert_eq!(state.repeat_count, 0);
        state.record_action(Primitive::Rewrite, CircuitMetrics::new(90, 20, 0.0));
        assert_eq!(state.repeat_count, 1);
        state.record_action(Primitive::Balance, CircuitMetrics::new(90, 18, 0.0));
        assert_eq!(state.repeat_count, 0);
        assert_eq!(state.step_count, 3);
        assert_eq!(state.last_action, Some(Primitive::Balance));
    }

    #[test]
    fn test_noop_detection_and_counter() {
        let mut state = EpisodeState::new(OptMode::Depth, 10);
        state.reinitialize(CircuitMetrics::new(100, 20, 5.0));

        let t = state.record_action(Primitive::Refactor, CircuitMetrics::new(100, 20, 4.0));
        assert!(t.is_noop);
        let t = state.record_action(Primitive::Rewrite, CircuitMetrics::new(100, 20, 4.0));
        assert!(t.is_noop);
        assert_eq!(state.consecutive_noops, 2);

        let t = state.record_action(Primitive::Rewrite, CircuitMetrics::new(99, 20, 4.0));
        assert!(!t.is_noop);
        assert_eq!(state.consecutive_noops, 0);
    }

    #[test]
    fn test_ratios_and_progress() {
        let mut state = EpisodeState::new(OptMode::Area, 4);
        state.reinitialize(CircuitMetrics::new(200, 40, 0.0));
        state.record_action(Primitive::Balance, CircuitMetrics::new(220, 30, 0.0));
        assert!((state.area_ratio() - 1.1).abs() < 1e-12);
        assert!((state.depth_ratio() - 0.75).abs() < 1e-12);
        assert!(state.is_bloated());
        assert_eq!(state.progress(), 0.25);
        assert!(!state.at_step_limit());
    }
}
