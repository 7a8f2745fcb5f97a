// src/rl/reward.rs
//
// Multi-objective reward shaping.
//
// Two interchangeable strategies, selected by RewardStrategyKind:
//
// - ModeWeighted: improvement relative to the previous step, weighted per
//   optimisation mode; regressions are charged proportionally to their size.
// - DynamicThreshold ("red/green light"): improvement relative to the
//   initial circuit; while the circuit is larger than it started (red) the
//   shaper pushes hard on area, otherwise (green) it rewards depth and allows
//   trading some area for it.
//
// Both strategies share the no-op, repeat, step-cost and terminal logic.
// The shaper is a pure function of (EpisodeState, Transition); every
// component is reported separately in RewardBreakdown and the scalar reward
// is exactly their sum.
//
// Terminal checks run in a fixed order: bloat, stall, success.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OptMode;
use crate::types::InitialMetrics;

use super::episode::{EpisodeState, Transition};

/// Reward strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStrategyKind {
    ModeWeighted,
    DynamicThreshold,
}

impl RewardStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardStrategyKind::ModeWeighted => "mode_weighted",
            RewardStrategyKind::DynamicThreshold => "dynamic_threshold",
        }
    }

    /// Parse a strategy name (case-insensitive, `-` or `_`).
    pub fn parse(s: &str) -> Option<RewardStrategyKind> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "mode_weighted" | "weighted" | "mode" => Some(RewardStrategyKind::ModeWeighted),
            "dynamic_threshold" | "dynamic" | "threshold" | "traffic_light" => {
                Some(RewardStrategyKind::DynamicThreshold)
            }
            _ => None,
        }
    }
}

impl fmt::Display for RewardStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable reward coefficients.
///
/// Penalties are stored as positive magnitudes and subtracted by the shaper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardParams {
    /// Multiplier on a positive weighted improvement score (mode-weighted).
    pub improvement_gain: f64,
    /// Multiplier on a non-positive weighted score (mode-weighted).
    pub regression_gain: f64,
    /// Flat per-step cost, mode-weighted.
    pub step_cost: f64,
    /// Flat per-step cost, dynamic-threshold.
    pub dynamic_step_cost: f64,
    /// Constant part of the mode-weighted no-op penalty.
    pub noop_base_penalty: f64,
    /// Coefficient on repeat_count² in the mode-weighted no-op penalty.
    pub noop_repeat_coeff: f64,
    /// Coefficient on consecutive_noops in the dynamic no-op penalty.
    pub dynamic_noop_coeff: f64,
    /// Repeats of the same action tolerated before the repeat penalty.
    pub repeat_threshold: u32,
    /// Penalty per repeat above the threshold.
    pub repeat_penalty: f64,
    pub success_bonus: f64,
    pub bloat_penalty: f64,
    /// Bloat limit (x initial area) used by the dynamic strategy.
    pub dynamic_bloat_limit: f64,
    /// Consecutive no-ops tolerated before the episode stalls.
    pub stall_limit: u32,
    pub stall_penalty: f64,
    /// Per-step penalty while area is above its initial value (dynamic).
    pub red_light_penalty: f64,
    pub red_area_weight: f64,
    pub red_depth_weight: f64,
    pub green_area_weight: f64,
    pub green_depth_weight: f64,
    /// Bonus when depth improves at the cost of area under a green light.
    pub trade_bonus: f64,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            improvement_gain: 60.0,
            regression_gain: 30.0,
            step_cost: 0.1,
            dynamic_step_cost: 0.1,
            noop_base_penalty: 1.0,
            noop_repeat_coeff: 1.0,
            dynamic_noop_coeff: 1.0,
            repeat_threshold: 5,
            repeat_penalty: 0.5,
            success_bonus: 100.0,
            bloat_penalty: 50.0,
            dynamic_bloat_limit: 2.0,
            stall_limit: 6,
            stall_penalty: 10.0,
            red_light_penalty: 0.5,
            red_area_weight: 10.0,
            red_depth_weight: 1.0,
            green_area_weight: 2.0,
            green_depth_weight: 8.0,
            trade_bonus: 1.0,
        }
    }
}

impl RewardParams {
    pub fn validate(&self) -> Result<(), String> {
        let non_negative = [
            ("improvement_gain", self.improvement_gain),
            ("regression_gain", self.regression_gain),
            ("step_cost", self.step_cost),
            ("dynamic_step_cost", self.dynamic_step_cost),
            ("noop_base_penalty", self.noop_base_penalty),
            ("noop_repeat_coeff", self.noop_repeat_coeff),
            ("dynamic_noop_coeff", self.dynamic_noop_coeff),
            ("repeat_penalty", self.repeat_penalty),
            ("success_bonus", self.success_bonus),
            ("bloat_penalty", self.bloat_penalty),
            ("stall_penalty", self.stall_penalty),
            ("red_light_penalty", self.red_light_penalty),
            ("red_area_weight", self.red_area_weight),
            ("red_depth_weight", self.red_depth_weight),
            ("green_area_weight", self.green_area_weight),
            ("green_depth_weight", self.green_depth_weight),
            ("trade_bonus", self.trade_bonus),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("reward.{} must be finite and >= 0, got {}", field, value));
            }
        }
        if !self.dynamic_bloat_limit.is_finite() || self.dynamic_bloat_limit <= 1.0 {
            return Err(format!(
                "reward.dynamic_bloat_limit must be > 1.0, got {}",
                self.dynamic_bloat_limit
            ));
        }
        Ok(())
    }
}

/// Per-mode weights for the mode-weighted strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeWeights {
    pub area_weight: f64,
    pub depth_weight: f64,
    /// Scale of the penalty charged when area regresses.
    pub area_penalty: f64,
    /// Scale of the penalty charged when depth regresses.
    pub depth_penalty: f64,
    /// Area growth (x initial) at which the episode is cut off.
    pub bloat_limit: f64,
}

impl ModeWeights {
    pub fn for_mode(mode: OptMode) -> Self {
        match mode {
            OptMode::Depth => Self {
                area_weight: 0.3,
                depth_weight: 0.7,
                area_penalty: 20.0,
                depth_penalty: 30.0,
                bloat_limit: 3.0,
            },
            OptMode::Area => Self {
                area_weight: 0.7,
                depth_weight: 0.3,
                area_penalty: 30.0,
                depth_penalty: 20.0,
                bloat_limit: 1.5,
            },
            OptMode::Balanced => Self {
                area_weight: 0.5,
                depth_weight: 0.5,
                area_penalty: 20.0,
                depth_penalty: 20.0,
                bloat_limit: 1.5,
            },
        }
    }
}

/// Whether `(area_ratio, depth_ratio)` (current / initial) meets the goal
/// for `mode`.
pub fn mode_success(mode: OptMode, area_ratio: f64, depth_ratio: f64) -> bool {
    match mode {
        OptMode::Depth => area_ratio < 1.10 && depth_ratio < 0.75,
        OptMode::Area => area_ratio < 0.80 && depth_ratio <= 1.00,
        OptMode::Balanced => area_ratio < 0.90 && depth_ratio < 0.90,
    }
}

/// Terminal outcome decided by the shaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Mode goal reached (terminated).
    Success,
    /// Area grew past the bloat limit (truncated).
    Bloat,
    /// Too many consecutive no-ops (truncated).
    Stall,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Success => "success",
            Termination::Bloat => "bloat",
            Termination::Stall => "stall",
        }
    }

    /// Success terminates; bloat and stall truncate.
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Success)
    }
}

/// Signed reward components for one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    /// Weighted improvement term.
    pub base: f64,
    /// Proportional charge for area/depth regressions (mode-weighted).
    pub regression_penalty: f64,
    pub noop_penalty: f64,
    pub repeat_penalty: f64,
    /// Red-light charge while bloated (dynamic).
    pub bloat_pressure: f64,
    /// Depth-for-area trade bonus (dynamic).
    pub trade_bonus: f64,
    pub step_cost: f64,
    /// Success bonus or bloat/stall penalty.
    pub terminal: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.base
            + self.regression_penalty
            + self.noop_penalty
            + self.repeat_penalty
            + self.bloat_pressure
            + self.trade_bonus
            + self.step_cost
            + self.terminal
    }
}

/// Output of one shaping call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapedReward {
    pub reward: f64,
    pub breakdown: RewardBreakdown,
    pub termination: Option<Termination>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardShaper {
    kind: RewardStrategyKind,
    params: RewardParams,
}

impl RewardShaper {
    pub fn new(kind: RewardStrategyKind, params: RewardParams) -> Self {
        Self { kind, params }
    }

    pub fn kind(&self) -> RewardStrategyKind {
        self.kind
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// Shape the reward for the transition just recorded into `state`.
    pub fn shape(&self, state: &EpisodeState, transition: &Transition) -> ShapedReward {
        let (breakdown, termination) = match self.kind {
            RewardStrategyKind::ModeWeighted => mode_weighted(&self.params, state, transition),
            RewardStrategyKind::DynamicThreshold => {
                dynamic_threshold(&self.params, state, transition)
            }
        };
        ShapedReward {
            reward: breakdown.total(),
            breakdown,
            termination,
        }
    }

    /// Bloat limit (x initial area) in effect for `mode`.
    pub fn bloat_limit(&self, mode: OptMode) -> f64 {
        match self.kind {
            RewardStrategyKind::ModeWeighted => ModeWeights::for_mode(mode).bloat_limit,
            RewardStrategyKind::DynamicThreshold => self.params.dynamic_bloat_limit,
        }
    }
}

/// Relative change `(prev - cur) / prev`; 0 when `prev` is 0.
#[inline]
fn relative_improvement(prev: u64, cur: u64) -> f64 {
    if prev == 0 {
        return 0.0;
    }
    (prev as f64 - cur as f64) / prev as f64
}

fn repeat_charge(params: &RewardParams, state: &EpisodeState, is_noop: bool) -> f64 {
    if !is_noop && state.repeat_count > params.repeat_threshold {
        -params.repeat_penalty * (state.repeat_count - params.repeat_threshold) as f64
    } else {
        0.0
    }
}

fn terminal_outcome(
    params: &RewardParams,
    state: &EpisodeState,
    bloat_limit: f64,
) -> Option<(Termination, f64)> {
    let initial: &InitialMetrics = &state.initial;
    let area = state.current.area as f64;

    if area > initial.area * bloat_limit {
        return Some((Termination::Bloat, -params.bloat_penalty));
    }
    if state.consecutive_noops > params.stall_limit {
        return Some((Termination::Stall, -params.stall_penalty));
    }
    if mode_success(state.mode, state.area_ratio(), state.depth_ratio()) {
        return Some((Termination::Success, params.success_bonus));
    }
    None
}

/// Mode-weighted strategy: step-relative improvement under the mode's
/// weights.
pub fn mode_weighted(
    params: &RewardParams,
    state: &EpisodeState,
    t: &Transition,
) -> (RewardBreakdown, Option<Termination>) {
    let weights = ModeWeights::for_mode(state.mode);
    let mut out = RewardBreakdown::default();

    let area_imp = relative_improvement(t.prev.area, t.cur.area);
    let depth_imp = relative_improvement(t.prev.depth, t.cur.depth);
    let score = weights.area_weight * area_imp + weights.depth_weight * depth_imp;
    out.base = if score > 0.0 {
        score * params.improvement_gain
    } else {
        score * params.regression_gain
    };

    if t.prev.area > 0 && t.cur.area > t.prev.area {
        out.regression_penalty -= weights.area_penalty * (t.cur.area as f64 / t.prev.area as f64);
    }
    if t.prev.depth > 0 && t.cur.depth > t.prev.depth {
        out.regression_penalty -=
            weights.depth_penalty * (t.cur.depth as f64 / t.prev.depth as f64);
    }

    if t.is_noop {
        let rc = state.repeat_count as f64;
        out.noop_penalty = -(params.noop_base_penalty + params.noop_repeat_coeff * rc * rc);
    }
    out.repeat_penalty = repeat_charge(params, state, t.is_noop);
    out.step_cost = -params.step_cost;

    let termination = terminal_outcome(params, state, weights.bloat_limit).map(|(term, value)| {
        out.terminal = value;
        term
    });
    (out, termination)
}

/// Dynamic-threshold strategy: initial-relative improvement with weights
/// switched on whether the circuit is currently bloated.
pub fn dynamic_threshold(
    params: &RewardParams,
    state: &EpisodeState,
    t: &Transition,
) -> (RewardBreakdown, Option<Termination>) {
    let initial = &state.initial;
    let mut out = RewardBreakdown::default();

    let area_diff = (t.prev.area as f64 - t.cur.area as f64) / initial.area;
    let depth_diff = (t.prev.depth as f64 - t.cur.depth as f64) / initial.depth;

    let red_light = t.cur.area as f64 > initial.area;
    let (wa, wd) = if red_light {
        (params.red_area_weight, params.red_depth_weight)
    } else {
        (params.green_area_weight, params.green_depth_weight)
    };
    out.base = wa * area_diff + wd * depth_diff;

    if red_light {
        out.bloat_pressure = -params.red_light_penalty;
    } else if t.cur.depth < t.prev.depth && t.cur.area > t.prev.area {
        out.trade_bonus = params.trade_bonus;
    }

    if t.is_noop {
        out.noop_penalty = -params.dynamic_noop_coeff * state.consecutive_noops as f64;
    }
    out.repeat_penalty = repeat_charge(params, state, t.is_noop);
    out.step_cost = -params.dynamic_step_cost;

    let termination =
        terminal_outcome(params, state, params.dynamic_bloat_limit).map(|(term, value)| {
            out.terminal = value;
            term
        });
    (out, termination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Primitive;
    use crate::types::CircuitMetrics;

    fn running(mode: OptMode, area: u64, depth: u64) -> EpisodeState {
        let mut state = EpisodeState::new(mode, 40);
        state.reinitialize(CircuitMetrics::new(area, depth, 0.0));
        state
    }

    fn step(
        shaper: &RewardShaper,
        state: &mut EpisodeState,
        op: Primitive,
        area: u64,
        depth: u64,
    ) -> ShapedReward {
        let t = state.record_action(op, CircuitMetrics::new(area, depth, 0.0));
        shaper.shape(state, &t)
    }

    fn mode_weighted_shaper() -> RewardShaper {
        RewardShaper::new(RewardStrategyKind::ModeWeighted, RewardParams::default())
    }

    fn dynamic_shaper() -> RewardShaper {
        RewardShaper::new(RewardStrategyKind::DynamicThreshold, RewardParams::default())
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            RewardStrategyKind::parse("Mode-Weighted"),
            Some(RewardStrategyKind::ModeWeighted)
        );
        assert_eq!(
            RewardStrategyKind::parse("dynamic"),
            Some(RewardStrategyKind::DynamicThreshold)
        );
        assert_eq!(RewardStrategyKind::parse("greedy"), None);
    }

    #[test]
    fn test_balanced_area_gain_matches_hand_computation() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Rewrite, 90, 20);

        assert!((r.breakdown.base - 3.0).abs() < 1e-9);
        assert!((r.reward - 2.9).abs() < 1e-9);
        assert_eq!(r.termination, None);
    }

    #[test]
    fn test_regression_charged_proportionally() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 110, 18);

        // score = 0.5 * -0.1 + 0.5 * 0.1 = 0 -> base 0
        assert!(r.breakdown.base.abs() < 1e-9);
        assert!((r.breakdown.regression_penalty + 20.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_noop_penalty_grows_with_repeats() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);

        let mut last = f64::INFINITY;
        for _ in 0..4 {
            let r = step(&shaper, &mut state, Primitive::Refactor, 100, 20);
            assert!(r.reward < last);
            assert!(r.reward < -shaper.params().step_cost);
            last = r.reward;
        }
        // repeat_count is 3 on the fourth identical action
        assert!((last - (-(1.0 + 9.0) - 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_repeat_penalty_without_noop() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Balanced, 10_000, 20);
        let mut r = None;
        for i in 0..7u64 {
            r = Some(step(&shaper, &mut state, Primitive::Rewrite, 10_000 - (i + 1), 20));
        }
        let r = r.unwrap();
        assert_eq!(state.repeat_count, 6);
        assert!((r.breakdown.repeat_penalty + 0.5).abs() < 1e-9);
        assert_eq!(r.breakdown.noop_penalty, 0.0);
    }

    #[test]
    fn test_depth_mode_success() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Depth, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 105, 14);
        assert_eq!(r.termination, Some(Termination::Success));
        assert_eq!(r.breakdown.terminal, 100.0);
    }

    #[test]
    fn test_area_mode_bloat_regardless_of_depth() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Area, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 160, 5);
        assert_eq!(r.termination, Some(Termination::Bloat));
        assert_eq!(r.breakdown.terminal, -50.0);
    }

    #[test]
    fn test_stall_after_consecutive_noops() {
        let shaper = mode_weighted_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        let ops = [Primitive::Rewrite, Primitive::Balance];
        let mut outcome = None;
        for i in 0..7 {
            let r = step(&shaper, &mut state, ops[i % 2], 100, 20);
            outcome = r.termination;
            if i < 6 {
                assert_eq!(r.termination, None);
            }
        }
        assert_eq!(outcome, Some(Termination::Stall));
    }

    #[test]
    fn test_dynamic_green_light_prefers_depth() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 100, 19);
        // 8 * (1 / 20)
        assert!((r.breakdown.base - 0.4).abs() < 1e-9);
        assert_eq!(r.breakdown.bloat_pressure, 0.0);
    }

    #[test]
    fn test_dynamic_red_light_pushes_area() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        step(&shaper, &mut state, Primitive::Balance, 120, 18);
        let r = step(&shaper, &mut state, Primitive::Rewrite, 110, 18);
        assert!((r.breakdown.base - 1.0).abs() < 1e-9);
        assert_eq!(r.breakdown.bloat_pressure, -0.5);
    }

    #[test]
    fn test_dynamic_trade_bonus() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        step(&shaper, &mut state, Primitive::Rewrite, 90, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 95, 18);
        assert_eq!(r.breakdown.trade_bonus, 1.0);
    }

    #[test]
    fn test_dynamic_noop_penalty_linear() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Balanced, 100, 20);
        let a = step(&shaper, &mut state, Primitive::Rewrite, 100, 20);
        let b = step(&shaper, &mut state, Primitive::Balance, 100, 20);
        assert_eq!(a.breakdown.noop_penalty, -1.0);
        assert_eq!(b.breakdown.noop_penalty, -2.0);
    }

    #[test]
    fn test_dynamic_bloat_limit() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Depth, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Balance, 201, 10);
        assert_eq!(r.termination, Some(Termination::Bloat));
        assert_eq!(shaper.bloat_limit(OptMode::Depth), 2.0);
    }

    #[test]
    fn test_breakdown_total_is_sum() {
        let shaper = dynamic_shaper();
        let mut state = running(OptMode::Area, 100, 20);
        let r = step(&shaper, &mut state, Primitive::Rewrite, 70, 20);
        assert_eq!(r.reward, r.breakdown.total());
        assert_eq!(r.termination, Some(Termination::Success));
    }

    #[test]
    fn test_params_validate() {
        assert!(RewardParams::default().validate().is_ok());
        let bad = RewardParams {
            bloat_penalty: -1.0,
            ..RewardParams::default()
        };
        assert!(bad.validate().unwrap_err().contains("bloat_penalty"));
    }
}
