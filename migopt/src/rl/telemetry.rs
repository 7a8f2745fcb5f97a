// src/rl/telemetry.rs
//
// RL-specific telemetry: one record per step plus episode boundary markers.
//
// Every record carries:
// - schema_version, obs_version, action_version, config_version
// - the action id actually applied and the policy that chose it
// - the reward and its separate components
// - episode boundary markers (start/end, termination reason)
//
// Records go through the generic JSONL TelemetrySink, so the same
// MIGOPT_TELEMETRY_* variables switch them on.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::action_encoding::{ActionEncodingSpec, ActionId, ACTION_VERSION};
use super::env::{StepResult, TerminationReason};
use super::observation::OBS_VERSION;
use super::reward::RewardBreakdown;
use crate::telemetry::{TelemetryConfig, TelemetrySink, SCHEMA_VERSION};

/// Per-step record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub schema_version: i64,
    pub obs_version: u32,
    pub action_version: u32,
    pub policy_version: String,
    pub config_version: String,
    pub episode_id: u64,
    pub step: u32,
    pub action: ActionId,
    pub action_name: String,
    pub reward: f64,
    pub reward_components: RewardBreakdown,
    pub raw_area: u64,
    pub raw_depth: u64,
    pub switching_activity: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub termination_reason: Option<TerminationReason>,
    /// Observation after the step.
    pub observation: Vec<f32>,
}

impl StepRecord {
    pub fn new(
        result: &StepResult,
        action: ActionId,
        policy_version: &str,
        config_version: &str,
        episode_id: u64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            obs_version: OBS_VERSION,
            action_version: ACTION_VERSION,
            policy_version: policy_version.to_string(),
            config_version: config_version.to_string(),
            episode_id,
            step: result.info.step,
            action,
            action_name: result.info.action_name.clone(),
            reward: result.reward,
            reward_components: result.info.reward_components,
            raw_area: result.info.raw_area,
            raw_depth: result.info.raw_depth,
            switching_activity: result.info.switching_activity,
            terminated: result.terminated,
            truncated: result.truncated,
            termination_reason: result.info.termination_reason,
            observation: result.observation.features.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMarkerType {
    Start,
    End,
}

/// Episode boundary marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub schema_version: i64,
    pub marker_type: EpisodeMarkerType,
    pub episode_id: u64,
    pub seed: u64,
    pub circuit: String,
    pub mode: String,
    /// Reason the episode ended (end markers only; None if cut short).
    pub termination_reason: Option<TerminationReason>,
    pub total_steps: Option<u32>,
    pub total_reward: Option<f64>,
    pub final_area: Option<u64>,
    pub final_depth: Option<u64>,
    /// Action table in force (start markers only).
    pub action_encoding: Option<ActionEncodingSpec>,
}

/// RL telemetry writer.
pub struct RLTelemetry {
    sink: TelemetrySink,
    episode_id: u64,
    seed: u64,
    total_reward: f64,
}

impl RLTelemetry {
    /// Disabled telemetry.
    pub fn disabled() -> Self {
        Self::from_sink(TelemetrySink::from_config(TelemetryConfig::off()))
    }

    /// Create from MIGOPT_TELEMETRY_* environment variables.
    pub fn from_env() -> Self {
        Self::from_sink(TelemetrySink::from_env())
    }

    /// Enable telemetry with a specific path (truncating).
    pub fn enable(path: PathBuf) -> Self {
        Self::from_sink(TelemetrySink::from_config(TelemetryConfig::jsonl(path)))
    }

    pub fn from_sink(sink: TelemetrySink) -> Self {
        Self {
            sink,
            episode_id: 0,
            seed: 0,
            total_reward: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_enabled()
    }

    pub fn log_episode_start(&mut self, episode_id: u64, seed: u64, circuit: &str, mode: &str) {
        self.episode_id = episode_id;
        self.seed = seed;
        self.total_reward = 0.0;

        let marker = EpisodeMarker {
            schema_version: SCHEMA_VERSION,
            marker_type: EpisodeMarkerType::Start,
            episode_id,
            seed,
            circuit: circuit.to_string(),
            mode: mode.to_string(),
            termination_reason: None,
            total_steps: None,
            total_reward: None,
            final_area: None,
            final_depth: None,
            action_encoding: Some(ActionEncodingSpec::current()),
        };
        self.sink.log_record(&marker);
    }

    pub fn log_step(
        &mut self,
        result: &StepResult,
        action: ActionId,
        policy_version: &str,
        config_version: &str,
    ) {
        self.total_reward += result.reward;
        let record = StepRecord::new(
            result,
            action,
            policy_version,
            config_version,
            self.episode_id,
        );
        self.sink.log_record(&record);
    }

    /// Log the end marker using the last step of the episode.
    pub fn log_episode_end(&mut self, last: &StepResult) {
        let marker = EpisodeMarker {
            schema_version: SCHEMA_VERSION,
            marker_type: EpisodeMarkerType::End,
            episode_id: self.episode_id,
            seed: self.seed,
            circuit: last.info.circuit.clone(),
            mode: last.info.mode.clone(),
            termination_reason: last.info.termination_reason,
            total_steps: Some(last.info.step),
            total_reward: Some(self.total_reward),
            final_area: Some(last.info.raw_area),
            final_depth: Some(last.info.raw_depth),
            action_encoding: None,
        };
        self.sink.log_record(&marker);
    }

    /// Reward accumulated since the last start marker.
    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    pub fn flush(&mut self) {
        self.sink.flush();
    }
}

impl Default for RLTelemetry {
    fn default() -> Self {
        Self::disabled()
    }
}
