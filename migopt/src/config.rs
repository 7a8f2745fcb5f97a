// src/config.rs
//
// Central configuration for the migopt episode controller.
//
// Single source of truth for the optimisation mode, the reward strategy and
// its coefficients, the episode horizon, the circuit sampler retry bound and
// the post-episode evaluation paths (equivalence checker, results dir).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rl::reward::{RewardParams, RewardStrategyKind};

/// Optimisation mode preset.
///
/// Selects the reward weighting, the bloat tolerance and the success
/// thresholds. Fixed for the lifetime of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptMode {
    /// Prioritise logic depth (timing).
    Depth,
    /// Prioritise gate count.
    Area,
    /// Weight area and depth equally.
    Balanced,
}

impl OptMode {
    pub const ALL: [OptMode; 3] = [OptMode::Depth, OptMode::Area, OptMode::Balanced];

    /// Return a stable lowercase name for the mode (used in logs, file names
    /// and reports).
    pub fn as_str(&self) -> &'static str {
        match self {
            OptMode::Depth => "depth",
            OptMode::Area => "area",
            OptMode::Balanced => "balanced",
        }
    }

    /// Parse a mode name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<OptMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "depth" | "d" => Some(OptMode::Depth),
            "area" | "a" => Some(OptMode::Area),
            "balanced" | "bal" | "b" => Some(OptMode::Balanced),
            _ => None,
        }
    }
}

impl fmt::Display for OptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the effective mode (for logging precedence).
///
/// Precedence order (highest to lowest):
/// 1. CLI argument (--mode)
/// 2. Environment variable (MIGOPT_MODE)
/// 3. Run spec file
/// 4. Default (Balanced)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Cli,
    Env,
    RunSpec,
    Default,
}

impl ModeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeSource::Cli => "cli",
            ModeSource::Env => "env",
            ModeSource::RunSpec => "run_spec",
            ModeSource::Default => "default",
        }
    }
}

/// Resolved mode with its source for logging.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveMode {
    pub mode: OptMode,
    pub source: ModeSource,
}

impl EffectiveMode {
    /// Format: `effective_mode=<mode> source=<source>`
    pub fn log_startup(&self) {
        eprintln!(
            "effective_mode={} source={}",
            self.mode.as_str(),
            self.source.as_str()
        );
    }
}

/// Resolve the effective mode: CLI, then `MIGOPT_MODE`, then the run spec,
/// then Balanced.
pub fn resolve_effective_mode(
    cli_mode: Option<OptMode>,
    run_spec_mode: Option<&str>,
) -> EffectiveMode {
    let env_val = std::env::var("MIGOPT_MODE").ok();
    resolve_mode_with(cli_mode, env_val.as_deref(), run_spec_mode)
}

/// Precedence logic behind [`resolve_effective_mode`] with the environment
/// value passed in.
pub fn resolve_mode_with(
    cli_mode: Option<OptMode>,
    env_mode: Option<&str>,
    run_spec_mode: Option<&str>,
) -> EffectiveMode {
    if let Some(mode) = cli_mode {
        return EffectiveMode {
            mode,
            source: ModeSource::Cli,
        };
    }

    if let Some(raw) = env_mode {
        if !raw.is_empty() {
            if let Some(mode) = OptMode::parse(raw) {
                return EffectiveMode {
                    mode,
                    source: ModeSource::Env,
                };
            }
            eprintln!("[config] WARN: invalid MIGOPT_MODE={:?}; ignoring", raw);
        }
    }

    if let Some(s) = run_spec_mode {
        if let Some(mode) = OptMode::parse(s) {
            return EffectiveMode {
                mode,
                source: ModeSource::RunSpec,
            };
        }
    }

    EffectiveMode {
        mode: OptMode::Balanced,
        source: ModeSource::Default,
    }
}

/// Circuit sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Draws attempted per reset before giving up with NoViableCircuit.
    pub max_attempts: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

/// Post-episode evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// ABC binary used for the combinational equivalence check.
    pub abc_binary: PathBuf,
    /// Directory receiving optimised circuits, logs and summaries.
    pub results_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            abc_binary: PathBuf::from("lib/abc/abc"),
            results_dir: PathBuf::from("results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Human-readable config version.
    pub version: &'static str,
    pub mode: OptMode,
    /// Reward strategy used by the shaper.
    pub strategy: RewardStrategyKind,
    /// Episode horizon; reaching it truncates.
    pub max_steps: u32,
    pub reward: RewardParams,
    pub sampler: SamplerConfig,
    pub eval: EvalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "migopt-v0.1",
            mode: OptMode::Balanced,
            strategy: RewardStrategyKind::ModeWeighted,
            max_steps: 40,
            reward: RewardParams::default(),
            sampler: SamplerConfig::default(),
            eval: EvalConfig::default(),
        }
    }
}

// --- Runtime config loader: modes + env overrides ----------------------------

impl Config {
    /// Build a Config for the given mode on top of the defaults.
    ///
    /// Mode-specific reward weights are looked up by the shaper from
    /// `mode`, so only the mode itself changes here.
    pub fn for_mode(mode: OptMode) -> Self {
        Config {
            mode,
            ..Config::default()
        }
    }

    /// Build a Config from a mode, then apply environment overrides:
    ///
    ///   - MIGOPT_MAX_STEPS             (u32)
    ///   - MIGOPT_STRATEGY              (mode_weighted | dynamic_threshold)
    ///   - MIGOPT_SAMPLER_MAX_ATTEMPTS  (u32)
    ///   - MIGOPT_ABC_PATH              (path)
    ///   - MIGOPT_RESULTS_DIR           (path)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn from_env_or_mode(mode: OptMode) -> Self {
        Self::from_lookup_or_mode(mode, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env_or_mode`] with an explicit variable lookup.
    pub fn from_lookup_or_mode<F>(mode: OptMode, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::for_mode(mode);

        override_parsed(&lookup, "MIGOPT_MAX_STEPS", &mut cfg.max_steps, |v| *v >= 1);

        if let Some(raw) = lookup("MIGOPT_STRATEGY") {
            match RewardStrategyKind::parse(&raw) {
                Some(kind) => {
                    cfg.strategy = kind;
                    eprintln!(
                        "[config] MIGOPT_STRATEGY = {} (overrode default)",
                        kind.as_str()
                    );
                }
                None => {
                    eprintln!(
                        "[config] WARN: could not parse MIGOPT_STRATEGY = {:?}; using default {}",
                        raw,
                        cfg.strategy.as_str()
                    );
                }
            }
        }

        override_parsed(
            &lookup,
            "MIGOPT_SAMPLER_MAX_ATTEMPTS",
            &mut cfg.sampler.max_attempts,
            |v| *v >= 1,
        );

        if let Some(raw) = lookup("MIGOPT_ABC_PATH") {
            if !raw.trim().is_empty() {
                cfg.eval.abc_binary = PathBuf::from(raw.trim());
                eprintln!(
                    "[config] MIGOPT_ABC_PATH = {} (overrode default)",
                    cfg.eval.abc_binary.display()
                );
            }
        }

        if let Some(raw) = lookup("MIGOPT_RESULTS_DIR") {
            if !raw.trim().is_empty() {
                cfg.eval.results_dir = PathBuf::from(raw.trim());
                eprintln!(
                    "[config] MIGOPT_RESULTS_DIR = {} (overrode default)",
                    cfg.eval.results_dir.display()
                );
            }
        }

        cfg
    }

    /// Pick the mode from MIGOPT_MODE (default Balanced), then apply all
    /// other env overrides.
    pub fn from_env_or_default() -> Self {
        let mode = match std::env::var("MIGOPT_MODE") {
            Ok(s) if s.trim().is_empty() => OptMode::Balanced,
            Ok(s) => OptMode::parse(&s).unwrap_or_else(|| {
                eprintln!(
                    "[config] WARN: unknown MIGOPT_MODE = {:?}; using Balanced",
                    s
                );
                OptMode::Balanced
            }),
            Err(_) => OptMode::Balanced,
        };
        Self::from_env_or_mode(mode)
    }

    /// Check cross-field constraints. Returns the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_steps == 0 {
            return Err("max_steps must be >= 1".to_string());
        }
        if self.sampler.max_attempts == 0 {
            return Err("sampler.max_attempts must be >= 1".to_string());
        }
        self.reward.validate()
    }
}

fn override_parsed<T, F, V>(lookup: &F, key: &str, target: &mut T, valid: V)
where
    T: FromStr + fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => {
            eprintln!("[config] {} = {} (overrode default)", key, v);
            *target = v;
        }
        _ => {
            eprintln!(
                "[config] WARN: could not parse {} = {:?}; using default {}",
                key, raw, target
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mode_parse_aliases() {
        assert_eq!(OptMode::parse("DEPTH"), Some(OptMode::Depth));
        assert_eq!(OptMode::parse(" a "), Some(OptMode::Area));
        assert_eq!(OptMode::parse("bal"), Some(OptMode::Balanced));
        assert_eq!(OptMode::parse("speed"), None);
        for mode in OptMode::ALL {
            assert_eq!(OptMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.max_steps, 40);
        assert_eq!(cfg.sampler.max_attempts, 10);
        assert_eq!(cfg.strategy, RewardStrategyKind::ModeWeighted);
        assert_eq!(cfg.eval.abc_binary, PathBuf::from("lib/abc/abc"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_precedence_cli_env_runspec_default() {
        let e = resolve_mode_with(Some(OptMode::Area), Some("depth"), Some("balanced"));
        assert_eq!((e.mode, e.source), (OptMode::Area, ModeSource::Cli));

        let e = resolve_mode_with(None, Some("depth"), Some("area"));
        assert_eq!((e.mode, e.source), (OptMode::Depth, ModeSource::Env));

        let e = resolve_mode_with(None, Some("nonsense"), Some("area"));
        assert_eq!((e.mode, e.source), (OptMode::Area, ModeSource::RunSpec));

        let e = resolve_mode_with(None, Some(""), None);
        assert_eq!((e.mode, e.source), (OptMode::Balanced, ModeSource::Default));
    }

    #[test]
    fn test_env_overrides_applied() {
        let cfg = Config::from_lookup_or_mode(
            OptMode::Depth,
            lookup(&[
                ("MIGOPT_MAX_STEPS", "25"),
                ("MIGOPT_STRATEGY", "dynamic"),
                ("MIGOPT_SAMPLER_MAX_ATTEMPTS", "3"),
                ("MIGOPT_ABC_PATH", "/opt/abc/abc"),
                ("MIGOPT_RESULTS_DIR", "/tmp/out"),
            ]),
        );
        assert_eq!(cfg.mode, OptMode::Depth);
        assert_eq!(cfg.max_steps, 25);
        assert_eq!(cfg.strategy, RewardStrategyKind::DynamicThreshold);
        assert_eq!(cfg.sampler.max_attempts, 3);
        assert_eq!(cfg.eval.abc_binary, PathBuf::from("/opt/abc/abc"));
        assert_eq!(cfg.eval.results_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let cfg = Config::from_lookup_or_mode(
            OptMode::Area,
            lookup(&[
                ("MIGOPT_MAX_STEPS", "0"),
                ("MIGOPT_STRATEGY", "greedy"),
                ("MIGOPT_SAMPLER_MAX_ATTEMPTS", "many"),
            ]),
        );
        assert_eq!(cfg.max_steps, 40);
        assert_eq!(cfg.strategy, RewardStrategyKind::ModeWeighted);
        assert_eq!(cfg.sampler.max_attempts, 10);
    }

    #[test]
    fn test_validate_rejects_zero_horizon() {
        let cfg = Config {
            max_steps: 0,
            ..Config::default()
        };
        assert!(cfg.validate().unwrap_err().contains("max_steps"));
    }
}
