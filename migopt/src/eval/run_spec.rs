// src/eval/run_spec.rs
//
// Evaluation run specification parsing and validation.
//
// A run spec fully defines a reproducible evaluation:
// - run_id + run_version for tracking
// - optimisation mode (subject to CLI / MIGOPT_MODE precedence)
// - reward strategy and episode horizon
// - seed
// - circuits (explicit files and/or a directory scan)
// - baseline policy
// - equivalence checker and results directory

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, OptMode};
use crate::dataset;
use crate::rl::action_encoding::{ActionId, NUM_ACTIONS};
use crate::rl::policy::PolicyKind;
use crate::rl::reward::RewardStrategyKind;

/// Current run spec schema version.
pub const RUN_SPEC_SCHEMA_VERSION: u32 = 1;

fn default_extension() -> String {
    "yaml".to_string()
}

/// Circuits evaluated by the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitSource {
    /// Explicit circuit files, evaluated in the listed order.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Directory scanned with [`dataset::discover`] after `files`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

/// Baseline policy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub kind: PolicyKind,
    /// Action ids cycled by the `sequence` policy.
    #[serde(default)]
    pub sequence: Vec<ActionId>,
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Heuristic,
            sequence: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub run_id: String,
    pub run_version: u32,

    /// Mode name; resolved through [`crate::config::resolve_effective_mode`].
    #[serde(default)]
    pub mode: Option<String>,

    #[serde(default)]
    pub strategy: Option<RewardStrategyKind>,

    #[serde(default)]
    pub max_steps: Option<u32>,

    #[serde(default)]
    pub seed: u64,

    pub circuits: CircuitSource,

    #[serde(default)]
    pub policy: PolicySpec,

    #[serde(default)]
    pub abc_binary: Option<PathBuf>,

    #[serde(default)]
    pub results_dir: Option<PathBuf>,
}

impl RunSpec {
    /// Load a run spec from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, RunSpecError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| RunSpecError::IoError {
            path: path.as_ref().display().to_string(),
            source: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a run spec from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RunSpecError> {
        let spec: RunSpec = serde_yaml::from_str(yaml).map_err(|e| RunSpecError::ParseError {
            source: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), RunSpecError> {
        if self.run_id.trim().is_empty() {
            return Err(RunSpecError::validation("run_id", "run_id cannot be empty"));
        }

        if self.run_version < 1 {
            return Err(RunSpecError::validation(
                "run_version",
                "run_version must be >= 1",
            ));
        }

        if let Some(mode) = &self.mode {
            if OptMode::parse(mode).is_none() {
                return Err(RunSpecError::validation(
                    "mode",
                    format!("unknown mode {:?} (expected depth, area or balanced)", mode),
                ));
            }
        }

        if self.max_steps == Some(0) {
            return Err(RunSpecError::validation("max_steps", "max_steps must be > 0"));
        }

        if self.circuits.files.is_empty() && self.circuits.dir.is_none() {
            return Err(RunSpecError::validation(
                "circuits",
                "at least one of circuits.files or circuits.dir is required",
            ));
        }

        if self.circuits.extension.trim_start_matches('.').is_empty() {
            return Err(RunSpecError::validation(
                "circuits.extension",
                "extension cannot be empty",
            ));
        }

        if let Some(bad) = self
            .policy
            .sequence
            .iter()
            .find(|a| (**a as usize) >= NUM_ACTIONS)
        {
            return Err(RunSpecError::validation(
                "policy.sequence",
                format!("action {} out of range 0..{}", bad, NUM_ACTIONS),
            ));
        }

        Ok(())
    }

    /// Overlay the spec's settings onto `cfg` (mode is resolved separately).
    pub fn apply_to(&self, cfg: &mut Config) {
        if let Some(strategy) = self.strategy {
            cfg.strategy = strategy;
        }
        if let Some(max_steps) = self.max_steps {
            cfg.max_steps = max_steps;
        }
        if let Some(abc) = &self.abc_binary {
            cfg.eval.abc_binary = abc.clone();
        }
        if let Some(dir) = &self.results_dir {
            cfg.eval.results_dir = dir.clone();
        }
    }

    /// Explicit files first, then the directory scan, without duplicates.
    pub fn resolve_circuits(&self) -> Result<Vec<PathBuf>, RunSpecError> {
        let mut out = self.circuits.files.clone();
        if let Some(dir) = &self.circuits.dir {
            let found = dataset::discover(dir, &self.circuits.extension).map_err(|e| {
                RunSpecError::IoError {
                    path: dir.display().to_string(),
                    source: e.to_string(),
                }
            })?;
            for path in found {
                if !out.contains(&path) {
                    out.push(path);
                }
            }
        }
        Ok(out)
    }
}

/// Errors from run spec parsing and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunSpecError {
    IoError { path: String, source: String },
    ParseError { source: String },
    ValidationError { field: String, message: String },
}

impl RunSpecError {
    fn validation(field: &str, message: impl Into<String>) -> Self {
        RunSpecError::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RunSpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunSpecError::IoError { path, source } => {
                write!(f, "Failed to read run spec '{}': {}", path, source)
            }
            RunSpecError::ParseError { source } => {
                write!(f, "Failed to parse run spec YAML: {}", source)
            }
            RunSpecError::ValidationError { field, message } => {
                write!(f, "Run spec validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for RunSpecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_spec() {
        let yaml = r#"
run_id: depth_sweep
run_version: 1
mode: depth
strategy: dynamic_threshold
max_steps: 25
seed: 7

circuits:
  files:
    - bench/adder.yaml
    - bench/mult.yaml

policy:
  kind: sequence
  sequence: [1, 0, 3]

abc_binary: /opt/abc/abc
results_dir: out/depth
"#;
        let spec = RunSpec::from_yaml_str(yaml).expect("Should parse");
        assert_eq!(spec.run_id, "depth_sweep");
        assert_eq!(spec.mode.as_deref(), Some("depth"));
        assert_eq!(spec.strategy, Some(RewardStrategyKind::DynamicThreshold));
        assert_eq!(spec.circuits.files.len(), 2);
        assert_eq!(spec.circuits.extension, "yaml");
        assert_eq!(spec.policy.kind, PolicyKind::Sequence);
        assert_eq!(spec.policy.sequence, vec![1, 0, 3]);

        let mut cfg = Config::default();
        spec.apply_to(&mut cfg);
        assert_eq!(cfg.max_steps, 25);
        assert_eq!(cfg.strategy, RewardStrategyKind::DynamicThreshold);
        assert_eq!(cfg.eval.abc_binary, PathBuf::from("/opt/abc/abc"));
        assert_eq!(cfg.eval.results_dir, PathBuf::from("out/depth"));
    }

    #[test]
    fn test_minimal_spec_defaults() {
        let yaml = r#"
run_id: minimal
run_version: 1
circuits:
  dir: bench
"#;
        let spec = RunSpec::from_yaml_str(yaml).expect("Should parse");
        assert_eq!(spec.seed, 0);
        assert!(spec.mode.is_none());
        assert_eq!(spec.policy, PolicySpec::default());

        let mut cfg = Config::default();
        spec.apply_to(&mut cfg);
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("run_id: \"\"\nrun_version: 1\ncircuits: {dir: x}\n", "run_id"),
            ("run_id: a\nrun_version: 0\ncircuits: {dir: x}\n", "run_version"),
            ("run_id: a\nrun_version: 1\nmode: speed\ncircuits: {dir: x}\n", "mode"),
            ("run_id: a\nrun_version: 1\nmax_steps: 0\ncircuits: {dir: x}\n", "max_steps"),
            ("run_id: a\nrun_version: 1\ncircuits: {}\n", "circuits"),
            (
                "run_id: a\nrun_version: 1\ncircuits: {dir: x}\npolicy: {kind: sequence, sequence: [4]}\n",
                "policy.sequence",
            ),
        ];
        for (yaml, want) in cases {
            match RunSpec::from_yaml_str(yaml) {
                Err(RunSpecError::ValidationError { field, .. }) => assert_eq!(field, want),
                other => panic!("expected validation error for {}, got {:?}", want, other),
            }
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            RunSpec::from_yaml_str("run_id: [unclosed"),
            Err(RunSpecError::ParseError { .. })
        ));
    }

    #[test]
    fn test_resolve_circuits_merges_files_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.yaml", "b.yaml", "a_opt_area.yaml"] {
            fs::write(dir.path().join(name), "name: x\narea: 1\ndepth: 1\n").unwrap();
        }
        let spec = RunSpec {
            run_id: "r".to_string(),
            run_version: 1,
            mode: None,
            strategy: None,
            max_steps: None,
            seed: 0,
            circuits: CircuitSource {
                files: vec![dir.path().join("b.yaml")],
                dir: Some(dir.path().to_path_buf()),
                extension: "yaml".to_string(),
            },
            policy: PolicySpec::default(),
            abc_binary: None,
            results_dir: None,
        };
        let circuits = spec.resolve_circuits().unwrap();
        assert_eq!(
            circuits,
            vec![dir.path().join("b.yaml"), dir.path().join("a.yaml")]
        );
    }
}
