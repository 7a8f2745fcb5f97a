// src/eval/equivalence.rs
//
// Combinational equivalence check between an original circuit and its
// optimised output, delegated to ABC.
//
// The check is informational: every failure mode degrades to a status value
// and nothing here returns an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

/// Line ABC prints when the two networks match.
pub const EQUIVALENT_MARKER: &str = "Networks are equivalent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquivalenceStatus {
    Pass,
    Fail,
    /// Checker binary missing.
    NotFound,
    /// Checker could not be run.
    Error(String),
}

impl EquivalenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquivalenceStatus::Pass => "PASS",
            EquivalenceStatus::Fail => "FAIL",
            EquivalenceStatus::NotFound => "NOT_FOUND",
            EquivalenceStatus::Error(_) => "ERROR",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, EquivalenceStatus::Pass)
    }
}

impl fmt::Display for EquivalenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything able to compare two circuit files.
pub trait EquivalenceChecker: Send + Sync {
    fn check(&self, original: &Path, optimized: &Path) -> EquivalenceStatus;
}

/// ABC-backed checker: `<abc> -c "&r <original>; &cec <optimized>"`.
#[derive(Debug, Clone)]
pub struct AbcChecker {
    binary: PathBuf,
}

impl AbcChecker {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn command_script(original: &Path, optimized: &Path) -> String {
        format!("&r {}; &cec {}", original.display(), optimized.display())
    }
}

impl EquivalenceChecker for AbcChecker {
    fn check(&self, original: &Path, optimized: &Path) -> EquivalenceStatus {
        if !self.binary.exists() {
            return EquivalenceStatus::NotFound;
        }

        let output = Command::new(&self.binary)
            .arg("-c")
            .arg(Self::command_script(original, optimized))
            .output();

        match output {
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                if stdout.contains(EQUIVALENT_MARKER) {
                    EquivalenceStatus::Pass
                } else {
                    EquivalenceStatus::Fail
                }
            }
            Err(e) => {
                eprintln!(
                    "[eval] WARN: cannot run {}: {}",
                    self.binary.display(),
                    e
                );
                EquivalenceStatus::Error(e.to_string())
            }
        }
    }
}

/// Checker that reports every pair with a fixed status (tests, dry runs).
#[derive(Debug, Clone)]
pub struct FixedChecker(pub EquivalenceStatus);

impl EquivalenceChecker for FixedChecker {
    fn check(&self, _original: &Path, _optimized: &Path) -> EquivalenceStatus {
        self.0.clone()
    }
}
