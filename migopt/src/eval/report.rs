// src/eval/report.rs
//
// Evaluation artifacts.
//
// Per circuit:
//   <stem>_opt_<mode>.<ext>   optimised network (written by the runner)
//   <stem>_opt_<mode>.log     step-by-step text log
//
// Per run:
//   benchmark_summary_<mode>.csv
//   eval_summary_<mode>.json  results + determinism checksum

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::OptMode;
use crate::rl::env::TerminationReason;
use crate::telemetry::SCHEMA_VERSION;
use crate::types::CircuitMetrics;

use super::equivalence::EquivalenceStatus;

/// Column order of the CSV summary.
pub const CSV_COLUMNS: [&str; 14] = [
    "Circuit",
    "Mode",
    "Init_Gates",
    "Final_Gates",
    "Gate_Imp(%)",
    "Init_Depth",
    "Final_Depth",
    "Depth_Imp(%)",
    "Init_WSA",
    "Final_WSA",
    "WSA_Imp(%)",
    "CEC_Check",
    "Time(s)",
    "Steps",
];

const RULE_WIDTH: usize = 80;

/// Relative improvement in percent; zero when the baseline is zero.
pub fn improvement_pct(initial: f64, final_value: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (initial - final_value) * 100.0 / initial
}

fn mean_of(results: &[CircuitResult], field: impl Fn(&CircuitResult) -> f64) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(field).sum::<f64>() / results.len() as f64
}

/// Output locations for one evaluated circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub optimized: PathBuf,
    pub log: PathBuf,
}

impl OutputPaths {
    /// `<results>/<stem>_opt_<mode>.<ext>` and `<results>/<stem>_opt_<mode>.log`.
    pub fn for_circuit(results_dir: &Path, circuit: &Path, mode: OptMode) -> Self {
        let stem = circuit
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "circuit".to_string());
        let base = format!("{}_opt_{}", stem, mode.as_str());
        let optimized = match circuit.extension() {
            Some(ext) => results_dir.join(format!("{}.{}", base, ext.to_string_lossy())),
            None => results_dir.join(&base),
        };
        Self {
            optimized,
            log: results_dir.join(format!("{}.log", base)),
        }
    }
}

pub fn summary_csv_name(mode: OptMode) -> String {
    format!("benchmark_summary_{}.csv", mode.as_str())
}

pub fn summary_json_name(mode: OptMode) -> String {
    format!("eval_summary_{}.json", mode.as_str())
}

/// One row of the per-circuit step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub step: u32,
    pub action: String,
    pub reward: f64,
    pub gates: u64,
    pub depth: u64,
    pub wsa: f64,
    pub gate_diff: i64,
    pub depth_diff: i64,
}

impl StepEntry {
    pub fn new(
        step: u32,
        action: &str,
        reward: f64,
        prev: &CircuitMetrics,
        cur: &CircuitMetrics,
    ) -> Self {
        Self {
            step,
            action: action.to_string(),
            reward,
            gates: cur.area,
            depth: cur.depth,
            wsa: cur.switching_activity,
            gate_diff: cur.area as i64 - prev.area as i64,
            depth_diff: cur.depth as i64 - prev.depth as i64,
        }
    }
}

/// Outcome of evaluating one circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitResult {
    /// File name of the source circuit.
    pub circuit: String,
    pub mode: OptMode,
    pub initial: CircuitMetrics,
    #[serde(rename = "final")]
    pub final_metrics: CircuitMetrics,
    pub gate_imp_pct: f64,
    pub depth_imp_pct: f64,
    pub wsa_imp_pct: f64,
    pub cec: EquivalenceStatus,
    pub elapsed_s: f64,
    pub steps: u32,
    pub total_reward: f64,
    pub termination_reason: Option<TerminationReason>,
    pub optimized_path: PathBuf,
}

impl CircuitResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        circuit: String,
        mode: OptMode,
        initial: CircuitMetrics,
        final_metrics: CircuitMetrics,
        cec: EquivalenceStatus,
        elapsed_s: f64,
        steps: u32,
        total_reward: f64,
        termination_reason: Option<TerminationReason>,
        optimized_path: PathBuf,
    ) -> Self {
        Self {
            circuit,
            mode,
            gate_imp_pct: improvement_pct(initial.area as f64, final_metrics.area as f64),
            depth_imp_pct: improvement_pct(initial.depth as f64, final_metrics.depth as f64),
            wsa_imp_pct: improvement_pct(
                initial.switching_activity,
                final_metrics.switching_activity,
            ),
            initial,
            final_metrics,
            cec,
            elapsed_s,
            steps,
            total_reward,
            termination_reason,
            optimized_path,
        }
    }

    /// CSV row in [`CSV_COLUMNS`] order.
    pub fn csv_row(&self) -> String {
        let fields = [
            csv_field(&self.circuit),
            self.mode.as_str().to_string(),
            self.initial.area.to_string(),
            self.final_metrics.area.to_string(),
            format!("{:.2}", self.gate_imp_pct),
            self.initial.depth.to_string(),
            self.final_metrics.depth.to_string(),
            format!("{:.2}", self.depth_imp_pct),
            format!("{:.1}", self.initial.switching_activity),
            format!("{:.1}", self.final_metrics.switching_activity),
            format!("{:.2}", self.wsa_imp_pct),
            self.cec.as_str().to_string(),
            format!("{:.2}", self.elapsed_s),
            self.steps.to_string(),
        ];
        fields.join(",")
    }
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write the per-circuit text log.
pub fn write_circuit_log<P: AsRef<Path>>(
    path: P,
    result: &CircuitResult,
    steps: &[StepEntry],
) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    let rule = "-".repeat(RULE_WIDTH);
    let double = "=".repeat(RULE_WIDTH);

    writeln!(f, "Optimization Log for: {}", result.circuit)?;
    writeln!(f, "Mode: {}", result.mode.as_str().to_uppercase())?;
    writeln!(f, "{}", double)?;
    writeln!(
        f,
        "Initial State: Gates={}, Depth={}, WSA={:.1}",
        result.initial.area, result.initial.depth, result.initial.switching_activity
    )?;
    writeln!(f, "{}", rule)?;
    writeln!(
        f,
        "{:<5} | {:<12} | {:<10} | {:<15} | {:<15} | {:<15}",
        "Step", "Action", "Reward", "Gates", "Depth", "Power(WSA)"
    )?;
    writeln!(f, "{}", rule)?;

    for s in steps {
        writeln!(
            f,
            "{:<5} | {:<12} | {:<10} | {:<15} | {:<15} | {:<15}",
            format!("{:02}", s.step),
            s.action,
            format!("{:+.4}", s.reward),
            format!("{} ({:+})", s.gates, s.gate_diff),
            format!("{} ({:+})", s.depth, s.depth_diff),
            format!("{:.1}", s.wsa),
        )?;
    }

    writeln!(f, "{}", rule)?;
    writeln!(
        f,
        "Final State:   Gates={}, Depth={}, WSA={:.1}",
        result.final_metrics.area,
        result.final_metrics.depth,
        result.final_metrics.switching_activity
    )?;
    writeln!(
        f,
        "Improvement:   Gates {:.2}% | Depth {:.2}% | Power {:.2}%",
        result.gate_imp_pct, result.depth_imp_pct, result.wsa_imp_pct
    )?;
    writeln!(f, "Verification:  {}", result.cec)?;
    writeln!(
        f,
        "Termination:   {}",
        result
            .termination_reason
            .map_or("none", |r| r.as_str())
    )?;
    writeln!(f, "Total Time:    {:.2}s", result.elapsed_s)?;
    writeln!(f, "{}", double)?;
    f.flush()
}

/// Write the CSV summary (header + one row per circuit).
pub fn write_csv_summary<P: AsRef<Path>>(path: P, results: &[CircuitResult]) -> std::io::Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "{}", CSV_COLUMNS.join(","))?;
    for r in results {
        writeln!(f, "{}", r.csv_row())?;
    }
    f.flush()
}

/// Circuits whose equivalence check passed, out of all attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRate {
    pub passed: usize,
    pub total: usize,
}

impl PassRate {
    pub fn from_results(results: &[CircuitResult], attempted: usize) -> Self {
        Self {
            passed: results.iter().filter(|r| r.cec.is_pass()).count(),
            total: attempted,
        }
    }
}

impl fmt::Display for PassRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pass Rate: {}/{}", self.passed, self.total)
    }
}

/// Circuit that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitFailure {
    pub circuit: String,
    pub error: String,
}

/// Run-level summary written as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub schema_version: i64,
    pub run_id: String,
    pub config_version: String,
    pub mode: OptMode,
    pub strategy: String,
    pub policy_version: String,
    pub seed: u64,
    pub max_steps: u32,
    pub results: Vec<CircuitResult>,
    pub failures: Vec<CircuitFailure>,
    pub pass_rate: PassRate,
    pub mean_gate_imp_pct: f64,
    pub mean_depth_imp_pct: f64,
    pub mean_wsa_imp_pct: f64,
    /// SHA-256 over seed, settings and per-circuit outcomes (wall time excluded).
    pub determinism_checksum: String,
}

impl EvalSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: &str,
        config_version: &str,
        mode: OptMode,
        strategy: &str,
        policy_version: &str,
        seed: u64,
        max_steps: u32,
        results: Vec<CircuitResult>,
        failures: Vec<CircuitFailure>,
    ) -> Self {
        let attempted = results.len() + failures.len();
        let pass_rate = PassRate::from_results(&results, attempted);
        let mean_gate_imp_pct = mean_of(&results, |r| r.gate_imp_pct);
        let mean_depth_imp_pct = mean_of(&results, |r| r.depth_imp_pct);
        let mean_wsa_imp_pct = mean_of(&results, |r| r.wsa_imp_pct);

        let mut summary = Self {
            schema_version: SCHEMA_VERSION,
            run_id: run_id.to_string(),
            config_version: config_version.to_string(),
            mode,
            strategy: strategy.to_string(),
            policy_version: policy_version.to_string(),
            seed,
            max_steps,
            results,
            failures,
            pass_rate,
            mean_gate_imp_pct,
            mean_depth_imp_pct,
            mean_wsa_imp_pct,
            determinism_checksum: String::new(),
        };
        summary.determinism_checksum = summary.compute_checksum();
        summary
    }

    /// Deterministic checksum of the run.
    ///
    /// Floats are rounded to 6 decimal places before hashing.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.seed.to_le_bytes());
        hasher.update(self.mode.as_str().as_bytes());
        hasher.update(self.strategy.as_bytes());
        hasher.update(self.policy_version.as_bytes());
        hasher.update(self.max_steps.to_le_bytes());

        for r in &self.results {
            hasher.update(r.circuit.as_bytes());
            for m in [&r.initial, &r.final_metrics] {
                hasher.update(m.area.to_le_bytes());
                hasher.update(m.depth.to_le_bytes());
                hasher.update(round6(m.switching_activity).to_le_bytes());
            }
            hasher.update(round6(r.total_reward).to_le_bytes());
            hasher.update(r.steps.to_le_bytes());
            hasher.update(r.cec.as_str().as_bytes());
            hasher.update(
                r.termination_reason
                    .map_or("none", |t| t.as_str())
                    .as_bytes(),
            );
        }

        for failure in &self.failures {
            hasher.update(failure.circuit.as_bytes());
        }

        hex_encode(&hasher.finalize())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

fn round6(x: f64) -> i64 {
    (x * 1_000_000.0).round() as i64
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, cec: EquivalenceStatus, elapsed_s: f64) -> CircuitResult {
        CircuitResult::new(
            name.to_string(),
            OptMode::Depth,
            CircuitMetrics::new(100, 20, 50.0),
            CircuitMetrics::new(90, 14, 45.0),
            cec,
            elapsed_s,
            6,
            104.5,
            Some(TerminationReason::Success),
            PathBuf::from(format!("results/{}", name)),
        )
    }

    #[test]
    fn test_improvement_pct() {
        assert!((improvement_pct(100.0, 90.0) - 10.0).abs() < 1e-12);
        assert!((improvement_pct(20.0, 22.0) + 10.0).abs() < 1e-12);
        assert_eq!(improvement_pct(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_output_paths() {
        let p = OutputPaths::for_circuit(
            Path::new("results"),
            Path::new("bench/adder.aig"),
            OptMode::Depth,
        );
        assert_eq!(p.optimized, PathBuf::from("results/adder_opt_depth.aig"));
        assert_eq!(p.log, PathBuf::from("results/adder_opt_depth.log"));
        assert_eq!(summary_csv_name(OptMode::Area), "benchmark_summary_area.csv");
    }

    #[test]
    fn test_csv_row_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        write_csv_summary(&path, &[result("adder.aig", EquivalenceStatus::Pass, 0.123)]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "Circuit,Mode,Init_Gates,Final_Gates,Gate_Imp(%),Init_Depth,Final_Depth,Depth_Imp(%),Init_WSA,Final_WSA,WSA_Imp(%),CEC_Check,Time(s),Steps"
        );
        assert_eq!(
            lines[1],
            "adder.aig,depth,100,90,10.00,20,14,30.00,50.0,45.0,10.00,PASS,0.12,6"
        );
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_circuit_log_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adder_opt_depth.log");
        let prev = CircuitMetrics::new(100, 20, 50.0);
        let cur = CircuitMetrics::new(90, 14, 45.0);
        let steps = [StepEntry::new(1, "Balance", 104.5, &prev, &cur)];
        write_circuit_log(&path, &result("adder.aig", EquivalenceStatus::Fail, 1.0), &steps)
            .unwrap();

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.starts_with("Optimization Log for: adder.aig\nMode: DEPTH\n"));
        assert!(log.contains("90 (-10)"));
        assert!(log.contains("14 (-6)"));
        assert!(log.contains("+104.5000"));
        assert!(log.contains("Verification:  FAIL"));
    }

    #[test]
    fn test_summary_checksum_ignores_wall_time() {
        let mk = |elapsed| {
            EvalSummary::new(
                "run",
                "migopt-v0.1",
                OptMode::Depth,
                "mode_weighted",
                "heuristic-v1.0.0",
                42,
                40,
                vec![result("adder.aig", EquivalenceStatus::Pass, elapsed)],
                vec![CircuitFailure {
                    circuit: "bad.aig".to_string(),
                    error: "malformed".to_string(),
                }],
            )
        };
        let a = mk(0.5);
        let b = mk(3.0);
        assert_eq!(a.determinism_checksum, b.determinism_checksum);
        assert_eq!(a.determinism_checksum.len(), 64);
        assert_eq!(a.pass_rate, PassRate { passed: 1, total: 2 });
        assert_eq!(a.pass_rate.to_string(), "Pass Rate: 1/2");

        let mut c = mk(0.5);
        c.seed = 43;
        assert_ne!(c.compute_checksum(), a.determinism_checksum);
    }

    #[test]
    fn test_summary_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eval.json");
        let summary = EvalSummary::new(
            "run",
            "migopt-v0.1",
            OptMode::Depth,
            "mode_weighted",
            "heuristic-v1.0.0",
            1,
            40,
            vec![result("adder.aig", EquivalenceStatus::NotFound, 0.1)],
            vec![],
        );
        summary.write_to_file(&path).unwrap();
        let loaded: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded["results"][0]["final"]["area"], 90);
        assert_eq!(loaded["results"][0]["cec"], "NotFound");
        assert_eq!(loaded["mean_depth_imp_pct"], 30.0);
    }
}
