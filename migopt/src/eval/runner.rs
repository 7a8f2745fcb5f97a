// src/eval/runner.rs
//
// Evaluation runner: roll a policy out on each circuit, persist the
// optimised network, check equivalence and write the reports.
//
// Per circuit (seed = base_seed + index):
// 1. reset the controller on the circuit
// 2. act until terminated/truncated or max_steps
// 3. save <stem>_opt_<mode>.<ext>, run the equivalence check
// 4. write <stem>_opt_<mode>.log
//
// A circuit that fails (load error, optimizer fault, save error) is
// recorded as a failure and the run moves on.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::optimizer::OptimizerFactory;
use crate::rl::env::{EnvError, OptEnv, StepResult};
use crate::rl::policy::Policy;
use crate::rl::telemetry::RLTelemetry;

use super::equivalence::EquivalenceChecker;
use super::report::{
    summary_csv_name, summary_json_name, write_circuit_log, write_csv_summary, CircuitFailure,
    CircuitResult, EvalSummary, OutputPaths, StepEntry,
};

#[derive(Debug)]
pub enum EvalError {
    Env(EnvError),
    Io { path: String, source: std::io::Error },
}

impl EvalError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Env(e) => write!(f, "{}", e),
            EvalError::Io { path, source } => write!(f, "cannot write {}: {}", path, source),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Env(e) => Some(e),
            EvalError::Io { source, .. } => Some(source),
        }
    }
}

impl From<EnvError> for EvalError {
    fn from(e: EnvError) -> Self {
        EvalError::Env(e)
    }
}

/// Result of one circuit plus its step log.
#[derive(Debug, Clone)]
pub struct CircuitEvaluation {
    pub result: CircuitResult,
    pub steps: Vec<StepEntry>,
    pub log_path: PathBuf,
}

/// Evaluate `policy` on a single circuit.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_circuit(
    env: &mut OptEnv,
    policy: &mut dyn Policy,
    circuit: &Path,
    seed: u64,
    checker: &dyn EquivalenceChecker,
    results_dir: &Path,
    telemetry: &mut RLTelemetry,
) -> Result<CircuitEvaluation, EvalError> {
    let mode = env.mode();
    let max_steps = env.config().max_steps;
    let config_version = env.config().version;

    let mut obs = env.reset_on(circuit)?;
    policy.reset_episode(seed, env.episode_id());
    telemetry.log_episode_start(
        env.episode_id(),
        seed,
        &circuit.display().to_string(),
        mode.as_str(),
    );

    let initial = env.metrics();
    let start = Instant::now();
    let mut prev = initial;
    let mut steps = Vec::new();
    let mut total_reward = 0.0;
    let mut last: Option<StepResult> = None;

    for _ in 0..max_steps {
        let action = policy.act(&obs);
        let r = env.step(action)?;
        let cur = env.metrics();

        steps.push(StepEntry::new(
            r.info.step,
            &r.info.action_name,
            r.reward,
            &prev,
            &cur,
        ));
        telemetry.log_step(&r, action, policy.version(), config_version);
        total_reward += r.reward;
        prev = cur;
        obs = r.observation.clone();

        let done = r.done();
        last = Some(r);
        if done {
            break;
        }
    }
    let elapsed_s = start.elapsed().as_secs_f64();

    if let Some(last) = &last {
        telemetry.log_episode_end(last);
    }

    let paths = OutputPaths::for_circuit(results_dir, circuit, mode);
    env.save_circuit(&paths.optimized)?;
    let cec = checker.check(circuit, &paths.optimized);

    let name = circuit
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| circuit.display().to_string());

    let result = CircuitResult::new(
        name,
        mode,
        initial,
        env.metrics(),
        cec,
        elapsed_s,
        steps.len() as u32,
        total_reward,
        env.termination(),
        paths.optimized.clone(),
    );

    write_circuit_log(&paths.log, &result, &steps).map_err(|e| EvalError::io(&paths.log, e))?;

    Ok(CircuitEvaluation {
        result,
        steps,
        log_path: paths.log,
    })
}

/// Run-level settings not carried by [`Config`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run_id: String,
    pub seed: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: "adhoc".to_string(),
            seed: 0,
        }
    }
}

/// Everything produced by [`run_evaluation`].
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub summary: EvalSummary,
    /// None when no circuit could be evaluated.
    pub csv_path: Option<PathBuf>,
    pub summary_path: PathBuf,
}

/// Evaluate every circuit in order and write the run reports into
/// `config.eval.results_dir`.
pub fn run_evaluation(
    config: &Config,
    factory: Arc<dyn OptimizerFactory>,
    circuits: &[PathBuf],
    policy: &mut dyn Policy,
    checker: &dyn EquivalenceChecker,
    options: &RunOptions,
    telemetry: &mut RLTelemetry,
) -> Result<EvalOutcome, EvalError> {
    let results_dir = config.eval.results_dir.clone();
    fs::create_dir_all(&results_dir).map_err(|e| EvalError::io(&results_dir, e))?;

    let mut env = OptEnv::new(config.clone(), factory, circuits.to_vec(), options.seed);
    let mut results = Vec::with_capacity(circuits.len());
    let mut failures = Vec::new();

    eprintln!(
        "[eval] {} circuits mode={} strategy={} policy={} results={}",
        circuits.len(),
        config.mode,
        config.strategy.as_str(),
        policy.version(),
        results_dir.display()
    );

    for (i, circuit) in circuits.iter().enumerate() {
        let seed = options.seed.wrapping_add(i as u64);
        match evaluate_circuit(
            &mut env,
            policy,
            circuit,
            seed,
            checker,
            &results_dir,
            telemetry,
        ) {
            Ok(eval) => {
                let r = &eval.result;
                eprintln!(
                    "[eval] [{}/{}] {} gates {:.2}% | depth {:.2}% | power {:.2}% | steps={} CEC={}",
                    i + 1,
                    circuits.len(),
                    r.circuit,
                    r.gate_imp_pct,
                    r.depth_imp_pct,
                    r.wsa_imp_pct,
                    r.steps,
                    r.cec
                );
                results.push(eval.result);
            }
            Err(e) => {
                eprintln!(
                    "[eval] ERROR: [{}/{}] {}: {}",
                    i + 1,
                    circuits.len(),
                    circuit.display(),
                    e
                );
                failures.push(CircuitFailure {
                    circuit: circuit.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    telemetry.flush();

    let csv_path = if results.is_empty() {
        None
    } else {
        let path = results_dir.join(summary_csv_name(config.mode));
        write_csv_summary(&path, &results).map_err(|e| EvalError::io(&path, e))?;
        Some(path)
    };

    let summary = EvalSummary::new(
        &options.run_id,
        config.version,
        config.mode,
        config.strategy.as_str(),
        policy.version(),
        options.seed,
        config.max_steps,
        results,
        failures,
    );
    let summary_path = results_dir.join(summary_json_name(config.mode));
    summary
        .write_to_file(&summary_path)
        .map_err(|e| EvalError::io(&summary_path, e))?;

    eprintln!("[eval] {}", summary.pass_rate);

    Ok(EvalOutcome {
        summary,
        csv_path,
        summary_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptMode;
    use crate::eval::equivalence::{EquivalenceStatus, FixedChecker};
    use crate::optimizer::{Primitive, ScriptedFactory, ScriptedOptimizer};
    use crate::rl::env::TerminationReason;
    use crate::rl::policy::SequencePolicy;
    use crate::types::CircuitMetrics;

    fn m(area: u64, depth: u64) -> CircuitMetrics {
        CircuitMetrics::new(area, depth, area as f64 * 0.5)
    }

    fn config(dir: &Path, mode: OptMode) -> Config {
        let mut cfg = Config::for_mode(mode);
        cfg.eval.results_dir = dir.to_path_buf();
        cfg
    }

    #[test]
    fn test_evaluate_circuit_depth_success() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new().with_circuit(
            "bench/adder.aig",
            ScriptedOptimizer::new(m(100, 20)).with_outcome(Primitive::Balance, m(104, 13)),
        );
        let cfg = config(dir.path(), OptMode::Depth);
        let mut env = OptEnv::new(cfg, Arc::new(factory), vec![], 0);
        let mut policy = SequencePolicy::new(vec![1]);

        let eval = evaluate_circuit(
            &mut env,
            &mut policy,
            Path::new("bench/adder.aig"),
            5,
            &FixedChecker(EquivalenceStatus::Pass),
            dir.path(),
            &mut RLTelemetry::disabled(),
        )
        .unwrap();

        let r = &eval.result;
        assert_eq!(r.circuit, "adder.aig");
        assert_eq!(r.steps, 1);
        assert_eq!(r.termination_reason, Some(TerminationReason::Success));
        assert_eq!(r.final_metrics.depth, 13);
        assert!((r.depth_imp_pct - 35.0).abs() < 1e-9);
        assert_eq!(eval.steps[0].gate_diff, 4);
        assert_eq!(eval.steps[0].depth_diff, -7);
        assert!(dir.path().join("adder_opt_depth.aig").exists());
        assert!(eval.log_path.ends_with("adder_opt_depth.log"));
        assert!(eval.log_path.exists());
    }

    #[test]
    fn test_run_evaluation_records_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ScriptedFactory::new()
            .with_circuit(
                "a.aig",
                ScriptedOptimizer::new(m(100, 20))
                    .with_outcomes(Primitive::Rewrite, [m(95, 20), m(92, 20)]),
            )
            .with_malformed("b.aig", "bad header")
            .with_circuit(
                "c.aig",
                ScriptedOptimizer::new(m(50, 10)).with_fault(Primitive::Rewrite, "crash"),
            );
        let mut cfg = config(dir.path(), OptMode::Balanced);
        cfg.max_steps = 3;
        let circuits: Vec<PathBuf> = ["a.aig", "b.aig", "c.aig"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let mut policy = SequencePolicy::new(vec![0]);

        let outcome = run_evaluation(
            &cfg,
            Arc::new(factory),
            &circuits,
            &mut policy,
            &FixedChecker(EquivalenceStatus::NotFound),
            &RunOptions::default(),
            &mut RLTelemetry::disabled(),
        )
        .unwrap();

        let s = &outcome.summary;
        assert_eq!(s.results.len(), 1);
        assert_eq!(s.failures.len(), 2);
        assert_eq!(s.pass_rate.passed, 0);
        assert_eq!(s.pass_rate.total, 3);
        // a: two improvements, then an unchanged (no-op) step hits max_steps
        assert_eq!(s.results[0].steps, 3);
        assert_eq!(
            s.results[0].termination_reason,
            Some(TerminationReason::MaxSteps)
        );

        let csv = outcome.csv_path.unwrap();
        assert!(csv.ends_with("benchmark_summary_balanced.csv"));
        let rows = fs::read_to_string(&csv).unwrap();
        assert_eq!(rows.lines().count(), 2);
        assert!(outcome.summary_path.exists());
    }
}
