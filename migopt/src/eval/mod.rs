// src/eval/mod.rs
//
// Post-episode evaluation: run specs, the rollout runner, equivalence
// checking and report writers.

pub mod equivalence;
pub mod report;
pub mod run_spec;
pub mod runner;

pub use equivalence::{AbcChecker, EquivalenceChecker, EquivalenceStatus, FixedChecker};
pub use report::{
    improvement_pct, summary_csv_name, CircuitFailure, CircuitResult, EvalSummary, OutputPaths,
    PassRate, StepEntry, CSV_COLUMNS,
};
pub use run_spec::{CircuitSource, PolicySpec, RunSpec, RunSpecError};
pub use runner::{evaluate_circuit, run_evaluation, CircuitEvaluation, EvalError, EvalOutcome, RunOptions};
