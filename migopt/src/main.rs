// src/main.rs
//
// Evaluation CLI for migopt.
//
// Constraints:
// - Mode precedence: --mode, then MIGOPT_MODE, then the run spec, then
//   Balanced; the effective mode is logged once at startup.
// - Other settings: run spec overlays env-derived Config, CLI flags win.
// - Deterministic runs via --seed (circuit i uses seed + i).
// - Print concise run header (mode, strategy, cfg version/hash).
// - Exit status 2 on any fatal error.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};

use migopt::config::{resolve_effective_mode, Config, OptMode};
use migopt::dataset;
use migopt::eval::{run_evaluation, AbcChecker, RunOptions, RunSpec};
use migopt::optimizer::synthetic::fnv1a64;
use migopt::optimizer::SyntheticFactory;
use migopt::rl::{ActionId, PolicyKind, RLTelemetry, RewardStrategyKind};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Depth,
    Area,
    Balanced,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    ModeWeighted,
    DynamicThreshold,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    Heuristic,
    Random,
    Sequence,
}

#[derive(Debug, Parser)]
#[command(
    name = "migopt",
    about = "Evaluate an optimisation policy over logic circuits",
    version
)]
struct Args {
    /// Run spec YAML (optional; CLI flags override its values).
    #[arg(long)]
    run_spec: Option<PathBuf>,

    /// Optimisation mode preset.
    /// If omitted, uses MIGOPT_MODE, then the run spec (default Balanced).
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Reward strategy.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Baseline policy.
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Action ids cycled by the sequence policy (e.g. 1,0,3).
    #[arg(long, value_delimiter = ',')]
    sequence: Vec<ActionId>,

    /// Circuit files to evaluate.
    #[arg(long = "circuit")]
    circuits: Vec<PathBuf>,

    /// Directory scanned for circuits.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Circuit file extension used with --dir.
    #[arg(long, default_value = "yaml")]
    ext: String,

    /// Deterministic base seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Episode horizon.
    #[arg(long)]
    max_steps: Option<u32>,

    /// ABC binary for the equivalence check.
    #[arg(long)]
    abc: Option<PathBuf>,

    /// Output directory for optimised circuits and reports.
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("[migopt] ERROR: {:#}", e);
        std::process::exit(2);
    }
}

fn run(args: Args) -> Result<()> {
    let spec = match &args.run_spec {
        Some(path) => Some(
            RunSpec::from_yaml_file(path)
                .with_context(|| format!("loading run spec {}", path.display()))?,
        ),
        None => None,
    };

    let cli_mode = args.mode.map(|m| match m {
        ModeArg::Depth => OptMode::Depth,
        ModeArg::Area => OptMode::Area,
        ModeArg::Balanced => OptMode::Balanced,
    });

    let effective = resolve_effective_mode(cli_mode, spec.as_ref().and_then(|s| s.mode.as_deref()));
    effective.log_startup();
    let mode = effective.mode;

    let mut cfg = Config::from_env_or_mode(mode);
    if let Some(spec) = &spec {
        spec.apply_to(&mut cfg);
    }
    if let Some(s) = args.strategy {
        cfg.strategy = match s {
            StrategyArg::ModeWeighted => RewardStrategyKind::ModeWeighted,
            StrategyArg::DynamicThreshold => RewardStrategyKind::DynamicThreshold,
        };
    }
    if let Some(n) = args.max_steps {
        cfg.max_steps = n;
    }
    if let Some(abc) = &args.abc {
        cfg.eval.abc_binary = abc.clone();
    }
    if let Some(dir) = &args.results_dir {
        cfg.eval.results_dir = dir.clone();
    }
    if let Err(msg) = cfg.validate() {
        bail!("invalid configuration: {}", msg);
    }

    let mut circuits = match &spec {
        Some(spec) => spec.resolve_circuits().context("resolving run spec circuits")?,
        None => Vec::new(),
    };
    circuits.extend(args.circuits.iter().cloned());
    if let Some(dir) = &args.dir {
        let found = dataset::discover(dir, &args.ext)
            .with_context(|| format!("scanning {}", dir.display()))?;
        circuits.extend(found);
    }
    if circuits.is_empty() {
        bail!("no circuits given (use --circuit, --dir or a run spec)");
    }

    let seed = args
        .seed
        .or_else(|| spec.as_ref().map(|s| s.seed))
        .unwrap_or(0);
    let policy_kind = match args.policy {
        Some(PolicyArg::Heuristic) => PolicyKind::Heuristic,
        Some(PolicyArg::Random) => PolicyKind::Random,
        Some(PolicyArg::Sequence) => PolicyKind::Sequence,
        None => spec
            .as_ref()
            .map(|s| s.policy.kind)
            .unwrap_or(PolicyKind::Heuristic),
    };
    let sequence = if args.sequence.is_empty() {
        spec.as_ref()
            .map(|s| s.policy.sequence.clone())
            .unwrap_or_default()
    } else {
        args.sequence.clone()
    };
    let mut policy = policy_kind.build(cfg.mode, seed, &sequence);

    let cfg_hash = fnv1a64(&format!("{cfg:?}"));
    println!(
        "migopt | cfg={} | cfg_hash=0x{:016x} | mode={} | strategy={} | policy={} | circuits={} | seed={}",
        cfg.version,
        cfg_hash,
        cfg.mode,
        cfg.strategy.as_str(),
        policy.version(),
        circuits.len(),
        seed
    );
    if args.verbose > 0 {
        for c in &circuits {
            println!("  circuit: {}", c.display());
        }
    }

    let options = RunOptions {
        run_id: spec
            .as_ref()
            .map(|s| s.run_id.clone())
            .unwrap_or_else(|| "adhoc".to_string()),
        seed,
    };
    let checker = AbcChecker::new(cfg.eval.abc_binary.clone());
    let mut telemetry = RLTelemetry::from_env();

    let outcome = run_evaluation(
        &cfg,
        Arc::new(SyntheticFactory),
        &circuits,
        policy.as_mut(),
        &checker,
        &options,
        &mut telemetry,
    )
    .context("evaluation run failed")?;

    let s = &outcome.summary;
    println!("{}", "=".repeat(60));
    if let Some(csv) = &outcome.csv_path {
        println!("FINAL REPORT: {}", csv.display());
    }
    println!("SUMMARY: {}", outcome.summary_path.display());
    println!(
        "Mean improvement: gates {:.2}% | depth {:.2}% | power {:.2}%",
        s.mean_gate_imp_pct, s.mean_depth_imp_pct, s.mean_wsa_imp_pct
    );
    println!("{}", s.pass_rate);
    println!("determinism_checksum={}", s.determinism_checksum);
    println!("{}", "=".repeat(60));

    if s.results.is_empty() {
        bail!("no circuit could be evaluated");
    }
    Ok(())
}
