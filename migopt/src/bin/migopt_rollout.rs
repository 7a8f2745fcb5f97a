// src/bin/migopt_rollout.rs
//
// Seeded rollouts over a training set with N independent controllers.
//
// Each controller i is seeded with seed + i, samples its own circuits and
// writes one JSONL trajectory file (<out-dir>/env_<i>.jsonl) with episode
// start/end markers and one record per step.
//
// Usage:
//   migopt_rollout --dir bench/train --envs 4 --episodes 8 --seed 7 \
//       --policy random --out-dir runs/rollout [--parallel]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use migopt::config::{resolve_effective_mode, Config, OptMode};
use migopt::dataset;
use migopt::optimizer::SyntheticFactory;
use migopt::rl::{Observation, Policy, PolicyKind, RLTelemetry, StepResult, VecEnv};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    Depth,
    Area,
    Balanced,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    Heuristic,
    Random,
    Sequence,
}

#[derive(Debug, Parser)]
#[command(
    name = "migopt_rollout",
    about = "Seeded rollouts writing JSONL trajectories",
    version
)]
struct Args {
    /// Training circuit directory.
    #[arg(long)]
    dir: PathBuf,

    #[arg(long, default_value = "yaml")]
    ext: String,

    /// If omitted, uses MIGOPT_MODE (default Balanced).
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    #[arg(long, value_enum, default_value = "random")]
    policy: PolicyArg,

    /// Number of independent controllers.
    #[arg(long, default_value_t = 1)]
    envs: usize,

    /// Episodes per controller.
    #[arg(long, default_value_t = 4)]
    episodes: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output directory for trajectory files.
    #[arg(long, default_value = "runs/rollout")]
    out_dir: PathBuf,

    /// Step controllers on scoped threads.
    #[arg(long)]
    parallel: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("[migopt_rollout] ERROR: {:#}", e);
        std::process::exit(2);
    }
}

fn run(args: Args) -> Result<()> {
    if args.envs == 0 {
        bail!("--envs must be >= 1");
    }

    let cli_mode = args.mode.map(|m| match m {
        ModeArg::Depth => OptMode::Depth,
        ModeArg::Area => OptMode::Area,
        ModeArg::Balanced => OptMode::Balanced,
    });
    let effective = resolve_effective_mode(cli_mode, None);
    effective.log_startup();

    let cfg = Config::from_env_or_mode(effective.mode);
    if let Err(msg) = cfg.validate() {
        bail!("invalid configuration: {}", msg);
    }

    let circuits = dataset::discover(&args.dir, &args.ext)
        .with_context(|| format!("scanning {}", args.dir.display()))?;
    if circuits.is_empty() {
        bail!("no *.{} circuits in {}", args.ext, args.dir.display());
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let kind = match args.policy {
        PolicyArg::Heuristic => PolicyKind::Heuristic,
        PolicyArg::Random => PolicyKind::Random,
        PolicyArg::Sequence => PolicyKind::Sequence,
    };

    println!(
        "migopt_rollout | cfg={} | mode={} | strategy={} | policy={} | envs={} | episodes={} | circuits={} | seed={}",
        cfg.version,
        cfg.mode,
        cfg.strategy.as_str(),
        kind,
        args.envs,
        args.episodes,
        circuits.len(),
        args.seed
    );

    let mut venv = VecEnv::new(
        args.envs,
        cfg.clone(),
        Arc::new(SyntheticFactory),
        circuits,
        args.seed,
    );
    let mut policies: Vec<Box<dyn Policy>> = (0..args.envs)
        .map(|i| kind.build(cfg.mode, args.seed.wrapping_add(i as u64), &[]))
        .collect();
    let mut telemetry: Vec<RLTelemetry> = (0..args.envs)
        .map(|i| RLTelemetry::enable(args.out_dir.join(format!("env_{}.jsonl", i))))
        .collect();

    let mut total_steps: u64 = 0;
    for episode in 0..args.episodes {
        let mut obs: Vec<Observation> = venv.reset_all(None).context("reset failed")?;

        for (i, env) in venv.envs().iter().enumerate() {
            policies[i].reset_episode(env.seed(), env.episode_id());
            let circuit = env
                .circuit_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            telemetry[i].log_episode_start(
                env.episode_id(),
                env.seed(),
                &circuit,
                cfg.mode.as_str(),
            );
        }

        let mut done = vec![false; args.envs];
        let mut last: Vec<Option<StepResult>> = vec![None; args.envs];
        while done.iter().any(|d| !d) {
            let actions: Vec<_> = policies
                .iter_mut()
                .zip(obs.iter())
                .map(|(p, o)| p.act(o))
                .collect();

            let results = if args.parallel {
                venv.step_parallel(&actions)
            } else {
                venv.step(&actions)
            }
            .context("step failed")?;

            for (i, r) in results.into_iter().enumerate() {
                if done[i] {
                    continue;
                }
                telemetry[i].log_step(&r, actions[i], policies[i].version(), cfg.version);
                total_steps += 1;
                obs[i] = r.observation.clone();
                if r.done() {
                    done[i] = true;
                    telemetry[i].log_episode_end(&r);
                }
                last[i] = Some(r);
            }
        }

        for (i, r) in last.iter().enumerate() {
            if let Some(r) = r {
                println!(
                    "episode={} env={} circuit={} steps={} reward={:.3} reason={} gates={} depth={}",
                    episode,
                    i,
                    r.info.circuit,
                    r.info.step,
                    telemetry[i].total_reward(),
                    r.info
                        .termination_reason
                        .map_or("none", |t| t.as_str()),
                    r.info.raw_area,
                    r.info.raw_depth
                );
            }
        }
    }

    for t in telemetry.iter_mut() {
        t.flush();
    }
    println!(
        "migopt_rollout: {} steps written to {}",
        total_steps,
        args.out_dir.display()
    );
    Ok(())
}
