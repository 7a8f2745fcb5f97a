// src/bin/migopt_screen.rs
//
// Dataset screening: open every circuit in a directory through the
// optimizer factory, report which ones load, and optionally move the broken
// ones into a quarantine directory so training never samples them.
//
// Usage:
//   migopt_screen --dir bench/train [--ext yaml] [--quarantine bench/bad]
//
// Exit status: 0 when every circuit loads (or bad ones were quarantined),
// 1 when bad circuits remain in place, 2 on fatal errors.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use migopt::dataset;
use migopt::optimizer::SyntheticFactory;

#[derive(Debug, Parser)]
#[command(
    name = "migopt_screen",
    about = "Screen a circuit dataset and quarantine unreadable files",
    version
)]
struct Args {
    /// Directory holding the circuits.
    #[arg(long)]
    dir: PathBuf,

    /// Circuit file extension.
    #[arg(long, default_value = "yaml")]
    ext: String,

    /// Move bad circuits into this directory.
    #[arg(long)]
    quarantine: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[migopt_screen] ERROR: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let paths = dataset::discover(&args.dir, &args.ext)
        .with_context(|| format!("scanning {}", args.dir.display()))?;
    println!(
        "migopt_screen | dir={} | ext={} | candidates={}",
        args.dir.display(),
        args.ext,
        paths.len()
    );

    let report = dataset::screen(&SyntheticFactory, &paths);
    println!("good={} bad={}", report.good.len(), report.bad.len());

    if report.bad.is_empty() {
        return Ok(0);
    }

    match &args.quarantine {
        Some(qdir) => {
            let moved = dataset::quarantine(&report.bad_paths(), qdir)
                .with_context(|| format!("quarantining into {}", qdir.display()))?;
            println!("quarantined {} files into {}", moved.len(), qdir.display());
            Ok(0)
        }
        None => {
            for (path, err) in &report.bad {
                println!("  bad: {} ({})", path.display(), err);
            }
            Ok(1)
        }
    }
}
