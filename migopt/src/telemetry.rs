// src/telemetry.rs
//
// JSONL sink shared by every migopt record producer.
//
// Switched on from the environment:
//   MIGOPT_TELEMETRY_MODE    off (default) | jsonl
//   MIGOPT_TELEMETRY_PATH    output file, required for jsonl
//   MIGOPT_TELEMETRY_APPEND  1 | true | yes appends instead of truncating
//
// Producers stamp `schema_version` on their own records. The file is opened
// on the first record; any I/O failure switches the sink off for the rest of
// the run and is never returned to the caller.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Current telemetry schema version.
pub const SCHEMA_VERSION: i64 = 1;

const MODE_VAR: &str = "MIGOPT_TELEMETRY_MODE";
const PATH_VAR: &str = "MIGOPT_TELEMETRY_PATH";
const APPEND_VAR: &str = "MIGOPT_TELEMETRY_APPEND";

/// Where telemetry goes. No path means telemetry is off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub path: Option<PathBuf>,
    pub append: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TelemetryConfig::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = lookup(MODE_VAR).unwrap_or_default();
        if !mode.trim().eq_ignore_ascii_case("jsonl") {
            return Self::off();
        }

        let path = match lookup(PATH_VAR) {
            Some(raw) if !raw.trim().is_empty() => PathBuf::from(raw.trim()),
            _ => {
                eprintln!(
                    "[telemetry] WARN: {}=jsonl without {}; telemetry off",
                    MODE_VAR, PATH_VAR
                );
                return Self::off();
            }
        };
        let append = lookup(APPEND_VAR).map_or(false, |v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });

        Self {
            path: Some(path),
            append,
        }
    }

    /// JSONL output to `path`, truncating.
    pub fn jsonl(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            append: false,
        }
    }

    pub fn off() -> Self {
        Self::default()
    }
}

enum SinkState {
    Off,
    Pending { path: PathBuf, append: bool },
    Open(BufWriter<File>),
}

/// One JSON object per line.
pub struct TelemetrySink {
    state: SinkState,
}

impl TelemetrySink {
    pub fn from_env() -> Self {
        Self::from_config(TelemetryConfig::from_env())
    }

    pub fn from_config(cfg: TelemetryConfig) -> Self {
        let state = match cfg.path {
            Some(path) => SinkState::Pending {
                path,
                append: cfg.append,
            },
            None => SinkState::Off,
        };
        Self { state }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.state, SinkState::Off)
    }

    /// Serialize `record` as one line.
    pub fn log_record<T: Serialize>(&mut self, record: &T) {
        let result = match self.writer() {
            Some(writer) => write_line(writer, record),
            None => return,
        };
        if let Err(e) = result {
            eprintln!("[telemetry] WARN: write failed: {}; telemetry disabled", e);
            self.state = SinkState::Off;
        }
    }

    pub fn flush(&mut self) {
        if let SinkState::Open(writer) = &mut self.state {
            let _ = writer.flush();
        }
    }

    fn writer(&mut self) -> Option<&mut BufWriter<File>> {
        if let SinkState::Pending { path, append } = &self.state {
            self.state = match open(path, *append) {
                Ok(file) => SinkState::Open(BufWriter::new(file)),
                Err(e) => {
                    eprintln!(
                        "[telemetry] WARN: cannot open {}: {}; telemetry disabled",
                        path.display(),
                        e
                    );
                    SinkState::Off
                }
            };
        }
        match &mut self.state {
            SinkState::Open(writer) => Some(writer),
            _ => None,
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.flush();
    }
}

fn open(path: &Path, append: bool) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path)
}

fn write_line<W: Write, T: Serialize>(writer: &mut W, record: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")
}
