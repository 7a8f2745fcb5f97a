// src/dataset.rs
//
// Circuit dataset discovery and screening.
//
// - discover: list circuit files with a given extension, skipping optimised
//   outputs written by earlier evaluation runs (`_opt` in the file stem)
// - screen: open every file through the optimizer factory and split the set
//   into loadable and broken circuits
// - quarantine: move broken circuits out of the training directory

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::circuit::CircuitState;
use crate::optimizer::{LoadError, OptimizerFactory};

/// Marker in file stems produced by the evaluation runner.
pub const OPTIMISED_STEM_MARKER: &str = "_opt";

/// List `*.{ext}` files in `dir` (non-recursive), sorted by path.
///
/// `ext` is matched case-insensitively with or without a leading dot.
pub fn discover(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let want = ext.trim_start_matches('.').to_ascii_lowercase();
    let mut out = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.to_ascii_lowercase() == want);
        if !matches_ext || is_optimised_output(&path) {
            continue;
        }
        out.push(path);
    }

    out.sort();
    Ok(out)
}

/// True for files written by a previous evaluation run.
pub fn is_optimised_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or(false, |s| s.contains(OPTIMISED_STEM_MARKER))
}

/// Outcome of screening a set of circuit files.
#[derive(Debug, Default)]
pub struct ScreenReport {
    pub good: Vec<PathBuf>,
    pub bad: Vec<(PathBuf, LoadError)>,
}

impl ScreenReport {
    pub fn total(&self) -> usize {
        self.good.len() + self.bad.len()
    }

    pub fn bad_paths(&self) -> Vec<PathBuf> {
        self.bad.iter().map(|(p, _)| p.clone()).collect()
    }
}

/// Try to open every circuit; each handle is dropped right after its
/// metrics are read.
pub fn screen(factory: &dyn OptimizerFactory, paths: &[PathBuf]) -> ScreenReport {
    let mut report = ScreenReport::default();
    for path in paths {
        match CircuitState::load(factory, path) {
            Ok(state) => {
                let m = state.metrics();
                eprintln!(
                    "[dataset] OK   {} (gates={} depth={})",
                    path.display(),
                    m.area,
                    m.depth
                );
                report.good.push(path.clone());
            }
            Err(e) => {
                eprintln!("[dataset] BAD  {}: {}", path.display(), e);
                report.bad.push((path.clone(), e));
            }
        }
    }
    report
}

/// Move `paths` into `dir`, creating it if needed. Returns the new locations.
pub fn quarantine(paths: &[PathBuf], dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut moved = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = path.file_name() else {
            continue;
        };
        let target = dir.join(name);
        fs::rename(path, &target)?;
        eprintln!(
            "[dataset] quarantined {} -> {}",
            path.display(),
            target.display()
        );
        moved.push(target);
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{CircuitProfile, SyntheticFactory};

    fn write_profile(dir: &Path, file: &str, area: u64, depth: u64) -> PathBuf {
        let path = dir.join(file);
        let yaml = CircuitProfile::new(file, area, depth)
            .to_yaml_string()
            .unwrap();
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_discover_filters_extension_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        write_profile(dir.path(), "b.yaml", 10, 3);
        write_profile(dir.path(), "a.YAML", 10, 3);
        write_profile(dir.path(), "a_opt_depth.yaml", 10, 3);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let found = discover(dir.path(), ".yaml").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.YAML", "b.yaml"]);
    }

    #[test]
    fn test_screen_and_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_profile(dir.path(), "good.yaml", 40, 6);
        let empty = dir.path().join("empty.yaml");
        fs::write(&empty, "name: empty\narea: 0\ndepth: 0\n").unwrap();
        let junk = dir.path().join("junk.yaml");
        fs::write(&junk, "area: [not, a, number").unwrap();

        let paths = discover(dir.path(), "yaml").unwrap();
        let report = screen(&SyntheticFactory, &paths);
        assert_eq!(report.total(), 3);
        assert_eq!(report.good, vec![good]);
        assert_eq!(report.bad.len(), 2);

        let qdir = dir.path().join("quarantine");
        let moved = quarantine(&report.bad_paths(), &qdir).unwrap();
        assert_eq!(moved.len(), 2);
        assert!(!empty.exists());
        assert!(!junk.exists());
        assert!(qdir.join("junk.yaml").exists());
    }
}
