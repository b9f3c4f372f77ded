use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const LOG_FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to scan runs directory {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Parsed form of a run directory name such as `run-20250731_170606-abc123`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKey {
    pub key: String,
    pub timestamp: String,
    pub run_id: String,
    pub offline: bool,
}

fn run_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(offline-)?run-(\d{8}_\d{6})-([A-Za-z0-9]+)$").expect("valid regex")
    })
}

impl RunKey {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = run_dir_pattern().captures(name)?;
        Some(Self {
            key: name.to_string(),
            offline: caps.get(1).is_some(),
            timestamp: caps.get(2)?.as_str().to_string(),
            run_id: caps.get(3)?.as_str().to_string(),
        })
    }

    pub fn log_file_name(&self) -> String {
        format!("run-{}.{LOG_FILE_EXTENSION}", self.run_id)
    }
}

/// Path of the log file for `key` under `runs_dir`, if the key is well formed.
pub fn run_log_path(runs_dir: &Path, key: &str) -> Option<PathBuf> {
    let parsed = RunKey::parse(key)?;
    Some(runs_dir.join(key).join(parsed.log_file_name()))
}

/// Lists run directories under `runs_dir`, oldest first.
///
/// A missing runs directory is not an error; it simply has no runs yet.
pub fn scan_runs(runs_dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let entries = match fs::read_dir(runs_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(DiscoveryError::Scan {
                path: runs_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut runs: Vec<RunKey> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().and_then(RunKey::parse))
        .collect();
    runs.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(runs.into_iter().map(|run| run.key).collect())
}
