use crate::animation::{DEFAULT_ANIMATION_DURATION, DEFAULT_ANIMATION_FRAME};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(2);
const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "runwatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridSize {
    pub rows: u16,
    pub cols: u16,
}

impl GridSize {
    pub fn capacity(self) -> usize {
        usize::from(self.rows.max(1)) * usize::from(self.cols.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PanelVisibility {
    pub runs_sidebar: bool,
    pub overview_sidebar: bool,
    pub console_logs: bool,
    pub system_metrics: bool,
}

impl Default for PanelVisibility {
    fn default() -> Self {
        Self {
            runs_sidebar: true,
            overview_sidebar: true,
            console_logs: false,
            system_metrics: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub runs_dir: PathBuf,
    pub heartbeat_interval: Duration,
    pub scan_interval: Duration,
    pub animation_duration: Duration,
    pub animation_frame: Duration,
    pub metrics_grid: GridSize,
    pub system_grid: GridSize,
    pub panels: PanelVisibility,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            animation_duration: DEFAULT_ANIMATION_DURATION,
            animation_frame: DEFAULT_ANIMATION_FRAME,
            metrics_grid: GridSize { rows: 2, cols: 3 },
            system_grid: GridSize { rows: 2, cols: 2 },
            panels: PanelVisibility::default(),
            log_file: None,
        }
    }
}

/// On-disk shape of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    runs_dir: Option<PathBuf>,
    heartbeat_ms: Option<u64>,
    scan_ms: Option<u64>,
    animation_ms: Option<u64>,
    frame_ms: Option<u64>,
    metrics_grid: Option<GridSize>,
    system_grid: Option<GridSize>,
    panels: Option<PanelVisibility>,
    log_file: Option<PathBuf>,
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub runs_dir: Option<PathBuf>,
    pub heartbeat_ms: Option<u64>,
    pub log_file: Option<PathBuf>,
}

pub fn load(overrides: &Overrides) -> Result<Config> {
    let mut config = Config::default();

    let path = overrides.config_path.clone().or_else(default_config_path);
    if let Some(path) = path {
        let explicit = overrides.config_path.is_some();
        if explicit || path.exists() {
            let file = read_file_config(&path)?;
            config.apply_file(file);
        }
    }

    config.apply_env(|name| std::env::var(name).ok());
    config.apply_overrides(overrides);
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

impl Config {
    fn apply_file(&mut self, file: FileConfig) {
        if let Some(dir) = file.runs_dir {
            self.runs_dir = dir;
        }
        if let Some(ms) = file.heartbeat_ms {
            self.heartbeat_interval = millis(ms);
        }
        if let Some(ms) = file.scan_ms {
            self.scan_interval = millis(ms);
        }
        if let Some(ms) = file.animation_ms {
            self.animation_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = file.frame_ms {
            self.animation_frame = millis(ms);
        }
        if let Some(grid) = file.metrics_grid {
            self.metrics_grid = clamp_grid(grid);
        }
        if let Some(grid) = file.system_grid {
            self.system_grid = clamp_grid(grid);
        }
        if let Some(panels) = file.panels {
            self.panels = panels;
        }
        if file.log_file.is_some() {
            self.log_file = file.log_file;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(dir) = non_empty("RUNWATCH_RUNS_DIR") {
            self.runs_dir = PathBuf::from(dir);
        }
        if let Some(ms) = non_empty("RUNWATCH_HEARTBEAT_MS").and_then(|v| v.trim().parse().ok()) {
            self.heartbeat_interval = millis(ms);
        }
        if let Some(ms) = non_empty("RUNWATCH_SCAN_MS").and_then(|v| v.trim().parse().ok()) {
            self.scan_interval = millis(ms);
        }
        if let Some(path) = non_empty("RUNWATCH_LOG_FILE") {
            self.log_file = Some(PathBuf::from(path));
        }
        if let Some(show) = non_empty("RUNWATCH_SHOW_LOGS").and_then(|v| parse_bool_flag(&v)) {
            self.panels.console_logs = show;
        }
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.runs_dir {
            self.runs_dir = dir.clone();
        }
        if let Some(ms) = overrides.heartbeat_ms {
            self.heartbeat_interval = millis(ms);
        }
        if let Some(path) = &overrides.log_file {
            self.log_file = Some(path.clone());
        }
    }
}

/// Intervals are floored at one millisecond so timers never spin.
fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

fn clamp_grid(grid: GridSize) -> GridSize {
    GridSize {
        rows: grid.rows.clamp(1, 9),
        cols: grid.cols.clamp(1, 9),
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn file_values_override_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            runs_dir = "/data/runs"
            heartbeat_ms = 500
            metrics_grid = { rows = 3, cols = 12 }

            [panels]
            console_logs = true
            "#,
        )
        .expect("parse config");
        let mut config = Config::default();
        config.apply_file(file);

        assert_eq!(config.runs_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.metrics_grid, GridSize { rows: 3, cols: 9 });
        assert!(config.panels.console_logs);
        assert!(config.panels.runs_sidebar);
        assert_eq!(config.scan_interval, DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<FileConfig, _> = toml::from_str("heartbeat = 3");
        assert!(parsed.is_err());
    }

    #[test]
    fn env_then_cli_layering() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RUNWATCH_RUNS_DIR", "/env/runs"),
            ("RUNWATCH_HEARTBEAT_MS", "750"),
            ("RUNWATCH_SCAN_MS", "not-a-number"),
            ("RUNWATCH_SHOW_LOGS", "yes"),
        ]);
        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.runs_dir, PathBuf::from("/env/runs"));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(750));
        assert_eq!(config.scan_interval, DEFAULT_SCAN_INTERVAL);
        assert!(config.panels.console_logs);

        config.apply_overrides(&Overrides {
            runs_dir: Some(PathBuf::from("/cli/runs")),
            heartbeat_ms: Some(0),
            ..Overrides::default()
        });
        assert_eq!(config.runs_dir, PathBuf::from("/cli/runs"));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1));
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = load(&Overrides {
            config_path: Some(dir.path().join("absent.toml")),
            ..Overrides::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn parse_bool_flag_accepts_common_spellings() {
        assert_eq!(parse_bool_flag(" ON "), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
