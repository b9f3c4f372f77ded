use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub mod console;
pub mod discovery;
pub mod reader;
pub mod runlog;

/// One decoded line of a run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunRecord {
    Run(RunMetadata),
    Metric(MetricPoint),
    Resource(ResourcePoint),
    Console(ConsoleText),
    Environment(EnvironmentInfo),
    Exit(Completion),
}

impl RunRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            RunRecord::Run(_) => "run",
            RunRecord::Metric(_) => "metric",
            RunRecord::Resource(_) => "resource",
            RunRecord::Console(_) => "console",
            RunRecord::Environment(_) => "environment",
            RunRecord::Exit(_) => "exit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunMetadata {
    pub run_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub config: BTreeMap<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A row of history: every metric logged at one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricPoint {
    pub step: u64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourcePoint {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleText {
    pub text: String,
    #[serde(default)]
    pub stream: ConsoleStream,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleText {
    pub fn is_stderr(&self) -> bool {
        self.stream == ConsoleStream::Stderr
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnvironmentInfo {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: i32,
}

impl Completion {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lifecycle of a tracked run as derived from its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Finished,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finished | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Failed => "failed",
        }
    }

    /// Applies a forward transition; backward moves are ignored.
    pub fn advance(self, next: RunState) -> RunState {
        if next > self && !self.is_terminal() {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_parse_from_tagged_json() {
        let run: RunRecord = serde_json::from_str(
            r#"{"type":"run","run_id":"abc123","project":"mnist","config":{"lr":0.01}}"#,
        )
        .expect("parse run");
        match run {
            RunRecord::Run(meta) => {
                assert_eq!(meta.run_id, "abc123");
                assert_eq!(meta.project.as_deref(), Some("mnist"));
                assert_eq!(meta.config.get("lr"), Some(&serde_json::json!(0.01)));
            }
            other => panic!("unexpected record: {other:?}"),
        }

        let console: RunRecord = serde_json::from_str(
            r#"{"type":"console","text":"boom\n","stream":"stderr","timestamp":"2025-07-31T17:06:06Z"}"#,
        )
        .expect("parse console");
        match console {
            RunRecord::Console(text) => assert!(text.is_stderr()),
            other => panic!("unexpected record: {other:?}"),
        }

        let exit: RunRecord =
            serde_json::from_str(r#"{"type":"exit","exit_code":3}"#).expect("parse exit");
        assert_eq!(exit, RunRecord::Exit(Completion { exit_code: 3 }));
    }

    #[test]
    fn console_stream_defaults_to_stdout() {
        let record: ConsoleText =
            serde_json::from_str(r#"{"text":"hi","timestamp":"2025-07-31T17:06:06Z"}"#)
                .expect("parse console text");
        assert!(!record.is_stderr());
    }

    #[test]
    fn run_state_only_moves_forward() {
        assert_eq!(RunState::Idle.advance(RunState::Running), RunState::Running);
        assert_eq!(RunState::Running.advance(RunState::Idle), RunState::Running);
        assert_eq!(RunState::Idle.advance(RunState::Failed), RunState::Failed);
        assert_eq!(
            RunState::Finished.advance(RunState::Running),
            RunState::Finished
        );
        assert_eq!(RunState::Failed.advance(RunState::Finished), RunState::Failed);
    }
}
