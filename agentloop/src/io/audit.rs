//! Append-only subtask audit trail.
//!
//! Every sandbox execution appends a `pending` event before running and one
//! terminal event afterwards. Events are never rewritten, so an interrupted
//! run leaves its `pending` record behind.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskEvent {
    pub tool_name: String,
    pub status: SubtaskStatus,
    /// Zero-based step the event belongs to.
    pub step: u32,
    pub timestamp: DateTime<Utc>,
}

/// In-memory event list, optionally mirrored to a JSONL file.
#[derive(Debug, Clone, Default)]
pub struct SubtaskLog {
    events: Vec<SubtaskEvent>,
    sink: Option<PathBuf>,
}

impl SubtaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every event to `path`, one JSON object per line.
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            events: Vec::new(),
            sink: Some(path.into()),
        }
    }

    pub fn events(&self) -> &[SubtaskEvent] {
        &self.events
    }

    /// Append an event. The in-memory record is kept even if the sink write fails.
    pub fn record(&mut self, tool_name: &str, status: SubtaskStatus, step: u32) -> Result<()> {
        let event = SubtaskEvent {
            tool_name: tool_name.to_string(),
            status,
            step,
            timestamp: Utc::now(),
        };
        let sink_result = match &self.sink {
            Some(path) => append_jsonl(path, &event),
            None => Ok(()),
        };
        self.events.push(event);
        sink_result
    }

    /// Latest status recorded for `tool_name`.
    pub fn latest_status(&self, tool_name: &str) -> Option<SubtaskStatus> {
        self.events
            .iter()
            .rev()
            .find(|event| event.tool_name == tool_name)
            .map(|event| event.status)
    }
}

fn append_jsonl(path: &Path, event: &SubtaskEvent) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(event).context("serialize subtask event")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}
