//! Session transcripts under the memory directory.
//!
//! A transcript is a JSON array of records tagged by `type`. Sessions are
//! stored as `<memory_dir>/YYYY/MM/DD/<session_id>.json`; the index builder
//! reads them back to extract query/answer pairs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::HistoryRecord;
use crate::io::config::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptRecord {
    RunMetadata {
        session_id: String,
        user_query: String,
        timestamp: DateTime<Utc>,
    },
    ToolOutput {
        tool_name: String,
        tool_args: Value,
        tool_result: Value,
        success: bool,
        #[serde(default)]
        tags: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    FinalAnswer {
        final_answer: String,
        timestamp: DateTime<Utc>,
    },
}

/// Transcript file for `session_id` started at `started_at`.
pub fn transcript_path(memory_dir: &Path, session_id: &str, started_at: DateTime<Utc>) -> PathBuf {
    memory_dir
        .join(started_at.format("%Y").to_string())
        .join(started_at.format("%m").to_string())
        .join(started_at.format("%d").to_string())
        .join(format!("{session_id}.json"))
}

/// Accumulates one session's records and persists them as a whole.
#[derive(Debug, Clone)]
pub struct SessionTranscript {
    path: PathBuf,
    records: Vec<TranscriptRecord>,
}

impl SessionTranscript {
    pub fn new(memory_dir: &Path, session_id: &str, user_query: &str) -> Self {
        let now = Utc::now();
        Self {
            path: transcript_path(memory_dir, session_id, now),
            records: vec![TranscriptRecord::RunMetadata {
                session_id: session_id.to_string(),
                user_query: user_query.to_string(),
                timestamp: now,
            }],
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[TranscriptRecord] {
        &self.records
    }

    pub fn push(&mut self, record: TranscriptRecord) {
        self.records.push(record);
    }

    pub fn record_final_answer(&mut self, final_answer: &str) {
        self.push(TranscriptRecord::FinalAnswer {
            final_answer: final_answer.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Write the transcript, replacing any earlier save.
    pub fn save(&self) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(&self.records).context("serialize transcript")?;
        payload.push('\n');
        write_atomic(&self.path, payload.as_bytes())
    }
}

/// Read a transcript as loosely typed records.
///
/// Records are kept as raw JSON so files written by other tools, or with
/// unknown record types, still yield a pair.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Extract the session's query and final answer.
///
/// The query is the first non-empty `run_metadata` `user_query` (or `text`);
/// the answer comes from the last `final_answer` record (`final_answer` or
/// `text`). Both must be non-empty.
pub fn extract_pair(records: &[Value]) -> Option<HistoryRecord> {
    let mut query: Option<String> = None;
    let mut answer: Option<String> = None;
    for record in records {
        match record.get("type").and_then(Value::as_str) {
            Some("run_metadata") if query.is_none() => {
                query = field_text(record, "user_query").or_else(|| field_text(record, "text"));
            }
            Some("final_answer") => {
                answer = field_text(record, "final_answer").or_else(|| field_text(record, "text"));
            }
            _ => {}
        }
    }
    Some(HistoryRecord::new(query?, answer?))
}

fn field_text(record: &Value, key: &str) -> Option<String> {
    let text = match record.get(key)? {
        Value::Null => return None,
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}
