//! Per-run agent context.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::heuristics::Metadata;
use crate::io::audit::SubtaskLog;
use crate::io::transcript::{SessionTranscript, TranscriptRecord};

/// State carried across steps until the loop returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    /// Committed terminal answer literal.
    pub final_answer: Option<String>,
    /// Framed forwarded result replacing the original input for later steps.
    pub user_input_override: Option<String>,
}

/// One tool output remembered for the rest of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// One-line rendering used in planning prompts.
    pub text: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub tool_result: Value,
    pub success: bool,
    pub tags: Vec<String>,
}

/// Same-session memory of tool outputs, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    items: Vec<MemoryItem>,
}

impl SessionMemory {
    pub fn items(&self) -> &[MemoryItem] {
        &self.items
    }

    pub fn add_tool_output(
        &mut self,
        tool_name: &str,
        tool_args: Value,
        tool_result: Value,
        success: bool,
        tags: &[&str],
    ) -> &MemoryItem {
        let text = format!("Output of {tool_name}: {tool_result}");
        self.items.push(MemoryItem {
            text,
            tool_name: tool_name.to_string(),
            tool_args,
            tool_result,
            success,
            tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
        });
        let last = self.items.len() - 1;
        &self.items[last]
    }
}

/// Context for one agent run: identity, input, loop state, memory and audit.
#[derive(Debug)]
pub struct AgentSession {
    pub session_id: String,
    /// The original task, never modified.
    pub user_input: String,
    pub state: LoopState,
    pub memory: SessionMemory,
    pub subtasks: SubtaskLog,
    /// Zero-based index of the step in progress.
    pub step: u32,
    transcript: Option<SessionTranscript>,
}

impl AgentSession {
    pub fn new(session_id: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_input: user_input.into(),
            state: LoopState::default(),
            memory: SessionMemory::default(),
            subtasks: SubtaskLog::new(),
            step: 0,
            transcript: None,
        }
    }

    /// Persist this session as a transcript under `memory_dir`.
    pub fn with_transcript(mut self, memory_dir: &Path) -> Self {
        self.transcript = Some(SessionTranscript::new(
            memory_dir,
            &self.session_id,
            &self.user_input,
        ));
        self
    }

    pub fn with_subtask_log(mut self, subtasks: SubtaskLog) -> Self {
        self.subtasks = subtasks;
        self
    }

    pub fn transcript(&self) -> Option<&SessionTranscript> {
        self.transcript.as_ref()
    }

    /// Text the current step works on: the forwarded override if set, else the task.
    pub fn current_input(&self) -> &str {
        self.state
            .user_input_override
            .as_deref()
            .unwrap_or(&self.user_input)
    }

    /// Side-channel metadata handed to heuristics.
    pub fn heuristic_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("session_id".to_string(), json!(self.session_id));
        metadata.insert("step".to_string(), json!(self.step));
        metadata
    }

    /// Remember a sandbox execution in memory and in the transcript.
    pub fn record_sandbox_output(&mut self, plan: &str, result: &str, success: bool) {
        let item = self.memory.add_tool_output(
            "solve_sandbox",
            json!({ "plan": plan }),
            json!({ "result": result }),
            success,
            &["sandbox"],
        );
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.push(TranscriptRecord::ToolOutput {
                tool_name: item.tool_name.clone(),
                tool_args: item.tool_args.clone(),
                tool_result: item.tool_result.clone(),
                success: item.success,
                tags: item.tags.clone(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Commit the terminal answer and flush the transcript.
    pub fn commit_final_answer(&mut self, literal: String) {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record_final_answer(&literal);
            if let Err(err) = transcript.save() {
                warn!(
                    session_id = %self.session_id,
                    error = %format!("{err:#}"),
                    "failed to save transcript"
                );
            }
        }
        self.state.final_answer = Some(literal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transcript::{extract_pair, read_records};

    #[test]
    fn override_replaces_current_input() {
        let mut session = AgentSession::new("s", "task");
        assert_eq!(session.current_input(), "task");
        session.state.user_input_override = Some("framed".to_string());
        assert_eq!(session.current_input(), "framed");
        assert_eq!(session.user_input, "task");
    }

    #[test]
    fn metadata_carries_session_and_step() {
        let mut session = AgentSession::new("abc", "task");
        session.step = 2;
        let metadata = session.heuristic_metadata();
        assert_eq!(metadata["session_id"], "abc");
        assert_eq!(metadata["step"], 2);
    }

    #[test]
    fn sandbox_outputs_are_remembered() {
        let mut session = AgentSession::new("s", "task");
        session.record_sandbox_output("def solve(): pass", "FINAL_ANSWER: 1", true);
        let item = &session.memory.items()[0];
        assert_eq!(item.tool_name, "solve_sandbox");
        assert_eq!(item.tool_args["plan"], "def solve(): pass");
        assert_eq!(item.tool_result["result"], "FINAL_ANSWER: 1");
        assert_eq!(item.tags, vec!["sandbox"]);
        assert!(item.text.starts_with("Output of solve_sandbox:"));
    }

    #[test]
    fn committed_answer_is_persisted_to_transcript() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = AgentSession::new("s-9", "what is 6*7").with_transcript(temp.path());
        session.record_sandbox_output("def solve(): ...", "FINAL_ANSWER: 42", true);
        session.commit_final_answer("FINAL_ANSWER: 42".to_string());

        let path = session.transcript().expect("transcript").path();
        let records = read_records(path).expect("read");
        assert_eq!(records.len(), 3);
        let pair = extract_pair(&records).expect("pair");
        assert_eq!(pair.query, "what is 6*7");
        assert_eq!(pair.answer, "FINAL_ANSWER: 42");
        assert_eq!(
            session.state.final_answer.as_deref(),
            Some("FINAL_ANSWER: 42")
        );
    }
}
