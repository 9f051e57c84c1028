//! Shared types that cross the core/io boundary.

use serde::{Deserialize, Serialize};

/// One past session reduced to its question and final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub query: String,
    pub answer: String,
}

impl HistoryRecord {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }

    /// Render as a few-shot example block.
    pub fn as_shot(&self) -> String {
        format!("Q: {}\nA: {}", self.query, self.answer)
    }
}

/// Terminal status of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStop {
    /// A final answer was produced (including degraded literals).
    Done,
    /// Every step ran without a terminal answer.
    MaxStepsExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_format_is_stable() {
        let record = HistoryRecord::new("2+2?", "FINAL_ANSWER: 4");
        assert_eq!(record.as_shot(), "Q: 2+2?\nA: FINAL_ANSWER: 4");
    }

    #[test]
    fn record_serializes_with_query_and_answer() {
        let record = HistoryRecord::new("q", "a");
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"query":"q","answer":"a"}"#);
    }
}
