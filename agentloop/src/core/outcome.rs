//! Deterministic classification of sandbox executor output.
//!
//! The executor speaks a line protocol keyed on literal prefixes. Those
//! prefixes are part of the wire contract and must not change.

/// Prefix marking a terminal answer.
pub const FINAL_ANSWER_PREFIX: &str = "FINAL_ANSWER:";
/// Prefix marking an intermediate result that must be fed into the next step.
pub const FORWARD_PREFIX: &str = "FURTHER_PROCESSING_REQUIRED:";
/// Prefix the sandbox uses to report a failed execution.
pub const SANDBOX_ERROR_PREFIX: &str = "[sandbox error:";

/// Tagged result of one sandbox execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// `FINAL_ANSWER:` output. `literal` is the full trimmed text including the prefix.
    Final { literal: String, payload: String },
    /// `FURTHER_PROCESSING_REQUIRED:` output carrying content for the next step.
    ForwardRequired { payload: String },
    /// `[sandbox error:` output.
    SandboxError { message: String },
    /// Anything else. Treated as a de-facto final answer.
    Plain { text: String },
}

impl SandboxOutcome {
    /// Classify raw executor output by its (whitespace-trimmed) prefix.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if let Some(rest) = text.strip_prefix(FINAL_ANSWER_PREFIX) {
            return Self::Final {
                literal: text.to_string(),
                payload: rest.trim().to_string(),
            };
        }
        if let Some(rest) = text.strip_prefix(FORWARD_PREFIX) {
            // A repeated marker terminates the payload.
            let payload = rest.split(FORWARD_PREFIX).next().unwrap_or_default();
            return Self::ForwardRequired {
                payload: payload.trim().to_string(),
            };
        }
        if text.starts_with(SANDBOX_ERROR_PREFIX) {
            return Self::SandboxError {
                message: text.to_string(),
            };
        }
        Self::Plain {
            text: text.to_string(),
        }
    }

    /// Label used in logs and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Final { .. } => "final",
            Self::ForwardRequired { .. } => "forward_required",
            Self::SandboxError { .. } => "sandbox_error",
            Self::Plain { .. } => "plain",
        }
    }

    /// Whether the execution attempt counts as successful for auditing.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::SandboxError { .. })
    }
}

/// Wrap text as a final-answer literal.
pub fn final_answer_literal(text: &str) -> String {
    format!("{FINAL_ANSWER_PREFIX} {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_answer_keeps_full_literal() {
        let outcome = SandboxOutcome::parse("  FINAL_ANSWER: 42\n");
        assert_eq!(
            outcome,
            SandboxOutcome::Final {
                literal: "FINAL_ANSWER: 42".to_string(),
                payload: "42".to_string(),
            }
        );
    }

    #[test]
    fn forward_payload_is_trimmed() {
        let outcome = SandboxOutcome::parse("FURTHER_PROCESSING_REQUIRED:   page text  ");
        assert_eq!(
            outcome,
            SandboxOutcome::ForwardRequired {
                payload: "page text".to_string(),
            }
        );
    }

    #[test]
    fn forward_payload_stops_at_repeated_marker() {
        let outcome = SandboxOutcome::parse(
            "FURTHER_PROCESSING_REQUIRED: one FURTHER_PROCESSING_REQUIRED: two",
        );
        assert_eq!(
            outcome,
            SandboxOutcome::ForwardRequired {
                payload: "one".to_string(),
            }
        );
    }

    #[test]
    fn sandbox_error_is_not_success() {
        let outcome = SandboxOutcome::parse("[sandbox error: NameError]");
        assert_eq!(outcome.kind(), "sandbox_error");
        assert!(!outcome.is_success());
    }

    #[test]
    fn unrecognized_text_is_plain() {
        let outcome = SandboxOutcome::parse("the answer is 7");
        assert_eq!(
            outcome,
            SandboxOutcome::Plain {
                text: "the answer is 7".to_string(),
            }
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn prefix_must_lead_the_text() {
        let outcome = SandboxOutcome::parse("note: FINAL_ANSWER: 1");
        assert_eq!(outcome.kind(), "plain");
    }

    #[test]
    fn final_literal_wraps_text() {
        assert_eq!(final_answer_literal("[unknown]"), "FINAL_ANSWER: [unknown]");
    }
}
