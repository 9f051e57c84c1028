//! Ordered, failure-isolated text heuristics.
//!
//! A [`Heuristic`] inspects the working text (and, after tool execution, the
//! interim result), may propose a rewrite, and reports a severity-tagged
//! verdict. The [`engine::HeuristicEngine`] threads rewrites through an
//! ordered pipeline; [`registry`] builds units from configuration ids.

pub mod builtin;
pub mod engine;
pub mod registry;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-readable flags attached to a verdict.
pub type Flags = serde_json::Map<String, Value>;

/// Side-channel context (session id, step) passed to every unit.
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Info,
    Warn,
    Error,
}

/// Inputs for one unit invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeuristicContext {
    /// Current working text (already rewritten by earlier units).
    pub user_input: String,
    /// Latest tool output being forwarded, if any.
    pub interim_result: Option<String>,
    pub metadata: Metadata,
}

impl HeuristicContext {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            interim_result: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_interim(mut self, interim: impl Into<String>) -> Self {
        self.interim_result = Some(interim.into());
        self
    }
}

/// Verdict produced by a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicResult {
    /// Replacement working text. Never empty when present.
    pub modified_input: Option<String>,
    pub notes: Option<String>,
    pub flags: Flags,
    pub severity: Severity,
}

impl HeuristicResult {
    /// Verdict with nothing to report.
    pub fn pass() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }

    pub fn with_flag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flags.insert(key.to_string(), value.into());
        self
    }

    /// Propose a rewrite. Empty text is ignored to keep the non-empty invariant.
    pub fn with_rewrite(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.modified_input = Some(text);
        }
        self
    }
}

/// A stateless rule over query text or interim results.
pub trait Heuristic: Send + Sync {
    /// Stable identifier used for configuration lookup.
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Evaluate the rule. Errors are isolated by the engine.
    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult>;
}

/// A configured heuristic in a pipeline.
pub struct HeuristicUnit {
    rule: Box<dyn Heuristic>,
    enabled: bool,
}

impl HeuristicUnit {
    pub fn new(rule: impl Heuristic + 'static) -> Self {
        Self::from_boxed(Box::new(rule))
    }

    pub fn from_boxed(rule: Box<dyn Heuristic>) -> Self {
        Self {
            rule,
            enabled: true,
        }
    }

    /// Keep the unit in the pipeline but never invoke it.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn id(&self) -> &str {
        self.rule.id()
    }

    pub fn description(&self) -> &str {
        self.rule.description()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        self.rule.run(ctx)
    }
}

impl std::fmt::Debug for HeuristicUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicUnit")
            .field("id", &self.id())
            .field("enabled", &self.enabled)
            .finish()
    }
}
