//! External collaborators of the agent loop.
//!
//! Tool selection, plan generation, code execution and tool lookup live
//! outside this crate. The loop only consumes their outputs through these
//! traits; tests plug in scripted implementations from `test_support`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::{AgentSession, MemoryItem};

/// Servers chosen by perception for the current input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptionResult {
    pub selected_servers: BTreeSet<String>,
    /// Free-form rationale from the perception model, if any.
    #[serde(default)]
    pub rationale: Option<String>,
}

impl PerceptionResult {
    pub fn with_servers<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_servers: servers.into_iter().map(Into::into).collect(),
            rationale: None,
        }
    }
}

/// A tool exposed by some server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Render tool descriptors as the `{tool_descriptions}` prompt block.
pub fn summarize_tools(tools: &[ToolInfo]) -> String {
    tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
pub trait Perception: Send + Sync {
    async fn perceive(&self, session: &AgentSession, text: &str) -> Result<PerceptionResult>;
}

/// Resolves server names to the tools they expose.
pub trait ToolDispatcher: Send + Sync {
    fn tools_for_servers(&self, servers: &BTreeSet<String>) -> Vec<ToolInfo>;
}

/// Everything a planner needs for one call.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub user_input: &'a str,
    pub perception: &'a PerceptionResult,
    pub memory_items: &'a [MemoryItem],
    pub tool_descriptions: &'a str,
    pub prompt_path: &'a Path,
    /// One-based step number.
    pub step_num: u32,
    pub max_steps: u32,
}

/// Produces plan text (normally a `solve()` function) for the sandbox.
///
/// An `Err` is terminal for the run; malformed text is not an error.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String>;
}

/// Runs a plan and returns its raw textual output.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(&self, plan: &str, dispatcher: &dyn ToolDispatcher) -> Result<String>;
}

/// Text completion backend used by `ModelPlanner`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}
