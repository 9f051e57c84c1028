//! Scripted collaborators and fixtures for loop and index tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::core::strategy::PromptPaths;
use crate::io::collaborators::{
    Perception, PerceptionResult, PlanRequest, Planner, SandboxExecutor, ToolDispatcher, ToolInfo,
};
use crate::planner::memory_context;
use crate::session::AgentSession;

/// What a planner call observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCall {
    pub user_input: String,
    pub prompt_path: PathBuf,
    pub step_num: u32,
    pub memory_len: usize,
    /// `{memory_context}` as the prompt would render it.
    pub memory_context: String,
}

/// One scripted planner reply.
#[derive(Debug, Clone)]
pub enum ScriptedPlan {
    Text(String),
    Fail(String),
}

/// Planner replaying queued replies; the last reply repeats once the queue drains.
pub struct ScriptedPlanner {
    replies: Mutex<VecDeque<ScriptedPlan>>,
    last: Mutex<Option<ScriptedPlan>>,
    calls: Mutex<Vec<PlanCall>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<ScriptedPlan>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Planner that always answers `text`.
    pub fn always(text: &str) -> Self {
        Self::new(vec![ScriptedPlan::Text(text.to_string())])
    }

    pub fn calls(&self) -> Vec<PlanCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("planner calls poisoned"))?
            .push(PlanCall {
                user_input: request.user_input.to_string(),
                prompt_path: request.prompt_path.to_path_buf(),
                step_num: request.step_num,
                memory_len: request.memory_items.len(),
                memory_context: memory_context(request.memory_items),
            });
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("planner script poisoned"))?
            .pop_front();
        let mut last = self.last.lock().map_err(|_| anyhow!("planner script poisoned"))?;
        let reply = match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().ok_or_else(|| anyhow!("planner script is empty"))?,
        };
        match reply {
            ScriptedPlan::Text(text) => Ok(text),
            ScriptedPlan::Fail(message) => bail!("{message}"),
        }
    }
}

/// One scripted sandbox reply.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Output(String),
    Fail(String),
    /// Never completes; used to exercise cancellation.
    Hang,
}

/// Sandbox replaying queued replies; the last reply repeats once the queue drains.
pub struct ScriptedSandbox {
    replies: Mutex<VecDeque<ScriptedRun>>,
    last: Mutex<Option<ScriptedRun>>,
    plans: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(replies: Vec<ScriptedRun>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn outputs(outputs: &[&str]) -> Self {
        Self::new(
            outputs
                .iter()
                .map(|output| ScriptedRun::Output((*output).to_string()))
                .collect(),
        )
    }

    /// Plans executed so far.
    pub fn plans(&self) -> Vec<String> {
        self.plans.lock().map(|plans| plans.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> Result<ScriptedRun> {
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("sandbox script poisoned"))?
            .pop_front();
        let mut last = self.last.lock().map_err(|_| anyhow!("sandbox script poisoned"))?;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                Ok(reply)
            }
            None => last.clone().ok_or_else(|| anyhow!("sandbox script is empty")),
        }
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn execute(&self, plan: &str, _dispatcher: &dyn ToolDispatcher) -> Result<String> {
        self.plans
            .lock()
            .map_err(|_| anyhow!("sandbox plans poisoned"))?
            .push(plan.to_string());
        match self.next_reply()? {
            ScriptedRun::Output(text) => Ok(text),
            ScriptedRun::Fail(message) => bail!("{message}"),
            ScriptedRun::Hang => std::future::pending().await,
        }
    }
}

/// Perception selecting a fixed set of servers, or failing.
pub struct StaticPerception {
    servers: Option<BTreeSet<String>>,
    seen: Mutex<Vec<String>>,
}

impl StaticPerception {
    pub fn selecting(servers: &[&str]) -> Self {
        Self {
            servers: Some(servers.iter().map(|server| (*server).to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            servers: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Texts perception was invoked with, after pre-query heuristics.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Perception for StaticPerception {
    async fn perceive(&self, _session: &AgentSession, text: &str) -> Result<PerceptionResult> {
        self.seen
            .lock()
            .map_err(|_| anyhow!("perception log poisoned"))?
            .push(text.to_string());
        match &self.servers {
            Some(servers) => Ok(PerceptionResult {
                selected_servers: servers.clone(),
                rationale: None,
            }),
            None => bail!("perception model unavailable"),
        }
    }
}

/// Dispatcher with a fixed server → tools table.
#[derive(Debug, Clone, Default)]
pub struct StaticDispatcher {
    servers: BTreeMap<String, Vec<ToolInfo>>,
}

impl StaticDispatcher {
    pub fn with_tool(mut self, server: &str, name: &str, description: &str) -> Self {
        self.servers.entry(server.to_string()).or_default().push(ToolInfo {
            name: name.to_string(),
            description: description.to_string(),
        });
        self
    }
}

impl ToolDispatcher for StaticDispatcher {
    fn tools_for_servers(&self, servers: &BTreeSet<String>) -> Vec<ToolInfo> {
        servers
            .iter()
            .filter_map(|server| self.servers.get(server))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Temporary directory laid out like an agent working directory.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root().join("memory")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root().join("history_index")
    }

    /// Write prompt templates and return their paths.
    pub fn prompts(&self) -> Result<PromptPaths> {
        write_prompts(&self.root().join("prompts"))
    }
}

/// Write a minimal transcript with one query and one final answer.
pub fn write_transcript(dir: &Path, name: &str, query: &str, answer: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let body = serde_json::json!([
        {"type": "run_metadata", "user_query": query},
        {"type": "tool_output", "tool_name": "solve_sandbox", "success": true},
        {"type": "final_answer", "final_answer": answer},
    ]);
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(&body)?)?;
    Ok(path)
}

/// Prompt templates under `dir`, one per variant.
pub fn write_prompts(dir: &Path) -> Result<PromptPaths> {
    fs::create_dir_all(dir)?;
    let prompts = PromptPaths {
        conservative: dir.join("conservative.txt"),
        exploratory_parallel: dir.join("exploratory_parallel.txt"),
        exploratory_sequential: dir.join("exploratory_sequential.txt"),
        summarize: dir.join("summarize.txt"),
    };
    for path in [
        &prompts.conservative,
        &prompts.exploratory_parallel,
        &prompts.exploratory_sequential,
        &prompts.summarize,
    ] {
        fs::write(
            path,
            "Tools:\n{tool_descriptions}\n\nMemory:\n{memory_context}\n\nTask: {user_input}\n",
        )?;
    }
    Ok(prompts)
}
