//! Agent configuration stored as TOML (default `config/agent.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::strategy::{ExplorationMode, PlanningMode, PromptPaths};

/// Agent configuration (TOML).
///
/// Missing fields default to the values used by interactive runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Outer iterations before giving up.
    pub max_steps: u32,

    /// Retries allowed within one step after the first attempt.
    pub max_lifelines_per_step: u32,

    pub planning_mode: PlanningMode,

    pub exploration_mode: ExplorationMode,

    /// Directory holding per-session transcripts.
    pub memory_dir: PathBuf,

    /// Directory holding the history embedding snapshot.
    pub index_dir: PathBuf,

    /// Heuristics pipeline configuration.
    pub heuristics_path: PathBuf,

    /// Few-shot examples folded into each planning prompt.
    pub few_shot_top_k: usize,

    /// Build the postings index alongside the dense snapshot.
    pub accelerate_index: bool,

    pub prompts: PromptPaths,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            max_lifelines_per_step: 3,
            planning_mode: PlanningMode::default(),
            exploration_mode: ExplorationMode::default(),
            memory_dir: PathBuf::from("memory"),
            index_dir: PathBuf::from("history_index"),
            heuristics_path: PathBuf::from("config/heuristics.toml"),
            few_shot_top_k: 2,
            accelerate_index: true,
            prompts: PromptPaths::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.memory_dir.as_os_str().is_empty() {
            return Err(anyhow!("memory_dir must be non-empty"));
        }
        if self.index_dir.as_os_str().is_empty() {
            return Err(anyhow!("index_dir must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
