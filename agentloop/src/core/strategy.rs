//! Prompt variant selection for the planning call.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How aggressively the planner commits to a single tool path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningMode {
    #[default]
    Conservative,
    Exploratory,
}

/// How exploratory planning fans out across candidate tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplorationMode {
    #[default]
    Parallel,
    Sequential,
}

/// Prompt template locations, one per planning variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptPaths {
    pub conservative: PathBuf,
    pub exploratory_parallel: PathBuf,
    pub exploratory_sequential: PathBuf,
    /// Used while a forwarded result is being resumed, to push toward a final answer.
    pub summarize: PathBuf,
}

impl Default for PromptPaths {
    fn default() -> Self {
        Self {
            conservative: PathBuf::from("prompts/decision_prompt_conservative.txt"),
            exploratory_parallel: PathBuf::from("prompts/decision_prompt_exploratory_parallel.txt"),
            exploratory_sequential: PathBuf::from(
                "prompts/decision_prompt_exploratory_sequential.txt",
            ),
            summarize: PathBuf::from("prompts/decision_prompt_summarize.txt"),
        }
    }
}

/// Pick the prompt for the next planning call.
///
/// An active input override always selects the summarization prompt.
pub fn select_prompt_path(
    prompts: &PromptPaths,
    planning: PlanningMode,
    exploration: ExplorationMode,
    override_active: bool,
) -> &Path {
    if override_active {
        return &prompts.summarize;
    }
    match (planning, exploration) {
        (PlanningMode::Conservative, _) => &prompts.conservative,
        (PlanningMode::Exploratory, ExplorationMode::Parallel) => &prompts.exploratory_parallel,
        (PlanningMode::Exploratory, ExplorationMode::Sequential) => {
            &prompts.exploratory_sequential
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_forces_summarize() {
        let prompts = PromptPaths::default();
        let path = select_prompt_path(
            &prompts,
            PlanningMode::Exploratory,
            ExplorationMode::Sequential,
            true,
        );
        assert_eq!(path, prompts.summarize.as_path());
    }

    #[test]
    fn conservative_ignores_exploration_mode() {
        let prompts = PromptPaths::default();
        for exploration in [ExplorationMode::Parallel, ExplorationMode::Sequential] {
            let path = select_prompt_path(&prompts, PlanningMode::Conservative, exploration, false);
            assert_eq!(path, prompts.conservative.as_path());
        }
    }

    #[test]
    fn exploratory_follows_exploration_mode() {
        let prompts = PromptPaths::default();
        assert_eq!(
            select_prompt_path(
                &prompts,
                PlanningMode::Exploratory,
                ExplorationMode::Sequential,
                false
            ),
            prompts.exploratory_sequential.as_path()
        );
    }
}
