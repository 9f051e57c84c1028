//! Prompt-driven planner backed by a [`LanguageModel`].

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::core::outcome::final_answer_literal;
use crate::core::plan::{is_solve_plan, strip_code_fence};
use crate::io::collaborators::{LanguageModel, PlanRequest, Planner};
use crate::retriever::HistoryRetriever;
use crate::session::MemoryItem;

/// Most recent memory items shown to the model.
const MEMORY_CONTEXT_ITEMS: usize = 8;

/// Fallback plan text when the model does not produce a `solve()` function.
pub const INVALID_PLAN_TEXT: &str = "[Could not generate valid solve()]";

pub struct ModelPlanner<M> {
    model: M,
    retriever: Option<Arc<HistoryRetriever>>,
    few_shot_top_k: usize,
}

impl<M: LanguageModel> ModelPlanner<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            retriever: None,
            few_shot_top_k: 2,
        }
    }

    /// Fold up to `top_k` similar past sessions into each prompt.
    pub fn with_history(mut self, retriever: Arc<HistoryRetriever>, top_k: usize) -> Self {
        self.retriever = Some(retriever);
        self.few_shot_top_k = top_k;
        self
    }

    /// The rendered prompt for `request`.
    pub fn build_prompt(&self, request: &PlanRequest<'_>) -> Result<String> {
        let template = fs::read_to_string(request.prompt_path)
            .with_context(|| format!("read prompt {}", request.prompt_path.display()))?;
        let user_input = self.with_few_shots(request.user_input);
        let memory = memory_context(request.memory_items);
        let values = HashMap::from([
            ("tool_descriptions", request.tool_descriptions),
            ("user_input", user_input.as_str()),
            ("memory_context", memory.as_str()),
        ]);
        Ok(render_template(&template, &values))
    }

    fn with_few_shots(&self, user_input: &str) -> String {
        let Some(retriever) = &self.retriever else {
            return user_input.to_string();
        };
        let shots = retriever.retrieve(user_input, self.few_shot_top_k);
        if shots.is_empty() {
            return user_input.to_string();
        }
        let examples = shots
            .iter()
            .map(|shot| shot.as_shot())
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("{examples}\n\nCurrent Task: {user_input}")
    }
}

#[async_trait]
impl<M: LanguageModel> Planner for ModelPlanner<M> {
    #[instrument(skip_all, fields(step = request.step_num, max_steps = request.max_steps))]
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<String> {
        let prompt = self.build_prompt(request)?;
        let raw = self
            .model
            .generate_text(&prompt)
            .await
            .context("generate plan")?;
        let plan = strip_code_fence(raw.trim());
        if is_solve_plan(&plan) {
            debug!(chars = plan.len(), "model produced solve() plan");
            return Ok(plan);
        }
        warn!("model did not return a solve() function");
        Ok(final_answer_literal(INVALID_PLAN_TEXT))
    }
}

/// Most recent items first, one `- text` line each; `None` when empty.
pub fn memory_context(items: &[MemoryItem]) -> String {
    let lines: Vec<String> = items
        .iter()
        .rev()
        .take(MEMORY_CONTEXT_ITEMS)
        .map(|item| format!("- {}", item.text))
        .collect();
    if lines.is_empty() {
        return "None".to_string();
    }
    lines.join("\n")
}

/// Fill `{name}` placeholders. `{{` and `}}` produce literal braces; unknown
/// placeholders are left as written.
pub fn render_template(template: &str, values: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        let placeholder = tail
            .starts_with('{')
            .then(|| tail.find('}'))
            .flatten()
            .and_then(|end| values.get(&tail[1..end]).map(|value| (end, value)));
        if let Some((end, value)) = placeholder {
            out.push_str(value);
            rest = &tail[end + 1..];
            continue;
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embed::{EMBEDDING_DIM, embed_text, history_text};
    use crate::core::types::HistoryRecord;
    use crate::io::collaborators::PerceptionResult;
    use crate::io::snapshot::{Snapshot, write_snapshot};
    use crate::session::SessionMemory;
    use anyhow::bail;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    struct EchoModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl EchoModel {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate_text(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(message) => bail!("{message}"),
            }
        }
    }

    fn request<'a>(
        prompt_path: &'a Path,
        perception: &'a PerceptionResult,
        memory: &'a [MemoryItem],
    ) -> PlanRequest<'a> {
        PlanRequest {
            user_input: "capital of france",
            perception,
            memory_items: memory,
            tool_descriptions: "- search: Search.",
            prompt_path,
            step_num: 1,
            max_steps: 3,
        }
    }

    fn write_prompt(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("prompt.txt");
        fs::write(
            &path,
            "Tools:\n{tool_descriptions}\nMemory:\n{memory_context}\nTask: {user_input}\nExample: {{\"k\": 1}}",
        )
        .expect("write prompt");
        path
    }

    #[test]
    fn template_fills_known_placeholders_only() {
        let values = HashMap::from([("a", "1"), ("b", "{a}")]);
        assert_eq!(
            render_template("{a}-{b}-{c}-{{a}}", &values),
            "1-{a}-{c}-{a}"
        );
    }

    #[test]
    fn memory_context_is_recent_first_and_capped() {
        assert_eq!(memory_context(&[]), "None");
        let mut memory = SessionMemory::default();
        for i in 0..10 {
            memory.add_tool_output("t", json!({}), json!(i), true, &[]);
        }
        let context = memory_context(memory.items());
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "- Output of t: 9");
        assert_eq!(lines[7], "- Output of t: 2");
    }

    #[tokio::test]
    async fn fenced_solve_plan_is_unwrapped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = write_prompt(temp.path());
        let planner = ModelPlanner::new(EchoModel::replying(
            "```python\nasync def solve():\n    return 1\n```",
        ));
        let perception = PerceptionResult::default();
        let plan = planner
            .plan(&request(&prompt, &perception, &[]))
            .await
            .expect("plan");
        assert_eq!(plan, "async def solve():\n    return 1");

        let prompts = planner.model.prompts.lock().expect("lock");
        assert!(prompts[0].contains("Tools:\n- search: Search."));
        assert!(prompts[0].contains("Memory:\nNone"));
        assert!(prompts[0].ends_with("Example: {\"k\": 1}"));
    }

    #[tokio::test]
    async fn non_solve_reply_becomes_fallback_literal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = write_prompt(temp.path());
        let planner = ModelPlanner::new(EchoModel::replying("I think the answer is Paris"));
        let perception = PerceptionResult::default();
        let plan = planner
            .plan(&request(&prompt, &perception, &[]))
            .await
            .expect("plan");
        assert_eq!(plan, "FINAL_ANSWER: [Could not generate valid solve()]");
    }

    #[tokio::test]
    async fn model_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = write_prompt(temp.path());
        let planner = ModelPlanner::new(EchoModel {
            reply: Err("quota".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let perception = PerceptionResult::default();
        let err = planner
            .plan(&request(&prompt, &perception, &[]))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("quota"));
    }

    #[tokio::test]
    async fn history_shots_prefix_the_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prompt = write_prompt(temp.path());
        let past = HistoryRecord::new("capital of spain", "FINAL_ANSWER: Madrid");
        let index_dir = temp.path().join("index");
        write_snapshot(
            &index_dir,
            &Snapshot {
                dim: EMBEDDING_DIM,
                vectors: embed_text(&history_text(&past.query, &past.answer)),
                metadata: vec![serde_json::to_string(&past).expect("serialize")],
            },
        )
        .expect("write snapshot");

        let planner = ModelPlanner::new(EchoModel::replying("def solve(): pass"))
            .with_history(Arc::new(HistoryRetriever::load(&index_dir)), 2);
        let perception = PerceptionResult::default();
        planner
            .plan(&request(&prompt, &perception, &[]))
            .await
            .expect("plan");

        let prompts = planner.model.prompts.lock().expect("lock");
        assert!(prompts[0].contains(
            "Task: Q: capital of spain\nA: FINAL_ANSWER: Madrid\n\nCurrent Task: capital of france"
        ));
    }
}
