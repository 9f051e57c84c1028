//! Step/lifeline orchestration for one agent run.
//!
//! Each step gets a fresh lifeline budget. Within a step the loop runs
//! pre-query heuristics, perception, planning and sandbox execution until the
//! sandbox yields a terminal answer, forwards an intermediate result into the
//! next step, or the budget runs out.

use std::fmt;
use std::future::Future;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::lifeline::{StepExit, StepRecord, StepState};
use crate::core::outcome::{SandboxOutcome, final_answer_literal};
use crate::core::plan::is_solve_plan;
use crate::core::strategy::{ExplorationMode, PlanningMode, PromptPaths, select_prompt_path};
use crate::core::types::LoopStop;
use crate::heuristics::Severity;
use crate::heuristics::engine::HeuristicEngine;
use crate::io::audit::SubtaskStatus;
use crate::io::collaborators::{
    Perception, PlanRequest, Planner, SandboxExecutor, ToolDispatcher, summarize_tools,
};
use crate::io::config::AgentConfig;
use crate::session::AgentSession;

const SANDBOX_TOOL: &str = "solve_sandbox";
pub const MAX_STEPS_TEXT: &str = "[Max steps reached]";
pub const PLANNER_FAILED_TEXT: &str = "[unknown]";

/// Budgets and prompt selection for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub max_steps: u32,
    pub max_lifelines_per_step: u32,
    pub planning_mode: PlanningMode,
    pub exploration_mode: ExplorationMode,
    pub prompts: PromptPaths,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_lifelines_per_step: config.max_lifelines_per_step,
            planning_mode: config.planning_mode,
            exploration_mode: config.exploration_mode,
            prompts: config.prompts.clone(),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopOutcome {
    pub stop: LoopStop,
    /// The committed `FINAL_ANSWER:` literal.
    pub result: String,
    /// One entry per step that ran, in order.
    pub steps: Vec<StepRecord>,
}

/// Returned (inside `anyhow::Error`) when a run is cancelled mid-flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCancelledError {
    pub session_id: String,
    pub step: u32,
}

impl fmt::Display for RunCancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} cancelled during step {}",
            self.session_id,
            self.step + 1
        )
    }
}

impl std::error::Error for RunCancelledError {}

/// Outcome of one attempt inside a step.
enum Attempt {
    /// A lifeline was spent; try again if any remain.
    Retry,
    NoTools,
    Forwarded,
    Done(String),
}

pub struct AgentLoop<P, L, S, D> {
    perception: P,
    planner: L,
    sandbox: S,
    dispatcher: D,
    engine: HeuristicEngine,
    config: LoopConfig,
}

impl<P, L, S, D> AgentLoop<P, L, S, D>
where
    P: Perception,
    L: Planner,
    S: SandboxExecutor,
    D: ToolDispatcher,
{
    pub fn new(
        perception: P,
        planner: L,
        sandbox: S,
        dispatcher: D,
        engine: HeuristicEngine,
        config: LoopConfig,
    ) -> Self {
        Self {
            perception,
            planner,
            sandbox,
            dispatcher,
            engine,
            config,
        }
    }

    pub fn perception(&self) -> &P {
        &self.perception
    }

    pub fn planner(&self) -> &L {
        &self.planner
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    /// Drive `session` to a terminal answer.
    ///
    /// Never fails: planner errors and exhausted budgets resolve to literal
    /// `FINAL_ANSWER:` results.
    #[instrument(
        skip_all,
        fields(session_id = %session.session_id, max_steps = self.config.max_steps)
    )]
    pub async fn run(&self, session: &mut AgentSession) -> LoopOutcome {
        let mut steps = Vec::new();

        for step in 0..self.config.max_steps {
            session.step = step;
            let mut state = StepState::new(step, self.config.max_lifelines_per_step);
            info!(step = step + 1, "step starting");

            let exit = loop {
                if !state.has_lifelines() {
                    warn!(step = step + 1, "lifelines exhausted");
                    break StepExit::LifelinesExhausted;
                }
                match self.attempt(session, &mut state).await {
                    Attempt::Retry => {
                        debug!(remaining = state.lifelines_remaining, "retrying step");
                    }
                    Attempt::NoTools => break StepExit::NoTools,
                    Attempt::Forwarded => break StepExit::Forwarded,
                    Attempt::Done(literal) => {
                        steps.push(StepRecord::from_state(&state, StepExit::Done));
                        session.commit_final_answer(literal.clone());
                        info!(step = step + 1, "final answer committed");
                        return LoopOutcome {
                            stop: LoopStop::Done,
                            result: literal,
                            steps,
                        };
                    }
                }
            };
            steps.push(StepRecord::from_state(&state, exit));
        }

        warn!("max steps reached without a final answer");
        let literal = final_answer_literal(MAX_STEPS_TEXT);
        session.commit_final_answer(literal.clone());
        LoopOutcome {
            stop: LoopStop::MaxStepsExhausted,
            result: literal,
            steps,
        }
    }

    /// Like [`AgentLoop::run`], but abandons the run when `cancel` resolves first.
    ///
    /// A cancelled run commits no final answer and fails with [`RunCancelledError`].
    pub async fn run_until_cancelled<C>(
        &self,
        session: &mut AgentSession,
        cancel: C,
    ) -> Result<LoopOutcome>
    where
        C: Future<Output = ()>,
    {
        let finished = tokio::select! {
            outcome = self.run(session) => Some(outcome),
            () = cancel => None,
        };
        match finished {
            Some(outcome) => Ok(outcome),
            None => {
                warn!(session_id = %session.session_id, step = session.step + 1, "run cancelled");
                Err(RunCancelledError {
                    session_id: session.session_id.clone(),
                    step: session.step,
                }
                .into())
            }
        }
    }

    async fn attempt(&self, session: &mut AgentSession, state: &mut StepState) -> Attempt {
        let metadata = session.heuristic_metadata();
        let pre = self.engine.pre_query(session.current_input(), &metadata);
        if pre.max_severity() >= Severity::Warn {
            debug!(severity = ?pre.max_severity(), "pre-query heuristics raised concerns");
        }

        let perception = match self.perception.perceive(session, &pre.text).await {
            Ok(perception) => perception,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "perception failed, aborting step");
                return Attempt::NoTools;
            }
        };
        let tools = self.dispatcher.tools_for_servers(&perception.selected_servers);
        if tools.is_empty() {
            warn!("no tools selected, aborting step");
            return Attempt::NoTools;
        }
        let tool_descriptions = summarize_tools(&tools);

        let override_active = session.state.user_input_override.is_some();
        let prompt_path = select_prompt_path(
            &self.config.prompts,
            self.config.planning_mode,
            self.config.exploration_mode,
            override_active,
        );
        let request = PlanRequest {
            user_input: session.current_input(),
            perception: &perception,
            memory_items: session.memory.items(),
            tool_descriptions: &tool_descriptions,
            prompt_path,
            step_num: state.step_index + 1,
            max_steps: self.config.max_steps,
        };
        let plan = match self.planner.plan(&request).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "planning failed");
                return Attempt::Done(final_answer_literal(PLANNER_FAILED_TEXT));
            }
        };

        if !is_solve_plan(&plan) {
            state.consume();
            warn!(
                remaining = state.lifelines_remaining,
                "plan has no solve() function"
            );
            return Attempt::Retry;
        }

        record_subtask(session, SubtaskStatus::Pending);
        let outcome = match self.sandbox.execute(&plan, &self.dispatcher).await {
            Ok(raw) => SandboxOutcome::parse(&raw),
            Err(err) => SandboxOutcome::SandboxError {
                message: format!("{err:#}"),
            },
        };
        debug!(kind = outcome.kind(), "sandbox finished");
        // Forwarded payloads reach the planner only through the masked override.
        if !matches!(outcome, SandboxOutcome::ForwardRequired { .. }) {
            session.record_sandbox_output(&plan, &outcome_text(&outcome), outcome.is_success());
        }

        match outcome {
            SandboxOutcome::Final { literal, .. } => {
                record_subtask(session, SubtaskStatus::Success);
                Attempt::Done(literal)
            }
            SandboxOutcome::ForwardRequired { payload } => {
                let post = self
                    .engine
                    .post_result(&session.user_input, &payload, &metadata);
                let framed = forward_framing(&session.user_input, &post.text);
                debug!(chars = framed.len(), "forwarding intermediate result");
                session.state.user_input_override = Some(framed);
                record_subtask(session, SubtaskStatus::Success);
                Attempt::Forwarded
            }
            SandboxOutcome::SandboxError { message } => {
                record_subtask(session, SubtaskStatus::Failure);
                state.consume();
                warn!(
                    error = %message,
                    remaining = state.lifelines_remaining,
                    "sandbox execution failed"
                );
                Attempt::Retry
            }
            SandboxOutcome::Plain { text } => {
                record_subtask(session, SubtaskStatus::Success);
                Attempt::Done(final_answer_literal(&text))
            }
        }
    }
}

/// Input for the step after a forwarded result.
pub fn forward_framing(task: &str, payload: &str) -> String {
    format!(
        "Original user task: {task}\n\n\
         Your last tool produced this result:\n\n\
         {payload}\n\n\
         If this fully answers the task, return:\n\
         FINAL_ANSWER: your answer\n\n\
         Otherwise, return the next FUNCTION_CALL."
    )
}

fn outcome_text(outcome: &SandboxOutcome) -> String {
    match outcome {
        SandboxOutcome::Final { literal, .. } => literal.clone(),
        SandboxOutcome::ForwardRequired { payload } => payload.clone(),
        SandboxOutcome::SandboxError { message } => message.clone(),
        SandboxOutcome::Plain { text } => text.clone(),
    }
}

fn record_subtask(session: &mut AgentSession, status: SubtaskStatus) {
    let step = session.step;
    if let Err(err) = session.subtasks.record(SANDBOX_TOOL, status, step) {
        warn!(error = %format!("{err:#}"), "failed to persist subtask event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_matches_resumption_text() {
        let framed = forward_framing("find x", "x = 3");
        assert_eq!(
            framed,
            "Original user task: find x\n\nYour last tool produced this result:\n\nx = 3\n\n\
             If this fully answers the task, return:\nFINAL_ANSWER: your answer\n\n\
             Otherwise, return the next FUNCTION_CALL."
        );
    }

    #[test]
    fn loop_config_follows_agent_config() {
        let config = AgentConfig {
            max_steps: 7,
            max_lifelines_per_step: 1,
            ..AgentConfig::default()
        };
        let loop_config = LoopConfig::from(&config);
        assert_eq!(loop_config.max_steps, 7);
        assert_eq!(loop_config.max_lifelines_per_step, 1);
        assert_eq!(loop_config.prompts, config.prompts);
    }

    #[test]
    fn cancellation_error_names_the_step() {
        let err = RunCancelledError {
            session_id: "s".to_string(),
            step: 1,
        };
        assert_eq!(err.to_string(), "run s cancelled during step 2");
    }
}
