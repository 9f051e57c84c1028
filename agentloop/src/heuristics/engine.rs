//! Sequential heuristics pipeline.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::heuristics::registry::default_units;
use crate::heuristics::{HeuristicContext, HeuristicResult, HeuristicUnit, Metadata, Severity};

/// Where in the step the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Over the query before perception.
    PreQuery,
    /// Over a tool result before it is forwarded.
    PostResult,
}

/// One unit's verdict, tagged with the unit id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitVerdict {
    pub id: String,
    #[serde(flatten)]
    pub result: HeuristicResult,
}

/// Final working text plus every enabled unit's verdict, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub text: String,
    pub verdicts: Vec<UnitVerdict>,
}

impl PipelineOutput {
    /// Highest severity reported by any unit.
    pub fn max_severity(&self) -> Severity {
        self.verdicts
            .iter()
            .map(|verdict| verdict.result.severity)
            .max()
            .unwrap_or_default()
    }
}

/// Ordered pipeline of heuristic units. Read-only after construction.
#[derive(Debug, Default)]
pub struct HeuristicEngine {
    units: Vec<HeuristicUnit>,
}

impl HeuristicEngine {
    pub fn new(units: Vec<HeuristicUnit>) -> Self {
        Self { units }
    }

    /// Pipeline of all built-ins with default parameters.
    pub fn with_defaults() -> Self {
        Self::new(default_units())
    }

    pub fn units(&self) -> &[HeuristicUnit] {
        &self.units
    }

    pub fn pre_query(&self, user_input: &str, metadata: &Metadata) -> PipelineOutput {
        self.run(Mode::PreQuery, user_input, None, metadata)
    }

    pub fn post_result(
        &self,
        user_input: &str,
        interim_result: &str,
        metadata: &Metadata,
    ) -> PipelineOutput {
        self.run(Mode::PostResult, user_input, Some(interim_result), metadata)
    }

    /// Run every enabled unit in order, threading rewrites.
    ///
    /// The working text starts as the interim result in post-result mode and as
    /// `user_input` otherwise. A failing unit is reported as a warn-level verdict
    /// and never stops the pipeline.
    pub fn run(
        &self,
        mode: Mode,
        user_input: &str,
        interim_result: Option<&str>,
        metadata: &Metadata,
    ) -> PipelineOutput {
        let interim = match mode {
            Mode::PreQuery => None,
            Mode::PostResult => interim_result,
        };
        let mut current = interim.unwrap_or(user_input).to_string();
        let mut verdicts = Vec::with_capacity(self.units.len());

        for unit in self.units.iter().filter(|unit| unit.is_enabled()) {
            let ctx = HeuristicContext {
                user_input: current.clone(),
                interim_result: interim.map(str::to_string),
                metadata: metadata.clone(),
            };
            let mut result = match unit.run(&ctx) {
                Ok(result) => result,
                Err(err) => {
                    warn!(heuristic = unit.id(), error = %err, "heuristic failed");
                    HeuristicResult::pass()
                        .with_note(format!("heuristic_error: {}: {err}", unit.id()))
                        .with_severity(Severity::Warn)
                }
            };

            match result.modified_input.take() {
                Some(text) if !text.is_empty() => {
                    debug!(heuristic = unit.id(), "heuristic rewrote working text");
                    current = text.clone();
                    result.modified_input = Some(text);
                }
                Some(_) => warn!(heuristic = unit.id(), "discarding empty rewrite"),
                None => {}
            }

            verdicts.push(UnitVerdict {
                id: unit.id().to_string(),
                result,
            });
        }

        debug!(?mode, units = verdicts.len(), "heuristics pipeline finished");
        PipelineOutput {
            text: current,
            verdicts,
        }
    }
}
