//! Per-step retry budget bookkeeping.

use serde::Serialize;

/// Mutable retry state for one step. Discarded when the step ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub step_index: u32,
    /// Remaining lifelines; `-1` means exhausted.
    pub lifelines_remaining: i64,
    max_lifelines: u32,
}

impl StepState {
    pub fn new(step_index: u32, max_lifelines: u32) -> Self {
        Self {
            step_index,
            lifelines_remaining: i64::from(max_lifelines),
            max_lifelines,
        }
    }

    /// The inner retry loop keeps running while this holds.
    pub fn has_lifelines(&self) -> bool {
        self.lifelines_remaining >= 0
    }

    /// Spend one lifeline. Never drops below the terminal `-1`.
    pub fn consume(&mut self) {
        if self.lifelines_remaining >= 0 {
            self.lifelines_remaining -= 1;
        }
    }

    /// Lifelines spent so far in this step.
    pub fn consumed(&self) -> u32 {
        let spent = i64::from(self.max_lifelines) - self.lifelines_remaining;
        u32::try_from(spent).unwrap_or(0)
    }
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExit {
    /// A terminal answer was produced.
    Done,
    /// An intermediate result was forwarded into the next step.
    Forwarded,
    /// Perception selected no tools; the step was abandoned.
    NoTools,
    /// Every lifeline was spent without a terminal outcome.
    LifelinesExhausted,
}

/// Trace entry for one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Zero-based step index.
    pub step: u32,
    pub lifelines_consumed: u32,
    pub exit: StepExit,
}

impl StepRecord {
    pub fn from_state(state: &StepState, exit: StepExit) -> Self {
        Self {
            step: state.step_index,
            lifelines_consumed: state.consumed(),
            exit,
        }
    }
}
