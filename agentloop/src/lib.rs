//! Step/lifeline agent loop with a heuristics pipeline and history retrieval.
//!
//! - **[`core`]**: pure logic (outcome parsing, lifeline accounting, embeddings,
//!   ranking). No I/O.
//! - **[`heuristics`]**: ordered, failure-isolated text rules.
//! - **[`io`]**: collaborator traits, configuration, snapshots, transcripts and
//!   the audit trail.
//!
//! [`looping::AgentLoop`] drives a run; [`indexer`] and [`retriever`] build and
//! query the history index that [`planner::ModelPlanner`] folds into prompts.

pub mod core;
pub mod heuristics;
pub mod indexer;
pub mod io;
pub mod logging;
pub mod looping;
pub mod planner;
pub mod retriever;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
