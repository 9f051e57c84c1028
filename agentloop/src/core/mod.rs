//! Deterministic, pure logic shared by the agent loop and the history index.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod embed;
pub mod lifeline;
pub mod outcome;
pub mod plan;
pub mod rank;
pub mod strategy;
pub mod types;
