//! Side-effecting collaborators and persistence.

pub mod audit;
pub mod collaborators;
pub mod config;
pub mod heuristics_config;
pub mod snapshot;
pub mod transcript;
