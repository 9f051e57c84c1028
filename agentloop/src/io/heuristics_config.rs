//! Heuristics pipeline configuration (default `config/heuristics.toml`).
//!
//! ```toml
//! enabled = true
//!
//! [[pre_query]]
//! id = "banned_words_filter"
//! banned = ["password", "secret"]
//!
//! [[post_result]]
//! id = "error_pattern_detector"
//! enabled = false
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::heuristics::engine::HeuristicEngine;
use crate::heuristics::registry::build_unit;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeuristicsDocument {
    /// `false` yields an empty pipeline.
    pub enabled: bool,
    pub pre_query: Vec<UnitEntry>,
    pub post_result: Vec<UnitEntry>,
}

impl Default for HeuristicsDocument {
    fn default() -> Self {
        Self {
            enabled: true,
            pre_query: Vec::new(),
            post_result: Vec::new(),
        }
    }
}

/// One pipeline entry: an id, an enabled switch, and unit-specific overrides.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UnitEntry {
    pub id: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub params: toml::Table,
}

fn default_enabled() -> bool {
    true
}

pub fn parse_document(contents: &str) -> Result<HeuristicsDocument> {
    toml::from_str(contents).context("parse heuristics config")
}

/// Build an engine from a configuration file.
///
/// A missing, unreadable or malformed file yields the default pipeline.
pub fn load_engine(path: &Path) -> HeuristicEngine {
    match read_document(path) {
        Ok(document) => engine_from_document(&document),
        Err(err) => {
            if path.exists() {
                warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "heuristics config unusable, using defaults"
                );
            } else {
                debug!(path = %path.display(), "no heuristics config, using defaults");
            }
            HeuristicEngine::with_defaults()
        }
    }
}

fn read_document(path: &Path) -> Result<HeuristicsDocument> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_document(&contents)
}

/// Resolve a document into a pipeline: pre-query entries, then post-result entries.
///
/// Unknown ids and entries with invalid parameters are skipped. If nothing
/// resolves, the default pipeline is used.
pub fn engine_from_document(document: &HeuristicsDocument) -> HeuristicEngine {
    if !document.enabled {
        debug!("heuristics disabled by config");
        return HeuristicEngine::default();
    }

    let mut units = Vec::new();
    for entry in document.pre_query.iter().chain(&document.post_result) {
        if !entry.enabled {
            continue;
        }
        let Some(id) = entry.id.as_deref() else {
            warn!("heuristics entry without id skipped");
            continue;
        };
        match build_unit(id, &entry.params) {
            Ok(Some(unit)) => units.push(unit),
            Ok(None) => warn!(heuristic = id, "unknown heuristic id skipped"),
            Err(err) => {
                warn!(
                    heuristic = id,
                    error = %format!("{err:#}"),
                    "invalid heuristic parameters, skipped"
                );
            }
        }
    }

    if units.is_empty() {
        debug!("heuristics config resolved no units, using defaults");
        return HeuristicEngine::with_defaults();
    }
    HeuristicEngine::new(units)
}
