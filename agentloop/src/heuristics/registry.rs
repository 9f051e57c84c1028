//! Id → constructor registry for configuration-driven pipelines.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::heuristics::HeuristicUnit;
use crate::heuristics::builtin::{
    BannedWordsFilter, ErrorPatternDetector, HistoricalPatternRecognizer, InputValidationSystem,
    InvalidFileDetector, QueryComplexityAnalyzer, QueryIntentMatcher, ResponseFormatValidator,
    TimeoutManager, ToolUsageOptimizer,
};

/// Ids of every built-in heuristic, in default pipeline order.
pub const BUILTIN_IDS: [&str; 10] = [
    "invalid_file_detector",
    "input_validation_system",
    "banned_words_filter",
    "query_complexity_analyzer",
    "tool_usage_optimizer",
    "error_pattern_detector",
    "response_format_validator",
    "historical_pattern_recognizer",
    "timeout_manager",
    "query_intent_matcher",
];

/// The default pipeline: every built-in with default parameters.
pub fn default_units() -> Vec<HeuristicUnit> {
    vec![
        HeuristicUnit::new(InvalidFileDetector),
        HeuristicUnit::new(InputValidationSystem::default()),
        HeuristicUnit::new(BannedWordsFilter::default()),
        HeuristicUnit::new(QueryComplexityAnalyzer),
        HeuristicUnit::new(ToolUsageOptimizer),
        HeuristicUnit::new(ErrorPatternDetector),
        HeuristicUnit::new(ResponseFormatValidator),
        HeuristicUnit::new(HistoricalPatternRecognizer),
        HeuristicUnit::new(TimeoutManager),
        HeuristicUnit::new(QueryIntentMatcher),
    ]
}

/// Build a unit from its id and override parameters.
///
/// Returns `Ok(None)` for unknown ids. Parameters a unit does not recognise
/// are ignored.
pub fn build_unit(id: &str, params: &toml::Table) -> Result<Option<HeuristicUnit>> {
    let unit = match id {
        "invalid_file_detector" => HeuristicUnit::new(InvalidFileDetector),
        "input_validation_system" => {
            HeuristicUnit::new(InputValidationSystem::new(parse_params(id, params)?)?)
        }
        "banned_words_filter" => {
            HeuristicUnit::new(BannedWordsFilter::new(parse_params(id, params)?)?)
        }
        "query_complexity_analyzer" => HeuristicUnit::new(QueryComplexityAnalyzer),
        "tool_usage_optimizer" => HeuristicUnit::new(ToolUsageOptimizer),
        "error_pattern_detector" => HeuristicUnit::new(ErrorPatternDetector),
        "response_format_validator" => HeuristicUnit::new(ResponseFormatValidator),
        "historical_pattern_recognizer" => HeuristicUnit::new(HistoricalPatternRecognizer),
        "timeout_manager" => HeuristicUnit::new(TimeoutManager),
        "query_intent_matcher" => HeuristicUnit::new(QueryIntentMatcher),
        _ => return Ok(None),
    };
    Ok(Some(unit))
}

fn parse_params<T: DeserializeOwned>(id: &str, params: &toml::Table) -> Result<T> {
    toml::Value::Table(params.clone())
        .try_into()
        .with_context(|| format!("parse parameters for {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::HeuristicContext;

    #[test]
    fn defaults_follow_builtin_order() {
        let ids: Vec<String> = default_units().iter().map(|unit| unit.id().to_string()).collect();
        assert_eq!(ids, BUILTIN_IDS);
    }

    #[test]
    fn every_builtin_id_is_registered() {
        for id in BUILTIN_IDS {
            let unit = build_unit(id, &toml::Table::new()).expect("build").expect("registered");
            assert_eq!(unit.id(), id);
        }
    }

    #[test]
    fn unknown_id_is_skipped() {
        assert!(build_unit("nope", &toml::Table::new()).expect("build").is_none());
    }

    #[test]
    fn overrides_reach_the_unit() {
        let params: toml::Table = toml::from_str("max_len = 5\nextra = true").expect("toml");
        let unit = build_unit("input_validation_system", &params)
            .expect("build")
            .expect("registered");
        let result = unit.run(&HeuristicContext::new("abcdefgh")).expect("run");
        assert_eq!(result.modified_input.as_deref(), Some("abcde"));
    }

    #[test]
    fn invalid_overrides_are_errors() {
        let params: toml::Table = toml::from_str("max_len = \"big\"").expect("toml");
        assert!(build_unit("input_validation_system", &params).is_err());
    }
}
