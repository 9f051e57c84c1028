//! Built-in heuristics.
//!
//! Every unit here is a pure function of its context. Parameterised units
//! take their knobs at construction time and are immutable afterwards.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::heuristics::{Heuristic, HeuristicContext, HeuristicResult, Severity};

static DRIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Za-z]):\\").unwrap());
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

const REDACTED: &str = "[REDACTED]";
const LONG_INPUT_CHARS: usize = 2000;

/// Flags Windows paths on drive letters outside `c..=o`.
pub struct InvalidFileDetector;

impl Heuristic for InvalidFileDetector {
    fn id(&self) -> &str {
        "invalid_file_detector"
    }

    fn description(&self) -> &str {
        "Validate file existence patterns and reject unsupported paths."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let suspicious = DRIVE_RE
            .captures(&ctx.user_input)
            .and_then(|caps| caps[1].chars().next())
            .is_some_and(|letter| !('c'..='o').contains(&letter.to_ascii_lowercase()));
        if suspicious {
            return Ok(HeuristicResult::pass()
                .with_note("Suspicious drive letter detected in query")
                .with_flag("suspicious_path", true)
                .with_severity(Severity::Info));
        }
        Ok(HeuristicResult::pass())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputValidationParams {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for InputValidationParams {
    fn default() -> Self {
        Self {
            min_len: 1,
            max_len: 10_000,
        }
    }
}

/// Length bounds on the working text. Over-long input is truncated.
#[derive(Default)]
pub struct InputValidationSystem {
    params: InputValidationParams,
}

impl InputValidationSystem {
    pub fn new(params: InputValidationParams) -> Result<Self> {
        if params.max_len == 0 {
            bail!("input_validation_system: max_len must be >= 1");
        }
        Ok(Self { params })
    }
}

impl Heuristic for InputValidationSystem {
    fn id(&self) -> &str {
        "input_validation_system"
    }

    fn description(&self) -> &str {
        "Validate structure and basic constraints for inputs."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let length = ctx.user_input.chars().count();
        if length < self.params.min_len {
            return Ok(HeuristicResult::pass()
                .with_note("input_too_short")
                .with_severity(Severity::Error));
        }
        if length > self.params.max_len {
            let trimmed: String = ctx.user_input.chars().take(self.params.max_len).collect();
            return Ok(HeuristicResult::pass()
                .with_rewrite(trimmed)
                .with_note("input_trimmed")
                .with_flag("original_length", length)
                .with_severity(Severity::Warn));
        }
        Ok(HeuristicResult::pass())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BannedWordsParams {
    pub banned: Vec<String>,
}

impl Default for BannedWordsParams {
    fn default() -> Self {
        Self {
            banned: vec![
                "password".to_string(),
                "apikey".to_string(),
                "token".to_string(),
            ],
        }
    }
}

/// Masks configured words, case-insensitively.
pub struct BannedWordsFilter {
    patterns: Vec<(String, Regex)>,
}

impl BannedWordsFilter {
    pub fn new(params: BannedWordsParams) -> Result<Self> {
        let patterns = params
            .banned
            .into_iter()
            .filter(|word| !word.is_empty())
            .map(|word| {
                let regex = RegexBuilder::new(&regex::escape(&word))
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("compile banned word {word:?}"))?;
                Ok((word, regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl Default for BannedWordsFilter {
    fn default() -> Self {
        Self::new(BannedWordsParams::default()).expect("default banned words are valid patterns")
    }
}

impl Heuristic for BannedWordsFilter {
    fn id(&self) -> &str {
        "banned_words_filter"
    }

    fn description(&self) -> &str {
        "Filter and mask banned words from the query."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let mut masked = ctx.user_input.clone();
        let mut found = Vec::new();
        for (word, regex) in &self.patterns {
            // Detection runs on the original text, masking on the running result.
            if regex.is_match(&ctx.user_input) {
                found.push(word.clone());
                masked = regex.replace_all(&masked, REDACTED).into_owned();
            }
        }
        if found.is_empty() {
            return Ok(HeuristicResult::pass());
        }
        Ok(HeuristicResult::pass()
            .with_rewrite(masked)
            .with_note(format!("banned_terms_masked: {found:?}"))
            .with_flag("banned_terms_found", found)
            .with_severity(Severity::Warn))
    }
}

/// Counts word tokens as a rough complexity score.
pub struct QueryComplexityAnalyzer;

impl Heuristic for QueryComplexityAnalyzer {
    fn id(&self) -> &str {
        "query_complexity_analyzer"
    }

    fn description(&self) -> &str {
        "Estimate query complexity via token-like heuristics."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let score = WORD_RE.find_iter(&ctx.user_input).count();
        Ok(HeuristicResult::pass()
            .with_note(format!("complexity_score={score}"))
            .with_flag("complexity_score", score)
            .with_severity(Severity::Info))
    }
}

/// Hints which tool families fit the query.
pub struct ToolUsageOptimizer;

impl Heuristic for ToolUsageOptimizer {
    fn id(&self) -> &str {
        "tool_usage_optimizer"
    }

    fn description(&self) -> &str {
        "Hint tool selection: prefer web/doc tools when query mentions URLs/docs."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let text = ctx.user_input.to_lowercase();
        let mut result = HeuristicResult::pass().with_severity(Severity::Info);
        if text.contains("http://") || text.contains("https://") {
            result = result.with_flag("prefer_web_tools", true);
        }
        if ["pdf", "document", "doc", "paper"].iter().any(|hint| text.contains(hint)) {
            result = result.with_flag("prefer_document_tools", true);
        }
        Ok(result)
    }
}

/// Suggests a retry when interim output looks like a transient failure.
pub struct ErrorPatternDetector;

impl Heuristic for ErrorPatternDetector {
    fn id(&self) -> &str {
        "error_pattern_detector"
    }

    fn description(&self) -> &str {
        "Detect common error patterns in interim results and suggest retry."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let Some(interim) = ctx.interim_result.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(HeuristicResult::pass());
        };
        let text = interim.to_lowercase();
        let retry = ["timeout", "rate limit", "exceeded max tool calls"]
            .iter()
            .any(|pattern| text.contains(pattern));
        if !retry {
            return Ok(HeuristicResult::pass());
        }
        Ok(HeuristicResult::pass()
            .with_flag("retry_suggested", true)
            .with_severity(Severity::Warn))
    }
}

/// Checks that brace-delimited interim output parses as JSON.
pub struct ResponseFormatValidator;

impl Heuristic for ResponseFormatValidator {
    fn id(&self) -> &str {
        "response_format_validator"
    }

    fn description(&self) -> &str {
        "Ensure interim result can be parsed; if JSON-like, validate minimal structure."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let Some(interim) = ctx.interim_result.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(HeuristicResult::pass());
        };
        let text = interim.trim();
        if !(text.starts_with('{') && text.ends_with('}')) {
            return Ok(HeuristicResult::pass());
        }
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(_) => Ok(HeuristicResult::pass()
                .with_note("json_parse_ok")
                .with_severity(Severity::Info)),
            Err(_) => Ok(HeuristicResult::pass()
                .with_note("json_parse_failed")
                .with_severity(Severity::Warn)),
        }
    }
}

/// Placeholder for a history lookup; always reports no match.
pub struct HistoricalPatternRecognizer;

impl Heuristic for HistoricalPatternRecognizer {
    fn id(&self) -> &str {
        "historical_pattern_recognizer"
    }

    fn description(&self) -> &str {
        "Surface that past runs with similar wording were successful."
    }

    fn run(&self, _ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let hint = "similar_past_query_found";
        Ok(HeuristicResult::pass()
            .with_note(hint)
            .with_flag(hint, false)
            .with_severity(Severity::Info))
    }
}

/// Suggests a shorter timeout for very long inputs.
pub struct TimeoutManager;

impl Heuristic for TimeoutManager {
    fn id(&self) -> &str {
        "timeout_manager"
    }

    fn description(&self) -> &str {
        "Raise urgency/severity if long content with web/doc hints."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        if ctx.user_input.chars().count() <= LONG_INPUT_CHARS {
            return Ok(HeuristicResult::pass());
        }
        Ok(HeuristicResult::pass()
            .with_note("long_input_detected")
            .with_flag("suggest_shorter_timeout", true)
            .with_severity(Severity::Info))
    }
}

/// Keyword intent extraction.
pub struct QueryIntentMatcher;

impl Heuristic for QueryIntentMatcher {
    fn id(&self) -> &str {
        "query_intent_matcher"
    }

    fn description(&self) -> &str {
        "Extract simple intents from the query using regex rules."
    }

    fn run(&self, ctx: &HeuristicContext) -> Result<HeuristicResult> {
        let text = ctx.user_input.to_lowercase();
        let intent = if ["price", "cost", "how much"].iter().any(|k| text.contains(k)) {
            Some("ask_price")
        } else if ["who", "person", "name"].iter().any(|k| text.contains(k)) {
            Some("ask_person")
        } else {
            None
        };
        match intent {
            Some(intent) => Ok(HeuristicResult::pass()
                .with_flag("intent", intent)
                .with_severity(Severity::Info)),
            None => Ok(HeuristicResult::pass()),
        }
    }
}
