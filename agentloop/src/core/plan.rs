//! Plan text recognition.

use std::sync::LazyLock;

use regex::Regex;

static SOLVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(async\s+)?def\s+solve\s*\(").unwrap());

/// Returns true if `plan` defines a `solve` function (optionally `async`) on any line.
pub fn is_solve_plan(plan: &str) -> bool {
    SOLVE_RE.is_match(plan)
}

/// Strip a surrounding markdown code fence (and a leading `python` tag) from model output.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let inner = trimmed.trim_matches('`').trim();
    match inner.get(..6) {
        Some(tag) if tag.eq_ignore_ascii_case("python") => inner[6..].trim().to_string(),
        _ => inner.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sync_and_async_solve() {
        assert!(is_solve_plan("def solve():\n    return 1"));
        assert!(is_solve_plan("import math\n\nasync def solve(ctx):\n    pass"));
        assert!(is_solve_plan("  ASYNC  DEF Solve (x):"));
    }

    #[test]
    fn rejects_other_functions() {
        assert!(!is_solve_plan("def solver():\n    pass"));
        assert!(!is_solve_plan("FINAL_ANSWER: [unknown]"));
        assert!(!is_solve_plan("x = solve()"));
    }

    #[test]
    fn strips_python_fence() {
        let raw = "```python\nasync def solve():\n    return 1\n```";
        assert_eq!(strip_code_fence(raw), "async def solve():\n    return 1");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(
            strip_code_fence("  def solve(): pass "),
            "def solve(): pass"
        );
    }
}
