//! Action extraction from free-text agent output.
//!
//! Agents are asked to finish with `Answer: <action>`, but real completions
//! wrap it in LaTeX, markdown and restated questions. Extraction strips that
//! decoration and takes the text after the *last* `answer`, so a restated
//! "the answer format is ..." earlier in the reply never wins.

use once_cell::sync::Lazy;
use regex::Regex;

/// `\boxed{..}`, `\text{..}`, `\mathrm{..}`, `\mathbf{..}` with no nested braces
static WRAPPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:boxed|text|mathrm|mathbf)\{([^{}]*)\}").expect("static regex")
});

static ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)answer\s*:\s*(.*)").expect("static regex"));

/// Tokens removed after wrappers are unwrapped. `\$` goes before `$`.
const DECORATIONS: &[&str] = &[
    "**", "\\{", "\\}", "\\$", "$", "\\(", "\\)", "\\boxed", "\\text", "\\mathrm", "\\mathbf",
];

/// Extract the canonical action from an agent response.
///
/// Returns an empty string when the response is missing, empty, or has no
/// `answer:` marker. Never fails.
pub fn extract_action(response: Option<&str>) -> String {
    let Some(response) = response.filter(|r| !r.trim().is_empty()) else {
        return String::new();
    };

    let normalized = strip_decorations(response);

    // ASCII lowercasing keeps byte offsets aligned with `normalized`.
    let Some(idx) = normalized.to_ascii_lowercase().rfind("answer") else {
        return String::new();
    };

    ANSWER
        .captures_iter(&normalized[idx..])
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn strip_decorations(text: &str) -> String {
    let mut out = text.to_string();
    loop {
        let unwrapped = WRAPPED.replace_all(&out, "$1").into_owned();
        if unwrapped == out {
            break;
        }
        out = unwrapped;
    }
    for token in DECORATIONS {
        out = out.replace(token, "");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_answer() {
        assert_eq!(extract_action(Some("Some reasoning here.\nAnswer: 42")), "42");
    }

    #[test]
    fn test_last_answer_wins() {
        let text = "The question asks for Answer: <word>.\nAfter thinking...\nAnswer: crane";
        assert_eq!(extract_action(Some(text)), "crane");
    }

    #[test]
    fn test_latex_is_stripped() {
        assert_eq!(extract_action(Some("$\\boxed{Answer: X}$")), "X");
        assert_eq!(extract_action(Some("Final: \\boxed{\\text{Answer: up}}")), "up");
        assert_eq!(extract_action(Some("**Answer:** $\\mathbf{7}$")), "7");
        assert_eq!(extract_action(Some("Answer: \\{1, 2\\}")), "1, 2");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(extract_action(Some("ANSWER : left")), "left");
        assert_eq!(extract_action(Some("answer:RIGHT  ")), "RIGHT");
    }

    #[test]
    fn test_answer_runs_to_end_of_line() {
        let text = "Answer: [[1,2],[3,4]]\nThat is my final move.";
        assert_eq!(extract_action(Some(text)), "[[1,2],[3,4]]");
    }

    #[test]
    fn test_missing_answer() {
        assert_eq!(extract_action(Some("I would move up.")), "");
        assert_eq!(extract_action(Some("")), "");
        assert_eq!(extract_action(Some("   \n")), "");
        assert_eq!(extract_action(None), "");
    }

    #[test]
    fn test_last_answer_without_colon() {
        // The rightmost "answer" has no colon after it, so nothing is captured.
        assert_eq!(extract_action(Some("Answer: 3, or so the answer seems")), "");
    }

    #[test]
    fn test_non_ascii_text_keeps_offsets() {
        assert_eq!(extract_action(Some("Ärger über Ü... Answer: größer")), "größer");
    }
}
