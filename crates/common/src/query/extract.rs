//! Response Extractor - Locates the query text inside model output
//!
//! Models often wrap the object in a fenced block, sometimes with a language tag
//! and surrounding prose. The first fenced object wins; otherwise the trimmed
//! response is used as-is. Nothing is validated here.

use regex_lite::Regex;
use std::sync::LazyLock;

/// Fenced block holding an object, with an optional language tag after the fence
static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+.-]*\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
});

/// Text judged most likely to hold the structured query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// Text handed to the parser
    pub text: &'a str,

    /// Complete model response, echoed in parse errors
    pub raw: &'a str,

    /// Whether the text came out of a fenced block
    pub fenced: bool,
}

/// Extract the candidate query text from a raw model response
pub fn extract_candidate(raw: &str) -> Candidate<'_> {
    if let Some(inner) = FENCED_OBJECT.captures(raw).and_then(|caps| caps.get(1)) {
        tracing::debug!(candidate = inner.as_str(), "Extracted query from fenced block");
        return Candidate {
            text: inner.as_str(),
            raw,
            fenced: true,
        };
    }

    tracing::debug!("No fenced block found, parsing the raw response directly");
    Candidate {
        text: raw.trim(),
        raw,
        fenced: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_with_language_tag() {
        let raw = "```json\n{\"aggregate\": [{\"$match\": {\"year\": 2015}}, {\"$limit\": 3}]}\n```";
        let candidate = extract_candidate(raw);

        assert!(candidate.fenced);
        assert_eq!(
            candidate.text,
            "{\"aggregate\": [{\"$match\": {\"year\": 2015}}, {\"$limit\": 3}]}"
        );
        assert_eq!(candidate.raw, raw);
    }

    #[test]
    fn test_fenced_block_without_tag_and_with_prose() {
        let raw = "Here is your query:\n```\n{\n  \"filter\": {\"city\": \"Boston\"}\n}\n```\nLet me know!";
        let candidate = extract_candidate(raw);

        assert!(candidate.fenced);
        assert_eq!(candidate.text, "{\n  \"filter\": {\"city\": \"Boston\"}\n}");
    }

    #[test]
    fn test_fenced_block_keeps_nested_braces() {
        let raw = "```python\n{'filter': {'age': {'$gt': 30}}}\n```";
        let candidate = extract_candidate(raw);

        assert_eq!(candidate.text, "{'filter': {'age': {'$gt': 30}}}");
    }

    #[test]
    fn test_unfenced_response_is_trimmed() {
        let raw = "  \n{\"filter\": {}, \"limit\": 10}\n\n";
        let candidate = extract_candidate(raw);

        assert!(!candidate.fenced);
        assert_eq!(candidate.text, "{\"filter\": {}, \"limit\": 10}");
    }

    #[test]
    fn test_unbalanced_text_passes_through() {
        let raw = "{\"filter\": {\"city\": \"Boston\"";
        let candidate = extract_candidate(raw);

        assert!(!candidate.fenced);
        assert_eq!(candidate.text, raw);
    }

    #[test]
    fn test_fence_without_object_is_ignored() {
        let raw = "```json\n[1, 2, 3]\n```";
        let candidate = extract_candidate(raw);

        assert!(!candidate.fenced);
        assert_eq!(candidate.text, raw);
    }
}
