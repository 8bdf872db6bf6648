//! Source span provenance type (§3, §4.7.1).

use serde::{Deserialize, Serialize};

/// A `{start, end, text}` triple pointing into the original article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Whitespace-normalize and lowercase for span-text comparison (§4.7.1).
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Validate a span against the original article text (§4.7.1).
///
/// `0 <= start < end <= len(article)` and the whitespace-normalized,
/// case-insensitive slice must equal the span's `text`.
pub fn validate_span(article: &str, span: &SourceSpan) -> bool {
    if span.start >= span.end || span.end > article.len() {
        return false;
    }
    // Guard against slicing inside a multi-byte char boundary.
    if !article.is_char_boundary(span.start) || !article.is_char_boundary(span.end) {
        return false;
    }
    let slice = &article[span.start..span.end];
    normalize_ws(slice) == normalize_ws(&span.text)
}

/// Filter `spans` down to those that validate against `article`, dropping
/// invalid ones silently (§4.7.1).
pub fn validate_spans(article: &str, spans: Vec<SourceSpan>) -> Vec<SourceSpan> {
    spans.into_iter().filter(|s| validate_span(article, s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_span_passes() {
        let article = "Juan Perez was arrested in Dallas, TX.";
        let span = SourceSpan {
            start: 0,
            end: 10,
            text: "Juan Perez".to_string(),
        };
        assert!(validate_span(article, &span));
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let article = "Juan   Perez was arrested.";
        let span = SourceSpan {
            start: 0,
            end: 13,
            text: "juan perez".to_string(),
        };
        assert!(validate_span(article, &span));
    }

    #[test]
    fn out_of_range_span_is_invalid() {
        let article = "short";
        let span = SourceSpan {
            start: 0,
            end: 50,
            text: "short".to_string(),
        };
        assert!(!validate_span(article, &span));
    }

    #[test]
    fn start_not_less_than_end_is_invalid() {
        let article = "short text";
        let span = SourceSpan {
            start: 5,
            end: 5,
            text: "".to_string(),
        };
        assert!(!validate_span(article, &span));
    }

    #[test]
    fn mismatched_text_is_invalid() {
        let article = "Juan Perez was arrested.";
        let span = SourceSpan {
            start: 0,
            end: 10,
            text: "John Smith".to_string(),
        };
        assert!(!validate_span(article, &span));
    }

    #[test]
    fn validate_spans_drops_invalid_keeps_valid() {
        let article = "Juan Perez was arrested in Dallas.";
        let spans = vec![
            SourceSpan {
                start: 0,
                end: 10,
                text: "Juan Perez".to_string(),
            },
            SourceSpan {
                start: 0,
                end: 10,
                text: "wrong".to_string(),
            },
        ];
        let valid = validate_spans(article, spans);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].text, "Juan Perez");
    }
}
