//! PII detection and masking
//!
//! Pattern-based guard used in two places: blocking PII-bearing user messages
//! on the chat path, and scrubbing answer text before it is sent to the
//! embedding provider. Detection is deliberately rough: it only has to be
//! good enough to keep obvious personal data inside the trust boundary.
//!
//! Covered patterns: SSN-like numbers, phone numbers, email addresses,
//! card-like digit runs, street addresses, "my name is <First Last>" /
//! "I am <First Last>" statements, and age statements.

use regex::Regex;
use std::sync::OnceLock;

const MASK: &str = "<PII>";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // US SSN-like: 123-45-6789 or 123456789
            r"\b\d{3}-\d{2}-\d{4}\b",
            r"\b\d{9}\b",
            // Phone numbers: +1 555-555-5555, (555) 555-5555, 555-555-5555
            r"(?:\+?1[\s-]?)?(?:\(\d{3}\)|\b\d{3})[\s-]?\d{3}[\s-]?\d{4}\b",
            // Email addresses
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            // Credit/debit card-like digit runs
            r"\b(?:\d[ -]*?){13,16}\b",
            // Address-like: number + up to two name words + street word
            r"(?i)\b\d+\s+(?:[A-Za-z]+\s+){0,2}(?:street|st\.?|avenue|ave\.?|road|rd\.?|lane|ln\.?|drive|dr\.?)\b",
            // Name-like: "my name is <First Last>" or "I am <First Last>"
            r"\bmy\s+name\s+is\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b",
            r"\b(?:[Ii]\s*am|[Ii]'m)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b",
            // Age: "I am 23", "I'm 19 years old", "my age is 23"
            r"(?i)\b(?:i\s*am|i'm)\s*(\d{1,2})\s*(?:years?\s*old|yrs?\s*old|y/o)?\b",
            r"(?i)\bmy\s+age\s+is\s*(\d{1,2})\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid PII pattern"))
        .collect()
    })
}

/// Return merged byte spans `(start, end)` for each PII region detected.
pub fn detect_pii_spans(text: &str) -> Vec<(usize, usize)> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    for pattern in patterns() {
        for m in pattern.find_iter(text) {
            spans.push((m.start(), m.end()));
        }
    }

    // Merge overlapping spans conservatively
    spans.sort_by_key(|s| s.0);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

pub fn contains_pii(text: &str) -> bool {
    !detect_pii_spans(text).is_empty()
}

/// Replace every detected PII span with `<PII>`.
pub fn mask_pii(text: &str) -> String {
    let mut out = text.to_string();
    // Replace back-to-front so earlier byte offsets stay valid
    for (start, end) in detect_pii_spans(text).into_iter().rev() {
        out.replace_range(start..end, MASK);
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
