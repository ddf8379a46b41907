//! Fixed category taxonomy and the keyword topic classifier
//!
//! Maps a message to one of the top-level onboarding categories used for
//! analytics and message events. The classifier does not have to be perfect;
//! just good enough for charts and grouping. Unmatched text falls through to
//! the catch-all category.

/// Top-level categories. Every analytics breakdown contains all of these,
/// even when no message fell into them.
pub const CATEGORIES: [&str; 12] = [
    "Housing",
    "Admissions",
    "Visa and Immigration",
    "Travel and Arrival",
    "Forms and Documentation",
    "Money and Banking",
    "Campus Life and Academics",
    "Health and Safety",
    "Phone and Connectivity",
    "Work and Career",
    "Community and Daily Life",
    "Other Inquiries",
];

/// Catch-all for text no keyword rule claims.
pub const FALLBACK_CATEGORY: &str = "Other Inquiries";

/// Keyword rules, checked in order; first category with a matching keyword wins.
const KEYWORD_RULES: &[(&str, &[&str])] = &[
    (
        "Housing",
        &[
            "housing", "dorm", "residence hall", "apartment", "roommate", "room mate", "move-in",
            "move in", "move-out", "move out", "lease", "contract",
        ],
    ),
    (
        "Admissions",
        &[
            "admission", "apply", "application", "deadline", "gpa", "transcript", "offer letter",
        ],
    ),
    (
        "Visa and Immigration",
        &[
            "visa", "i-20", "i20", "sevis", "ds-2019", "immigration", "consulate",
        ],
    ),
    (
        "Travel and Arrival",
        &[
            "flight", "airport", "arrival", "travel", "pickup", "pick up", "hotel",
            "temporary housing",
        ],
    ),
    (
        "Forms and Documentation",
        &["form", "forms", "document", "documents", "paperwork"],
    ),
    (
        "Money and Banking",
        &[
            "tuition", "fee", "bank", "account", "card", "loan", "scholarship", "assistantship",
            "budget", "money", "rent",
        ],
    ),
    (
        "Campus Life and Academics",
        &[
            "class", "course", "registration", "enroll", "advisor", "adviser", "tutoring", "club",
            "organization", "campus",
        ],
    ),
    (
        "Health and Safety",
        &[
            "insurance", "health", "doctor", "hospital", "clinic", "counseling", "counselling",
            "safety", "emergency",
        ],
    ),
    (
        "Phone and Connectivity",
        &["phone", "sim card", "sim", "wifi", "wi-fi", "internet", "data plan"],
    ),
    (
        "Work and Career",
        &[
            "job", "work", "internship", "cpt", "opt", "career", "employment",
        ],
    ),
    (
        "Community and Daily Life",
        &[
            "grocery", "groceries", "shopping", "bus", "transport", "transportation", "parking",
            "community", "restaurant",
        ],
    ),
];

/// Classify free text into one of the fixed categories. Total: never fails.
pub fn classify(text: &str) -> &'static str {
    if text.is_empty() {
        return FALLBACK_CATEGORY;
    }

    let lowered = text.to_lowercase();

    for (category, keywords) in KEYWORD_RULES {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return category;
        }
    }

    FALLBACK_CATEGORY
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_housing_questions() {
        assert_eq!(classify("When is the move-in date?"), "Housing");
        assert_eq!(classify("Can I pick my roommate?"), "Housing");
    }

    #[test]
    fn test_classify_visa_questions() {
        assert_eq!(classify("How do I get my I-20?"), "Visa and Immigration");
        assert_eq!(classify("SEVIS fee payment steps"), "Visa and Immigration");
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("TUITION payment options"), "Money and Banking");
    }

    #[test]
    fn test_classify_falls_back_to_other() {
        assert_eq!(classify("tell me a story"), FALLBACK_CATEGORY);
        assert_eq!(classify(""), FALLBACK_CATEGORY);
    }

    #[test]
    fn test_rule_order_decides_overlapping_keywords() {
        // "temporary housing" contains "housing", so the Housing rule claims it first
        assert_eq!(classify("where do I find temporary housing"), "Housing");
    }

    #[test]
    fn test_fallback_is_part_of_taxonomy() {
        assert!(CATEGORIES.contains(&FALLBACK_CATEGORY));
    }

    #[test]
    fn test_every_rule_category_is_in_taxonomy() {
        for (category, _) in KEYWORD_RULES {
            assert!(CATEGORIES.contains(category), "unknown category: {}", category);
        }
    }
}
