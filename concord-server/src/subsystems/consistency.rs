//! Consistency engine: answer-consistency scoring over past conversations
//!
//! For the selected conversations:
//! - pair each assistant reply with the most recent unanswered user question
//! - group pairs by normalized question text
//! - embed the (PII-masked, truncated) answers of every question asked 2+ times
//! - group similarity = mean pairwise cosine over the embedded answers
//! - global score = mean of group similarities, scaled to 0-100
//! - per-category score = same computation over the groups a category owns
//!
//! Provider failures are absorbed here: a failed embedding drops that answer
//! from its group, and a group left with fewer than two embedded answers
//! contributes nothing. The outcome carries embed success/failure counters so
//! an outage stays distinguishable from a genuinely perfect score.

use std::collections::{BTreeMap, HashMap};

use concord_core::config::AnalyticsConfig;
use concord_core::embeddings::EmbeddingBackend;
use concord_core::models::Message;
use concord_core::{pii, scoring, store, taxonomy};
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================================
// Types
// ============================================================================

/// One question/answer exchange, derived while scanning a conversation.
/// Never persisted.
#[derive(Debug, Clone)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    pub category: String,
}

/// All exchanges whose questions normalize to the same key.
#[derive(Debug, Clone)]
pub struct QaGroup {
    pub key: String,
    pub items: Vec<QaPair>,
}

impl QaGroup {
    /// Category attribution: the first-seen item owns the group, even when a
    /// later occurrence of the same question classified differently.
    pub fn category(&self) -> &str {
        self.items
            .first()
            .map(|p| p.category.as_str())
            .unwrap_or(taxonomy::FALLBACK_CATEGORY)
    }
}

/// Result of one scoring pass.
///
/// The counters exist for observability: a total provider outage produces the
/// same vacuous scores as a perfectly consistent bot, and only
/// `embed_failed` / `scored_groups` tell the two apart.
#[derive(Debug, Clone)]
pub struct ConsistencyOutcome {
    pub score: f64,
    pub by_category: BTreeMap<String, f64>,
    /// Groups with 2+ occurrences of the same question.
    pub repeated_groups: usize,
    /// Groups that actually produced a similarity sample.
    pub scored_groups: usize,
    pub embed_ok: usize,
    pub embed_failed: usize,
    /// Conversations skipped because their history could not be fetched.
    pub skipped_chats: usize,
}

// ============================================================================
// Normalization and pairing (pure)
// ============================================================================

/// Canonicalize a question into its grouping key: trim, collapse internal
/// whitespace, lowercase, cap the length. No stemming and no synonym folding;
/// collapsing unrelated questions into one group would corrupt the signal.
pub fn normalize_question(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed.to_lowercase(), max_chars)
}

/// Char-based truncation; never splits a UTF-8 scalar.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Scan a conversation in order and pair each assistant reply with the most
/// recent unanswered user question. The latest question always wins; a
/// question with no reply before the next question produces no pair. Messages
/// with empty trimmed content are ignored entirely.
pub fn extract_pairs(messages: &[Message]) -> Vec<QaPair> {
    let mut pairs = Vec::new();
    let mut pending_question: Option<String> = None;

    for message in messages {
        let content = message.content.trim();
        if content.is_empty() {
            continue;
        }

        match message.role.to_ascii_lowercase().as_str() {
            "user" => pending_question = Some(content.to_string()),
            "assistant" => {
                if let Some(question) = pending_question.take() {
                    let category = taxonomy::classify(&question).to_string();
                    pairs.push(QaPair {
                        question,
                        answer: content.to_string(),
                        category,
                    });
                }
            }
            _ => {}
        }
    }

    pairs
}

/// Group pairs by normalized question, preserving first-seen order, and keep
/// only the groups with two or more occurrences. Grouping is a function of
/// question text alone; category and origin play no part.
pub fn group_pairs(pairs: Vec<QaPair>, key_max_chars: usize) -> Vec<QaGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<QaPair>> = HashMap::new();

    for pair in pairs {
        let key = normalize_question(&pair.question, key_max_chars);
        if key.is_empty() {
            continue;
        }
        match grouped.get_mut(&key) {
            Some(items) => items.push(pair),
            None => {
                order.push(key.clone());
                grouped.insert(key, vec![pair]);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let items = grouped.remove(&key)?;
            (items.len() >= 2).then(|| QaGroup { key, items })
        })
        .collect()
}

/// Answer text as it leaves the trust boundary: PII masked, length capped.
fn prepare_answer_text(answer: &str, max_chars: usize) -> String {
    let masked = if pii::contains_pii(answer) {
        pii::mask_pii(answer)
    } else {
        answer.to_string()
    };
    truncate_chars(&masked, max_chars)
}

// ============================================================================
// Scoring
// ============================================================================

/// Embed every answer of the given repeated groups and reduce to scores.
///
/// Embedding calls run concurrently, bounded by `embed_concurrency`, and each
/// result is collated back to its originating item by index, not by completion
/// order. Per-item failures only shrink the sample set.
pub async fn score_groups(
    groups: &[QaGroup],
    backend: &dyn EmbeddingBackend,
    opts: &AnalyticsConfig,
) -> ConsistencyOutcome {
    let jobs: Vec<(usize, usize, String)> = groups
        .iter()
        .enumerate()
        .flat_map(|(gi, group)| {
            group.items.iter().enumerate().map(move |(ii, item)| {
                (
                    gi,
                    ii,
                    prepare_answer_text(&item.answer, opts.answer_embed_max_chars as usize),
                )
            })
        })
        .collect();

    let concurrency = opts.embed_concurrency.max(1) as usize;
    let results: Vec<_> = stream::iter(jobs)
        .map(|(gi, ii, text)| async move {
            let result = backend.embed(&text).await;
            (gi, ii, result)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut embedded: Vec<Vec<Option<Vec<f32>>>> =
        groups.iter().map(|g| vec![None; g.items.len()]).collect();
    let mut embed_ok = 0usize;
    let mut embed_failed = 0usize;

    for (gi, ii, result) in results {
        match result {
            Ok(vector) => {
                embed_ok += 1;
                embedded[gi][ii] = Some(vector);
            }
            Err(e) => {
                embed_failed += 1;
                tracing::warn!(
                    group = %groups[gi].key,
                    error = %e,
                    "answer embedding failed, dropping item from its group"
                );
            }
        }
    }

    let mut group_sims: Vec<f64> = Vec::new();
    let mut per_category: BTreeMap<String, Vec<f64>> = taxonomy::CATEGORIES
        .iter()
        .map(|c| (c.to_string(), Vec::new()))
        .collect();
    let mut scored_groups = 0usize;

    for (gi, group) in groups.iter().enumerate() {
        let vectors: Vec<&Vec<f32>> = embedded[gi].iter().flatten().collect();
        if vectors.len() < 2 {
            // failures reduced this group below the scoreable threshold
            continue;
        }

        let Some(sim) = scoring::mean_pairwise_similarity(&vectors) else {
            continue;
        };

        scored_groups += 1;
        group_sims.push(sim);
        per_category
            .entry(group.category().to_string())
            .or_default()
            .push(sim);
    }

    if scored_groups == 0 && embed_failed > 0 {
        tracing::warn!(
            embed_failed,
            repeated_groups = groups.len(),
            "consistency defaulted to the vacuous score with embedding failures present; check provider health before trusting it"
        );
    }

    let score = scoring::consistency_score(&group_sims);
    let by_category: BTreeMap<String, f64> = per_category
        .into_iter()
        .map(|(category, sims)| (category, scoring::consistency_score(&sims)))
        .collect();

    ConsistencyOutcome {
        score,
        by_category,
        repeated_groups: groups.len(),
        scored_groups,
        embed_ok,
        embed_failed,
        skipped_chats: 0,
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Score answer consistency across the given conversations.
///
/// Missing or empty conversations contribute no pairs; a history fetch
/// failure skips that conversation with a warning (partial data beats no
/// data). Provider failures never escape this function.
pub async fn compute_consistency(
    chat_ids: &[Uuid],
    pool: &PgPool,
    backend: &dyn EmbeddingBackend,
    opts: &AnalyticsConfig,
) -> ConsistencyOutcome {
    let mut pairs: Vec<QaPair> = Vec::new();
    let mut skipped_chats = 0usize;

    for chat_id in chat_ids {
        match store::get_messages(pool, *chat_id).await {
            Ok(messages) => pairs.extend(extract_pairs(&messages)),
            Err(e) => {
                skipped_chats += 1;
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %e,
                    "skipping conversation, history fetch failed"
                );
            }
        }
    }

    let groups = group_pairs(pairs, opts.question_key_max_chars as usize);

    tracing::debug!(
        chats = chat_ids.len(),
        repeated_groups = groups.len(),
        "scoring answer consistency"
    );

    let mut outcome = score_groups(&groups, backend, opts).await;
    outcome.skipped_chats = skipped_chats;
    outcome
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use concord_core::embeddings::EmbeddingError;

    /// Embedding backend with canned vectors keyed by the exact text sent to
    /// it, plus an optional set of texts that fail.
    struct StubBackend {
        vectors: HashMap<String, Vec<f32>>,
        fail_on: Vec<String>,
    }

    impl StubBackend {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                fail_on: Vec::new(),
            }
        }

        fn failing_on(mut self, texts: &[&str]) -> Self {
            self.fail_on = texts.iter().map(|t| t.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if self.fail_on.iter().any(|t| t == text) {
                return Err(EmbeddingError::Api {
                    code: "503".to_string(),
                    message: "stub outage".to_string(),
                });
            }
            self.vectors
                .get(text)
                .cloned()
                .ok_or(EmbeddingError::MissingEmbedding)
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn msg(role: &str, content: &str, seq: i64) -> Message {
        Message {
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        }
    }

    fn opts() -> AnalyticsConfig {
        AnalyticsConfig::default()
    }

    fn pair(question: &str, answer: &str, category: &str) -> QaPair {
        QaPair {
            question: question.to_string(),
            answer: answer.to_string(),
            category: category.to_string(),
        }
    }

    // ========================================================================
    // Normalization
    // ========================================================================

    #[test]
    fn test_normalize_collapses_case_and_whitespace() {
        assert_eq!(
            normalize_question("  What's   the Move-In Date? ", 200),
            "what's the move-in date?"
        );
    }

    #[test]
    fn test_normalize_empty_input_yields_empty_key() {
        assert_eq!(normalize_question("", 200), "");
        assert_eq!(normalize_question("   \t\n ", 200), "");
    }

    #[test]
    fn test_normalize_caps_key_length_on_char_boundary() {
        let long = "ä".repeat(300);
        let key = normalize_question(&long, 200);
        assert_eq!(key.chars().count(), 200);
    }

    #[test]
    fn test_normalize_does_not_stem_or_fold_synonyms() {
        assert_ne!(
            normalize_question("what is the move in date", 200),
            normalize_question("what's the move-in date", 200)
        );
    }

    // ========================================================================
    // Pair extraction
    // ========================================================================

    #[test]
    fn test_extract_pairs_basic_alternation() {
        let messages = vec![
            msg("user", "When is move-in?", 0),
            msg("assistant", "August 15.", 1),
            msg("user", "How do I get a SIM card?", 2),
            msg("assistant", "Any carrier store works.", 3),
        ];

        let pairs = extract_pairs(&messages);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].question, "When is move-in?");
        assert_eq!(pairs[0].answer, "August 15.");
        assert_eq!(pairs[0].category, "Housing");
        assert_eq!(pairs[1].category, "Phone and Connectivity");
    }

    #[test]
    fn test_extract_pairs_latest_question_wins() {
        let messages = vec![
            msg("user", "first question", 0),
            msg("user", "second question about housing", 1),
            msg("assistant", "the answer", 2),
        ];

        let pairs = extract_pairs(&messages);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].question, "second question about housing");
    }

    #[test]
    fn test_extract_pairs_consecutive_assistants_yield_one_pair() {
        let messages = vec![
            msg("user", "When is move-in?", 0),
            msg("assistant", "August 15.", 1),
            msg("assistant", "Anything else?", 2),
        ];

        let pairs = extract_pairs(&messages);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].answer, "August 15.");
    }

    #[test]
    fn test_extract_pairs_ignores_empty_content_entirely() {
        let messages = vec![
            msg("user", "When is move-in?", 0),
            msg("assistant", "   ", 1),
            msg("assistant", "August 15.", 2),
        ];

        // the blank assistant message must not consume the pending question
        let pairs = extract_pairs(&messages);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].answer, "August 15.");
    }

    #[test]
    fn test_extract_pairs_user_only_conversation_yields_nothing() {
        let messages = vec![msg("user", "hello?", 0), msg("user", "anyone there?", 1)];
        assert!(extract_pairs(&messages).is_empty());
    }

    #[test]
    fn test_extract_pairs_ignores_unknown_roles() {
        let messages = vec![
            msg("user", "When is move-in?", 0),
            msg("system", "internal marker", 1),
            msg("assistant", "August 15.", 2),
        ];

        let pairs = extract_pairs(&messages);
        assert_eq!(pairs.len(), 1);
    }

    // ========================================================================
    // Grouping
    // ========================================================================

    #[test]
    fn test_group_pairs_collapses_case_and_whitespace_variants() {
        let pairs = vec![
            pair("When is move-in?", "August 15.", "Housing"),
            pair("  when is   MOVE-IN? ", "August 18.", "Housing"),
            pair("Where do I park?", "Lot B.", "Community and Daily Life"),
        ];

        let groups = group_pairs(pairs, 200);
        assert_eq!(groups.len(), 1, "singleton group must be filtered out");
        assert_eq!(groups[0].items.len(), 2);
        assert_eq!(groups[0].key, "when is move-in?");
    }

    #[test]
    fn test_group_pairs_ignores_category_when_grouping() {
        // classifier drift: same question, different labels, still one group
        let pairs = vec![
            pair("When is move-in?", "August 15.", "Housing"),
            pair("when is move-in?", "August 18.", "Other Inquiries"),
        ];

        let groups = group_pairs(pairs, 200);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].category(), "Housing", "first-seen item owns the group");
    }

    #[test]
    fn test_group_pairs_drops_empty_keys() {
        let pairs = vec![
            pair("  ", "answer a", "Other Inquiries"),
            pair("\t", "answer b", "Other Inquiries"),
        ];

        assert!(group_pairs(pairs, 200).is_empty());
    }

    #[test]
    fn test_group_pairs_preserves_first_seen_order() {
        let pairs = vec![
            pair("question b", "1", "Other Inquiries"),
            pair("question a", "2", "Other Inquiries"),
            pair("question b", "3", "Other Inquiries"),
            pair("question a", "4", "Other Inquiries"),
        ];

        let groups = group_pairs(pairs, 200);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "question b");
        assert_eq!(groups[1].key, "question a");
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    #[tokio::test]
    async fn test_score_groups_vacuous_default_with_no_groups() {
        let backend = StubBackend::new(&[]);
        let outcome = score_groups(&[], &backend, &opts()).await;

        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.by_category.len(), taxonomy::CATEGORIES.len());
        for (category, score) in &outcome.by_category {
            assert_eq!(*score, 100.0, "category {} should default", category);
        }
        assert_eq!(outcome.embed_ok, 0);
        assert_eq!(outcome.embed_failed, 0);
    }

    #[tokio::test]
    async fn test_score_groups_divergent_answers_example() {
        // two answers to the repeated move-in question, embeddings at cosine 0.4
        let b = (1.0f32 - 0.4 * 0.4).sqrt();
        let backend = StubBackend::new(&[
            ("August 15.", vec![1.0, 0.0]),
            ("The move-in date is August 18.", vec![0.4, b]),
        ]);

        let groups = group_pairs(
            vec![
                pair("What's the move-in date?", "August 15.", "Housing"),
                pair(
                    "  what's the MOVE-IN date? ",
                    "The move-in date is August 18.",
                    "Housing",
                ),
            ],
            200,
        );
        assert_eq!(groups.len(), 1);

        let outcome = score_groups(&groups, &backend, &opts()).await;

        assert_eq!(outcome.score, 40.0);
        assert_eq!(outcome.by_category["Housing"], 40.0);
        for (category, score) in &outcome.by_category {
            if category != "Housing" {
                assert_eq!(*score, 100.0, "category {} should default", category);
            }
        }
        assert_eq!(outcome.scored_groups, 1);
        assert_eq!(outcome.embed_ok, 2);
    }

    #[tokio::test]
    async fn test_score_groups_identical_answers_saturate_at_100() {
        let backend = StubBackend::new(&[("August 15.", vec![0.3, 0.7])]);

        let groups = group_pairs(
            vec![
                pair("When is move-in?", "August 15.", "Housing"),
                pair("when is move-in?", "August 15.", "Housing"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;
        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.by_category["Housing"], 100.0);
    }

    #[tokio::test]
    async fn test_score_groups_isolates_single_embed_failure() {
        let backend = StubBackend::new(&[
            ("answer one", vec![1.0, 0.0]),
            ("answer three", vec![1.0, 0.0]),
        ])
        .failing_on(&["answer two"]);

        let groups = group_pairs(
            vec![
                pair("repeated question", "answer one", "Other Inquiries"),
                pair("repeated question", "answer two", "Other Inquiries"),
                pair("repeated question", "answer three", "Other Inquiries"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;

        assert_eq!(outcome.embed_ok, 2);
        assert_eq!(outcome.embed_failed, 1);
        assert_eq!(outcome.scored_groups, 1);
        assert_eq!(outcome.score, 100.0, "remaining identical pair scores clean");
    }

    #[tokio::test]
    async fn test_score_groups_excludes_group_when_all_embeds_fail() {
        let backend =
            StubBackend::new(&[]).failing_on(&["answer one", "answer two"]);

        let groups = group_pairs(
            vec![
                pair("repeated question", "answer one", "Other Inquiries"),
                pair("repeated question", "answer two", "Other Inquiries"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;

        assert_eq!(outcome.embed_failed, 2);
        assert_eq!(outcome.scored_groups, 0);
        assert_eq!(outcome.score, 100.0, "excluded group leaves the vacuous default");
        assert_eq!(outcome.repeated_groups, 1);
    }

    #[tokio::test]
    async fn test_score_groups_skips_zero_norm_vectors() {
        let backend = StubBackend::new(&[
            ("answer one", vec![0.0, 0.0]),
            ("answer two", vec![1.0, 0.0]),
        ]);

        let groups = group_pairs(
            vec![
                pair("repeated question", "answer one", "Other Inquiries"),
                pair("repeated question", "answer two", "Other Inquiries"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;

        // both embeds succeed but the only pair is degenerate
        assert_eq!(outcome.embed_ok, 2);
        assert_eq!(outcome.scored_groups, 0);
        assert_eq!(outcome.score, 100.0);
    }

    #[tokio::test]
    async fn test_score_groups_masks_pii_before_embedding() {
        // the stub only knows the masked form; an unmasked send would fail
        let backend = StubBackend::new(&[
            ("call <PII> for help", vec![1.0, 0.0]),
            ("just ask at the front desk", vec![1.0, 0.0]),
        ]);

        let groups = group_pairs(
            vec![
                pair("who do i call", "call 555-555-5555 for help", "Other Inquiries"),
                pair("who do i call", "just ask at the front desk", "Other Inquiries"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;
        assert_eq!(outcome.embed_ok, 2);
        assert_eq!(outcome.score, 100.0);
    }

    #[tokio::test]
    async fn test_score_groups_is_deterministic() {
        let b = (1.0f32 - 0.6 * 0.6).sqrt();
        let entries = [
            ("answer one", vec![1.0f32, 0.0]),
            ("answer two", vec![0.6, b]),
        ];

        let groups = group_pairs(
            vec![
                pair("repeated question", "answer one", "Other Inquiries"),
                pair("repeated question", "answer two", "Other Inquiries"),
            ],
            200,
        );

        let first = score_groups(&groups, &StubBackend::new(&entries), &opts()).await;
        let second = score_groups(&groups, &StubBackend::new(&entries), &opts()).await;

        assert_eq!(first.score, second.score);
        assert_eq!(first.by_category, second.by_category);
    }

    #[tokio::test]
    async fn test_scores_stay_in_bounds() {
        // opposite vectors give cosine -1; clamping must floor the score at 0
        let backend = StubBackend::new(&[
            ("answer one", vec![1.0, 0.0]),
            ("answer two", vec![-1.0, 0.0]),
        ]);

        let groups = group_pairs(
            vec![
                pair("repeated question", "answer one", "Other Inquiries"),
                pair("repeated question", "answer two", "Other Inquiries"),
            ],
            200,
        );

        let outcome = score_groups(&groups, &backend, &opts()).await;
        assert_eq!(outcome.score, 0.0);
        for score in outcome.by_category.values() {
            assert!((0.0..=100.0).contains(score));
        }
    }

    #[tokio::test]
    async fn test_multi_conversation_pipeline_without_db() {
        // two conversations asking the same question; union of pairs feeds one group
        let conversation_a = vec![
            msg("user", "When is move-in?", 0),
            msg("assistant", "August 15.", 1),
        ];
        let conversation_b = vec![
            msg("user", "  when is   move-in?", 0),
            msg("assistant", "August 15.", 1),
        ];

        let mut pairs = extract_pairs(&conversation_a);
        pairs.extend(extract_pairs(&conversation_b));

        let groups = group_pairs(pairs, 200);
        assert_eq!(groups.len(), 1);

        let backend = StubBackend::new(&[("August 15.", vec![0.5, 0.5])]);
        let outcome = score_groups(&groups, &backend, &opts()).await;
        assert_eq!(outcome.score, 100.0);
    }
}
