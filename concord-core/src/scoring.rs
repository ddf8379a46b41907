//! Similarity and score-shaping math for the consistency engine
//!
//! Pure CPU work, no suspension points. The conventions here define the
//! engine's edge-case policy:
//! - a zero-norm vector contributes no similarity sample (never NaN),
//! - an empty sample set resolves to the vacuous score of 100.0
//!   (no repeated questions observed means no detected inconsistency),
//! - means are clamped to [0, 1] before scaling to guard against
//!   floating-point drift from near-collinear or near-antiparallel vectors.

/// Score reported when there is no data capable of indicating inconsistency.
pub const VACUOUS_SCORE: f64 = 100.0;

/// Cosine similarity of two vectors, or `None` when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        Some(dot / (norm_a * norm_b))
    } else {
        None
    }
}

/// Mean cosine similarity over every unordered pair of vectors.
/// Returns `None` when no pair produces a valid sample.
pub fn mean_pairwise_similarity<V: AsRef<[f32]>>(vectors: &[V]) -> Option<f64> {
    let mut total = 0.0f64;
    let mut count = 0usize;

    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            if let Some(sim) = cosine_similarity(vectors[i].as_ref(), vectors[j].as_ref()) {
                total += sim;
                count += 1;
            }
        }
    }

    if count > 0 {
        Some(total / count as f64)
    } else {
        None
    }
}

/// Collapse similarity samples into a 0–100 score rounded to one decimal.
/// An empty sample set yields [`VACUOUS_SCORE`].
pub fn consistency_score(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return VACUOUS_SCORE;
    }

    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    round1(clamp01(mean) * 100.0)
}

pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ============================================================================
// TESTS
// ============================================================================
