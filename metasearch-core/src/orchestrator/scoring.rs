//! Weighted scoring with position-decay for result items.
//!
//! Each item an engine returns contributes to the combined score of the
//! aggregated result it lands in:
//!
//! ```text
//! contribution   = engine_weight * base
//! base           = item.score              (when the engine supplies one)
//!                | position_decay          (otherwise)
//! position_decay = 1.0 / (1.0 + position_index * 0.1)
//! ```
//!
//! Contributions of duplicates from different engines are summed.

/// Decay factor for the item at 0-based `position` in an engine's batch.
///
/// Position 0 gets 1.0, position 9 gets ~0.53.
pub fn position_decay(position: usize) -> f64 {
    1.0 / (1.0 + position as f64 * 0.1)
}

/// Contribution of one item to its aggregated result.
///
/// Non-finite or negative native scores are ignored in favour of the
/// position decay.
pub fn contribution(engine_weight: f64, native_score: Option<f64>, position: usize) -> f64 {
    let base = native_score
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or_else(|| position_decay(position));
    engine_weight * base
}

/// Sum contributions in a fixed order so the result does not depend on the
/// order duplicates arrived in.
pub fn combine<I>(contributions: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    contributions.into_iter().fold(0.0, |acc, c| acc + c)
}
