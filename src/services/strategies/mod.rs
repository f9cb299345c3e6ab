use rand::{seq::SliceRandom, Rng};
use std::collections::HashSet;

use crate::{error::AppResult, models::Recommendation, models::RecommendationRequest};

pub mod collaborative;
pub mod content_based;
pub mod context_aware;
pub mod discovery;
pub mod popularity;

pub use collaborative::CollaborativeFilteringStrategy;
pub use content_based::ContentBasedStrategy;
pub use context_aware::ContextAwareStrategy;
pub use discovery::DiscoveryStrategy;
pub use popularity::PopularityBasedStrategy;

/// One recommendation heuristic
///
/// Strategies are stateless aside from read-only repository access.
/// Expected "no data" conditions (no similar users, no taste profile, no
/// request context) return an empty list, never an error; errors are
/// reserved for genuine repository failures.
#[async_trait::async_trait]
pub trait RecommendationStrategy: Send + Sync {
    async fn recommend(&self, request: &RecommendationRequest)
        -> AppResult<Vec<Recommendation>>;

    /// Stable name used for weighting, logging, and result attribution
    fn name(&self) -> &'static str;
}

/// Drops candidates the request explicitly excludes
pub fn filter_excluded_songs(
    recommendations: Vec<Recommendation>,
    exclude_song_ids: &HashSet<String>,
) -> Vec<Recommendation> {
    if exclude_song_ids.is_empty() {
        return recommendations;
    }
    recommendations
        .into_iter()
        .filter(|r| !exclude_song_ids.contains(&r.song_id))
        .collect()
}

/// Linearly rescales scores to [0, 1]
///
/// When max == min the scores are left unchanged rather than dividing by
/// zero. Idempotent on a list already spanning [0, 1].
pub fn normalize_scores(recommendations: &mut [Recommendation]) {
    if recommendations.is_empty() {
        return;
    }
    let min = recommendations
        .iter()
        .map(|r| r.score)
        .fold(f64::INFINITY, f64::min);
    let max = recommendations
        .iter()
        .map(|r| r.score)
        .fold(f64::NEG_INFINITY, f64::max);

    if (max - min).abs() < f64::EPSILON {
        return;
    }

    for rec in recommendations.iter_mut() {
        rec.score = (rec.score - min) / (max - min);
    }
}

/// Sorts a candidate list by score, highest first; stable, no tie-break
pub fn sort_by_score(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Serendipity re-ranker
///
/// No-op when the factor is non-positive or the list holds 10 or fewer
/// candidates. Otherwise keeps the top floor((1-f)*n) of the ranked list,
/// draws floor(f*n*0.3) random candidates from the remainder, and re-sorts the
/// combined list by score. A heuristic, not an optimal re-ranking; the
/// randomness source is injected so tests are deterministic.
pub fn apply_diversity_factor<R: Rng + ?Sized>(
    mut recommendations: Vec<Recommendation>,
    factor: f64,
    rng: &mut R,
) -> Vec<Recommendation> {
    let n = recommendations.len();
    if factor <= 0.0 || n <= 10 {
        return recommendations;
    }

    sort_by_score(&mut recommendations);

    let keep = ((1.0 - factor) * n as f64).floor() as usize;
    let sample_size = (factor * n as f64 * 0.3).floor() as usize;

    let tail = recommendations.split_off(keep.min(n));
    let sampled: Vec<Recommendation> = tail
        .choose_multiple(rng, sample_size)
        .cloned()
        .collect();

    recommendations.extend(sampled);
    sort_by_score(&mut recommendations);
    recommendations
}
