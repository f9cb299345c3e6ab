use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::{
    db::{Cache, CacheKey},
    error::AppResult,
    models::{
        Recommendation, RecommendationContext, RecommendationReason, RecommendationRequest,
        RecommendationResult,
    },
    repository::MusicRepository,
    services::realtime::RealTimeRecommendationCache,
    services::strategies::{
        apply_diversity_factor, sort_by_score, CollaborativeFilteringStrategy,
        ContentBasedStrategy, ContextAwareStrategy, DiscoveryStrategy, PopularityBasedStrategy,
        RecommendationStrategy,
    },
};

const TRENDING_BOOST_POOL: i64 = 100;
const PLAYLIST_SEED_COUNT: usize = 5;

/// Externally injected per-strategy merge weights
///
/// Unknown strategy names fall back to the default weight, so new
/// strategies can be added without touching the engine.
#[derive(Debug, Clone)]
pub struct StrategyWeights {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        let weights = [
            (CollaborativeFilteringStrategy::NAME, 0.35),
            (ContentBasedStrategy::NAME, 0.25),
            (PopularityBasedStrategy::NAME, 0.15),
            (ContextAwareStrategy::NAME, 0.15),
            (DiscoveryStrategy::NAME, 0.10),
        ]
        .into_iter()
        .map(|(name, w)| (name.to_string(), w))
        .collect();

        Self {
            weights,
            default_weight: 0.10,
        }
    }
}

impl StrategyWeights {
    pub fn weight(&self, strategy_name: &str) -> f64 {
        self.weights
            .get(strategy_name)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Redis payload for a merged result; execution time and cache-hit flag are
/// recomputed per read
#[derive(Debug, Serialize, Deserialize)]
struct CachedResult {
    recommendations: Vec<Recommendation>,
    strategies: Vec<String>,
}

/// Per-song accumulator used during the fan-in merge
struct MergedSong {
    score: f64,
    reason: RecommendationReason,
    reason_weight: f64,
    metadata: HashMap<String, serde_json::Value>,
    strategies: Vec<String>,
}

/// Combines the independent scoring strategies into one ranked list
///
/// Per request: a deterministic cache key, a freshness-gated Redis read,
/// concurrent strategy fan-out with caught failures, a weighted merge with
/// real-time adjustments, and a best-effort write-back.
pub struct HybridRecommendationEngine {
    repository: Arc<dyn MusicRepository>,
    strategies: Vec<Arc<dyn RecommendationStrategy>>,
    weights: StrategyWeights,
    realtime: Arc<RealTimeRecommendationCache>,
    cache: Cache,
    result_cache_ttl_secs: u64,
    rng: Mutex<StdRng>,
}

impl HybridRecommendationEngine {
    pub fn new(
        repository: Arc<dyn MusicRepository>,
        strategies: Vec<Arc<dyn RecommendationStrategy>>,
        weights: StrategyWeights,
        realtime: Arc<RealTimeRecommendationCache>,
        cache: Cache,
        result_cache_ttl_secs: u64,
    ) -> Self {
        Self {
            repository,
            strategies,
            weights,
            realtime,
            cache,
            result_cache_ttl_secs,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Wires up the five standard strategies against one repository
    pub fn with_default_strategies(
        repository: Arc<dyn MusicRepository>,
        realtime: Arc<RealTimeRecommendationCache>,
        cache: Cache,
        result_cache_ttl_secs: u64,
    ) -> Self {
        let strategies: Vec<Arc<dyn RecommendationStrategy>> = vec![
            Arc::new(CollaborativeFilteringStrategy::new(Arc::clone(&repository))),
            Arc::new(ContentBasedStrategy::new(Arc::clone(&repository))),
            Arc::new(PopularityBasedStrategy::new(Arc::clone(&repository))),
            Arc::new(ContextAwareStrategy::new(Arc::clone(&repository))),
            Arc::new(DiscoveryStrategy::new(Arc::clone(&repository))),
        ];
        Self::new(
            repository,
            strategies,
            StrategyWeights::default(),
            realtime,
            cache,
            result_cache_ttl_secs,
        )
    }

    /// Replaces the diversity sampler's randomness source; tests seed this
    /// for determinism
    pub fn with_seeded_rng(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn repository(&self) -> &Arc<dyn MusicRepository> {
        &self.repository
    }

    pub fn realtime(&self) -> &Arc<RealTimeRecommendationCache> {
        &self.realtime
    }

    pub(crate) fn discovery_strategy(&self) -> Option<&Arc<dyn RecommendationStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.name() == DiscoveryStrategy::NAME)
    }

    pub(crate) fn sample_diversity(
        &self,
        recommendations: Vec<Recommendation>,
        factor: f64,
    ) -> Vec<Recommendation> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply_diversity_factor(recommendations, factor, &mut *rng)
    }

    /// Runs the full hybrid pipeline for one request
    pub async fn get_recommendations(
        &self,
        request: RecommendationRequest,
    ) -> AppResult<RecommendationResult> {
        let start = Instant::now();
        let cache_key = CacheKey::for_request(&request);
        let key_string = cache_key.to_string();

        // The freshness oracle gates the Redis read; the entry's own TTL is
        // a separate knob
        if self.realtime.is_fresh(&request.user_id, &key_string) {
            match self.cache.get_from_cache::<CachedResult>(&cache_key).await {
                Ok(Some(cached)) => {
                    tracing::debug!(cache_key = %key_string, "Returning cached recommendations");
                    return Ok(RecommendationResult {
                        recommendations: cached.recommendations,
                        execution_time_ms: start.elapsed().as_millis() as u64,
                        cache_hit: true,
                        strategies: cached.strategies,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, cache_key = %key_string, "Cache read failed, treating as miss");
                }
            }
        }

        let contributions = self.fan_out(&request).await;
        let strategies: Vec<String> = contributions
            .iter()
            .map(|(name, _)| name.to_string())
            .collect();

        let mut recommendations = self.merge(&request, contributions).await?;

        if request.diversity_factor > 0.0 {
            recommendations = self.sample_diversity(recommendations, request.diversity_factor);
        }
        sort_by_score(&mut recommendations);
        recommendations.truncate(request.limit);

        let result = RecommendationResult {
            recommendations,
            execution_time_ms: start.elapsed().as_millis() as u64,
            cache_hit: false,
            strategies,
        };

        self.cache.set_in_background(
            &cache_key,
            &CachedResult {
                recommendations: result.recommendations.clone(),
                strategies: result.strategies.clone(),
            },
            self.result_cache_ttl_secs,
        );
        self.realtime.mark_fresh(&key_string);

        tracing::info!(
            user_id = %request.user_id,
            returned = result.recommendations.len(),
            strategies = ?result.strategies,
            execution_time_ms = result.execution_time_ms,
            "Recommendations generated"
        );

        Ok(result)
    }

    /// Invokes every strategy concurrently and joins on all of them
    ///
    /// A throwing (or panicking) strategy is logged and substituted with an
    /// empty contribution; it never aborts the request. There is no overall
    /// timeout: a stalled repository call stalls the request, an accepted
    /// risk at this layer.
    async fn fan_out(
        &self,
        request: &RecommendationRequest,
    ) -> Vec<(&'static str, Vec<Recommendation>)> {
        let mut tasks = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let request = request.clone();
            tasks.push(tokio::spawn(async move {
                let name = strategy.name();
                (name, strategy.recommend(&request).await)
            }));
        }

        let mut contributions = Vec::new();
        for task in tasks {
            match task.await {
                Ok((name, Ok(recommendations))) => {
                    if recommendations.is_empty() {
                        tracing::debug!(strategy = name, "Strategy produced no candidates");
                    } else {
                        contributions.push((name, recommendations));
                    }
                }
                Ok((name, Err(e))) => {
                    tracing::error!(
                        strategy = name,
                        error = %e,
                        "Strategy failed, substituting empty contribution"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Strategy task join error");
                }
            }
        }
        contributions
    }

    /// Weighted fan-in merge plus the mainstream and real-time passes
    async fn merge(
        &self,
        request: &RecommendationRequest,
        contributions: Vec<(&'static str, Vec<Recommendation>)>,
    ) -> AppResult<Vec<Recommendation>> {
        let mut merged: HashMap<String, MergedSong> = HashMap::new();

        for (name, recommendations) in contributions {
            let weight = self.weights.weight(name);
            for rec in recommendations {
                // Strategies already filter exclusions; enforce again here so
                // the hybrid result honors them even for ad-hoc strategies
                if request.exclude_song_ids.contains(&rec.song_id) {
                    continue;
                }
                let entry = merged.entry(rec.song_id.clone()).or_insert(MergedSong {
                    score: 0.0,
                    reason: rec.reason,
                    reason_weight: weight,
                    metadata: HashMap::new(),
                    strategies: Vec::new(),
                });
                entry.score += rec.score * weight;
                // Deterministic display reason: the highest-weight
                // contributor wins
                if weight > entry.reason_weight {
                    entry.reason = rec.reason;
                    entry.reason_weight = weight;
                }
                for (key, value) in rec.metadata {
                    entry.metadata.entry(key).or_insert(value);
                }
                entry.strategies.push(name.to_string());
            }
        }

        // Second mainstream pass: layer an extra boost on globally trending
        // songs when the request leans mainstream
        if request.popularity_bias > 0.5 && !merged.is_empty() {
            let trending = self.repository.trending_songs(TRENDING_BOOST_POOL).await?;
            let trending_ids: HashSet<String> =
                trending.into_iter().map(|s| s.song_id).collect();
            let boost = 1.0 + (request.popularity_bias - 0.5);
            for (song_id, entry) in merged.iter_mut() {
                if trending_ids.contains(song_id) {
                    entry.score *= boost;
                }
            }
        }

        // Real-time pass: the total nudge (song plus genre) stays within
        // [-1, 1], and merged scores never go below zero
        let mut recommendations: Vec<Recommendation> = merged
            .into_iter()
            .map(|(song_id, entry)| {
                let mut adjustment = self
                    .realtime
                    .get_song_adjustment(&request.user_id, &song_id);
                if let Some(genre) = entry.metadata.get("genre").and_then(|v| v.as_str()) {
                    adjustment += self.realtime.get_genre_adjustment(&request.user_id, genre);
                }
                let adjustment = adjustment.clamp(-1.0, 1.0);
                let mut metadata = entry.metadata;
                metadata.insert(
                    "strategies".to_string(),
                    serde_json::json!(entry.strategies),
                );
                Recommendation {
                    song_id,
                    score: (entry.score + adjustment).max(0.0),
                    reason: entry.reason,
                    context: request.context,
                    metadata,
                }
            })
            .collect();

        sort_by_score(&mut recommendations);
        Ok(recommendations)
    }

    /// Recommendations for an explicit listening situation
    pub async fn get_contextual_recommendations(
        &self,
        user_id: &str,
        context: RecommendationContext,
        limit: usize,
    ) -> AppResult<RecommendationResult> {
        let mut request = RecommendationRequest::for_user(user_id, limit);
        request.context = Some(context);
        request.diversity_factor = 0.3;
        self.get_recommendations(request).await
    }

    /// Songs that continue a playlist: seeded by its tail, excluding
    /// everything already on it
    pub async fn get_playlist_continuation(
        &self,
        user_id: &str,
        playlist_song_ids: &[String],
        limit: usize,
    ) -> AppResult<RecommendationResult> {
        let mut request = RecommendationRequest::for_user(user_id, limit);
        request.seed_song_ids = Some(
            playlist_song_ids
                .iter()
                .rev()
                .take(PLAYLIST_SEED_COUNT)
                .rev()
                .cloned()
                .collect(),
        );
        request.exclude_song_ids = playlist_song_ids.iter().cloned().collect();
        request.diversity_factor = 0.2;
        self.get_recommendations(request).await
    }

    /// A radio stream grown from a single song
    pub async fn get_song_radio(
        &self,
        user_id: &str,
        song_id: &str,
        limit: usize,
    ) -> AppResult<RecommendationResult> {
        let mut request = RecommendationRequest::for_user(user_id, limit);
        request.seed_song_ids = Some(vec![song_id.to_string()]);
        request.exclude_song_ids.insert(song_id.to_string());
        request.diversity_factor = 0.4;
        self.get_recommendations(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_redis_client;
    use crate::error::AppError;
    use crate::repository::MockMusicRepository;

    /// Strategy stub returning a fixed contribution
    struct FixedStrategy {
        name: &'static str,
        recommendations: Vec<Recommendation>,
    }

    #[async_trait::async_trait]
    impl RecommendationStrategy for FixedStrategy {
        async fn recommend(
            &self,
            _request: &RecommendationRequest,
        ) -> AppResult<Vec<Recommendation>> {
            Ok(self.recommendations.clone())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Strategy stub that always fails
    struct FailingStrategy;

    #[async_trait::async_trait]
    impl RecommendationStrategy for FailingStrategy {
        async fn recommend(
            &self,
            _request: &RecommendationRequest,
        ) -> AppResult<Vec<Recommendation>> {
            Err(AppError::Strategy("boom".to_string()))
        }

        fn name(&self) -> &'static str {
            "context_aware"
        }
    }

    fn fixed(
        name: &'static str,
        recs: Vec<(String, f64)>,
        reason: RecommendationReason,
    ) -> Arc<dyn RecommendationStrategy> {
        Arc::new(FixedStrategy {
            name,
            recommendations: recs
                .into_iter()
                .map(|(id, score)| Recommendation::new(&id, score, reason))
                .collect(),
        })
    }

    fn ids(recs: &[(&str, f64)]) -> Vec<(String, f64)> {
        recs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    // Redis on an unroutable port: every cache operation degrades to a miss,
    // exercising the non-fatal error paths
    async fn offline_cache() -> Cache {
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, _handle) = Cache::new(client).await;
        cache
    }

    async fn engine_with(
        repo: MockMusicRepository,
        strategies: Vec<Arc<dyn RecommendationStrategy>>,
    ) -> HybridRecommendationEngine {
        HybridRecommendationEngine::new(
            Arc::new(repo),
            strategies,
            StrategyWeights::default(),
            Arc::new(RealTimeRecommendationCache::default()),
            offline_cache().await,
            300,
        )
        .with_seeded_rng(7)
    }

    #[test]
    fn test_unknown_strategy_gets_default_weight() {
        let weights = StrategyWeights::default();
        assert_eq!(weights.weight("collaborative_filtering"), 0.35);
        assert_eq!(weights.weight("somebody_elses_strategy"), 0.10);
    }

    #[tokio::test]
    async fn test_merge_math_weighted_sum() {
        let strategies = vec![
            fixed(
                ContentBasedStrategy::NAME,
                ids(&[("s1", 0.8)]),
                RecommendationReason::AudioFeatures,
            ),
            fixed(
                CollaborativeFilteringStrategy::NAME,
                ids(&[("s1", 0.6)]),
                RecommendationReason::CollaborativeFiltering,
            ),
        ];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 10))
            .await
            .unwrap();

        assert_eq!(result.recommendations.len(), 1);
        let rec = &result.recommendations[0];
        assert_eq!(rec.song_id, "s1");
        // 0.8 * 0.25 + 0.6 * 0.35, before any real-time adjustment
        assert!((rec.score - 0.41).abs() < 1e-9);
        // The higher-weight contributor supplies the display reason
        assert_eq!(rec.reason, RecommendationReason::CollaborativeFiltering);
        assert!(!result.cache_hit);
    }

    #[tokio::test]
    async fn test_failing_strategy_does_not_abort_request() {
        let strategies: Vec<Arc<dyn RecommendationStrategy>> = vec![
            fixed(
                CollaborativeFilteringStrategy::NAME,
                ids(&[("s1", 0.9)]),
                RecommendationReason::CollaborativeFiltering,
            ),
            fixed(
                ContentBasedStrategy::NAME,
                ids(&[("s2", 0.7)]),
                RecommendationReason::AudioFeatures,
            ),
            fixed(
                PopularityBasedStrategy::NAME,
                ids(&[("s3", 0.5)]),
                RecommendationReason::TrendingNow,
            ),
            fixed(
                DiscoveryStrategy::NAME,
                ids(&[("s4", 0.4)]),
                RecommendationReason::Discovery,
            ),
            Arc::new(FailingStrategy),
        ];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 10))
            .await
            .unwrap();

        assert_eq!(result.recommendations.len(), 4);
        assert_eq!(result.strategies.len(), 4);
        assert!(!result.strategies.contains(&"context_aware".to_string()));
    }

    #[tokio::test]
    async fn test_result_truncated_to_limit_and_unique() {
        let pool: Vec<(String, f64)> = (0..15)
            .map(|i| (format!("s{}", i), 0.9 - i as f64 * 0.05))
            .collect();
        let strategies = vec![
            fixed(
                CollaborativeFilteringStrategy::NAME,
                pool,
                RecommendationReason::CollaborativeFiltering,
            ),
            fixed(
                ContentBasedStrategy::NAME,
                ids(&[("s0", 0.8), ("s1", 0.8)]),
                RecommendationReason::AudioFeatures,
            ),
        ];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 5))
            .await
            .unwrap();

        assert_eq!(result.recommendations.len(), 5);
        let ids: HashSet<&str> = result
            .recommendations
            .iter()
            .map(|r| r.song_id.as_str())
            .collect();
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn test_mainstream_second_pass_boosts_trending() {
        let mut repo = MockMusicRepository::new();
        repo.expect_trending_songs().returning(|_| {
            Ok(vec![crate::models::ScoredSong {
                song_id: "hit".to_string(),
                score: 0.95,
            }])
        });

        let strategies = vec![
            fixed(
                ContentBasedStrategy::NAME,
                ids(&[("hit", 0.4), ("niche", 0.4)]),
                RecommendationReason::AudioFeatures,
            ),
        ];
        let engine = engine_with(repo, strategies).await;

        let mut request = RecommendationRequest::for_user("u1", 10);
        request.popularity_bias = 0.9;
        let result = engine.get_recommendations(request).await.unwrap();

        let hit = result
            .recommendations
            .iter()
            .find(|r| r.song_id == "hit")
            .unwrap();
        let niche = result
            .recommendations
            .iter()
            .find(|r| r.song_id == "niche")
            .unwrap();

        // hit: 0.4 * 0.25 * (1 + 0.4); niche untouched
        assert!((hit.score - 0.4 * 0.25 * 1.4).abs() < 1e-9);
        assert!((niche.score - 0.4 * 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_realtime_adjustment_floors_at_zero() {
        let strategies = vec![fixed(
            ContentBasedStrategy::NAME,
            ids(&[("s1", 0.4)]),
            RecommendationReason::AudioFeatures,
        )];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        engine.realtime().adjust_song_score("u1", "s1", -1.0);

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 10))
            .await
            .unwrap();

        // 0.4 * 0.25 - 1.0 floors at 0
        assert_eq!(result.recommendations[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_combined_song_and_genre_nudge_clamped_to_one() {
        let rec = Recommendation::new("s1", 0.4, RecommendationReason::PopularInGenre)
            .with_metadata("genre", serde_json::json!("Rock"));
        let strategies: Vec<Arc<dyn RecommendationStrategy>> = vec![Arc::new(FixedStrategy {
            name: PopularityBasedStrategy::NAME,
            recommendations: vec![rec],
        })];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        // Each nudge alone saturates its own [-1, 1] bound
        engine.realtime().adjust_song_score("u1", "s1", 1.0);
        engine.realtime().temporarily_boost_genre("u1", "Rock", 1.0, 60);

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 10))
            .await
            .unwrap();

        // 0.4 * 0.15 plus the total nudge clamped to 1.0, not 2.0
        assert!((result.recommendations[0].score - (0.4 * 0.15 + 1.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_strategies_metadata_appended() {
        let strategies = vec![
            fixed(
                ContentBasedStrategy::NAME,
                ids(&[("s1", 0.8)]),
                RecommendationReason::AudioFeatures,
            ),
            fixed(
                DiscoveryStrategy::NAME,
                ids(&[("s1", 0.5)]),
                RecommendationReason::Discovery,
            ),
        ];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        let result = engine
            .get_recommendations(RecommendationRequest::for_user("u1", 10))
            .await
            .unwrap();

        let contributing = result.recommendations[0]
            .metadata
            .get("strategies")
            .unwrap();
        assert_eq!(
            contributing,
            &serde_json::json!(["content_based", "discovery"])
        );
    }

    #[tokio::test]
    async fn test_playlist_continuation_excludes_playlist() {
        let playlist: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        // The stub deliberately returns a song already on the playlist; the
        // engine's merge-level exclusion must drop it
        let strategies = vec![fixed(
            ContentBasedStrategy::NAME,
            ids(&[("p7", 0.9), ("fresh", 0.8)]),
            RecommendationReason::SimilarToLiked,
        )];
        let engine = engine_with(MockMusicRepository::new(), strategies).await;

        let result = engine
            .get_playlist_continuation("u1", &playlist, 10)
            .await
            .unwrap();

        assert_eq!(result.recommendations.len(), 1);
        assert!(result
            .recommendations
            .iter()
            .all(|r| !playlist.contains(&r.song_id)));
    }
}
