use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Recommendation, RecommendationReason, RecommendationRequest},
    repository::MusicRepository,
};

use super::{filter_excluded_songs, sort_by_score, RecommendationStrategy};

const GENRE_POOL_COUNT: usize = 3;
const VIRAL_POPULARITY: f64 = 0.9;
const VIRAL_SCORE_FLOOR: f64 = 0.8;

/// Scores songs from the catalog's mainstream pools
///
/// Combines trending, new-release, and per-genre pools. The request's
/// popularity bias scales raw popularity: below 0.5 it compresses
/// mainstream dominance (raw * (0.5 + bias)), at or above 0.5 it boosts it
/// (raw * (1 + (bias - 0.5))). Viral songs (pool popularity >= 0.9) keep a score
/// floor of 0.8 regardless of bias.
pub struct PopularityBasedStrategy {
    repository: Arc<dyn MusicRepository>,
}

impl PopularityBasedStrategy {
    pub const NAME: &'static str = "popularity_based";

    pub fn new(repository: Arc<dyn MusicRepository>) -> Self {
        Self { repository }
    }

    fn scale_for_bias(raw: f64, bias: f64) -> f64 {
        if bias >= 0.5 {
            raw * (1.0 + (bias - 0.5))
        } else {
            raw * (0.5 + bias)
        }
    }

    /// Genres to pool from: explicit request seeds win, otherwise the taste
    /// profile's top genres weighted by affinity
    async fn genre_pools(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<(String, f64)>> {
        if let Some(seed_genres) = &request.seed_genres {
            return Ok(seed_genres.iter().map(|g| (g.clone(), 1.0)).collect());
        }
        match self.repository.taste_profile(&request.user_id).await? {
            Some(profile) => Ok(profile.top_genres_ranked(GENRE_POOL_COUNT)),
            None => Ok(vec![]),
        }
    }
}

#[async_trait::async_trait]
impl RecommendationStrategy for PopularityBasedStrategy {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let limit = request.limit as i64;
        let bias = request.popularity_bias.clamp(0.0, 1.0);

        // (raw popularity, candidate) so the viral floor can look at the
        // pre-bias value
        let mut candidates: Vec<(f64, Recommendation)> = Vec::new();

        for song in self.repository.trending_songs(limit).await? {
            candidates.push((
                song.score,
                Recommendation::new(
                    song.song_id,
                    Self::scale_for_bias(song.score, bias),
                    RecommendationReason::TrendingNow,
                ),
            ));
        }

        for song in self.repository.new_releases(limit).await? {
            candidates.push((
                song.score,
                Recommendation::new(
                    song.song_id,
                    Self::scale_for_bias(song.score, bias),
                    RecommendationReason::NewRelease,
                ),
            ));
        }

        for (genre, affinity) in self.genre_pools(request).await? {
            let pool = self.repository.top_songs_in_genre(&genre, limit).await?;
            for song in pool {
                candidates.push((
                    song.score,
                    Recommendation::new(
                        song.song_id,
                        Self::scale_for_bias(song.score * affinity, bias),
                        RecommendationReason::PopularInGenre,
                    )
                    .with_metadata("genre", serde_json::json!(genre.clone())),
                ));
            }
        }

        if candidates.is_empty() {
            tracing::debug!(user_id = %request.user_id, "No popularity pools available");
            return Ok(vec![]);
        }

        // Keep the best-scoring entry per song across pools
        let mut by_song: HashMap<String, Recommendation> = HashMap::new();
        for (raw_popularity, mut rec) in candidates {
            if raw_popularity >= VIRAL_POPULARITY {
                rec.score = rec.score.max(VIRAL_SCORE_FLOOR);
            }
            match by_song.get(&rec.song_id) {
                Some(existing) if existing.score >= rec.score => {}
                _ => {
                    by_song.insert(rec.song_id.clone(), rec);
                }
            }
        }

        let mut recommendations: Vec<Recommendation> = by_song.into_values().collect();
        recommendations = filter_excluded_songs(recommendations, &request.exclude_song_ids);
        sort_by_score(&mut recommendations);
        Ok(recommendations)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
