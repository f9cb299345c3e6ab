use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Mood, Recommendation, RecommendationReason, RecommendationRequest},
    repository::MusicRepository,
};

use super::{filter_excluded_songs, sort_by_score, RecommendationStrategy};

const TIME_HISTORY_DEPTH: i64 = 100;
const FOCUS_TRENDING_SUPPLEMENT: i64 = 5;

/// Scores songs from the listening situation the request describes
///
/// Each candidate's reason and metadata tag the context dimension that
/// produced it: per-time-of-day listening history, per-activity curated
/// songs, and a small trending supplement when the mood is focused.
/// Without a request context the strategy is a no-op.
pub struct ContextAwareStrategy {
    repository: Arc<dyn MusicRepository>,
}

impl ContextAwareStrategy {
    pub const NAME: &'static str = "context_aware";

    pub fn new(repository: Arc<dyn MusicRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl RecommendationStrategy for ContextAwareStrategy {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let Some(context) = &request.context else {
            return Ok(vec![]);
        };

        let mut candidates: Vec<Recommendation> = Vec::new();

        // Time dimension: rank the user's past plays in this bucket by
        // frequency
        let history = self
            .repository
            .listening_history_for_time(&request.user_id, context.time_of_day, TIME_HISTORY_DEPTH)
            .await?;
        if !history.is_empty() {
            let mut play_counts: HashMap<String, u32> = HashMap::new();
            for song_id in history {
                *play_counts.entry(song_id).or_insert(0) += 1;
            }
            let max_count = play_counts.values().copied().max().unwrap_or(1) as f64;
            for (song_id, count) in play_counts {
                candidates.push(
                    Recommendation::new(
                        song_id,
                        count as f64 / max_count,
                        RecommendationReason::TimeBased,
                    )
                    .with_metadata("context_dimension", serde_json::json!("time")),
                );
            }
        }

        // Activity dimension: curated pool
        if let Some(activity) = context.activity {
            let pool = self
                .repository
                .songs_for_activity(activity, request.limit as i64)
                .await?;
            for song in pool {
                candidates.push(
                    Recommendation::new(
                        song.song_id,
                        song.score,
                        RecommendationReason::ActivityBased,
                    )
                    .with_metadata("context_dimension", serde_json::json!("activity")),
                );
            }
        }

        // Mood dimension: focused listeners get a small trending supplement
        if context.mood == Some(Mood::Focused) {
            let trending = self
                .repository
                .trending_songs(FOCUS_TRENDING_SUPPLEMENT)
                .await?;
            for song in trending {
                candidates.push(
                    Recommendation::new(
                        song.song_id,
                        song.score,
                        RecommendationReason::TrendingNow,
                    )
                    .with_metadata("context_dimension", serde_json::json!("mood")),
                );
            }
        }

        // Keep the best entry per song across dimensions
        let mut by_song: HashMap<String, Recommendation> = HashMap::new();
        for rec in candidates {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, RecommendationContext, ScoredSong, TimeOfDay};
    use crate::repository::MockMusicRepository;
    use chrono::Weekday;

    fn context(activity: Option<Activity>, mood: Option<Mood>) -> RecommendationContext {
        RecommendationContext {
            time_of_day: TimeOfDay::Evening,
            day_of_week: Weekday::Wed,
            activity,
            mood,
        }
    }

    #[tokio::test]
    async fn test_no_context_is_noop() {
        let repo = MockMusicRepository::new();
        let strategy = ContextAwareStrategy::new(Arc::new(repo));
        let request = RecommendationRequest::for_user("u1", 20);

        let recs = strategy.recommend(&request).await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_time_history_ranked_by_frequency() {
        let mut repo = MockMusicRepository::new();
        repo.expect_listening_history_for_time().returning(|_, _, _| {
            Ok(vec![
                "s1".to_string(),
                "s1".to_string(),
                "s1".to_string(),
                "s2".to_string(),
            ])
        });

        let strategy = ContextAwareStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.context = Some(context(None, None));

        let recs = strategy.recommend(&request).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].song_id, "s1");
        assert!((recs[0].score - 1.0).abs() < 1e-9);
        assert!((recs[1].score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(recs[0].reason, RecommendationReason::TimeBased);
        assert_eq!(
            recs[0].metadata.get("context_dimension"),
            Some(&serde_json::json!("time"))
        );
    }

    #[tokio::test]
    async fn test_activity_pool_tagged_with_dimension() {
        let mut repo = MockMusicRepository::new();
        repo.expect_listening_history_for_time()
            .returning(|_, _, _| Ok(vec![]));
        repo.expect_songs_for_activity()
            .withf(|activity, _| *activity == Activity::Exercising)
            .returning(|_, _| {
                Ok(vec![ScoredSong {
                    song_id: "gym1".to_string(),
                    score: 0.9,
                }])
            });

        let strategy = ContextAwareStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.context = Some(context(Some(Activity::Exercising), None));

        let recs = strategy.recommend(&request).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].reason, RecommendationReason::ActivityBased);
        assert_eq!(
            recs[0].metadata.get("context_dimension"),
            Some(&serde_json::json!("activity"))
        );
    }

    #[tokio::test]
    async fn test_focused_mood_adds_trending_supplement() {
        let mut repo = MockMusicRepository::new();
        repo.expect_listening_history_for_time()
            .returning(|_, _, _| Ok(vec![]));
        repo.expect_trending_songs()
            .withf(|limit| *limit == FOCUS_TRENDING_SUPPLEMENT)
            .returning(|_| {
                Ok(vec![ScoredSong {
                    song_id: "t1".to_string(),
                    score: 0.8,
                }])
            });

        let strategy = ContextAwareStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.context = Some(context(None, Some(Mood::Focused)));

        let recs = strategy.recommend(&request).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(
            recs[0].metadata.get("context_dimension"),
            Some(&serde_json::json!("mood"))
        );
    }

    #[tokio::test]
    async fn test_non_focused_mood_skips_trending() {
        let mut repo = MockMusicRepository::new();
        repo.expect_listening_history_for_time()
            .returning(|_, _, _| Ok(vec![]));
        repo.expect_trending_songs().times(0);

        let strategy = ContextAwareStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.context = Some(context(None, Some(Mood::Calm)));

        let recs = strategy.recommend(&request).await.unwrap();
        assert!(recs.is_empty());
    }
}
