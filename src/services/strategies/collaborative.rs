use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Recommendation, RecommendationReason, RecommendationRequest},
    repository::MusicRepository,
};

use super::{filter_excluded_songs, RecommendationStrategy};

const MAX_SIMILAR_USERS: i64 = 100;
const LIKED_SONGS_PER_USER: i64 = 50;

/// Scores songs by how often they recur in similar users' liked songs
///
/// The raw score for a candidate is its co-occurrence count (how many
/// similar users liked it), normalized by the maximum count.
pub struct CollaborativeFilteringStrategy {
    repository: Arc<dyn MusicRepository>,
}

impl CollaborativeFilteringStrategy {
    pub const NAME: &'static str = "collaborative_filtering";

    pub fn new(repository: Arc<dyn MusicRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl RecommendationStrategy for CollaborativeFilteringStrategy {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let similar_users = self
            .repository
            .find_similar_users(&request.user_id, MAX_SIMILAR_USERS)
            .await?;

        if similar_users.is_empty() {
            tracing::debug!(user_id = %request.user_id, "No similar users, skipping");
            return Ok(vec![]);
        }

        let user_ids: Vec<String> = similar_users.into_iter().map(|u| u.user_id).collect();
        let liked_lists = self
            .repository
            .liked_song_ids(&user_ids, LIKED_SONGS_PER_USER)
            .await?;

        let mut co_occurrence: HashMap<String, u32> = HashMap::new();
        for list in liked_lists {
            for song_id in list {
                *co_occurrence.entry(song_id).or_insert(0) += 1;
            }
        }

        if co_occurrence.is_empty() {
            return Ok(vec![]);
        }

        let mut candidates: Vec<(String, u32)> = co_occurrence.into_iter().collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(request.limit * 3);

        let max_count = candidates[0].1 as f64;
        let recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .map(|(song_id, count)| {
                Recommendation::new(
                    song_id,
                    count as f64 / max_count,
                    RecommendationReason::CollaborativeFiltering,
                )
                .with_metadata("co_occurrence", serde_json::json!(count))
            })
            .collect();

        Ok(filter_excluded_songs(
            recommendations,
            &request.exclude_song_ids,
        ))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
