use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{
        Activity, AudioFeatures, Mood, Recommendation, RecommendationContext,
        RecommendationReason, RecommendationRequest,
    },
    repository::MusicRepository,
};

use super::{filter_excluded_songs, normalize_scores, sort_by_score, RecommendationStrategy};

const FALLBACK_ARTIST_COUNT: usize = 5;

/// Scores songs by audio-feature similarity to the request's seeds
///
/// Seeds are averaged into a target vector; the request context shifts the
/// target (working favors low energy and high instrumentalness, a party
/// pushes energy and danceability up). Without seeds it falls back to the
/// taste profile's preferred feature ranges and top artists; with neither,
/// it has nothing to say and returns empty.
pub struct ContentBasedStrategy {
    repository: Arc<dyn MusicRepository>,
}

impl ContentBasedStrategy {
    pub const NAME: &'static str = "content_based";

    pub fn new(repository: Arc<dyn MusicRepository>) -> Self {
        Self { repository }
    }

    fn shift_for_context(mut target: AudioFeatures, context: &RecommendationContext) -> AudioFeatures {
        match context.activity {
            Some(Activity::Working) | Some(Activity::Studying) => {
                target.energy -= 0.2;
                target.instrumentalness += 0.3;
            }
            Some(Activity::Exercising) => target.energy += 0.3,
            Some(Activity::Partying) => {
                target.energy += 0.2;
                target.danceability += 0.2;
            }
            Some(Activity::Relaxing) => {
                target.energy -= 0.3;
                target.acousticness += 0.2;
            }
            Some(Activity::Commuting) | None => {}
        }

        match context.mood {
            Some(Mood::Energetic) | Some(Mood::Happy) => target.valence += 0.2,
            Some(Mood::Sad) | Some(Mood::Melancholic) => target.valence -= 0.2,
            Some(Mood::Calm) => target.energy -= 0.2,
            Some(Mood::Focused) => target.instrumentalness += 0.2,
            None => {}
        }

        target.energy = target.energy.clamp(0.0, 1.0);
        target.valence = target.valence.clamp(0.0, 1.0);
        target.danceability = target.danceability.clamp(0.0, 1.0);
        target.acousticness = target.acousticness.clamp(0.0, 1.0);
        target.instrumentalness = target.instrumentalness.clamp(0.0, 1.0);
        target
    }

    async fn seeded_candidates(
        &self,
        request: &RecommendationRequest,
        seed_ids: &[String],
    ) -> AppResult<Vec<Recommendation>> {
        let features = self.repository.audio_features(seed_ids).await?;
        let Some(mut target) = AudioFeatures::centroid(&features) else {
            return Ok(vec![]);
        };
        if let Some(context) = &request.context {
            target = Self::shift_for_context(target, context);
        }

        let neighbors = self
            .repository
            .songs_by_audio_features(&target, (request.limit * 2) as i64)
            .await?;

        Ok(neighbors
            .into_iter()
            .filter(|s| !seed_ids.contains(&s.song_id))
            .map(|s| {
                Recommendation::new(s.song_id, s.score, RecommendationReason::SimilarToLiked)
            })
            .collect())
    }

    async fn profile_candidates(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let Some(profile) = self.repository.taste_profile(&request.user_id).await? else {
            tracing::debug!(user_id = %request.user_id, "No seeds and no taste profile, skipping");
            return Ok(vec![]);
        };

        let mut target = profile.audio_feature_preferences.target_features();
        if let Some(context) = &request.context {
            target = Self::shift_for_context(target, context);
        }

        let mut recommendations: Vec<Recommendation> = self
            .repository
            .songs_by_audio_features(&target, (request.limit * 2) as i64)
            .await?
            .into_iter()
            .map(|s| Recommendation::new(s.song_id, s.score, RecommendationReason::AudioFeatures))
            .collect();

        let top_artists = profile.top_artists_ranked(FALLBACK_ARTIST_COUNT);
        if !top_artists.is_empty() {
            let artist_ids: Vec<String> = top_artists.iter().map(|(a, _)| a.clone()).collect();
            // The artist pool is popularity-ranked without per-song artist
            // attribution, so the strongest affinity weights the whole pool
            let affinity = top_artists
                .iter()
                .map(|(_, s)| *s)
                .fold(0.0, f64::max);

            let by_artist = self
                .repository
                .songs_by_artists(&artist_ids, request.limit as i64)
                .await?;
            for song in by_artist {
                recommendations.push(Recommendation::new(
                    song.song_id,
                    song.score * affinity,
                    RecommendationReason::ArtistSimilarity,
                ));
            }
        }

        Ok(recommendations)
    }
}

#[async_trait::async_trait]
impl RecommendationStrategy for ContentBasedStrategy {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let seed_ids: Vec<String> = request
            .seed_song_ids
            .clone()
            .unwrap_or_default();

        let mut recommendations = if seed_ids.is_empty() {
            self.profile_candidates(request).await?
        } else {
            self.seeded_candidates(request, &seed_ids).await?
        };

        recommendations = filter_excluded_songs(recommendations, &request.exclude_song_ids);
        normalize_scores(&mut recommendations);
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
    use crate::models::{ScoredSong, TimeOfDay};
    use crate::repository::MockMusicRepository;
    use chrono::Weekday;

    fn scored(song_id: &str, score: f64) -> ScoredSong {
        ScoredSong {
            song_id: song_id.to_string(),
            score,
        }
    }

    fn working_context() -> RecommendationContext {
        RecommendationContext {
            time_of_day: TimeOfDay::Morning,
            day_of_week: Weekday::Tue,
            activity: Some(Activity::Working),
            mood: None,
        }
    }

    #[test]
    fn test_working_context_shifts_target() {
        let target =
            ContentBasedStrategy::shift_for_context(AudioFeatures::default(), &working_context());
        assert!((target.energy - 0.3).abs() < 1e-9);
        assert!((target.instrumentalness - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_context_shift_clamps() {
        let mut features = AudioFeatures::default();
        features.energy = 0.1;
        let context = RecommendationContext {
            activity: Some(Activity::Relaxing),
            ..working_context()
        };
        let target = ContentBasedStrategy::shift_for_context(features, &context);
        assert_eq!(target.energy, 0.0);
    }

    #[tokio::test]
    async fn test_no_seeds_no_profile_returns_empty() {
        let mut repo = MockMusicRepository::new();
        repo.expect_taste_profile().returning(|_| Ok(None));

        let strategy = ContentBasedStrategy::new(Arc::new(repo));
        let request = RecommendationRequest::for_user("u1", 20);

        let recs = strategy.recommend(&request).await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn test_seeds_drive_neighbor_lookup_and_exclude_seed() {
        let mut repo = MockMusicRepository::new();
        repo.expect_audio_features()
            .returning(|_| Ok(vec![AudioFeatures::default()]));
        repo.expect_songs_by_audio_features().returning(|_, _| {
            Ok(vec![
                scored("seed1", 1.0),
                scored("n1", 0.9),
                scored("n2", 0.6),
            ])
        });

        let strategy = ContentBasedStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.seed_song_ids = Some(vec!["seed1".to_string()]);

        let recs = strategy.recommend(&request).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.song_id != "seed1"));
        assert!(recs
            .iter()
            .all(|r| r.reason == RecommendationReason::SimilarToLiked));
        assert!(recs[0].score >= recs[1].score);
    }

    #[tokio::test]
    async fn test_seeds_without_features_returns_empty() {
        let mut repo = MockMusicRepository::new();
        repo.expect_audio_features().returning(|_| Ok(vec![]));

        let strategy = ContentBasedStrategy::new(Arc::new(repo));
        let mut request = RecommendationRequest::for_user("u1", 20);
        request.seed_song_ids = Some(vec!["missing".to_string()]);

        let recs = strategy.recommend(&request).await.unwrap();
        assert!(recs.is_empty());
    }
}
