use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Recommendation, RecommendationReason, RecommendationRequest},
    repository::MusicRepository,
};

use super::{filter_excluded_songs, sort_by_score, RecommendationStrategy};

const ADJACENT_GENRE_POOL: i64 = 10;
const SIMILAR_ARTIST_COUNT: i64 = 20;
const NEW_RELEASE_POOL: i64 = 10;
const SEED_GENRE_COUNT: usize = 3;
const SEED_ARTIST_COUNT: usize = 5;

/// Curated adjacency from a genre to its stepping-stone neighbors
///
/// Deliberately a fixed table: discovery should lead somewhere plausible,
/// not anywhere at all.
fn adjacent_genres(genre: &str) -> &'static [&'static str] {
    match genre {
        "Rock" => &["Alternative", "Indie Rock", "Post-rock"],
        "Pop" => &["Synth-pop", "Indie Pop", "Electropop"],
        "Jazz" => &["Soul", "Funk", "Bossa Nova"],
        "Hip-Hop" => &["R&B", "Trap", "Grime"],
        "Electronic" => &["House", "Techno", "Ambient"],
        "Classical" => &["Film Score", "Minimalism", "Chamber"],
        "Metal" => &["Post-metal", "Doom Metal", "Industrial"],
        "Country" => &["Folk", "Americana", "Bluegrass"],
        "R&B" => &["Neo Soul", "Funk", "Hip-Hop"],
        "Folk" => &["Indie Folk", "Singer-Songwriter", "Americana"],
        _ => &[],
    }
}

/// Surfaces unfamiliar music a user is likely to warm to
///
/// Pulls from genres adjacent to the user's favorites, from artists similar
/// to (but not among) the ones they follow, and from general new
/// releases. Every score is multiplied by the profile's discovery score, so
/// cautious listeners get gentler nudges. No taste profile means no basis
/// for discovery: empty.
pub struct DiscoveryStrategy {
    repository: Arc<dyn MusicRepository>,
}

impl DiscoveryStrategy {
    pub const NAME: &'static str = "discovery";

    pub fn new(repository: Arc<dyn MusicRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait::async_trait]
impl RecommendationStrategy for DiscoveryStrategy {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<Vec<Recommendation>> {
        let Some(profile) = self.repository.taste_profile(&request.user_id).await? else {
            tracing::debug!(user_id = %request.user_id, "No taste profile, skipping discovery");
            return Ok(vec![]);
        };

        let mut candidates: Vec<Recommendation> = Vec::new();

        // Adjacent-genre pools
        for (genre, _) in profile.top_genres_ranked(SEED_GENRE_COUNT) {
            for adjacent in adjacent_genres(&genre) {
                let pool = self
                    .repository
                    .top_songs_in_genre(adjacent, ADJACENT_GENRE_POOL)
                    .await?;
                for song in pool {
                    candidates.push(
                        Recommendation::new(
                            song.song_id,
                            song.score,
                            RecommendationReason::Discovery,
                        )
                        .with_metadata("adjacent_from", serde_json::json!(genre.clone()))
                        .with_metadata("genre", serde_json::json!(*adjacent)),
                    );
                }
            }
        }

        // Similar-but-unfollowed artists
        let seed_artists: Vec<String> = profile
            .top_artists_ranked(SEED_ARTIST_COUNT)
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        if !seed_artists.is_empty() {
            let followed: HashSet<String> = self
                .repository
                .followed_artists(&request.user_id)
                .await?
                .into_iter()
                .collect();
            let unfollowed: Vec<String> = self
                .repository
                .similar_artists(&seed_artists, SIMILAR_ARTIST_COUNT)
                .await?
                .into_iter()
                .filter(|a| !followed.contains(a))
                .collect();
            if !unfollowed.is_empty() {
                let pool = self
                    .repository
                    .songs_by_artists(&unfollowed, request.limit as i64)
                    .await?;
                for song in pool {
                    candidates.push(Recommendation::new(
                        song.song_id,
                        song.score,
                        RecommendationReason::ArtistSimilarity,
                    ));
                }
            }
        }

        // General new releases
        for song in self.repository.new_releases(NEW_RELEASE_POOL).await? {
            candidates.push(Recommendation::new(
                song.song_id,
                song.score,
                RecommendationReason::NewRelease,
            ));
        }

        // Scale everything by the user's appetite for the unfamiliar
        let discovery_score = profile.discovery_score.clamp(0.0, 1.0);
        for rec in candidates.iter_mut() {
            rec.score *= discovery_score;
            rec.metadata.insert(
                "discovery_score".to_string(),
                serde_json::json!(discovery_score),
            );
        }

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
