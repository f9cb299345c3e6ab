use crate::{
    error::AppResult,
    models::{Activity, AudioFeatures, DailyMix, ScoredSong, SimilarUser, TimeOfDay, UserTasteProfile},
};

pub mod postgres;

pub use postgres::PostgresMusicRepository;

/// Data-access collaborator for the recommendation engine
///
/// The sole source of taste profiles, song/artist similarity, trending and
/// genre pools, audio features, and listening history. Engine correctness
/// depends only on the return semantics documented here ("similarity-ranked",
/// "already time-windowed"), never on the storage behind them.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MusicRepository: Send + Sync {
    /// Users most similar to `user_id`, similarity-ranked, highest first
    async fn find_similar_users(&self, user_id: &str, limit: i64) -> AppResult<Vec<SimilarUser>>;

    /// Per-user distinct liked-song ids, one inner list per requested user
    async fn liked_song_ids(
        &self,
        user_ids: &[String],
        per_user_limit: i64,
    ) -> AppResult<Vec<Vec<String>>>;

    /// Persisted taste profile, if one has been computed for the user
    async fn taste_profile(&self, user_id: &str) -> AppResult<Option<UserTasteProfile>>;

    /// Audio-feature vectors for the given songs; unknown ids are skipped
    async fn audio_features(&self, song_ids: &[String]) -> AppResult<Vec<AudioFeatures>>;

    /// Nearest neighbors to a target feature vector, similarity-ranked
    async fn songs_by_audio_features(
        &self,
        target: &AudioFeatures,
        limit: i64,
    ) -> AppResult<Vec<ScoredSong>>;

    /// Currently trending songs with popularity scores in [0, 1],
    /// already time-windowed by the catalog
    async fn trending_songs(&self, limit: i64) -> AppResult<Vec<ScoredSong>>;

    /// Recent releases with popularity scores in [0, 1]
    async fn new_releases(&self, limit: i64) -> AppResult<Vec<ScoredSong>>;

    /// Most popular songs in a genre, popularity-ranked
    async fn top_songs_in_genre(&self, genre: &str, limit: i64) -> AppResult<Vec<ScoredSong>>;

    /// Curated songs for an activity, relevance-ranked
    async fn songs_for_activity(&self, activity: Activity, limit: i64)
        -> AppResult<Vec<ScoredSong>>;

    /// Raw play history for the user within a time-of-day bucket;
    /// repeats are preserved so callers can rank by frequency
    async fn listening_history_for_time(
        &self,
        user_id: &str,
        time_of_day: TimeOfDay,
        limit: i64,
    ) -> AppResult<Vec<String>>;

    /// Artists similar to any of the given artists, similarity-ranked
    async fn similar_artists(&self, artist_ids: &[String], limit: i64)
        -> AppResult<Vec<String>>;

    /// Artists the user follows
    async fn followed_artists(&self, user_id: &str) -> AppResult<Vec<String>>;

    /// Songs by the given artists, popularity-ranked
    async fn songs_by_artists(&self, artist_ids: &[String], limit: i64)
        -> AppResult<Vec<ScoredSong>>;

    /// Upserts a daily mix; the deterministic mix id makes regeneration
    /// overwrite rather than duplicate
    async fn save_daily_mix(&self, mix: &DailyMix) -> AppResult<()>;
}
