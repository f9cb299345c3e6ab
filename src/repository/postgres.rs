use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{
        Activity, AudioFeatures, DailyMix, ScoredSong, SimilarUser, TimeOfDay, UserTasteProfile,
    },
};

use super::MusicRepository;

/// Production repository backed by the catalog database
///
/// Queries use runtime binding rather than compile-time macros so the crate
/// builds without a live database.
#[derive(Clone)]
pub struct PostgresMusicRepository {
    pool: Arc<PgPool>,
}

impl PostgresMusicRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Hour predicate for a time-of-day bucket; night wraps midnight
    fn time_of_day_predicate(time_of_day: TimeOfDay) -> &'static str {
        match time_of_day {
            TimeOfDay::Morning => "EXTRACT(HOUR FROM played_at) BETWEEN 5 AND 11",
            TimeOfDay::Afternoon => "EXTRACT(HOUR FROM played_at) BETWEEN 12 AND 16",
            TimeOfDay::Evening => "EXTRACT(HOUR FROM played_at) BETWEEN 17 AND 21",
            TimeOfDay::Night => {
                "(EXTRACT(HOUR FROM played_at) >= 22 OR EXTRACT(HOUR FROM played_at) < 5)"
            }
        }
    }

    fn activity_tag(activity: Activity) -> &'static str {
        match activity {
            Activity::Working => "working",
            Activity::Studying => "studying",
            Activity::Exercising => "exercising",
            Activity::Commuting => "commuting",
            Activity::Relaxing => "relaxing",
            Activity::Partying => "partying",
        }
    }
}

#[derive(sqlx::FromRow)]
struct AudioFeaturesRow {
    energy: f64,
    valence: f64,
    danceability: f64,
    acousticness: f64,
    instrumentalness: f64,
    speechiness: f64,
    liveness: f64,
    loudness: f64,
    tempo: f64,
    key: i32,
    mode: i32,
    time_signature: i32,
}

impl From<AudioFeaturesRow> for AudioFeatures {
    fn from(row: AudioFeaturesRow) -> Self {
        AudioFeatures {
            energy: row.energy,
            valence: row.valence,
            danceability: row.danceability,
            acousticness: row.acousticness,
            instrumentalness: row.instrumentalness,
            speechiness: row.speechiness,
            liveness: row.liveness,
            loudness: row.loudness,
            tempo: row.tempo,
            key: row.key,
            mode: row.mode,
            time_signature: row.time_signature,
        }
    }
}

#[async_trait::async_trait]
impl MusicRepository for PostgresMusicRepository {
    async fn find_similar_users(&self, user_id: &str, limit: i64) -> AppResult<Vec<SimilarUser>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT other_user_id, similarity
            FROM user_similarity
            WHERE user_id = $1
            ORDER BY similarity DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, similarity)| SimilarUser {
                user_id,
                similarity,
            })
            .collect())
    }

    async fn liked_song_ids(
        &self,
        user_ids: &[String],
        per_user_limit: i64,
    ) -> AppResult<Vec<Vec<String>>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT user_id, song_id
            FROM (
                SELECT DISTINCT user_id, song_id,
                       ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY liked_at DESC) AS rn
                FROM liked_songs
                WHERE user_id = ANY($1)
            ) ranked
            WHERE rn <= $2
            "#,
        )
        .bind(user_ids)
        .bind(per_user_limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut by_user: HashMap<String, Vec<String>> = HashMap::new();
        for (user_id, song_id) in rows {
            by_user.entry(user_id).or_default().push(song_id);
        }

        Ok(by_user.into_values().collect())
    }

    async fn taste_profile(&self, user_id: &str) -> AppResult<Option<UserTasteProfile>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT profile
            FROM taste_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some((json,)) => {
                let profile = serde_json::from_value(json).map_err(|e| {
                    crate::error::AppError::Internal(format!(
                        "Malformed taste profile for {}: {}",
                        user_id, e
                    ))
                })?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn audio_features(&self, song_ids: &[String]) -> AppResult<Vec<AudioFeatures>> {
        let rows: Vec<AudioFeaturesRow> = sqlx::query_as(
            r#"
            SELECT energy, valence, danceability, acousticness, instrumentalness,
                   speechiness, liveness, loudness, tempo, key, mode, time_signature
            FROM song_audio_features
            WHERE song_id = ANY($1)
            "#,
        )
        .bind(song_ids)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(AudioFeatures::from).collect())
    }

    async fn songs_by_audio_features(
        &self,
        target: &AudioFeatures,
        limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        // Similarity is 1 / (1 + euclidean distance) over the continuous
        // [0, 1] features, so scores land in (0, 1]
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT song_id,
                   1.0 / (1.0 + sqrt(
                       power(energy - $1, 2) +
                       power(valence - $2, 2) +
                       power(danceability - $3, 2) +
                       power(acousticness - $4, 2) +
                       power(instrumentalness - $5, 2)
                   )) AS score
            FROM song_audio_features
            ORDER BY score DESC
            LIMIT $6
            "#,
        )
        .bind(target.energy)
        .bind(target.valence)
        .bind(target.danceability)
        .bind(target.acousticness)
        .bind(target.instrumentalness)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn trending_songs(&self, limit: i64) -> AppResult<Vec<ScoredSong>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT song_id, popularity
            FROM trending_songs
            ORDER BY popularity DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn new_releases(&self, limit: i64) -> AppResult<Vec<ScoredSong>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT id, popularity
            FROM songs
            WHERE released_at > NOW() - INTERVAL '30 days'
            ORDER BY released_at DESC, popularity DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn top_songs_in_genre(&self, genre: &str, limit: i64) -> AppResult<Vec<ScoredSong>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT id, popularity
            FROM songs
            WHERE genre = $1
            ORDER BY popularity DESC
            LIMIT $2
            "#,
        )
        .bind(genre)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn songs_for_activity(
        &self,
        activity: Activity,
        limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT song_id, relevance
            FROM activity_songs
            WHERE activity = $1
            ORDER BY relevance DESC
            LIMIT $2
            "#,
        )
        .bind(Self::activity_tag(activity))
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn listening_history_for_time(
        &self,
        user_id: &str,
        time_of_day: TimeOfDay,
        limit: i64,
    ) -> AppResult<Vec<String>> {
        let sql = format!(
            r#"
            SELECT song_id
            FROM plays
            WHERE user_id = $1 AND {}
            ORDER BY played_at DESC
            LIMIT $2
            "#,
            Self::time_of_day_predicate(time_of_day)
        );

        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.into_iter().map(|(song_id,)| song_id).collect())
    }

    async fn similar_artists(
        &self,
        artist_ids: &[String],
        limit: i64,
    ) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT other_artist_id
            FROM artist_similarity
            WHERE artist_id = ANY($1)
            ORDER BY other_artist_id
            LIMIT $2
            "#,
        )
        .bind(artist_ids)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(|(artist_id,)| artist_id).collect())
    }

    async fn followed_artists(&self, user_id: &str) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT artist_id
            FROM artist_follows
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(|(artist_id,)| artist_id).collect())
    }

    async fn songs_by_artists(
        &self,
        artist_ids: &[String],
        limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT id, popularity
            FROM songs
            WHERE artist_id = ANY($1)
            ORDER BY popularity DESC
            LIMIT $2
            "#,
        )
        .bind(artist_ids)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(song_id, score)| ScoredSong { song_id, score })
            .collect())
    }

    async fn save_daily_mix(&self, mix: &DailyMix) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_mixes (id, user_id, name, description, song_ids, genre, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                song_ids = EXCLUDED.song_ids,
                genre = EXCLUDED.genre,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&mix.id)
        .bind(&mix.user_id)
        .bind(&mix.name)
        .bind(&mix.description)
        .bind(&mix.song_ids)
        .bind(&mix.genre)
        .bind(mix.created_at)
        .bind(mix.expires_at)
        .execute(self.pool.as_ref())
        .await?;

        tracing::debug!(mix_id = %mix.id, songs = mix.song_ids.len(), "Daily mix saved");

        Ok(())
    }
}
