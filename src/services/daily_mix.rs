use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{DailyMix, RecommendationRequest, TimeOfDay, UserTasteProfile},
    services::engine::HybridRecommendationEngine,
};

const MIN_MIX_SONGS: usize = 20;
const MIX_SONG_LIMIT: usize = 30;
const GENRE_MIX_COUNT: usize = 3;
const TIME_MACHINE_HISTORY_DEPTH: i64 = 500;

const TOP_HITS_EXPIRY_DAYS: i64 = 1;
const GENRE_MIX_EXPIRY_DAYS: i64 = 1;
const DISCOVERY_EXPIRY_DAYS: i64 = 7;
const TIME_MACHINE_EXPIRY_DAYS: i64 = 3;

fn build_mix(
    id: String,
    user_id: &str,
    name: &str,
    description: &str,
    song_ids: Vec<String>,
    genre: Option<String>,
    now: DateTime<Utc>,
    expiry_days: i64,
) -> DailyMix {
    DailyMix {
        id,
        user_id: user_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        song_ids,
        genre,
        created_at: now,
        expires_at: now + Duration::days(expiry_days),
    }
}

impl HybridRecommendationEngine {
    /// Generates the user's daily mixes and persists each one
    ///
    /// Up to six mixes: Top Hits, three genre mixes built concurrently, a
    /// Discovery mix, and a Time Machine mix from per-time-of-day history.
    /// Any mix below 20 songs is silently discarded, never padded. A user
    /// with no persisted taste profile gets an empty list; repository
    /// failures are fatal for the whole operation.
    pub async fn generate_daily_mixes(self: &Arc<Self>, user_id: &str) -> AppResult<Vec<DailyMix>> {
        let profile = match self.repository().taste_profile(user_id).await? {
            Some(profile) => profile,
            None => {
                tracing::debug!(user_id, "No taste profile, skipping daily mixes");
                return Ok(Vec::new());
            }
        };

        let now = Utc::now();
        let mut mixes = Vec::new();

        if let Some(mix) = self.top_hits_mix(user_id, now).await? {
            mixes.push(mix);
        }
        mixes.extend(self.genre_mixes(user_id, &profile, now).await?);
        if let Some(mix) = self.discovery_mix(user_id, now).await? {
            mixes.push(mix);
        }
        if let Some(mix) = self.time_machine_mix(user_id, now).await? {
            mixes.push(mix);
        }

        for mix in &mixes {
            self.repository().save_daily_mix(mix).await?;
        }

        tracing::info!(user_id, mix_count = mixes.len(), "Daily mixes generated");
        Ok(mixes)
    }

    /// Familiar favorites with a strong mainstream lean
    async fn top_hits_mix(&self, user_id: &str, now: DateTime<Utc>) -> AppResult<Option<DailyMix>> {
        let mut request = RecommendationRequest::for_user(user_id, MIX_SONG_LIMIT);
        request.popularity_bias = 0.8;
        request.diversity_factor = 0.2;

        let result = self.get_recommendations(request).await?;
        let song_ids: Vec<String> = result
            .recommendations
            .into_iter()
            .map(|r| r.song_id)
            .collect();
        if song_ids.len() < MIN_MIX_SONGS {
            return Ok(None);
        }

        Ok(Some(build_mix(
            format!("mix:{}:top-hits", user_id),
            user_id,
            "Top Hits",
            "The biggest songs for you right now",
            song_ids,
            None,
            now,
            TOP_HITS_EXPIRY_DAYS,
        )))
    }

    /// One mix per top-affinity genre, generated concurrently
    ///
    /// A genre is only attempted when its popularity pool already holds
    /// enough candidates, so a thin catalog never produces a padded mix.
    async fn genre_mixes(
        self: &Arc<Self>,
        user_id: &str,
        profile: &UserTasteProfile,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<DailyMix>> {
        let top_genres = profile.top_genres_ranked(GENRE_MIX_COUNT);

        let mut tasks = Vec::with_capacity(top_genres.len());
        for (index, (genre, _affinity)) in top_genres.into_iter().enumerate() {
            let engine = Arc::clone(self);
            let user_id = user_id.to_string();
            tasks.push(tokio::spawn(async move {
                engine.genre_mix(&user_id, &genre, index, now).await
            }));
        }

        let mut mixes = Vec::new();
        for task in tasks {
            let mix = task
                .await
                .map_err(|e| AppError::Internal(format!("Daily mix task join error: {}", e)))??;
            if let Some(mix) = mix {
                mixes.push(mix);
            }
        }
        Ok(mixes)
    }

    async fn genre_mix(
        &self,
        user_id: &str,
        genre: &str,
        index: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Option<DailyMix>> {
        let pool = self
            .repository()
            .top_songs_in_genre(genre, MIN_MIX_SONGS as i64)
            .await?;
        if pool.len() < MIN_MIX_SONGS {
            tracing::debug!(user_id, genre, pool = pool.len(), "Genre pool too thin for a mix");
            return Ok(None);
        }

        let mut request = RecommendationRequest::for_user(user_id, MIX_SONG_LIMIT);
        request.seed_genres = Some(vec![genre.to_string()]);

        let result = self.get_recommendations(request).await?;
        let song_ids: Vec<String> = result
            .recommendations
            .into_iter()
            .map(|r| r.song_id)
            .collect();
        if song_ids.len() < MIN_MIX_SONGS {
            return Ok(None);
        }

        Ok(Some(build_mix(
            format!("mix:{}:genre:{}", user_id, index),
            user_id,
            &format!("{} Mix", genre),
            &format!("A daily dose of {}", genre),
            song_ids,
            Some(genre.to_string()),
            now,
            GENRE_MIX_EXPIRY_DAYS,
        )))
    }

    /// Unfamiliar songs from the discovery strategy alone, heavily shuffled
    ///
    /// Bypasses the hybrid merge: the other strategies would drown out the
    /// exploratory candidates this mix exists for. With no discovery
    /// strategy configured the mix is skipped.
    async fn discovery_mix(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<DailyMix>> {
        let strategy = match self.discovery_strategy() {
            Some(strategy) => strategy,
            None => return Ok(None),
        };

        // The request asks for a double-size candidate pool because the
        // aggressive diversity sampling below keeps well under half of it
        let mut request = RecommendationRequest::for_user(user_id, MIX_SONG_LIMIT * 2);
        request.popularity_bias = 0.3;
        request.diversity_factor = 0.7;

        let mut recommendations = strategy.recommend(&request).await?;
        recommendations = self.sample_diversity(recommendations, request.diversity_factor);
        recommendations.truncate(MIX_SONG_LIMIT);

        let song_ids: Vec<String> = recommendations.into_iter().map(|r| r.song_id).collect();
        if song_ids.len() < MIN_MIX_SONGS {
            return Ok(None);
        }

        Ok(Some(build_mix(
            format!("mix:{}:discovery", user_id),
            user_id,
            "Discovery Mix",
            "New music picked for your taste",
            song_ids,
            None,
            now,
            DISCOVERY_EXPIRY_DAYS,
        )))
    }

    /// Past favorites for this time of day, ranked by play frequency
    ///
    /// Built straight from raw history, bypassing the engine entirely.
    async fn time_machine_mix(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<DailyMix>> {
        let time_of_day = TimeOfDay::from_hour(now.hour());
        let history = self
            .repository()
            .listening_history_for_time(user_id, time_of_day, TIME_MACHINE_HISTORY_DEPTH)
            .await?;

        let mut play_counts: HashMap<String, usize> = HashMap::new();
        for song_id in history {
            *play_counts.entry(song_id).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, usize)> = play_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(MIX_SONG_LIMIT);

        let song_ids: Vec<String> = ranked.into_iter().map(|(song_id, _)| song_id).collect();
        if song_ids.len() < MIN_MIX_SONGS {
            return Ok(None);
        }

        Ok(Some(build_mix(
            format!("mix:{}:time-machine", user_id),
            user_id,
            "Time Machine",
            "Songs you kept coming back to at this hour",
            song_ids,
            None,
            now,
            TIME_MACHINE_EXPIRY_DAYS,
        )))
    }
}
