use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{Activity, Mood, RecommendationContext, TimeOfDay};

const SONG_ADJUSTMENT_TTL_MINUTES: i64 = 30;
const MOOD_WINDOW_HOURS: i64 = 2;
const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 300;

/// A user's explicit or implicit reaction to a song
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Played,
    Skipped,
    Liked,
    Disliked,
    AddedToPlaylist,
}

impl InteractionType {
    fn score_delta(self) -> f64 {
        match self {
            InteractionType::Played => 0.1,
            InteractionType::Skipped => -0.2,
            InteractionType::Liked => 0.3,
            InteractionType::Disliked => -0.5,
            InteractionType::AddedToPlaylist => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SongAdjustment {
    value: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct GenreBoost {
    value: f64,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct MoodEntry {
    mood: Mood,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct RealtimeState {
    /// (user, song) -> accumulated score nudge, clamped to [-1, 1]
    song_adjustments: HashMap<(String, String), SongAdjustment>,
    /// (user, genre) -> temporary boost/reduction with explicit expiry
    genre_boosts: HashMap<(String, String), GenreBoost>,
    moods: HashMap<String, MoodEntry>,
    /// (user, time bucket) -> genre play counts learned from interactions
    time_genre_counts: HashMap<(String, TimeOfDay), HashMap<String, u32>>,
    /// (user, activity) -> genre play counts learned from interactions
    activity_genre_counts: HashMap<(String, Activity), HashMap<String, u32>>,
    /// cache key -> when the engine last marked the merged result fresh
    fresh_keys: HashMap<String, DateTime<Utc>>,
    /// user -> most recent feedback event; feedback after a mark disrupts it
    last_feedback: HashMap<String, DateTime<Utc>>,
}

/// In-memory per-user feedback accumulator
///
/// The composite (user, song) and (user, genre) keys keep per-key
/// read-modify-write atomic under one lock and would shard cleanly if this
/// ever moves to a dedicated store. Entries expire by TTL; a missed
/// `cleanup` never causes stale reads because every accessor re-checks its
/// own expiry window against `now`.
pub struct RealTimeRecommendationCache {
    state: RwLock<RealtimeState>,
    freshness_window: Duration,
}

impl Default for RealTimeRecommendationCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW_SECS)
    }
}

impl RealTimeRecommendationCache {
    pub fn new(freshness_window_secs: i64) -> Self {
        Self {
            state: RwLock::new(RealtimeState::default()),
            freshness_window: Duration::seconds(freshness_window_secs),
        }
    }

    /// Applies a feedback event: nudges the song's score and learns the
    /// genre for the context's time/activity dimensions
    pub fn record_interaction(
        &self,
        user_id: &str,
        song_id: &str,
        genre: Option<&str>,
        interaction: InteractionType,
        context: Option<&RecommendationContext>,
    ) {
        let now = Utc::now();
        self.adjust_song_score_at(user_id, song_id, interaction.score_delta(), now);

        if let (Some(genre), Some(context)) = (genre, context) {
            let mut state = self.state.write().expect("realtime lock poisoned");
            *state
                .time_genre_counts
                .entry((user_id.to_string(), context.time_of_day))
                .or_default()
                .entry(genre.to_string())
                .or_insert(0) += 1;
            if let Some(activity) = context.activity {
                *state
                    .activity_genre_counts
                    .entry((user_id.to_string(), activity))
                    .or_default()
                    .entry(genre.to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    pub fn adjust_song_score(&self, user_id: &str, song_id: &str, delta: f64) {
        self.adjust_song_score_at(user_id, song_id, delta, Utc::now());
    }

    fn adjust_song_score_at(
        &self,
        user_id: &str,
        song_id: &str,
        delta: f64,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.write().expect("realtime lock poisoned");
        let key = (user_id.to_string(), song_id.to_string());
        let current = state
            .song_adjustments
            .get(&key)
            .filter(|a| now < a.updated_at + Duration::minutes(SONG_ADJUSTMENT_TTL_MINUTES))
            .map(|a| a.value)
            .unwrap_or(0.0);
        state.song_adjustments.insert(
            key,
            SongAdjustment {
                value: (current + delta).clamp(-1.0, 1.0),
                updated_at: now,
            },
        );
        state.last_feedback.insert(user_id.to_string(), now);
    }

    /// Accumulated per-song nudge, bounded to [-1, 1]; 0.0 once expired
    pub fn get_song_adjustment(&self, user_id: &str, song_id: &str) -> f64 {
        self.get_song_adjustment_at(user_id, song_id, Utc::now())
    }

    fn get_song_adjustment_at(&self, user_id: &str, song_id: &str, now: DateTime<Utc>) -> f64 {
        let state = self.state.read().expect("realtime lock poisoned");
        state
            .song_adjustments
            .get(&(user_id.to_string(), song_id.to_string()))
            .filter(|a| now < a.updated_at + Duration::minutes(SONG_ADJUSTMENT_TTL_MINUTES))
            .map(|a| a.value)
            .unwrap_or(0.0)
    }

    /// Temporarily boosts a genre for the user; a non-positive duration
    /// stores nothing
    pub fn temporarily_boost_genre(
        &self,
        user_id: &str,
        genre: &str,
        amount: f64,
        duration_minutes: i64,
    ) {
        self.apply_genre_adjustment(user_id, genre, amount, duration_minutes, Utc::now());
    }

    /// Temporarily dampens a genre; the mirror image of a boost
    pub fn temporarily_reduce_genre(
        &self,
        user_id: &str,
        genre: &str,
        amount: f64,
        duration_minutes: i64,
    ) {
        self.apply_genre_adjustment(user_id, genre, -amount, duration_minutes, Utc::now());
    }

    fn apply_genre_adjustment(
        &self,
        user_id: &str,
        genre: &str,
        delta: f64,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) {
        if duration_minutes <= 0 {
            tracing::debug!(user_id, genre, duration_minutes, "Ignoring non-positive genre boost duration");
            return;
        }
        let mut state = self.state.write().expect("realtime lock poisoned");
        let key = (user_id.to_string(), genre.to_string());
        let current = state
            .genre_boosts
            .get(&key)
            .filter(|b| now < b.expires_at)
            .map(|b| b.value)
            .unwrap_or(0.0);
        state.genre_boosts.insert(
            key,
            GenreBoost {
                value: (current + delta).clamp(-1.0, 1.0),
                expires_at: now + Duration::minutes(duration_minutes),
            },
        );
        state.last_feedback.insert(user_id.to_string(), now);
    }

    /// Live boost/reduction for a genre; 0.0 without one
    pub fn get_genre_adjustment(&self, user_id: &str, genre: &str) -> f64 {
        self.get_genre_adjustment_at(user_id, genre, Utc::now())
    }

    fn get_genre_adjustment_at(&self, user_id: &str, genre: &str, now: DateTime<Utc>) -> f64 {
        let state = self.state.read().expect("realtime lock poisoned");
        state
            .genre_boosts
            .get(&(user_id.to_string(), genre.to_string()))
            .filter(|b| now < b.expires_at)
            .map(|b| b.value)
            .unwrap_or(0.0)
    }

    pub fn update_current_mood(&self, user_id: &str, mood: Mood) {
        self.update_current_mood_at(user_id, mood, Utc::now());
    }

    fn update_current_mood_at(&self, user_id: &str, mood: Mood, now: DateTime<Utc>) {
        let mut state = self.state.write().expect("realtime lock poisoned");
        state
            .moods
            .insert(user_id.to_string(), MoodEntry { mood, updated_at: now });
        state.last_feedback.insert(user_id.to_string(), now);
    }

    /// Last reported mood, or `None` once it is older than two hours
    pub fn get_current_mood(&self, user_id: &str) -> Option<Mood> {
        self.get_current_mood_at(user_id, Utc::now())
    }

    fn get_current_mood_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<Mood> {
        let state = self.state.read().expect("realtime lock poisoned");
        state
            .moods
            .get(user_id)
            .filter(|m| now < m.updated_at + Duration::hours(MOOD_WINDOW_HOURS))
            .map(|m| m.mood)
    }

    /// Most-played genre learned for this time bucket
    pub fn top_genre_for_time(&self, user_id: &str, time_of_day: TimeOfDay) -> Option<String> {
        let state = self.state.read().expect("realtime lock poisoned");
        state
            .time_genre_counts
            .get(&(user_id.to_string(), time_of_day))
            .and_then(|counts| {
                counts
                    .iter()
                    .max_by_key(|(genre, count)| (**count, std::cmp::Reverse(genre.as_str())))
                    .map(|(genre, _)| genre.clone())
            })
    }

    /// Most-played genre learned for this activity
    pub fn top_genre_for_activity(&self, user_id: &str, activity: Activity) -> Option<String> {
        let state = self.state.read().expect("realtime lock poisoned");
        state
            .activity_genre_counts
            .get(&(user_id.to_string(), activity))
            .and_then(|counts| {
                counts
                    .iter()
                    .max_by_key(|(genre, count)| (**count, std::cmp::Reverse(genre.as_str())))
                    .map(|(genre, _)| genre.clone())
            })
    }

    /// Records that a merged result was just persisted for this key
    pub fn mark_fresh(&self, cache_key: &str) {
        let mut state = self.state.write().expect("realtime lock poisoned");
        state.fresh_keys.insert(cache_key.to_string(), Utc::now());
    }

    /// Freshness oracle for the persistent result cache
    ///
    /// A cached result is reusable only if it was marked within the window
    /// and the user has produced no feedback since the mark. This is
    /// independent of the Redis entry's own TTL.
    pub fn is_fresh(&self, user_id: &str, cache_key: &str) -> bool {
        self.is_fresh_at(user_id, cache_key, Utc::now())
    }

    fn is_fresh_at(&self, user_id: &str, cache_key: &str, now: DateTime<Utc>) -> bool {
        let state = self.state.read().expect("realtime lock poisoned");
        let Some(marked_at) = state.fresh_keys.get(cache_key) else {
            return false;
        };
        if now >= *marked_at + self.freshness_window {
            return false;
        }
        match state.last_feedback.get(user_id) {
            Some(feedback_at) => feedback_at <= marked_at,
            None => true,
        }
    }

    /// Prunes expired entries; purely a memory reclaim, accessors already
    /// ignore anything expired
    pub fn cleanup(&self) {
        let now = Utc::now();
        let mut state = self.state.write().expect("realtime lock poisoned");
        state
            .song_adjustments
            .retain(|_, a| now < a.updated_at + Duration::minutes(SONG_ADJUSTMENT_TTL_MINUTES));
        state.genre_boosts.retain(|_, b| now < b.expires_at);
        state
            .moods
            .retain(|_, m| now < m.updated_at + Duration::hours(MOOD_WINDOW_HOURS));
        let window = self.freshness_window;
        state.fresh_keys.retain(|_, marked| now < *marked + window);
    }
}
