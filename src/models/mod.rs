use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub mod taste_profile;

pub use taste_profile::{AudioFeaturePreferences, FeatureRange, UserTasteProfile};

/// Why a song was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationReason {
    CollaborativeFiltering,
    AudioFeatures,
    SimilarToLiked,
    TrendingNow,
    PopularInGenre,
    NewRelease,
    TimeBased,
    ActivityBased,
    Discovery,
    ArtistSimilarity,
}

/// Coarse time bucket used by context scoring and listening history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Buckets an hour-of-day (0-23); night wraps midnight
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Working,
    Studying,
    Exercising,
    Commuting,
    Relaxing,
    Partying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    Energetic,
    Calm,
    Focused,
    Melancholic,
}

/// Listening context attached to a request; consumed by strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub time_of_day: TimeOfDay,
    pub day_of_week: Weekday,
    #[serde(default)]
    pub activity: Option<Activity>,
    #[serde(default)]
    pub mood: Option<Mood>,
}

/// A single recommendation request
///
/// Transient: created per call and discarded. Excluded songs never appear
/// in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    pub limit: usize,
    #[serde(default)]
    pub context: Option<RecommendationContext>,
    #[serde(default)]
    pub seed_song_ids: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_song_ids: HashSet<String>,
    /// Trades strict score ranking for randomized inclusion of lower-ranked
    /// candidates; clamped to [0, 1]
    #[serde(default)]
    pub diversity_factor: f64,
    /// Mainstream/trending weighting versus niche signals; clamped to [0, 1]
    #[serde(default = "default_popularity_bias")]
    pub popularity_bias: f64,
    #[serde(default)]
    pub seed_genres: Option<Vec<String>>,
}

fn default_popularity_bias() -> f64 {
    0.5
}

impl RecommendationRequest {
    /// Creates a request with neutral knobs
    pub fn for_user(user_id: impl Into<String>, limit: usize) -> Self {
        Self {
            user_id: user_id.into(),
            limit,
            context: None,
            seed_song_ids: None,
            exclude_song_ids: HashSet::new(),
            diversity_factor: 0.0,
            popularity_bias: default_popularity_bias(),
            seed_genres: None,
        }
    }
}

/// A scored song with the reason and metadata that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub song_id: String,
    pub score: f64,
    pub reason: RecommendationReason,
    #[serde(default)]
    pub context: Option<RecommendationContext>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Recommendation {
    pub fn new(song_id: impl Into<String>, score: f64, reason: RecommendationReason) -> Self {
        Self {
            song_id: song_id.into(),
            score,
            reason,
            context: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Final engine output for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendations: Vec<Recommendation>,
    pub execution_time_ms: u64,
    pub cache_hit: bool,
    /// Names of the strategies that produced any contribution
    pub strategies: Vec<String>,
}

/// A named, time-boxed mix persisted by the repository
///
/// The id is deterministic from (user, mix kind), so regeneration
/// overwrites instead of duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMix {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub song_ids: Vec<String>,
    #[serde(default)]
    pub genre: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A candidate from one of the repository's scored pools
///
/// The score semantics depend on the pool: popularity for trending pools,
/// similarity for nearest-neighbor lookups. Always in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSong {
    pub song_id: String,
    pub score: f64,
}

/// A similarity-ranked neighbor from the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity: f64,
}

/// Precomputed audio-feature vector for a song
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub speechiness: f64,
    pub liveness: f64,
    pub loudness: f64,
    pub tempo: f64,
    pub key: i32,
    pub mode: i32,
    pub time_signature: i32,
}

impl Default for AudioFeatures {
    fn default() -> Self {
        Self {
            energy: 0.5,
            valence: 0.5,
            danceability: 0.5,
            acousticness: 0.5,
            instrumentalness: 0.0,
            speechiness: 0.1,
            liveness: 0.2,
            loudness: -10.0,
            tempo: 120.0,
            key: 0,
            mode: 1,
            time_signature: 4,
        }
    }
}

impl AudioFeatures {
    /// Component-wise mean of a non-empty set of feature vectors
    ///
    /// Returns `None` for an empty input.
    pub fn centroid(features: &[AudioFeatures]) -> Option<AudioFeatures> {
        if features.is_empty() {
            return None;
        }
        let n = features.len() as f64;
        let mut acc = AudioFeatures {
            energy: 0.0,
            valence: 0.0,
            danceability: 0.0,
            acousticness: 0.0,
            instrumentalness: 0.0,
            speechiness: 0.0,
            liveness: 0.0,
            loudness: 0.0,
            tempo: 0.0,
            key: features[0].key,
            mode: features[0].mode,
            time_signature: features[0].time_signature,
        };
        for f in features {
            acc.energy += f.energy;
            acc.valence += f.valence;
            acc.danceability += f.danceability;
            acc.acousticness += f.acousticness;
            acc.instrumentalness += f.instrumentalness;
            acc.speechiness += f.speechiness;
            acc.liveness += f.liveness;
            acc.loudness += f.loudness;
            acc.tempo += f.tempo;
        }
        acc.energy /= n;
        acc.valence /= n;
        acc.danceability /= n;
        acc.acousticness /= n;
        acc.instrumentalness /= n;
        acc.speechiness /= n;
        acc.liveness /= n;
        acc.loudness /= n;
        acc.tempo /= n;
        Some(acc)
    }
}
