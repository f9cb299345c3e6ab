use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Activity, AudioFeatures, TimeOfDay};

/// Preferred range for one continuous audio feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

impl Default for FeatureRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Per-feature preferred ranges derived from listening history
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeaturePreferences {
    pub energy: FeatureRange,
    pub valence: FeatureRange,
    pub danceability: FeatureRange,
    pub acousticness: FeatureRange,
    pub instrumentalness: FeatureRange,
}

impl AudioFeaturePreferences {
    /// Midpoint target vector for nearest-neighbor lookups
    pub fn target_features(&self) -> AudioFeatures {
        AudioFeatures {
            energy: self.energy.midpoint(),
            valence: self.valence.midpoint(),
            danceability: self.danceability.midpoint(),
            acousticness: self.acousticness.midpoint(),
            instrumentalness: self.instrumentalness.midpoint(),
            ..AudioFeatures::default()
        }
    }
}

/// Persisted summary of a user's affinities, recomputed externally
///
/// Read-only from the engine's perspective; the repository is its sole
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTasteProfile {
    pub user_id: String,
    /// Genre name to affinity in [0, 1]
    #[serde(default)]
    pub top_genres: HashMap<String, f64>,
    /// Artist id to affinity in [0, 1]
    #[serde(default)]
    pub top_artists: HashMap<String, f64>,
    #[serde(default)]
    pub audio_feature_preferences: AudioFeaturePreferences,
    /// Appetite for unfamiliar music in [0, 1]
    pub discovery_score: f64,
    /// Lean toward chart material in [0, 1]
    pub mainstream_score: f64,
    /// Genres the user historically plays in each time bucket
    #[serde(default)]
    pub time_preferences: HashMap<TimeOfDay, Vec<String>>,
    /// Genres the user historically plays during each activity
    #[serde(default)]
    pub activity_preferences: HashMap<Activity, Vec<String>>,
}

impl UserTasteProfile {
    /// Top `n` genres by affinity, highest first; ties broken by name so
    /// regeneration is stable
    pub fn top_genres_ranked(&self, n: usize) -> Vec<(String, f64)> {
        let mut genres: Vec<(String, f64)> = self
            .top_genres
            .iter()
            .map(|(g, a)| (g.clone(), *a))
            .collect();
        genres.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        genres.truncate(n);
        genres
    }

    /// Top `n` artists by affinity, highest first
    pub fn top_artists_ranked(&self, n: usize) -> Vec<(String, f64)> {
        let mut artists: Vec<(String, f64)> = self
            .top_artists
            .iter()
            .map(|(a, s)| (a.clone(), *s))
            .collect();
        artists.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        artists.truncate(n);
        artists
    }
}
