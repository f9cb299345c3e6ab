use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use serde_json::json;

use cadenza_api::api::{create_router, AppState};
use cadenza_api::db::{create_redis_client, Cache};
use cadenza_api::error::AppResult;
use cadenza_api::models::{
    Activity, AudioFeaturePreferences, AudioFeatures, DailyMix, ScoredSong, SimilarUser,
    TimeOfDay, UserTasteProfile,
};
use cadenza_api::repository::MusicRepository;
use cadenza_api::services::{HybridRecommendationEngine, RealTimeRecommendationCache};

/// In-memory repository with canned pools
///
/// Pool fields left empty simply produce no candidates for the strategies
/// that read them.
#[derive(Default)]
struct FakeRepository {
    profile: Option<UserTasteProfile>,
    trending: Vec<ScoredSong>,
    new_releases: Vec<ScoredSong>,
    genre_songs: HashMap<String, Vec<ScoredSong>>,
    feature_neighbors: Vec<ScoredSong>,
    history: Vec<String>,
}

fn capped(songs: &[ScoredSong], limit: i64) -> Vec<ScoredSong> {
    songs.iter().take(limit as usize).cloned().collect()
}

#[async_trait::async_trait]
impl MusicRepository for FakeRepository {
    async fn find_similar_users(&self, _user_id: &str, _limit: i64) -> AppResult<Vec<SimilarUser>> {
        Ok(Vec::new())
    }

    async fn liked_song_ids(
        &self,
        user_ids: &[String],
        _per_user_limit: i64,
    ) -> AppResult<Vec<Vec<String>>> {
        Ok(user_ids.iter().map(|_| Vec::new()).collect())
    }

    async fn taste_profile(&self, _user_id: &str) -> AppResult<Option<UserTasteProfile>> {
        Ok(self.profile.clone())
    }

    async fn audio_features(&self, song_ids: &[String]) -> AppResult<Vec<AudioFeatures>> {
        Ok(song_ids.iter().map(|_| AudioFeatures::default()).collect())
    }

    async fn songs_by_audio_features(
        &self,
        _target: &AudioFeatures,
        limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        Ok(capped(&self.feature_neighbors, limit))
    }

    async fn trending_songs(&self, limit: i64) -> AppResult<Vec<ScoredSong>> {
        Ok(capped(&self.trending, limit))
    }

    async fn new_releases(&self, limit: i64) -> AppResult<Vec<ScoredSong>> {
        Ok(capped(&self.new_releases, limit))
    }

    async fn top_songs_in_genre(&self, genre: &str, limit: i64) -> AppResult<Vec<ScoredSong>> {
        Ok(self
            .genre_songs
            .get(genre)
            .map(|songs| capped(songs, limit))
            .unwrap_or_default())
    }

    async fn songs_for_activity(
        &self,
        _activity: Activity,
        _limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        Ok(Vec::new())
    }

    async fn listening_history_for_time(
        &self,
        _user_id: &str,
        _time_of_day: TimeOfDay,
        limit: i64,
    ) -> AppResult<Vec<String>> {
        Ok(self.history.iter().take(limit as usize).cloned().collect())
    }

    async fn similar_artists(&self, _artist_ids: &[String], _limit: i64) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn followed_artists(&self, _user_id: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn songs_by_artists(
        &self,
        _artist_ids: &[String],
        _limit: i64,
    ) -> AppResult<Vec<ScoredSong>> {
        Ok(Vec::new())
    }

    async fn save_daily_mix(&self, _mix: &DailyMix) -> AppResult<()> {
        Ok(())
    }
}

fn songs(prefix: &str, count: usize, base_score: f64) -> Vec<ScoredSong> {
    (0..count)
        .map(|i| ScoredSong {
            song_id: format!("{}{}", prefix, i),
            score: (base_score - i as f64 * 0.01).max(0.1),
        })
        .collect()
}

fn rock_lover_profile() -> UserTasteProfile {
    UserTasteProfile {
        user_id: "u1".to_string(),
        top_genres: [("Rock".to_string(), 0.9)].into_iter().collect(),
        top_artists: HashMap::new(),
        audio_feature_preferences: AudioFeaturePreferences::default(),
        discovery_score: 0.5,
        mainstream_score: 0.6,
        time_preferences: HashMap::new(),
        activity_preferences: HashMap::new(),
    }
}

fn stocked_repository() -> FakeRepository {
    FakeRepository {
        profile: Some(rock_lover_profile()),
        trending: songs("t", 10, 0.8),
        new_releases: songs("n", 5, 0.6),
        genre_songs: [("Rock".to_string(), songs("r", 25, 0.9))]
            .into_iter()
            .collect(),
        feature_neighbors: songs("f", 10, 0.7),
        history: Vec::new(),
    }
}

async fn create_test_server(repository: FakeRepository) -> TestServer {
    // An unroutable Redis endpoint: every cache operation degrades to a miss
    let client = create_redis_client("redis://127.0.0.1:1").unwrap();
    let (cache, _writer) = Cache::new(client).await;

    let engine = Arc::new(
        HybridRecommendationEngine::with_default_strategies(
            Arc::new(repository),
            Arc::new(RealTimeRecommendationCache::default()),
            cache,
            300,
        )
        .with_seeded_rng(42),
    );

    let app = create_router(AppState::new(engine));
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(FakeRepository::default()).await;
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_recommendations_respect_limit_and_uniqueness() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": "u1", "limit": 5 }))
        .await;

    response.assert_status_ok();
    let result: serde_json::Value = response.json();
    let recommendations = result["recommendations"].as_array().unwrap();
    assert!(!recommendations.is_empty());
    assert!(recommendations.len() <= 5);

    let mut ids: Vec<&str> = recommendations
        .iter()
        .map(|r| r["song_id"].as_str().unwrap())
        .collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);

    assert_eq!(result["cache_hit"], false);
    assert!(!result["strategies"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_recommendations_honor_excludes() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": "u1",
            "limit": 20,
            "exclude_song_ids": ["t0", "r0"]
        }))
        .await;

    response.assert_status_ok();
    let result: serde_json::Value = response.json();
    for rec in result["recommendations"].as_array().unwrap() {
        let id = rec["song_id"].as_str().unwrap();
        assert_ne!(id, "t0");
        assert_ne!(id, "r0");
    }
}

#[tokio::test]
async fn test_recommendations_reject_zero_limit() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": "u1", "limit": 0 }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommendations_reject_blank_user() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": "  ", "limit": 10 }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_playlist_continuation_rejects_empty_playlist() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations/playlist")
        .json(&json!({ "user_id": "u1", "playlist_song_ids": [] }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_song_radio_returns_neighbors_without_the_seed() {
    let server = create_test_server(stocked_repository()).await;

    let response = server.get("/api/v1/users/u1/radio/f0").await;

    response.assert_status_ok();
    let result: serde_json::Value = response.json();
    let recommendations = result["recommendations"].as_array().unwrap();
    assert!(!recommendations.is_empty());
    for rec in recommendations {
        assert_ne!(rec["song_id"].as_str().unwrap(), "f0");
    }
}

#[tokio::test]
async fn test_contextual_recommendations() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/recommendations/contextual")
        .json(&json!({
            "user_id": "u1",
            "limit": 10,
            "context": {
                "time_of_day": "evening",
                "day_of_week": "Fri",
                "activity": "relaxing",
                "mood": "calm"
            }
        }))
        .await;

    response.assert_status_ok();
    let result: serde_json::Value = response.json();
    assert!(result["recommendations"].as_array().unwrap().len() <= 10);
}

#[tokio::test]
async fn test_daily_mixes_empty_without_profile() {
    let server = create_test_server(FakeRepository::default()).await;

    let response = server.post("/api/v1/users/u1/daily-mixes").await;

    response.assert_status_ok();
    let mixes: Vec<serde_json::Value> = response.json();
    assert!(mixes.is_empty());
}

#[tokio::test]
async fn test_feedback_endpoints_accept_events() {
    let server = create_test_server(stocked_repository()).await;

    let response = server
        .post("/api/v1/feedback/interaction")
        .json(&json!({
            "user_id": "u1",
            "song_id": "t0",
            "genre": "Rock",
            "interaction": "liked",
            "context": { "time_of_day": "morning", "day_of_week": "Mon" }
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server
        .post("/api/v1/feedback/genre-boost")
        .json(&json!({
            "user_id": "u1",
            "genre": "Rock",
            "amount": 0.3,
            "duration_minutes": 60
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = server
        .post("/api/v1/feedback/mood")
        .json(&json!({ "user_id": "u1", "mood": "energetic" }))
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_dislike_lowers_a_songs_score_on_the_next_request() {
    let server = create_test_server(stocked_repository()).await;
    let request = json!({ "user_id": "u1", "limit": 5 });

    let first: serde_json::Value = server
        .post("/api/v1/recommendations")
        .json(&request)
        .await
        .json();
    let top = first["recommendations"][0].clone();
    let top_id = top["song_id"].as_str().unwrap().to_string();
    let top_score = top["score"].as_f64().unwrap();
    assert!(top_score > 0.0);

    let response = server
        .post("/api/v1/feedback/interaction")
        .json(&json!({
            "user_id": "u1",
            "song_id": top_id,
            "interaction": "disliked"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    // Feedback after the freshness mark forces a recompute, so the
    // adjustment is visible immediately
    let second: serde_json::Value = server
        .post("/api/v1/recommendations")
        .json(&request)
        .await
        .json();
    let adjusted = second["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["song_id"] == top_id.as_str());

    match adjusted {
        Some(rec) => assert!(rec["score"].as_f64().unwrap() < top_score),
        // Dropping out of the top 5 entirely is the same outcome, stronger
        None => {}
    }
}
