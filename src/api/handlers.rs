use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{
    DailyMix, Mood, RecommendationContext, RecommendationRequest, RecommendationResult,
};
use crate::services::InteractionType;

use super::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

// Request types

#[derive(Debug, Deserialize)]
pub struct ContextualRequest {
    pub user_id: String,
    pub context: RecommendationContext,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistContinuationRequest {
    pub user_id: String,
    pub playlist_song_ids: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct RadioParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,
    pub song_id: String,
    #[serde(default)]
    pub genre: Option<String>,
    pub interaction: InteractionType,
    #[serde(default)]
    pub context: Option<RecommendationContext>,
}

#[derive(Debug, Deserialize)]
pub struct GenreBoostRequest {
    pub user_id: String,
    pub genre: String,
    /// Positive boosts the genre, negative dampens it
    pub amount: f64,
    pub duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct MoodRequest {
    pub user_id: String,
    pub mood: Mood,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_limit(limit: usize) -> AppResult<usize> {
    if limit == 0 {
        return Err(AppError::InvalidInput("limit must be positive".to_string()));
    }
    Ok(limit.min(MAX_LIMIT))
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Hybrid recommendations for an arbitrary request
pub async fn recommend(
    State(state): State<AppState>,
    Json(mut request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResult>> {
    validate_user_id(&request.user_id)?;
    request.limit = validate_limit(request.limit)?;
    request.diversity_factor = request.diversity_factor.clamp(0.0, 1.0);
    request.popularity_bias = request.popularity_bias.clamp(0.0, 1.0);

    let result = state.engine.get_recommendations(request).await?;
    Ok(Json(result))
}

/// Recommendations for an explicit listening situation
pub async fn recommend_contextual(
    State(state): State<AppState>,
    Json(request): Json<ContextualRequest>,
) -> AppResult<Json<RecommendationResult>> {
    validate_user_id(&request.user_id)?;
    let limit = validate_limit(request.limit)?;

    let result = state
        .engine
        .get_contextual_recommendations(&request.user_id, request.context, limit)
        .await?;
    Ok(Json(result))
}

/// Songs that continue an existing playlist
pub async fn recommend_playlist_continuation(
    State(state): State<AppState>,
    Json(request): Json<PlaylistContinuationRequest>,
) -> AppResult<Json<RecommendationResult>> {
    validate_user_id(&request.user_id)?;
    let limit = validate_limit(request.limit)?;
    if request.playlist_song_ids.is_empty() {
        return Err(AppError::InvalidInput(
            "playlist_song_ids must not be empty".to_string(),
        ));
    }

    let result = state
        .engine
        .get_playlist_continuation(&request.user_id, &request.playlist_song_ids, limit)
        .await?;
    Ok(Json(result))
}

/// A radio stream grown from one song
pub async fn song_radio(
    State(state): State<AppState>,
    Path((user_id, song_id)): Path<(String, String)>,
    Query(params): Query<RadioParams>,
) -> AppResult<Json<RecommendationResult>> {
    validate_user_id(&user_id)?;
    let limit = validate_limit(params.limit.unwrap_or(DEFAULT_LIMIT))?;

    let result = state.engine.get_song_radio(&user_id, &song_id, limit).await?;
    Ok(Json(result))
}

/// Regenerates and returns the user's daily mixes
pub async fn generate_daily_mixes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<DailyMix>>> {
    validate_user_id(&user_id)?;

    let mixes = state.engine.generate_daily_mixes(&user_id).await?;
    Ok(Json(mixes))
}

/// Records a listening interaction as real-time feedback
pub async fn record_interaction(
    State(state): State<AppState>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<StatusCode> {
    validate_user_id(&request.user_id)?;

    state.engine.realtime().record_interaction(
        &request.user_id,
        &request.song_id,
        request.genre.as_deref(),
        request.interaction,
        request.context.as_ref(),
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Temporarily boosts (or dampens, for a negative amount) a genre
pub async fn boost_genre(
    State(state): State<AppState>,
    Json(request): Json<GenreBoostRequest>,
) -> AppResult<StatusCode> {
    validate_user_id(&request.user_id)?;
    if request.genre.trim().is_empty() {
        return Err(AppError::InvalidInput("genre must not be empty".to_string()));
    }

    let realtime = state.engine.realtime();
    if request.amount >= 0.0 {
        realtime.temporarily_boost_genre(
            &request.user_id,
            &request.genre,
            request.amount,
            request.duration_minutes,
        );
    } else {
        realtime.temporarily_reduce_genre(
            &request.user_id,
            &request.genre,
            -request.amount,
            request.duration_minutes,
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Updates the user's current mood
pub async fn update_mood(
    State(state): State<AppState>,
    Json(request): Json<MoodRequest>,
) -> AppResult<StatusCode> {
    validate_user_id(&request.user_id)?;

    state
        .engine
        .realtime()
        .update_current_mood(&request.user_id, request.mood);
    Ok(StatusCode::NO_CONTENT)
}
