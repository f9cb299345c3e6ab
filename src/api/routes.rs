use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Recommendations
        .route("/recommendations", post(handlers::recommend))
        .route(
            "/recommendations/contextual",
            post(handlers::recommend_contextual),
        )
        .route(
            "/recommendations/playlist",
            post(handlers::recommend_playlist_continuation),
        )
        .route(
            "/users/:user_id/radio/:song_id",
            get(handlers::song_radio),
        )
        .route(
            "/users/:user_id/daily-mixes",
            post(handlers::generate_daily_mixes),
        )
        // Real-time feedback
        .route("/feedback/interaction", post(handlers::record_interaction))
        .route("/feedback/genre-boost", post(handlers::boost_genre))
        .route("/feedback/mood", post(handlers::update_mood))
}
