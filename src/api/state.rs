use std::sync::Arc;

use crate::services::HybridRecommendationEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HybridRecommendationEngine>,
}

impl AppState {
    pub fn new(engine: Arc<HybridRecommendationEngine>) -> Self {
        Self { engine }
    }
}
