pub mod daily_mix;
pub mod engine;
pub mod realtime;
pub mod strategies;

pub use engine::{HybridRecommendationEngine, StrategyWeights};
pub use realtime::{InteractionType, RealTimeRecommendationCache};
