//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::pose::MoveClassifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Every match shares the rules and classifier from config
        let classifier = MoveClassifier::new(config.move_thresholds);
        let match_registry = Arc::new(MatchRegistry::new(config.match_rules, classifier));

        Self {
            config,
            match_registry,
        }
    }
}
