//! Shared application state handed to every axum handler.

use std::sync::Arc;

use swarm_common::CoreConfig;
use swarm_core::ProjectRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProjectRegistry>,
    pub config: Arc<CoreConfig>,
}

impl AppState {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            registry: Arc::new(ProjectRegistry::new(config.clone())),
            config: Arc::new(config),
        }
    }
}
