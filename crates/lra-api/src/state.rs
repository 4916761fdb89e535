//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. The coordinator holds the saga registry and the
//! participant client; handlers never touch either directly.

use std::sync::Arc;

use lra_client::ParticipantCallError;

use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::registry::Registry;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Wrap an existing coordinator.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Build a coordinator over an empty in-memory registry.
    pub fn with_config(config: CoordinatorConfig) -> Result<Self, ParticipantCallError> {
        let coordinator = Coordinator::new(Registry::new(), config)?;
        Ok(Self::new(Arc::new(coordinator)))
    }
}
