//! # lra-api: HTTP Coordinator for Long Running Actions
//!
//! Serves the LRA coordination protocol over Axum and runs the recovery
//! loop that drives closing and cancelling sagas to completion.
//!
//! ## API Surface
//!
//! | Path                   | Module                 | Purpose                  |
//! |------------------------|------------------------|--------------------------|
//! | `/start`, `/:id/*`     | [`routes::lra`]        | Coordination protocol    |
//! | `/`                    | [`routes::lra`]        | List sagas               |
//! | `/recovery`            | [`routes::lra`]        | Sagas still recovering   |
//! | `/health/*`            | this module            | Liveness and readiness   |
//!
//! ## Layers
//!
//! ```text
//! routes ─► Coordinator ─► Registry (lra-state aggregates, snapshot file)
//!                      └─► ParticipantClient (lra-client)
//! RecoveryTask ─► Coordinator::sweep
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod recovery;
pub mod registry;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{CoordinatorArgs, CoordinatorConfig};
pub use coordinator::Coordinator;
pub use error::AppError;
pub use recovery::RecoveryTask;
pub use registry::Registry;
pub use state::AppState;

/// Assemble the application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::lra::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe. Always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. Returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
