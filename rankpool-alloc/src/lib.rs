//! rankpool-alloc library - image pool allocation and ranking survey
//!
//! Each participant session receives a disjoint, reproducible slice of an
//! image pool, ranks it batch by batch, and submits a JSON export. Claims
//! are durable in SQLite so no image is ever handed to two sessions.

use axum::Router;
use rankpool_common::config::TomlConfig;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod survey;
pub mod types;
pub mod utils;

use services::Allocator;
use survey::SurveyRegistry;
use types::ResourceId;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Allocator over the shared claim ledger
    pub allocator: Allocator,
    /// Open surveys
    pub registry: SurveyRegistry,
    /// Catalogued pool, in catalog order
    pub pool_ids: Arc<Vec<ResourceId>>,
    /// Resolved configuration (n_total, set_size, seed, output_dir)
    pub config: Arc<TomlConfig>,
}

impl AppState {
    /// Create new application state
    pub fn new(allocator: Allocator, pool_ids: Vec<ResourceId>, config: TomlConfig) -> Self {
        Self {
            allocator,
            registry: SurveyRegistry::new(),
            pool_ids: Arc::new(pool_ids),
            config: Arc::new(config),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let sessions = Router::new()
        .route("/api/sessions", post(api::create_session))
        .route("/api/sessions/:session_id", get(api::get_session))
        .route("/api/sessions/:session_id/assignment", post(api::assign_session))
        .route(
            "/api/sessions/:session_id/batches/:set_idx/ranking",
            put(api::put_ranking),
        )
        .route("/api/sessions/:session_id/navigate", post(api::navigate))
        .route("/api/sessions/:session_id/validity", get(api::get_validity))
        .route("/api/sessions/:session_id/submit", post(api::submit_session));

    Router::new()
        .merge(sessions)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
