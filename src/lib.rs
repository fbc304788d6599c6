//! report-portal: HTTP service behind the research report dashboard.
//!
//! Users keep up to three sources with keywords and a viewpoint, start report
//! runs and follow their progress. Analysis happens in an external backend;
//! users, sessions and rows live with the hosted auth provider and database.

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod generate;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod store;

use auth::AuthProvider;
use backend::AnalysisBackend;
use generate::PipelineInfo;
use progress::PollPolicy;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn AuthProvider>,
    pub backend: Arc<dyn AnalysisBackend>,
    pub pipeline: PipelineInfo,
    pub poll: PollPolicy,
}

pub fn build_router(state: AppState) -> Router {
    api::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
