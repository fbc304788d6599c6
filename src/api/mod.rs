//! JSON surface consumed by the dashboard.

mod config;
mod health;
mod reports;
mod session;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiError;
use crate::AppState;

/// `Json` body whose rejection renders as a `BAD_REQUEST` error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

pub fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/me", get(session::me))
        .route("/api/viewpoints", get(config::viewpoints))
        .route("/api/config", get(config::get_config).put(config::save_config))
        .route("/api/reports", get(reports::list_reports))
        .route("/api/reports/generate", post(reports::generate))
        .route("/api/reports/:id", get(reports::report_detail))
        .route("/api/reports/:id/progress", get(reports::progress))
        .route("/api/reports/:id/events", get(reports::progress_events))
        .route("/api/reports/:id/feedback", post(reports::submit_feedback))
        .route("/auth/login", post(session::login))
        .route("/auth/signup", post(session::signup))
        .route("/auth/logout", post(session::logout))
        .route("/auth/callback", get(session::callback))
}
