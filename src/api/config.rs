use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{data, ApiJson, Envelope};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::models::{Source, UserConfig, ViewpointPreset, VIEWPOINT_PRESETS};
use crate::reconcile::{save_sources, SaveOutcome, SourceInput};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub config: Option<UserConfig>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize)]
pub struct SaveConfigRequest {
    #[serde(default)]
    pub sources: Vec<SourceInput>,
}

/// GET /api/config
pub async fn get_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<ConfigView>>> {
    let config = state.store.user_config(&user).await?;
    let sources = state.store.sources(&user, None).await?;
    Ok(data(ConfigView { config, sources }))
}

/// PUT /api/config
pub async fn save_config(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<SaveConfigRequest>,
) -> ApiResult<Json<Envelope<SaveOutcome>>> {
    let outcome = save_sources(state.store.as_ref(), &user, &body.sources).await?;
    Ok(data(outcome))
}

/// GET /api/viewpoints
pub async fn viewpoints() -> Json<Envelope<&'static [ViewpointPreset]>> {
    data(VIEWPOINT_PRESETS)
}
