//! Starting a report run.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::backend::{AnalysisBackend, GenerateRequest};
use crate::error::{ApiError, ApiResult, BackendError};
use crate::models::{
    ConfigSnapshot, ReportStatus, SnapshotMetadata, SnapshotSource, Source, SourceStatus,
    UserConfig,
};
use crate::store::Store;

pub const DEFAULT_BACKEND_FAILURE: &str = "백엔드 처리 실패";

/// Recorded in every snapshot's metadata.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub llm_model: String,
    pub pipeline_version: String,
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            llm_model: "gemini".to_string(),
            pipeline_version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub report_id: Uuid,
    pub task_id: String,
}

pub fn snapshot_config(config: &UserConfig, sources: &[Source], pipeline: &PipelineInfo) -> ConfigSnapshot {
    ConfigSnapshot {
        keywords: config.keywords.clone(),
        viewpoint: config.viewpoint.clone(),
        schedule_cron: config.schedule_cron.clone(),
        sources: sources
            .iter()
            .map(|source| SnapshotSource {
                source_id: Some(source.id),
                url: source.url.clone(),
                status: source.status,
                crawled_at: None,
            })
            .collect(),
        metadata: Some(SnapshotMetadata {
            config_version: None,
            llm_model: Some(pipeline.llm_model.clone()),
            pipeline_version: Some(pipeline.pipeline_version.clone()),
        }),
    }
}

/// Create a `pending` report from the user's current configuration and hand
/// it to the analysis backend.
///
/// Nothing is written unless a config row and at least one valid source
/// exist. If the backend does not accept the run, the report is kept and
/// marked `failed`. There is no retry.
#[instrument(skip(store, backend, user, pipeline), fields(user_id = %user.id))]
pub async fn generate_report(
    store: &dyn Store,
    backend: &dyn AnalysisBackend,
    user: &AuthUser,
    pipeline: &PipelineInfo,
) -> ApiResult<GenerateOutcome> {
    let config = store.user_config(user).await?.ok_or(ApiError::NoConfig)?;

    let sources = store.sources(user, Some(SourceStatus::Valid)).await?;
    if sources.is_empty() {
        return Err(ApiError::NoSources);
    }

    let snapshot = snapshot_config(&config, &sources, pipeline);
    let report = store
        .create_report(user, &snapshot, Utc::now())
        .await
        .map_err(|err| {
            warn!(error = %err, "could not create report");
            ApiError::CreateFailed
        })?;
    info!(report_id = %report.id, sources = sources.len(), "report created");

    let request = GenerateRequest {
        report_id: report.id,
        user_id: user.id,
        config: snapshot,
    };

    match backend.generate(&request).await {
        Ok(accepted) => Ok(GenerateOutcome {
            report_id: report.id,
            task_id: accepted.task_id,
        }),
        Err(err) => {
            warn!(report_id = %report.id, error = %err, "backend did not accept report");
            if let Err(update_err) = store
                .set_report_status(user, report.id, ReportStatus::Failed)
                .await
            {
                warn!(report_id = %report.id, error = %update_err, "could not mark report failed");
            }

            Err(match err {
                BackendError::Rejected { detail, .. } => ApiError::Backend(
                    detail
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| DEFAULT_BACKEND_FAILURE.to_string()),
                ),
                BackendError::Transport(_) | BackendError::InvalidResponse(_) => {
                    ApiError::BackendConnection
                }
            })
        }
    }
}
