use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::BackendError;
use crate::models::ConfigSnapshot;

/// Body of `POST /api/reports/generate` on the analysis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub config: ConfigSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAccepted {
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
struct RejectionBody {
    detail: Option<String>,
}

/// The external service that collects, analyzes and synthesizes reports.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateAccepted, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/reports/generate", self.base_url)
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    #[instrument(skip(self, request), fields(report_id = %request.report_id))]
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateAccepted, BackendError> {
        let response = self
            .client
            .post(self.generate_url())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The body is optional; a non-JSON error page just loses the detail.
            let detail = response
                .json::<RejectionBody>()
                .await
                .ok()
                .and_then(|body| body.detail);
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let accepted: GenerateAccepted = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        info!(task_id = %accepted.task_id, "backend accepted report");
        Ok(accepted)
    }
}
