//! Report progress as shown to the user, and the polling loop behind it.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::StoreResult;
use crate::models::ReportStatus;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Idle,
    Collecting,
    Analyzing,
    Synthesizing,
    Completed,
    Partial,
    Failed,
}

impl From<ReportStatus> for ProgressStage {
    fn from(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Pending => ProgressStage::Idle,
            ReportStatus::Collecting => ProgressStage::Collecting,
            ReportStatus::Analyzing => ProgressStage::Analyzing,
            ReportStatus::Synthesizing => ProgressStage::Synthesizing,
            ReportStatus::Completed => ProgressStage::Completed,
            ReportStatus::Partial => ProgressStage::Partial,
            ReportStatus::Failed => ProgressStage::Failed,
        }
    }
}

impl ProgressStage {
    pub fn percent(self) -> u8 {
        match self {
            ProgressStage::Idle | ProgressStage::Failed => 0,
            ProgressStage::Collecting => 25,
            ProgressStage::Analyzing => 50,
            ProgressStage::Synthesizing => 75,
            ProgressStage::Completed | ProgressStage::Partial => 100,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ProgressStage::Idle => "대기 중",
            ProgressStage::Collecting => "소스 데이터 수집 중...",
            ProgressStage::Analyzing => "개별 기사 분석 중...",
            ProgressStage::Synthesizing => "최종 인사이트 도출 중...",
            ProgressStage::Completed => "완료",
            ProgressStage::Partial => "일부 소스 실패 (완료)",
            ProgressStage::Failed => "실패",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressStage::Completed | ProgressStage::Partial | ProgressStage::Failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: ProgressStage,
    pub percent: u8,
    pub message: String,
}

impl ProgressSnapshot {
    pub fn of(status: ReportStatus) -> Self {
        let stage = ProgressStage::from(status);
        Self {
            stage,
            percent: stage.percent(),
            message: stage.message().to_string(),
        }
    }

    /// No report to follow: missing id, no session, or no such report.
    pub fn unavailable() -> Self {
        Self {
            stage: ProgressStage::Idle,
            percent: 0,
            message: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Stop following after this long. `None` follows until a terminal stage.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: None,
        }
    }
}

/// Reads the current status of a report; `None` when it is not visible.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn status(&self, report_id: Uuid) -> StoreResult<Option<ReportStatus>>;
}

/// Status lookups through the row store on behalf of one user.
#[derive(Clone)]
pub struct StoreProbe {
    store: Arc<dyn Store>,
    user: AuthUser,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn Store>, user: AuthUser) -> Self {
        Self { store, user }
    }
}

#[async_trait]
impl StatusProbe for StoreProbe {
    async fn status(&self, report_id: Uuid) -> StoreResult<Option<ReportStatus>> {
        Ok(self
            .store
            .report(&self.user, report_id)
            .await?
            .map(|report| report.status))
    }
}

/// One-shot progress lookup.
pub async fn current_progress(probe: &dyn StatusProbe, report_id: Uuid) -> StoreResult<ProgressSnapshot> {
    Ok(probe
        .status(report_id)
        .await?
        .map(ProgressSnapshot::of)
        .unwrap_or_else(ProgressSnapshot::unavailable))
}

/// Follow a report until it reaches a terminal stage.
///
/// Yields one snapshot per successful fetch, fetching every
/// `policy.interval`. An unknown report yields a single unavailable snapshot
/// and ends. Fetch errors are logged and retried on the next tick. Dropping
/// the stream stops the polling.
pub fn watch_progress<P>(
    probe: P,
    report_id: Uuid,
    policy: PollPolicy,
) -> impl Stream<Item = ProgressSnapshot>
where
    P: StatusProbe + 'static,
{
    async_stream::stream! {
        let started = Instant::now();

        loop {
            match probe.status(report_id).await {
                Ok(Some(status)) => {
                    let snapshot = ProgressSnapshot::of(status);
                    let terminal = snapshot.stage.is_terminal();
                    debug!(%report_id, %status, "progress polled");
                    yield snapshot;
                    if terminal {
                        break;
                    }
                }
                Ok(None) => {
                    yield ProgressSnapshot::unavailable();
                    break;
                }
                Err(err) => {
                    warn!(%report_id, error = %err, "progress poll failed");
                }
            }

            if let Some(timeout) = policy.timeout {
                if started.elapsed() + policy.interval > timeout {
                    warn!(%report_id, ?timeout, "gave up following report");
                    break;
                }
            }

            tokio::time::sleep(policy.interval).await;
        }
    }
}
