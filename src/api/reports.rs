use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{data, ApiJson, Envelope};
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::generate::{generate_report, GenerateOutcome};
use crate::models::{
    ActionItem, ExecutiveSummary, FeedbackDraft, Report, ReportFeedback, ReportSection,
};
use crate::progress::{current_progress, watch_progress, ProgressSnapshot, StoreProbe};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Feedback body. The rating is read wide so out-of-range values reach the
/// range check instead of failing to parse.
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub sections: Vec<ReportSection>,
    pub summary: Option<ExecutiveSummary>,
    pub action: Option<ActionItem>,
}

/// POST /api/reports/generate
#[instrument(skip_all)]
pub async fn generate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<GenerateOutcome>>> {
    let outcome = generate_report(
        state.store.as_ref(),
        state.backend.as_ref(),
        &user,
        &state.pipeline,
    )
    .await?;

    info!(report_id = %outcome.report_id, task_id = %outcome.task_id, "report generation started");
    Ok(data(outcome))
}

/// GET /api/reports?limit=N
pub async fn list_reports(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Envelope<Vec<Report>>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(data(state.store.reports(&user, limit).await?))
}

/// GET /api/reports/:id
pub async fn report_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<ReportDetail>>> {
    let report = state
        .store
        .report(&user, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("리포트를 찾을 수 없습니다.".into()))?;
    let sections = state.store.report_sections(&user, id).await?;

    let summary = report
        .executive_summary
        .as_ref()
        .and_then(ExecutiveSummary::from_json);
    let action = report.action_item.as_ref().and_then(ActionItem::from_json);

    Ok(data(ReportDetail {
        report,
        sections,
        summary,
        action,
    }))
}

/// GET /api/reports/:id/progress
///
/// Without a session the report is simply not visible, so this answers idle
/// rather than 401.
pub async fn progress(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Envelope<ProgressSnapshot>>> {
    let Some(CurrentUser(user)) = user else {
        return Ok(data(ProgressSnapshot::unavailable()));
    };

    let probe = StoreProbe::new(state.store.clone(), user);
    Ok(data(current_progress(&probe, id).await?))
}

/// GET /api/reports/:id/events
///
/// Server-sent `progress` events every poll interval until the report reaches
/// a terminal stage.
pub async fn progress_events(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let snapshots: BoxStream<'static, ProgressSnapshot> = match user {
        Some(CurrentUser(user)) => {
            let probe = StoreProbe::new(state.store.clone(), user);
            watch_progress(probe, id, state.poll).boxed()
        }
        None => stream::once(async { ProgressSnapshot::unavailable() }).boxed(),
    };

    let events = snapshots.map(|snapshot| {
        let event = Event::default()
            .event("progress")
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().event("progress").data(snapshot.message));
        Ok(event)
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// POST /api/reports/:id/feedback
pub async fn submit_feedback(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<FeedbackRequest>,
) -> ApiResult<Json<Envelope<ReportFeedback>>> {
    let rating = match body.rating {
        Some(rating @ 1..=5) => Some(rating as u8),
        Some(_) => return Err(ApiError::BadRequest("평점은 1에서 5 사이여야 합니다.".into())),
        None => None,
    };

    if state.store.report(&user, id).await?.is_none() {
        return Err(ApiError::NotFound("리포트를 찾을 수 없습니다.".into()));
    }

    let comment = body
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let feedback = state
        .store
        .insert_feedback(&user, id, &FeedbackDraft { rating, comment })
        .await?;
    Ok(data(feedback))
}
