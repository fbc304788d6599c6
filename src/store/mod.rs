//! Persistence seam over the hosted relational store.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::StoreResult;
use crate::models::{
    ConfigDraft, ConfigSnapshot, FeedbackDraft, Profile, Report, ReportFeedback, ReportSection,
    ReportStatus, Source, SourceFields, SourceStatus, UserConfig,
};
use crate::reconcile::SourcePlan;

/// Row operations on the six collections the portal touches. Every call is
/// scoped to `user`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn profile(&self, user: &AuthUser) -> StoreResult<Option<Profile>>;

    async fn user_config(&self, user: &AuthUser) -> StoreResult<Option<UserConfig>>;

    /// Insert or replace the single config row of `user`.
    async fn upsert_user_config(&self, user: &AuthUser, draft: &ConfigDraft) -> StoreResult<UserConfig>;

    /// Sources of `user`, oldest first, optionally restricted to one status.
    async fn sources(&self, user: &AuthUser, status: Option<SourceStatus>) -> StoreResult<Vec<Source>>;

    async fn delete_sources(&self, user: &AuthUser, ids: &[Uuid]) -> StoreResult<()>;

    async fn update_source(&self, user: &AuthUser, id: Uuid, fields: &SourceFields) -> StoreResult<()>;

    /// Insert a new source in `pending` state.
    async fn insert_source(&self, user: &AuthUser, fields: &SourceFields) -> StoreResult<Source>;

    /// Write a reconciliation plan: deletes, then updates, then inserts.
    ///
    /// The default issues one call per row and stops at the first failure
    /// without undoing earlier writes.
    async fn apply_source_plan(&self, user: &AuthUser, plan: &SourcePlan) -> StoreResult<()> {
        if !plan.deletes.is_empty() {
            self.delete_sources(user, &plan.deletes).await?;
        }
        for (id, fields) in &plan.updates {
            self.update_source(user, *id, fields).await?;
        }
        for fields in &plan.inserts {
            self.insert_source(user, fields).await?;
        }
        Ok(())
    }

    /// Create a `pending` report carrying `snapshot`.
    async fn create_report(
        &self,
        user: &AuthUser,
        snapshot: &ConfigSnapshot,
        started_at: DateTime<Utc>,
    ) -> StoreResult<Report>;

    async fn set_report_status(&self, user: &AuthUser, id: Uuid, status: ReportStatus) -> StoreResult<()>;

    async fn report(&self, user: &AuthUser, id: Uuid) -> StoreResult<Option<Report>>;

    /// Most recent reports first.
    async fn reports(&self, user: &AuthUser, limit: usize) -> StoreResult<Vec<Report>>;

    /// Sections of a report ordered by `sort_order`.
    async fn report_sections(&self, user: &AuthUser, report_id: Uuid) -> StoreResult<Vec<ReportSection>>;

    async fn insert_feedback(
        &self,
        user: &AuthUser,
        report_id: Uuid,
        draft: &FeedbackDraft,
    ) -> StoreResult<ReportFeedback>;
}
