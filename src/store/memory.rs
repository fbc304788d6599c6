use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use super::Store;
use crate::auth::AuthUser;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    ConfigDraft, ConfigSnapshot, FeedbackDraft, Profile, Report, ReportFeedback, ReportSection,
    ReportStatus, Source, SourceFields, SourceStatus, UserConfig,
};
use crate::reconcile::SourcePlan;

/// Rows keyed by id, remembering insertion order.
struct Table<T> {
    rows: DashMap<Uuid, (u64, T)>,
    seq: AtomicU64,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    fn insert(&self, id: Uuid, row: T) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(id, (seq, row));
    }

    fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.get(id).map(|entry| entry.value().1.clone())
    }

    fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> bool {
        match self.rows.get_mut(id) {
            Some(mut entry) => {
                f(&mut entry.value_mut().1);
                true
            }
            None => false,
        }
    }

    /// Matching rows in insertion order.
    fn select(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut rows: Vec<(u64, T)> = self
            .rows
            .iter()
            .filter(|entry| pred(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

/// In-process store for local development and tests.
///
/// Also exposes the writes normally done by the analysis backend (source
/// validation, report sections) so whole flows can be exercised without it.
pub struct MemoryStore {
    profiles: Table<Profile>,
    configs: Table<UserConfig>,
    /// user id → config id; the entry lock keeps one config row per user.
    config_ids: DashMap<Uuid, Uuid>,
    sources: Table<Source>,
    reports: Table<Report>,
    sections: Table<ReportSection>,
    feedbacks: Table<ReportFeedback>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            profiles: Table::new(),
            configs: Table::new(),
            config_ids: DashMap::new(),
            sources: Table::new(),
            reports: Table::new(),
            sections: Table::new(),
            feedbacks: Table::new(),
        }
    }

    pub fn add_profile(&self, profile: Profile) {
        self.profiles.insert(profile.id, profile);
    }

    pub fn set_source_status(&self, id: Uuid, status: SourceStatus) -> bool {
        self.sources.update(&id, |source| {
            source.status = status;
            source.updated_at = Utc::now();
        })
    }

    pub fn add_section(&self, section: ReportSection) {
        self.sections.insert(section.id, section);
    }

    pub fn report_count(&self, user_id: Uuid) -> usize {
        self.reports.select(|r| r.user_id == user_id).len()
    }

    fn owned_source(&self, user: &AuthUser, id: &Uuid) -> bool {
        self.sources
            .get(id)
            .map(|source| source.user_id == user.id)
            .unwrap_or(false)
    }

    fn write_source(&self, id: &Uuid, fields: &SourceFields) -> bool {
        self.sources.update(id, |source| {
            source.url = fields.url.clone();
            source.keywords = fields.keywords.clone();
            source.viewpoint = fields.viewpoint.clone();
            source.updated_at = Utc::now();
        })
    }

    fn new_source(&self, user: &AuthUser, fields: &SourceFields) -> Source {
        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            user_id: user.id,
            url: fields.url.clone(),
            keywords: fields.keywords.clone(),
            viewpoint: fields.viewpoint.clone(),
            status: SourceStatus::Pending,
            last_checked_at: None,
            last_crawled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.sources.insert(source.id, source.clone());
        source
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn profile(&self, user: &AuthUser) -> StoreResult<Option<Profile>> {
        Ok(self.profiles.get(&user.id))
    }

    async fn user_config(&self, user: &AuthUser) -> StoreResult<Option<UserConfig>> {
        let id = self.config_ids.get(&user.id).map(|entry| *entry.value());
        Ok(id.and_then(|id| self.configs.get(&id)))
    }

    async fn upsert_user_config(&self, user: &AuthUser, draft: &ConfigDraft) -> StoreResult<UserConfig> {
        let now = Utc::now();
        match self.config_ids.entry(user.id) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                self.configs.update(&id, |config| {
                    config.keywords = draft.keywords.clone();
                    config.viewpoint = draft.viewpoint.clone();
                    config.schedule_cron = draft.schedule_cron.clone();
                    config.updated_at = now;
                });
                self.configs
                    .get(&id)
                    .ok_or_else(|| StoreError::Missing("user config".into()))
            }
            Entry::Vacant(entry) => {
                let config = UserConfig {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    keywords: draft.keywords.clone(),
                    viewpoint: draft.viewpoint.clone(),
                    schedule_cron: draft.schedule_cron.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.configs.insert(config.id, config.clone());
                entry.insert(config.id);
                Ok(config)
            }
        }
    }

    async fn sources(&self, user: &AuthUser, status: Option<SourceStatus>) -> StoreResult<Vec<Source>> {
        Ok(self
            .sources
            .select(|s| s.user_id == user.id && status.map_or(true, |status| s.status == status)))
    }

    async fn delete_sources(&self, user: &AuthUser, ids: &[Uuid]) -> StoreResult<()> {
        for id in ids {
            if self.owned_source(user, id) {
                self.sources.rows.remove(id);
            }
        }
        Ok(())
    }

    async fn update_source(&self, user: &AuthUser, id: Uuid, fields: &SourceFields) -> StoreResult<()> {
        if !self.owned_source(user, &id) || !self.write_source(&id, fields) {
            return Err(StoreError::Missing(format!("source {}", id)));
        }
        Ok(())
    }

    async fn insert_source(&self, user: &AuthUser, fields: &SourceFields) -> StoreResult<Source> {
        Ok(self.new_source(user, fields))
    }

    /// Checks every update target first so a rejected plan leaves no trace.
    async fn apply_source_plan(&self, user: &AuthUser, plan: &SourcePlan) -> StoreResult<()> {
        if let Some((id, _)) = plan.updates.iter().find(|(id, _)| !self.owned_source(user, id)) {
            return Err(StoreError::Missing(format!("source {}", id)));
        }

        self.delete_sources(user, &plan.deletes).await?;
        for (id, fields) in &plan.updates {
            self.write_source(id, fields);
        }
        for fields in &plan.inserts {
            self.new_source(user, fields);
        }
        Ok(())
    }

    async fn create_report(
        &self,
        user: &AuthUser,
        snapshot: &ConfigSnapshot,
        started_at: DateTime<Utc>,
    ) -> StoreResult<Report> {
        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            user_id: user.id,
            status: ReportStatus::Pending,
            executive_summary: None,
            action_item: None,
            config_snapshot: snapshot.clone(),
            started_at: Some(started_at),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn set_report_status(&self, user: &AuthUser, id: Uuid, status: ReportStatus) -> StoreResult<()> {
        let mut owned = false;
        self.reports.update(&id, |report| {
            if report.user_id == user.id {
                owned = true;
                report.status = status;
                report.updated_at = Utc::now();
                if matches!(status, ReportStatus::Completed | ReportStatus::Partial) {
                    report.completed_at = Some(report.updated_at);
                }
            }
        });

        if owned {
            Ok(())
        } else {
            Err(StoreError::Missing(format!("report {}", id)))
        }
    }

    async fn report(&self, user: &AuthUser, id: Uuid) -> StoreResult<Option<Report>> {
        Ok(self.reports.get(&id).filter(|r| r.user_id == user.id))
    }

    async fn reports(&self, user: &AuthUser, limit: usize) -> StoreResult<Vec<Report>> {
        let mut reports = self.reports.select(|r| r.user_id == user.id);
        reports.reverse();
        reports.truncate(limit);
        Ok(reports)
    }

    async fn report_sections(&self, user: &AuthUser, report_id: Uuid) -> StoreResult<Vec<ReportSection>> {
        if self.report(user, report_id).await?.is_none() {
            return Ok(Vec::new());
        }
        let mut sections = self.sections.select(|s| s.report_id == report_id);
        sections.sort_by_key(|s| s.sort_order);
        Ok(sections)
    }

    async fn insert_feedback(
        &self,
        user: &AuthUser,
        report_id: Uuid,
        draft: &FeedbackDraft,
    ) -> StoreResult<ReportFeedback> {
        let feedback = ReportFeedback {
            id: Uuid::new_v4(),
            report_id,
            user_id: user.id,
            comment: draft.comment.clone(),
            rating: draft.rating,
            created_at: Utc::now(),
        };
        self.feedbacks.insert(feedback.id, feedback.clone());
        Ok(feedback)
    }
}
