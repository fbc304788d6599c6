use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Collecting,
    Analyzing,
    Synthesizing,
    Completed,
    Partial,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Collecting => "collecting",
            ReportStatus::Analyzing => "analyzing",
            ReportStatus::Synthesizing => "synthesizing",
            ReportStatus::Completed => "completed",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Valid,
    Failed,
    Archived,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Valid => "valid",
            SourceStatus::Failed => "failed",
            SourceStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate per-user configuration row (`user_configs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub keywords: Vec<String>,
    pub viewpoint: String,
    pub schedule_cron: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by a `user_configs` upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDraft {
    pub keywords: Vec<String>,
    pub viewpoint: String,
    pub schedule_cron: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub viewpoint: String,
    pub status: SourceStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user-editable part of a source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFields {
    pub url: String,
    pub keywords: Vec<String>,
    pub viewpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ReportStatus,
    pub executive_summary: Option<Value>,
    pub action_item: Option<Value>,
    pub config_snapshot: ConfigSnapshot,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: Uuid,
    pub report_id: Uuid,
    pub source_id: Option<Uuid>,
    pub url: String,
    pub content: String,
    pub citation: Option<String>,
    pub status: SectionStatus,
    pub error_message: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFeedback {
    pub id: Uuid,
    pub report_id: Uuid,
    pub user_id: Uuid,
    pub comment: Option<String>,
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackDraft {
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

/// Point-in-time copy of the configuration a report was generated from.
///
/// Embedded in the report row so later edits to the live configuration do not
/// rewrite what a historical report analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub keywords: Vec<String>,
    pub viewpoint: String,
    #[serde(default)]
    pub schedule_cron: Option<String>,
    pub sources: Vec<SnapshotSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SnapshotMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSource {
    pub source_id: Option<Uuid>,
    pub url: String,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub bullets: Vec<String>,
}

impl ExecutiveSummary {
    /// Reads `{ "bullets": [...] }`, keeping only string bullets.
    pub fn from_json(value: &Value) -> Option<Self> {
        let bullets: Vec<String> = value
            .get("bullets")?
            .as_array()?
            .iter()
            .filter_map(|b| b.as_str().map(str::to_string))
            .collect();

        if bullets.is_empty() {
            None
        } else {
            Some(Self { bullets })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

impl ActionItem {
    pub fn from_json(value: &Value) -> Option<Self> {
        let text = value.get("text")?.as_str()?.to_string();
        let perspective = value
            .get("perspective")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { text, perspective })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewpointPreset {
    pub key: &'static str,
    pub label: &'static str,
}

pub const VIEWPOINT_PRESETS: &[ViewpointPreset] = &[
    ViewpointPreset { key: "critical", label: "비판적 분석" },
    ViewpointPreset { key: "investor", label: "투자자 관점" },
    ViewpointPreset { key: "beginner", label: "초보자 눈높이" },
    ViewpointPreset { key: "fact", label: "Fact 중심" },
];
