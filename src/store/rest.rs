use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::Store;
use crate::auth::AuthUser;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    ConfigDraft, ConfigSnapshot, FeedbackDraft, Profile, Report, ReportFeedback, ReportSection,
    ReportStatus, Source, SourceFields, SourceStatus, UserConfig,
};

/// Row store backed by the hosted database's REST row API (`/rest/v1`).
///
/// Requests carry the caller's access token, so row-level security applies
/// exactly as it would for the browser client.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

impl RestStore {
    pub fn new(client: Client, supabase_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }

    fn request(&self, method: Method, table: &str, user: &AuthUser) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&user.access_token)
    }

    fn select(&self, table: &str, user: &AuthUser) -> RequestBuilder {
        self.request(Method::GET, table, user).query(&[("select", "*")])
    }

    fn returning(&self, method: Method, table: &str, user: &AuthUser) -> RequestBuilder {
        self.request(method, table, user)
            .header("Prefer", "return=representation")
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<Vec<T>> {
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn first<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<Option<T>> {
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn one<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> StoreResult<T> {
        self.first(request)
            .await?
            .ok_or_else(|| StoreError::Missing(what.to_string()))
    }
}

async fn check(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    debug!(status = status.as_u16(), %message, "row api rejected request");

    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Store for RestStore {
    async fn profile(&self, user: &AuthUser) -> StoreResult<Option<Profile>> {
        self.first(self.select("profiles", user).query(&[("id", eq(user.id))]))
            .await
    }

    async fn user_config(&self, user: &AuthUser) -> StoreResult<Option<UserConfig>> {
        self.first(
            self.select("user_configs", user)
                .query(&[("user_id", eq(user.id)), ("limit", "1".to_string())]),
        )
        .await
    }

    async fn upsert_user_config(&self, user: &AuthUser, draft: &ConfigDraft) -> StoreResult<UserConfig> {
        let request = self
            .request(Method::POST, "user_configs", user)
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .query(&[("on_conflict", "user_id")])
            .json(&json!({
                "user_id": user.id,
                "keywords": draft.keywords,
                "viewpoint": draft.viewpoint,
                "schedule_cron": draft.schedule_cron,
            }));
        self.one(request, "user config").await
    }

    async fn sources(&self, user: &AuthUser, status: Option<SourceStatus>) -> StoreResult<Vec<Source>> {
        let mut request = self
            .select("sources", user)
            .query(&[("user_id", eq(user.id)), ("order", "created_at.asc".to_string())]);
        if let Some(status) = status {
            request = request.query(&[("status", eq(status))]);
        }
        self.rows(request).await
    }

    async fn delete_sources(&self, user: &AuthUser, ids: &[Uuid]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let list = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let request = self
            .request(Method::DELETE, "sources", user)
            .query(&[("id", format!("in.({})", list)), ("user_id", eq(user.id))]);
        check(request.send().await?).await?;
        Ok(())
    }

    async fn update_source(&self, user: &AuthUser, id: Uuid, fields: &SourceFields) -> StoreResult<()> {
        let request = self
            .returning(Method::PATCH, "sources", user)
            .query(&[("id", eq(id)), ("user_id", eq(user.id))])
            .json(fields);
        self.one::<Source>(request, &format!("source {}", id)).await?;
        Ok(())
    }

    async fn insert_source(&self, user: &AuthUser, fields: &SourceFields) -> StoreResult<Source> {
        let request = self.returning(Method::POST, "sources", user).json(&json!({
            "user_id": user.id,
            "url": fields.url,
            "keywords": fields.keywords,
            "viewpoint": fields.viewpoint,
            "status": SourceStatus::Pending,
        }));
        self.one(request, "inserted source").await
    }

    async fn create_report(
        &self,
        user: &AuthUser,
        snapshot: &ConfigSnapshot,
        started_at: DateTime<Utc>,
    ) -> StoreResult<Report> {
        let request = self.returning(Method::POST, "reports", user).json(&json!({
            "user_id": user.id,
            "status": ReportStatus::Pending,
            "config_snapshot": snapshot,
            "started_at": started_at,
        }));
        self.one(request, "inserted report").await
    }

    async fn set_report_status(&self, user: &AuthUser, id: Uuid, status: ReportStatus) -> StoreResult<()> {
        let request = self
            .returning(Method::PATCH, "reports", user)
            .query(&[("id", eq(id)), ("user_id", eq(user.id))])
            .json(&json!({ "status": status }));
        self.one::<Report>(request, &format!("report {}", id)).await?;
        Ok(())
    }

    async fn report(&self, user: &AuthUser, id: Uuid) -> StoreResult<Option<Report>> {
        self.first(
            self.select("reports", user)
                .query(&[("id", eq(id)), ("user_id", eq(user.id))]),
        )
        .await
    }

    async fn reports(&self, user: &AuthUser, limit: usize) -> StoreResult<Vec<Report>> {
        self.rows(self.select("reports", user).query(&[
            ("user_id", eq(user.id)),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]))
        .await
    }

    async fn report_sections(&self, user: &AuthUser, report_id: Uuid) -> StoreResult<Vec<ReportSection>> {
        self.rows(self.select("report_sections", user).query(&[
            ("report_id", eq(report_id)),
            ("order", "sort_order.asc".to_string()),
        ]))
        .await
    }

    async fn insert_feedback(
        &self,
        user: &AuthUser,
        report_id: Uuid,
        draft: &FeedbackDraft,
    ) -> StoreResult<ReportFeedback> {
        let request = self
            .returning(Method::POST, "report_feedbacks", user)
            .json(&json!({
                "report_id": report_id,
                "user_id": user.id,
                "rating": draft.rating,
                "comment": draft.comment,
            }));
        self.one(request, "inserted feedback").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_filtered_select() {
        let store = RestStore::new(Client::new(), "https://project.supabase.co/", "anon");
        let user = AuthUser {
            id: Uuid::nil(),
            email: None,
            access_token: "jwt".into(),
        };

        let request = store
            .select("sources", &user)
            .query(&[("user_id", eq(user.id)), ("status", eq(SourceStatus::Valid))])
            .build()
            .unwrap();

        assert_eq!(request.url().path(), "/rest/v1/sources");
        let query = request.url().query().unwrap();
        assert!(query.contains("select=*") || query.contains("select=%2A"));
        assert!(query.contains("user_id=eq.00000000-0000-0000-0000-000000000000"));
        assert!(query.contains("status=eq.valid"));
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer jwt");
    }
}
