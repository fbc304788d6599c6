//! Router-level tests against the in-memory store with scripted auth and
//! analysis backend doubles.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use report_portal::auth::{AuthProvider, AuthUser, Session, SignUpOutcome};
use report_portal::backend::{AnalysisBackend, GenerateAccepted, GenerateRequest};
use report_portal::error::{AuthError, BackendError};
use report_portal::generate::PipelineInfo;
use report_portal::models::{ReportSection, ReportStatus, SectionStatus, SourceStatus};
use report_portal::progress::PollPolicy;
use report_portal::store::{MemoryStore, Store};
use report_portal::{build_router, AppState};

const TOKEN: &str = "alice-token";

/// Accepts exactly one access token and one password.
struct FakeAuth {
    user_id: Uuid,
}

impl FakeAuth {
    fn user(&self) -> AuthUser {
        AuthUser {
            id: self.user_id,
            email: Some("alice@example.com".into()),
            access_token: TOKEN.into(),
        }
    }

    fn session(&self) -> Session {
        Session {
            access_token: TOKEN.into(),
            refresh_token: "refresh".into(),
            expires_in: 3600,
            user: self.user(),
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        if access_token == TOKEN {
            Ok(self.user())
        } else {
            Err(AuthError::Rejected {
                status: 401,
                message: "invalid JWT".into(),
            })
        }
    }

    async fn sign_in(&self, _email: &str, password: &str) -> Result<Session, AuthError> {
        if password == "correct" {
            Ok(self.session())
        } else {
            Err(AuthError::Rejected {
                status: 400,
                message: "Invalid login credentials".into(),
            })
        }
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        Ok(SignUpOutcome {
            user: self.user(),
            session: None,
        })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn exchange_code(&self, code: &str, _verifier: Option<&str>) -> Result<Session, AuthError> {
        if code == "good-code" {
            Ok(self.session())
        } else {
            Err(AuthError::Rejected {
                status: 400,
                message: "invalid grant".into(),
            })
        }
    }
}

#[derive(Clone, Copy)]
enum BackendMode {
    Accept,
    Reject,
    Unreachable,
}

struct FakeBackend {
    mode: BackendMode,
    calls: Mutex<usize>,
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateAccepted, BackendError> {
        *self.calls.lock().unwrap() += 1;
        match self.mode {
            BackendMode::Accept => Ok(GenerateAccepted {
                task_id: "celery-42".into(),
            }),
            BackendMode::Reject => Err(BackendError::Rejected {
                status: 500,
                detail: Some("Failed to start report generation".into()),
            }),
            BackendMode::Unreachable => {
                Err(BackendError::InvalidResponse("connection refused".into()))
            }
        }
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    backend: Arc<FakeBackend>,
    user: AuthUser,
}

fn harness(mode: BackendMode) -> Harness {
    let auth = Arc::new(FakeAuth {
        user_id: Uuid::new_v4(),
    });
    let user = auth.user();
    let store = Arc::new(MemoryStore::new());
    let backend = Arc::new(FakeBackend {
        mode,
        calls: Mutex::new(0),
    });

    let state = AppState {
        store: store.clone(),
        auth,
        backend: backend.clone(),
        pipeline: PipelineInfo::default(),
        poll: PollPolicy {
            interval: Duration::from_millis(10),
            timeout: Some(Duration::from_secs(5)),
        },
    };

    Harness {
        app: build_router(state),
        store,
        backend,
        user,
    }
}

fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn anonymous(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn save_one_source(h: &Harness) -> Value {
    let response = h
        .app
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/config",
            Some(json!({
                "sources": [
                    { "url": "https://news.example/tech", "keywords": "ai, chips", "viewpoint": "investor" },
                    { "url": "", "keywords": "", "viewpoint": "" },
                    { "url": "", "keywords": [], "viewpoint": "" }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn validate_all_sources(h: &Harness) {
    for source in h.store.sources(&h.user, None).await.unwrap() {
        h.store.set_source_status(source.id, SourceStatus::Valid);
    }
}

// =============================================================================
// Health and sessions
// =============================================================================

#[tokio::test]
async fn health_needs_no_session() {
    let h = harness(BackendMode::Accept);

    let response = h.app.oneshot(anonymous("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "report-portal");
}

#[tokio::test]
async fn protected_routes_reject_missing_session() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .oneshot(anonymous("POST", "/api/reports/generate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn cookie_session_is_accepted() {
    let h = harness(BackendMode::Accept);

    let request = Request::builder()
        .uri("/api/me")
        .header(header::COOKIE, format!("sb-access-token={}", TOKEN))
        .body(Body::empty())
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["user"]["email"], "alice@example.com");
    assert!(body["data"]["user"].get("access_token").is_none());
    assert!(body["data"]["profile"].is_null());
}

#[tokio::test]
async fn login_sets_session_cookies() {
    let h = harness(BackendMode::Accept);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "alice@example.com", "password": "correct" }).to_string(),
        ))
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with("sb-access-token=alice-token;"));
}

#[tokio::test]
async fn login_failure_reports_provider_message() {
    let h = harness(BackendMode::Accept);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "alice@example.com", "password": "nope" }).to_string(),
        ))
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_FAILED");
    assert_eq!(body["error"]["message"], "Invalid login credentials");
}

#[tokio::test]
async fn signup_without_session_requires_confirmation() {
    let h = harness(BackendMode::Accept);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "alice@example.com", "password": "pw" }).to_string(),
        ))
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = json_body(response).await;
    assert_eq!(body["data"]["confirmation_required"], true);
}

#[tokio::test]
async fn logout_clears_cookies() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .oneshot(authed("POST", "/auth/logout", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].to_str().unwrap().contains("Max-Age=0"));
}

#[tokio::test]
async fn oauth_callback_redirects_to_dashboard() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .clone()
        .oneshot(anonymous("GET", "/auth/callback?code=good-code"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    assert!(response.headers().get(header::SET_COOKIE).is_some());

    let response = h
        .app
        .clone()
        .oneshot(anonymous("GET", "/auth/callback?code=bad-code"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let response = h
        .app
        .oneshot(anonymous("GET", "/auth/callback"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn saving_config_reconciles_sources() {
    let h = harness(BackendMode::Accept);

    let saved = save_one_source(&h).await;
    assert_eq!(saved["data"]["inserted"], 1);
    assert_eq!(saved["data"]["config"]["keywords"], json!(["ai", "chips"]));
    let id = saved["data"]["sources"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(saved["data"]["sources"][0]["status"], "pending");

    let response = h
        .app
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/config",
            Some(json!({
                "sources": [
                    { "id": id, "url": "https://news.example/tech", "keywords": [], "viewpoint": "critical" },
                    { "url": "https://blog.example", "keywords": "rust", "viewpoint": "" }
                ]
            })),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["updated"], 1);
    assert_eq!(body["data"]["inserted"], 1);
    assert_eq!(body["data"]["deleted"], 0);
    assert_eq!(body["data"]["config"]["keywords"], json!(["general"]));
    assert_eq!(body["data"]["config"]["viewpoint"], "critical");

    let response = h
        .app
        .oneshot(authed("GET", "/api/config", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    let sources = body["data"]["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["id"], id.as_str());
    assert_eq!(sources[0]["keywords"], json!([]));
}

#[tokio::test]
async fn saving_config_accepts_loose_form_values() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .clone()
        .oneshot(authed(
            "PUT",
            "/api/config",
            Some(json!({
                "sources": [
                    { "id": "", "url": "https://news.example/tech", "keywords": null, "viewpoint": null },
                    { "id": null, "url": "", "keywords": "", "viewpoint": "" }
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["inserted"], 1);
    assert_eq!(body["data"]["sources"][0]["keywords"], json!([]));
    assert_eq!(body["data"]["config"]["keywords"], json!(["general"]));
    assert_eq!(body["data"]["config"]["viewpoint"], "");
}

#[tokio::test]
async fn malformed_body_uses_error_envelope() {
    let h = harness(BackendMode::Accept);

    let request = Request::builder()
        .method("PUT")
        .uri("/api/config")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let response = h
        .app
        .oneshot(authed("POST", "/auth/login", Some(json!({ "email": 42 }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn viewpoint_presets_are_listed() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .oneshot(anonymous("GET", "/api/viewpoints"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["key"], "critical");
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

// =============================================================================
// Report generation
// =============================================================================

#[tokio::test]
async fn generate_without_config() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NO_CONFIG");
}

#[tokio::test]
async fn generate_without_valid_sources_creates_nothing() {
    let h = harness(BackendMode::Accept);
    save_one_source(&h).await;

    let response = h
        .app
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NO_SOURCES");
    assert_eq!(h.store.report_count(h.user.id), 0);
    assert_eq!(*h.backend.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn generate_returns_report_and_task() {
    let h = harness(BackendMode::Accept);
    save_one_source(&h).await;
    validate_all_sources(&h).await;

    let response = h
        .app
        .clone()
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["task_id"], "celery-42");
    let report_id: Uuid = body["data"]["report_id"].as_str().unwrap().parse().unwrap();

    let report = h.store.report(&h.user, report_id).await.unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.config_snapshot.sources[0].url, "https://news.example/tech");
}

#[tokio::test]
async fn backend_rejection_marks_report_failed() {
    let h = harness(BackendMode::Reject);
    save_one_source(&h).await;
    validate_all_sources(&h).await;

    let response = h
        .app
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BACKEND_ERROR");
    assert_eq!(body["error"]["message"], "Failed to start report generation");

    let reports = h.store.reports(&h.user, 10).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Failed);
}

#[tokio::test]
async fn unreachable_backend_marks_report_failed() {
    let h = harness(BackendMode::Unreachable);
    save_one_source(&h).await;
    validate_all_sources(&h).await;

    let response = h
        .app
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BACKEND_CONNECTION_ERROR");
    assert_eq!(h.store.reports(&h.user, 10).await.unwrap()[0].status, ReportStatus::Failed);
}

// =============================================================================
// Reading reports
// =============================================================================

async fn generated_report(h: &Harness) -> Uuid {
    save_one_source(h).await;
    validate_all_sources(h).await;
    let response = h
        .app
        .clone()
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    body["data"]["report_id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn report_detail_includes_sorted_sections() {
    let h = harness(BackendMode::Accept);
    let report_id = generated_report(&h).await;

    for (order, url) in [(2, "https://b.example"), (1, "https://a.example")] {
        h.store.add_section(ReportSection {
            id: Uuid::new_v4(),
            report_id,
            source_id: None,
            url: url.into(),
            content: "analysis".into(),
            citation: None,
            status: SectionStatus::Success,
            error_message: None,
            sort_order: order,
            created_at: Utc::now(),
        });
    }

    let response = h
        .app
        .oneshot(authed("GET", &format!("/api/reports/{}", report_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["id"], report_id.to_string());
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["sections"][0]["url"], "https://a.example");
    assert_eq!(body["data"]["sections"][1]["url"], "https://b.example");
    assert!(body["data"]["summary"].is_null());
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let h = harness(BackendMode::Accept);

    let response = h
        .app
        .oneshot(authed("GET", &format!("/api/reports/{}", Uuid::new_v4()), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn report_list_is_newest_first() {
    let h = harness(BackendMode::Accept);
    let first = generated_report(&h).await;
    let response = h
        .app
        .clone()
        .oneshot(authed("POST", "/api/reports/generate", None))
        .await
        .unwrap();
    let second = json_body(response).await["data"]["report_id"].clone();

    let response = h
        .app
        .oneshot(authed("GET", "/api/reports?limit=1", None))
        .await
        .unwrap();
    let body = json_body(response).await;
    let reports = body["data"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["id"], second);
    assert_ne!(reports[0]["id"], first.to_string());
}

#[tokio::test]
async fn progress_reflects_status() {
    let h = harness(BackendMode::Accept);
    let report_id = generated_report(&h).await;
    h.store
        .set_report_status(&h.user, report_id, ReportStatus::Collecting)
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(authed("GET", &format!("/api/reports/{}/progress", report_id), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["stage"], "collecting");
    assert_eq!(body["data"]["percent"], 25);
    assert_eq!(body["data"]["message"], "소스 데이터 수집 중...");

    // Without a session the report is invisible.
    let response = h
        .app
        .oneshot(anonymous("GET", &format!("/api/reports/{}/progress", report_id)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["stage"], "idle");
    assert_eq!(body["data"]["message"], "");
}

#[tokio::test]
async fn progress_events_end_at_terminal_stage() {
    let h = harness(BackendMode::Accept);
    let report_id = generated_report(&h).await;
    h.store
        .set_report_status(&h.user, report_id, ReportStatus::Partial)
        .await
        .unwrap();

    let response = h
        .app
        .oneshot(authed("GET", &format!("/api/reports/{}/events", report_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: progress"));
    assert!(text.contains("\"stage\":\"partial\""));
    assert!(text.contains("\"percent\":100"));
}

#[tokio::test]
async fn feedback_validates_rating() {
    let h = harness(BackendMode::Accept);
    let report_id = generated_report(&h).await;
    let uri = format!("/api/reports/{}/feedback", report_id);

    let response = h
        .app
        .clone()
        .oneshot(authed("POST", &uri, Some(json!({ "rating": 6 }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for rating in [json!(300), json!(-1), json!(0)] {
        let response = h
            .app
            .clone()
            .oneshot(authed("POST", &uri, Some(json!({ "rating": rating }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "평점은 1에서 5 사이여야 합니다.");
    }

    let response = h
        .app
        .clone()
        .oneshot(authed("POST", &uri, Some(json!({ "rating": 4, "comment": "  useful  " }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["rating"], 4);
    assert_eq!(body["data"]["comment"], "useful");

    let response = h
        .app
        .oneshot(authed(
            "POST",
            &format!("/api/reports/{}/feedback", Uuid::new_v4()),
            Some(json!({ "rating": 3 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
