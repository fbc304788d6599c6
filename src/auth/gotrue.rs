use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{AuthProvider, AuthUser, Session, SignUpOutcome};
use crate::error::AuthError;

/// Client for the hosted auth REST API (`/auth/v1`).
#[derive(Clone)]
pub struct GoTrueAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    access_token: String,
    refresh_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
    user: UserBody,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error_description", alias = "msg")]
    message: Option<String>,
    error: Option<String>,
}

impl GoTrueAuth {
    pub fn new(client: Client, supabase_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    async fn session(&self, request: RequestBuilder) -> Result<Session, AuthError> {
        let response = check(request.send().await?).await?;
        let body: SessionBody = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(into_session(body))
    }
}

fn into_session(body: SessionBody) -> Session {
    Session {
        user: AuthUser {
            id: body.user.id,
            email: body.user.email,
            access_token: body.access_token.clone(),
        },
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        expires_in: body.expires_in,
    }
}

async fn check(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(AuthError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let body: UserBody = check(response)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(AuthUser {
            id: body.id,
            email: body.email,
            access_token: access_token.to_string(),
        })
    }

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let request = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        self.session(request).await
    }

    #[instrument(skip(self, password))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        let mut request = self
            .post("signup")
            .json(&json!({ "email": email, "password": password }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }

        let body: Value = check(request.send().await?)
            .await?
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        // With auto-confirm the provider answers with a session, otherwise with
        // the bare user awaiting email confirmation.
        if body.get("access_token").is_some() {
            let session: SessionBody = serde_json::from_value(body)
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
            let session = into_session(session);
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: UserBody =
            serde_json::from_value(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        debug!(user_id = %user.id, "sign-up awaiting email confirmation");
        Ok(SignUpOutcome {
            user: AuthUser {
                id: user.id,
                email: user.email,
                access_token: String::new(),
            },
            session: None,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self.post("logout").bearer_auth(access_token).send().await?;
        check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        let request = self
            .post("token")
            .query(&[("grant_type", "pkce")])
            .json(&json!({ "auth_code": code, "code_verifier": code_verifier }));
        self.session(request).await
    }
}
