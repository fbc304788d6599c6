//! Session handling against the hosted auth provider.
//!
//! The provider owns users, passwords and OAuth. This module only forwards
//! credentials, keeps the returned tokens in cookies and resolves the caller of
//! each request.

mod gotrue;

pub use gotrue::GoTrueAuth;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, AuthError};
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "sb-refresh-token";
pub const CODE_VERIFIER_COOKIE: &str = "sb-code-verifier";

/// An authenticated caller. The access token is forwarded to the row store so
/// its row-level policies see the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(skip)]
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: AuthUser,
}

#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    /// `None` when the provider requires email confirmation first.
    pub session: Option<Session>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn user(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError>;
}

/// Extractor resolving the request's caller; rejects with `UNAUTHORIZED`.
///
/// Wrap in `Option` for routes that degrade instead of failing.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = access_token(parts).ok_or(ApiError::Unauthorized)?;

        match state.auth.user(&token).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(AuthError::Rejected { .. }) => Err(ApiError::Unauthorized),
            Err(err) => {
                tracing::warn!(error = %err, "could not resolve session");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

fn access_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match bearer {
        Some(token) => Some(token.to_string()),
        None => cookie(parts, ACCESS_TOKEN_COOKIE),
    }
}

/// Reads one cookie value from the `Cookie` headers.
pub fn cookie(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` values storing a session.
pub fn session_cookies(session: &Session) -> [String; 2] {
    [
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            ACCESS_TOKEN_COOKIE, session.access_token, session.expires_in
        ),
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            REFRESH_TOKEN_COOKIE,
            session.refresh_token,
            60 * 60 * 24 * 30
        ),
    ]
}

pub fn cleared_cookies() -> [String; 2] {
    [
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", ACCESS_TOKEN_COOKIE),
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", REFRESH_TOKEN_COOKIE),
    ]
}
