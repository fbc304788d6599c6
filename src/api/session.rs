use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, request::Parts},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{data, ApiJson, Envelope};
use crate::auth::{cleared_cookies, cookie, session_cookies, AuthUser, CurrentUser, CODE_VERIFIER_COOKIE};
use crate::error::ApiResult;
use crate::models::Profile;
use crate::AppState;

const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Where the confirmation email should send the user back to.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub user: AuthUser,
    pub confirmation_required: bool,
}

#[derive(Debug, Serialize)]
pub struct MeView {
    pub user: AuthUser,
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
}

/// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Envelope<MeView>>> {
    let profile = state.store.profile(&user).await?;
    Ok(data(MeView { user, profile }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> ApiResult<Response> {
    let session = state
        .auth
        .sign_in(credentials.email.trim(), &credentials.password)
        .await?;
    info!(user_id = %session.user.id, "signed in");

    let [access, refresh] = session_cookies(&session);
    let body = data(SessionView {
        user: session.user,
        confirmation_required: false,
    });
    Ok((AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]), body).into_response())
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> ApiResult<Response> {
    let outcome = state
        .auth
        .sign_up(
            credentials.email.trim(),
            &credentials.password,
            credentials.redirect_to.as_deref(),
        )
        .await?;

    match outcome.session {
        Some(session) => {
            info!(user_id = %session.user.id, "signed up and signed in");
            let [access, refresh] = session_cookies(&session);
            let body = data(SessionView {
                user: session.user,
                confirmation_required: false,
            });
            Ok((AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]), body).into_response())
        }
        None => {
            info!(user_id = %outcome.user.id, "signed up, awaiting confirmation");
            Ok(data(SessionView {
                user: outcome.user,
                confirmation_required: true,
            })
            .into_response())
        }
    }
}

/// POST /auth/logout
///
/// Cookies are cleared even when the provider call fails.
pub async fn logout(State(state): State<AppState>, user: Option<CurrentUser>) -> Response {
    if let Some(CurrentUser(user)) = user {
        if let Err(err) = state.auth.sign_out(&user.access_token).await {
            warn!(user_id = %user.id, error = %err, "sign-out failed");
        }
    }

    let [access, refresh] = cleared_cookies();
    (
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        data(serde_json::json!({ "signed_out": true })),
    )
        .into_response()
}

/// GET /auth/callback?code=...
///
/// Trades the OAuth code for a session and always lands on the dashboard.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    parts: Parts,
) -> Response {
    let redirect = Redirect::temporary(DASHBOARD_PATH);

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return redirect.into_response();
    };

    let verifier = cookie(&parts, CODE_VERIFIER_COOKIE);
    match state.auth.exchange_code(&code, verifier.as_deref()).await {
        Ok(session) => {
            info!(user_id = %session.user.id, "oauth code exchanged");
            let [access, refresh] = session_cookies(&session);
            (AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]), redirect).into_response()
        }
        Err(err) => {
            warn!(error = %err, "oauth code exchange failed");
            redirect.into_response()
        }
    }
}
