use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures of the hosted row store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{0} not found")]
    Missing(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the hosted auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected auth response: {0}")]
    InvalidResponse(String),
}

/// Failures dispatching work to the analysis backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend responded {status}")]
    Rejected { status: u16, detail: Option<String> },

    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),
}

/// Error returned by HTTP handlers, rendered as `{"error":{"code","message"}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("설정이 없습니다.")]
    NoConfig,

    #[error("유효한 소스가 없습니다.")]
    NoSources,

    #[error("리포트 생성 실패")]
    CreateFailed,

    #[error("{0}")]
    Backend(String),

    #[error("백엔드 서버에 연결할 수 없습니다.")]
    BackendConnection,

    #[error("로그인이 필요합니다.")]
    Unauthorized,

    #[error("{0}")]
    AuthFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NoConfig => "NO_CONFIG",
            ApiError::NoSources => "NO_SOURCES",
            ApiError::CreateFailed => "CREATE_FAILED",
            ApiError::Backend(_) => "BACKEND_ERROR",
            ApiError::BackendConnection => "BACKEND_CONNECTION_ERROR",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::AuthFailed(_) => "AUTH_FAILED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal(_) | ApiError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoConfig | ApiError::NoSources | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized | ApiError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::CreateFailed
            | ApiError::Backend(_)
            | ApiError::BackendConnection
            | ApiError::Internal(_)
            | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected { message, .. } => ApiError::AuthFailed(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("잘못된 요청 본문입니다: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
