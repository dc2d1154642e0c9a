use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use agora_cache::CacheError;
use agora_db::DbError;
use agora_types::pagination::ValidationErrors;

/// Why an authenticated request was turned away. All of these surface as 401;
/// the distinction exists for logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header not provided")]
    MissingHeader,
    #[error("invalid Authorization header")]
    MalformedHeader,
    #[error("token is expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
    #[error("token is revoked")]
    Revoked,
    /// The revocation store could not be consulted.
    #[error("revocation check failed: {0}")]
    Backend(CacheError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    Conflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("wrong password")]
    InvalidCredentials,
    #[error("store call timed out")]
    Timeout,
    #[error("store error: {0}")]
    Store(DbError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Names the missing resource in a not-found error; other errors pass
    /// through untouched.
    pub fn for_resource(self, what: &'static str) -> Self {
        match self {
            Self::NotFound(_) => Self::NotFound(what),
            other => other,
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::NotFound("record"),
            DbError::Conflict => Self::Conflict("record already exists".to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errs: ValidationErrors) -> Self {
        Self::Validation(errs)
    }
}

/// Malformed or mistyped request bodies become a JSON 400 like every other
/// client error.
impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation(errs) => (StatusCode::BAD_REQUEST, json!({ "error": errs })),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Self::InvalidCredentials => (StatusCode::BAD_REQUEST, json!({ "error": "wrong password" })),
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{} not found", what) }),
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "Forbidden" })),
            Self::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            Self::Unauthorized(reason) => {
                if let AuthError::Backend(e) = &reason {
                    error!("Auth check could not reach the revocation store: {}", e);
                } else {
                    warn!("Rejected request: {}", reason);
                }
                let msg = match reason {
                    AuthError::Backend(_) => AuthError::Invalid.to_string(),
                    other => other.to_string(),
                };
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            Self::Timeout => {
                error!("Store call timed out");
                (StatusCode::GATEWAY_TIMEOUT, json!({ "error": "Gateway Timeout" }))
            }
            other @ (Self::Store(_) | Self::Cache(_) | Self::Internal(_)) => {
                error!("{}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
