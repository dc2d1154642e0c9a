use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::error::{AuthError, ServiceError};
use crate::state::AppState;

/// The caller behind a verified access token. Inserted as a request extension
/// by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub exp: i64,
    /// The raw bearer token, kept for logout.
    pub token: String,
}

/// Verifies the bearer token and hands the caller to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&req)?;
    let claims = state.tokens.verify(&token)?;

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        email: claims.email,
        exp: claims.exp,
        token,
    });
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Result<String, AuthError> {
    let headers = req.headers();
    if !headers.contains_key(header::AUTHORIZATION) {
        return Err(AuthError::MissingHeader);
    }

    match headers.typed_get::<Authorization<Bearer>>() {
        Some(auth) if !auth.token().is_empty() => Ok(auth.token().to_string()),
        _ => Err(AuthError::MalformedHeader),
    }
}
