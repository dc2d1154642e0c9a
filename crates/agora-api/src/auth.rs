use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use agora_types::api::{Ack, CredentialsRequest, LoginResponse};
use agora_types::pagination::Validator;

use crate::error::ServiceError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::store::run_blocking;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_EMAIL_LEN: usize = 254;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload?;
    validate_credentials(&req)?;

    let email = req.email.clone();
    let existing = run_blocking(&state.db, state.store_timeout, move |db| db.get_user_by_email(&email)).await?;
    if existing.is_some() {
        return Err(ServiceError::Conflict("user already exists".into()));
    }

    // Hashing is CPU-bound and runs on the blocking pool.
    let credentials = state.credentials.clone();
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || credentials.hash_password(&password))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ServiceError::Internal(e.to_string())
        })??;

    let user_id = Uuid::new_v4().to_string();
    let (id, email) = (user_id.clone(), req.email.clone());
    run_blocking(&state.db, state.store_timeout, move |db| db.create_user(&id, &email, &password_hash))
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration of the same email.
            ServiceError::Conflict(_) => ServiceError::Conflict("user already exists".into()),
            other => other,
        })?;

    info!("User {} registered as {}", user_id, req.email);
    Ok((StatusCode::CREATED, Json(Ack::new("user created"))))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload?;

    let email = req.email.clone();
    let user = run_blocking(&state.db, state.store_timeout, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ServiceError::NotFound("user"))?;

    let credentials = state.credentials.clone();
    let stored = user.password;
    let password = req.password;
    tokio::task::spawn_blocking(move || credentials.verify_password(&stored, &password))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ServiceError::Internal(e.to_string())
        })?
        .inspect_err(|_| debug!("Wrong password for {}", user.email))?;

    let access_token = state.tokens.issue(&user.id, &user.email)?;
    info!("User {} logged in", user.id);
    Ok(Json(LoginResponse { access_token }))
}

/// Revokes the token the request was authenticated with.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    state.tokens.revoke(&user.token, user.exp)?;
    info!("User {} logged out", user.user_id);
    Ok(Json(Ack::new("logged out")))
}

fn validate_credentials(req: &CredentialsRequest) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    v.check(!req.email.is_empty(), "email", "must be provided");
    v.check(is_valid_email(&req.email), "email", "must be a valid email address");
    v.check(!req.password.is_empty(), "password", "must be provided");
    v.check(
        req.password.chars().count() >= MIN_PASSWORD_LEN,
        "password",
        "must be at least 8 characters long",
    );
    v.finish()?;
    Ok(())
}

/// Shape check only: `local@domain.tld`, no whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains("..")
        }
        None => false,
    }
}
