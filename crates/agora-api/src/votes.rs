use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use agora_types::api::{Ack, VoteRequest};

use crate::error::ServiceError;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn add_vote(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload?;

    state.posts.add_vote(&post_id, &user.user_id, req.value).await?;
    Ok(Json(Ack::new("successful")))
}

pub async fn remove_vote(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    state.posts.remove_vote(&post_id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
