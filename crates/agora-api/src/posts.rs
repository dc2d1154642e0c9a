use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use agora_types::api::PostRequest;
use agora_types::pagination::{DEFAULT_POST_SORT, POST_SORT_SAFELIST, PaginateFilter, Validator};

use crate::error::ServiceError;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub const MAX_TITLE_LEN: usize = 255;

pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = PaginateFilter::from_params(&params, DEFAULT_POST_SORT, POST_SORT_SAFELIST)?;
    let page = state.posts.get_all_posts(filter).await?;
    Ok(Json(page))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.posts.get_post_by_id(&post_id).await?))
}

pub async fn get_post_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.posts.get_post_by_title(&title).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload?;
    validate_post(&req)?;

    let post = state.posts.create_post(&user.user_id, &req.title, &req.text).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<PostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload?;
    validate_post(&req)?;

    let post = state
        .posts
        .update_post(&post_id, &user.user_id, &req.title, &req.text)
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ServiceError> {
    state.posts.delete_post(&post_id, &user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate_post(req: &PostRequest) -> Result<(), ServiceError> {
    let mut v = Validator::new();
    v.check(!req.title.trim().is_empty(), "title", "must be provided");
    v.check(
        req.title.chars().count() <= MAX_TITLE_LEN,
        "title",
        "must not be more than 255 characters long",
    );
    v.check(!req.text.trim().is_empty(), "text", "must be provided");
    v.finish()?;
    Ok(())
}
