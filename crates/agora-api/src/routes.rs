use axum::{
    Json, Router,
    http::{Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, posts, votes};

/// All routes, with auth applied where required. Transport layers (CORS,
/// tracing, request timeout) are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/post", get(posts::list_posts))
        .route("/post/{id}", get(posts::get_post))
        .route("/post/title/{title}", get(posts::get_post_by_title));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/post", post(posts::create_post))
        .route("/post/{id}", delete(posts::delete_post).put(posts::update_post))
        .route("/post/{id}/vote", post(votes::add_vote).delete(votes::remove_vote))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/api/v1", api)
        .route("/heartbeat", get(heartbeat))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
}

async fn heartbeat() -> &'static str {
    "."
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "The requested resource could not be found. Please check the URL and try again."
        })),
    )
}

async fn method_not_allowed(method: Method) -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": format!("the {} method is not supported for this resource", method)
        })),
    )
}
