use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
};

use crate::{
    application::{error::AppError, users::UserDirectory},
    cache::FieldValue,
    domain::users::User,
};

use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/cache/get", post(cache_get))
        .route("/cache/list", post(cache_list))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Fixed-id single lookup; `null` when the user does not exist.
async fn cache_get(State(state): State<AppState>) -> Result<Json<Option<User>>, AppError> {
    let user = state.users.get_by_id(1).await?;
    Ok(Json(user))
}

/// Batch lookup; the body is a JSON array of ids, the response maps each
/// found id to its user.
async fn cache_list(
    State(state): State<AppState>,
    Json(ids): Json<Vec<i64>>,
) -> Result<Json<HashMap<FieldValue, User>>, AppError> {
    let users = state.users.list_by_ids(&ids).await?;
    Ok(Json(users))
}
