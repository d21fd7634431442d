use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument};

use crate::error::UserError;
use crate::state::AppState;
use crate::users::dto::{
    ChangePasswordRequest, CreateUserRequest, DeleteUserQuery, SearchUserQuery,
    UpdateUserRequest, UserResponse,
};
use crate::users::repo_types::UserCondition;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(get_all).post(create))
        .route("/users/search", get(search))
        .route("/users/change-password", put(change_password))
        .route("/users/:id", get(get_one).put(update).delete(delete))
}

/// Transport-level failure: a bad request or a domain error.
#[derive(Debug)]
pub enum ApiError {
    InvalidParameter,
    User(UserError),
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        ApiError::User(e)
    }
}

impl<E: std::fmt::Display> From<Rejected<E>> for ApiError {
    fn from(Rejected(e): Rejected<E>) -> Self {
        info!(error = %e, "failed to bind request");
        ApiError::InvalidParameter
    }
}

/// Wraps extractor rejections so `?` turns them into `InvalidParameter`.
pub struct Rejected<E>(E);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let bad_request = |code: u16, message: &str| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": code, "message": message })),
            )
                .into_response()
        };

        match self {
            ApiError::InvalidParameter => bad_request(1001, "invalid parameter"),
            ApiError::User(UserError::UsernameAlreadyExists) => {
                bad_request(1002, "username already exists")
            }
            ApiError::User(UserError::EmailAlreadyExists) => {
                bad_request(1003, "email already exists")
            }
            ApiError::User(UserError::NotFound) => StatusCode::NOT_FOUND.into_response(),
            ApiError::User(UserError::VersionMismatch) => StatusCode::CONFLICT.into_response(),
            ApiError::User(e @ (UserError::Storage(_) | UserError::PasswordHash(_))) => {
                error!(error = %e, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn parse_id(raw: Result<Path<String>, PathRejection>) -> Result<i64, ApiError> {
    let Path(raw) = raw.map_err(Rejected)?;
    raw.parse::<i64>().map_err(|e| {
        info!(error = %e, id = %raw, "failed to parse id");
        ApiError::InvalidParameter
    })
}

#[instrument(skip(state, payload))]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(payload) = payload.map_err(Rejected)?;
    if !payload.is_valid() {
        info!("invalid create request");
        return Err(ApiError::InvalidParameter);
    }

    let user = state.users.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn get_one(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(id)?;
    let user = state.users.get_by_id(id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_all(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.users.get_all().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchUserQuery>, QueryRejection>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let Query(query) = query.map_err(Rejected)?;
    let condition = UserCondition::from(query);
    let users = state.users.search(&condition).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(id)?;
    let Json(payload) = payload.map_err(Rejected)?;
    if !payload.is_valid() {
        info!("invalid update request");
        return Err(ApiError::InvalidParameter);
    }

    let (version, changes) = payload.into_parts();
    let user = state.users.update(id, version, changes).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload.map_err(Rejected)?;
    if !payload.is_valid() {
        info!("invalid change password request");
        return Err(ApiError::InvalidParameter);
    }

    state
        .users
        .update_password(&payload.username, &payload.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<DeleteUserQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    let Query(query) = query.map_err(Rejected)?;
    if !query.is_valid() {
        return Err(ApiError::InvalidParameter);
    }

    state.users.delete(id, query.version).await?;
    Ok(StatusCode::NO_CONTENT)
}
