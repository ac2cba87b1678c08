use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::{ApiError, ApiJson},
    state::AppState,
    users::{
        dto::{ProfileResponse, RegisterRequest, TokenRequest, TokenResponse, UpdateProfileRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/create", post(create_user))
        .route("/user/token", post(create_token))
        .route("/user/me", get(get_me).patch(update_me))
}

#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), ApiError> {
    let user = services::register(&state.db, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip_all)]
pub async fn create_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let token = services::issue_token(&state.db, &keys, payload).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip_all, fields(user_id = caller.id))]
pub async fn get_me(AuthUser(caller): AuthUser) -> Json<ProfileResponse> {
    Json(caller.into())
}

#[instrument(skip_all, fields(user_id = caller.id))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = services::update_profile(&state.db, &caller, payload).await?;
    Ok(Json(user.into()))
}
