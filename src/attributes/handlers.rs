use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    attributes::{
        dto::{AttributeResponse, CreateAttributeRequest},
        repo_types::{AttributeKind, Ingredient, Tag},
        services,
    },
    error::{ApiError, ApiJson},
    state::AppState,
    users::extractors::AuthUser,
};

pub fn attribute_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/tags", get(list::<Tag>).post(create::<Tag>))
        .route(
            "/recipe/ingredients",
            get(list::<Ingredient>).post(create::<Ingredient>),
        )
}

#[instrument(skip_all, fields(kind = K::LABEL, user_id = caller.id))]
pub async fn list<K: AttributeKind>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<AttributeResponse>>, ApiError> {
    let items = services::list::<K>(&state.db, caller.id).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

#[instrument(skip_all, fields(kind = K::LABEL, user_id = caller.id))]
pub async fn create<K: AttributeKind>(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(payload): ApiJson<CreateAttributeRequest>,
) -> Result<(StatusCode, Json<AttributeResponse>), ApiError> {
    let attribute = services::create::<K>(&state.db, caller.id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(attribute.into())))
}
