use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    error::{ApiError, ApiJson},
    recipes::{
        dto::{RecipeDetailResponse, RecipeImageResponse, RecipeListQuery, RecipePayload, RecipeResponse},
        services::{self, ImageUpload, WriteMode},
    },
    state::AppState,
    users::extractors::AuthUser,
};

const IMAGE_FIELD: &str = "image";

pub fn recipe_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/recipe/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/recipes/:id",
            get(get_recipe)
                .put(replace_recipe)
                .patch(update_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipe/recipes/:id/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

#[instrument(skip_all, fields(user_id = caller.id))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<RecipeResponse>>, ApiError> {
    let filter = query.into_filter()?;
    let recipes = services::list(&state.db, caller.id, &filter).await?;

    let mut out = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        out.push(services::to_response(&state, recipe).await?);
    }
    Ok(Json(out))
}

#[instrument(skip_all, fields(user_id = caller.id))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<(StatusCode, Json<RecipeResponse>), ApiError> {
    let recipe = services::create(&state.db, caller.id, payload).await?;
    let body = services::to_response(&state, recipe).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip_all, fields(user_id = caller.id, recipe_id = id))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetailResponse>, ApiError> {
    let detail = services::get_detail(&state.db, caller.id, id).await?;
    Ok(Json(services::to_detail_response(&state, detail).await?))
}

#[instrument(skip_all, fields(user_id = caller.id, recipe_id = id))]
pub async fn replace_recipe(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = services::update(&state.db, caller.id, id, payload, WriteMode::Replace).await?;
    Ok(Json(services::to_response(&state, recipe).await?))
}

#[instrument(skip_all, fields(user_id = caller.id, recipe_id = id))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = services::update(&state.db, caller.id, id, payload, WriteMode::Merge).await?;
    Ok(Json(services::to_response(&state, recipe).await?))
}

#[instrument(skip_all, fields(user_id = caller.id, recipe_id = id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    services::delete(&state, caller.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user_id = caller.id, recipe_id = id))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<RecipeImageResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, status = %e.status(), "unreadable multipart body");
        ApiError::from(e)
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| {
            warn!(error = %e, status = %e.status(), "unreadable upload field");
            ApiError::from(e)
        })?;
        upload = Some(ImageUpload { file_name, bytes });
        break;
    }

    let recipe = services::upload_image(&state, caller.id, id, upload).await?;
    let response = services::to_response(&state, recipe).await?;
    Ok(Json(RecipeImageResponse {
        id: response.id,
        image: response.image,
    }))
}
