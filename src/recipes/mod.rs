//! Recipes owned by one user, linked to that user's tags and ingredients,
//! with an optional uploaded image.

use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    handlers::recipe_routes(max_upload_bytes)
}
