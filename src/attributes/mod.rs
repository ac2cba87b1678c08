//! Tags and ingredients: named labels owned by one user, unique per owner.
//!
//! Both kinds share one implementation, parameterized by [`repo_types::AttributeKind`].

use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::attribute_routes()
}
