use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    attributes::dto::AttributeResponse,
    error::{ApiError, FieldErrors},
    recipes::repo_types::{Recipe, RecipeDetail, RecipeFilter},
};

/// Most distinct tag or ingredient ids one request may name.
pub const MAX_LINKED_IDS: usize = 1000;

pub fn too_many_ids_message() -> String {
    format!("Ensure this field has no more than {MAX_LINKED_IDS} elements.")
}

/// Body of create, full update, and partial update. Which fields are
/// required depends on the operation; see `services::WriteMode`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecipePayload {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub title: Option<String>,
    #[validate(range(
        min = 1,
        max = 520000,
        message = "Ensure this value is between 1 and 520000."
    ))]
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

/// `?tags=1,2&ingredients=3`
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

impl RecipeListQuery {
    pub fn into_filter(self) -> Result<RecipeFilter, ApiError> {
        let mut errors = FieldErrors::new();
        let tags = parse_id_list("tags", self.tags.as_deref(), &mut errors);
        let ingredients = parse_id_list("ingredients", self.ingredients.as_deref(), &mut errors);
        errors.into_result()?;
        Ok(RecipeFilter { tags, ingredients })
    }
}

/// An empty or missing list means "no filter".
fn parse_id_list(field: &str, raw: Option<&str>, errors: &mut FieldErrors) -> Option<Vec<i64>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed: Result<Vec<i64>, _> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<i64>)
        .collect();
    match parsed {
        Ok(ids) if ids.len() > MAX_LINKED_IDS => {
            errors.add(field, too_many_ids_message());
            None
        }
        Ok(ids) if !ids.is_empty() => Some(ids),
        Ok(_) => None,
        Err(_) => {
            errors.add(field, "Enter a comma-separated list of integers.");
            None
        }
    }
}

/// List shape: linked tags and ingredients as bare ids.
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub title: String,
    pub time_minutes: i64,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
    pub image: Option<String>,
}

impl RecipeResponse {
    pub fn new(recipe: Recipe, image_url: Option<String>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            tags: recipe.tags,
            ingredients: recipe.ingredients,
            image: image_url,
        }
    }
}

/// Detail shape: linked tags and ingredients embedded as objects.
#[derive(Debug, Serialize)]
pub struct RecipeDetailResponse {
    pub id: i64,
    pub title: String,
    pub time_minutes: i64,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<AttributeResponse>,
    pub ingredients: Vec<AttributeResponse>,
    pub image: Option<String>,
}

impl RecipeDetailResponse {
    pub fn new(detail: RecipeDetail, image_url: Option<String>) -> Self {
        let RecipeDetail {
            recipe,
            tags,
            ingredients,
        } = detail;
        Self {
            id: recipe.id,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            link: recipe.link,
            tags: tags.into_iter().map(Into::into).collect(),
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            image: image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeImageResponse {
    pub id: i64,
    pub image: Option<String>,
}
