use std::collections::{BTreeSet, HashMap};

use anyhow::anyhow;
use bytes::Bytes;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    attributes::{
        repo::AttributeRepo,
        repo_types::{AttributeKind, Ingredient, Tag},
    },
    error::{ApiError, FieldErrors},
    images::services::{content_type, detect_image, recipe_image_key},
    recipes::{
        dto::{
            too_many_ids_message, RecipeDetailResponse, RecipePayload, RecipeResponse,
            MAX_LINKED_IDS,
        },
        repo,
        repo_types::{Recipe, RecipeChanges, RecipeDetail, RecipeFilter, RecipeRow},
    },
    state::AppState,
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const MAX_PRICE_PLACES: u32 = 2;
const MAX_PRICE_WHOLE_DIGITS: u32 = 3;

/// How a payload is applied to a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// New recipe: title, time and price required.
    Create,
    /// PUT: same requirements as create; omitted link resets to "" and
    /// omitted tags/ingredients are cleared.
    Replace,
    /// PATCH: only fields present in the payload change.
    Merge,
}

impl WriteMode {
    fn requires_all(self) -> bool {
        !matches!(self, WriteMode::Merge)
    }
}

/// An uploaded file, as received from the multipart body.
#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// Structural checks that need no database: required fields, blank title,
/// range and length limits, and price precision.
fn check_fields(payload: &RecipePayload, mode: WriteMode, errors: &mut FieldErrors) {
    if let Err(e) = payload.validate() {
        errors.extend(e.into());
    }
    let required = mode.requires_all();

    match payload.title.as_deref().map(str::trim) {
        Some("") => errors.add("title", BLANK),
        None if required => errors.add("title", REQUIRED),
        _ => {}
    }
    if payload.time_minutes.is_none() && required {
        errors.add("time_minutes", REQUIRED);
    }
    match payload.price {
        Some(price) => check_price(price, errors),
        None if required => errors.add("price", REQUIRED),
        None => {}
    }
}

fn check_price(price: Decimal, errors: &mut FieldErrors) {
    let normalized = price.normalize();
    if normalized.scale() > MAX_PRICE_PLACES {
        errors.add(
            "price",
            format!("Ensure that there are no more than {MAX_PRICE_PLACES} decimal places."),
        );
    }
    if normalized.abs().trunc() >= Decimal::from(10i64.pow(MAX_PRICE_WHOLE_DIGITS)) {
        errors.add(
            "price",
            format!(
                "Ensure that there are no more than {MAX_PRICE_WHOLE_DIGITS} digits before the decimal point."
            ),
        );
    }
}

/// Sorted, de-duplicated copy of the submitted ids.
fn unique_ids(ids: Option<&[i64]>) -> Option<Vec<i64>> {
    ids.map(|ids| ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
}

async fn check_ids<K: AttributeKind>(
    db: &SqlitePool,
    field: &str,
    ids: Option<&[i64]>,
    errors: &mut FieldErrors,
) -> Result<(), ApiError> {
    let Some(ids) = ids.filter(|ids| !ids.is_empty()) else {
        return Ok(());
    };
    if ids.len() > MAX_LINKED_IDS {
        errors.add(field, too_many_ids_message());
        return Ok(());
    }
    let found: BTreeSet<i64> = AttributeRepo::<K>::existing_ids(db, ids)
        .await?
        .into_iter()
        .collect();
    for id in ids.iter().filter(|id| !found.contains(id)) {
        errors.add(field, format!("Invalid pk \"{id}\" - object does not exist."));
    }
    Ok(())
}

/// Validates a payload and turns it into the column changes to apply.
/// All problems are collected before returning.
async fn prepare(
    db: &SqlitePool,
    payload: RecipePayload,
    mode: WriteMode,
) -> Result<RecipeChanges, ApiError> {
    let mut errors = FieldErrors::new();
    check_fields(&payload, mode, &mut errors);

    let tags = unique_ids(payload.tags.as_deref());
    let ingredients = unique_ids(payload.ingredients.as_deref());
    check_ids::<Tag>(db, "tags", tags.as_deref(), &mut errors).await?;
    check_ids::<Ingredient>(db, "ingredients", ingredients.as_deref(), &mut errors).await?;

    if !errors.is_empty() {
        warn!(?mode, fields = ?errors, "recipe payload rejected");
        return Err(ApiError::Validation(errors));
    }

    let changes = if mode.requires_all() {
        RecipeChanges {
            title: payload.title.map(|t| t.trim().to_string()),
            time_minutes: payload.time_minutes,
            price: payload.price,
            link: Some(payload.link.unwrap_or_default()),
            tags: Some(tags.unwrap_or_default()),
            ingredients: Some(ingredients.unwrap_or_default()),
        }
    } else {
        RecipeChanges {
            title: payload.title.map(|t| t.trim().to_string()),
            time_minutes: payload.time_minutes,
            price: payload.price,
            link: payload.link,
            tags,
            ingredients,
        }
    };
    Ok(changes)
}

async fn hydrate(db: &SqlitePool, rows: Vec<RecipeRow>) -> Result<Vec<Recipe>, ApiError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut tags: HashMap<i64, Vec<i64>> = repo::link_ids::<Tag>(db, &ids).await?;
    let mut ingredients = repo::link_ids::<Ingredient>(db, &ids).await?;

    rows.into_iter()
        .map(|row| {
            let t = tags.remove(&row.id).unwrap_or_default();
            let i = ingredients.remove(&row.id).unwrap_or_default();
            Recipe::from_row(row, t, i).map_err(ApiError::from)
        })
        .collect()
}

async fn owned_row(db: &SqlitePool, owner_id: i64, id: i64) -> Result<RecipeRow, ApiError> {
    repo::get_for_user(db, owner_id, id)
        .await?
        .ok_or(ApiError::NotFound)
}

pub async fn list(
    db: &SqlitePool,
    owner_id: i64,
    filter: &RecipeFilter,
) -> Result<Vec<Recipe>, ApiError> {
    let rows = repo::list_by_user(db, owner_id, filter).await?;
    hydrate(db, rows).await
}

/// One owned recipe in list shape. Someone else's recipe is `NotFound`.
pub async fn get(db: &SqlitePool, owner_id: i64, id: i64) -> Result<Recipe, ApiError> {
    let row = owned_row(db, owner_id, id).await?;
    let mut recipes = hydrate(db, vec![row]).await?;
    recipes
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow!("recipe {id} vanished while loading")))
}

pub async fn get_detail(db: &SqlitePool, owner_id: i64, id: i64) -> Result<RecipeDetail, ApiError> {
    let recipe = get(db, owner_id, id).await?;
    let tags = repo::linked_attributes::<Tag>(db, recipe.id).await?;
    let ingredients = repo::linked_attributes::<Ingredient>(db, recipe.id).await?;
    Ok(RecipeDetail {
        recipe,
        tags,
        ingredients,
    })
}

/// Creates a recipe and its links in one transaction.
pub async fn create(
    db: &SqlitePool,
    owner_id: i64,
    payload: RecipePayload,
) -> Result<Recipe, ApiError> {
    let changes = prepare(db, payload, WriteMode::Create).await?;

    let mut tx = db.begin().await?;
    let id = repo::insert_tx(&mut tx, owner_id, &changes).await?;
    repo::replace_links_tx::<Tag>(&mut tx, id, changes.tags.as_deref().unwrap_or_default()).await?;
    repo::replace_links_tx::<Ingredient>(
        &mut tx,
        id,
        changes.ingredients.as_deref().unwrap_or_default(),
    )
    .await?;
    tx.commit().await?;

    info!(owner_id, recipe_id = id, "recipe created");
    get(db, owner_id, id).await
}

/// Full (`Replace`) or partial (`Merge`) update. Ownership is checked
/// before the payload, so a foreign id is `NotFound` even with a bad body.
pub async fn update(
    db: &SqlitePool,
    owner_id: i64,
    id: i64,
    payload: RecipePayload,
    mode: WriteMode,
) -> Result<Recipe, ApiError> {
    let row = owned_row(db, owner_id, id).await?;
    let changes = prepare(db, payload, mode).await?;

    let mut tx = db.begin().await?;
    repo::update_tx(&mut tx, row.id, &changes).await?;
    if let Some(tags) = changes.tags.as_deref() {
        repo::replace_links_tx::<Tag>(&mut tx, row.id, tags).await?;
    }
    if let Some(ingredients) = changes.ingredients.as_deref() {
        repo::replace_links_tx::<Ingredient>(&mut tx, row.id, ingredients).await?;
    }
    tx.commit().await?;

    info!(owner_id, recipe_id = row.id, ?mode, "recipe updated");
    get(db, owner_id, row.id).await
}

/// Deletes an owned recipe, then its stored image if it had one.
pub async fn delete(state: &AppState, owner_id: i64, id: i64) -> Result<(), ApiError> {
    let row = owned_row(&state.db, owner_id, id).await?;
    if !repo::delete(&state.db, owner_id, row.id).await? {
        return Err(ApiError::NotFound);
    }
    if let Some(key) = row.image.as_deref() {
        discard_object(state, key).await;
    }
    info!(owner_id, recipe_id = row.id, "recipe deleted");
    Ok(())
}

/// Stores a new image for an owned recipe and points the recipe at it.
///
/// The bytes must decode as an image. The previous image, if any, is removed
/// from storage only after the recipe row references the new one.
pub async fn upload_image(
    state: &AppState,
    owner_id: i64,
    id: i64,
    upload: Option<ImageUpload>,
) -> Result<Recipe, ApiError> {
    let row = owned_row(&state.db, owner_id, id).await?;
    let upload = upload.ok_or_else(|| ApiError::field("image", "No file was submitted."))?;
    if upload.bytes.is_empty() {
        return Err(ApiError::field("image", "The submitted file is empty."));
    }

    let bytes = upload.bytes.clone();
    let format = tokio::task::spawn_blocking(move || detect_image(&bytes))
        .await
        .map_err(|e| anyhow!("image decode task failed: {e}"))?
        .map_err(|e| {
            warn!(recipe_id = row.id, error = %e, "upload is not a valid image");
            ApiError::field(
                "image",
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            )
        })?;

    let key = recipe_image_key(upload.file_name.as_deref(), format);
    state
        .storage
        .put_object(&key, upload.bytes, content_type(format))
        .await?;

    if let Err(e) = repo::set_image(&state.db, row.id, Some(&key)).await {
        discard_object(state, &key).await;
        return Err(e.into());
    }
    if let Some(old) = row.image.as_deref() {
        discard_object(state, old).await;
    }

    info!(owner_id, recipe_id = row.id, key = %key, "recipe image stored");
    get(&state.db, owner_id, row.id).await
}

async fn discard_object(state: &AppState, key: &str) {
    if let Err(e) = state.storage.delete_object(key).await {
        warn!(key, error = ?e, "failed to delete stored object");
    }
}

async fn image_url(state: &AppState, key: Option<&str>) -> Result<Option<String>, ApiError> {
    match key {
        Some(key) => Ok(Some(state.storage.object_url(key).await?)),
        None => Ok(None),
    }
}

pub async fn to_response(state: &AppState, recipe: Recipe) -> Result<RecipeResponse, ApiError> {
    let url = image_url(state, recipe.image.as_deref()).await?;
    Ok(RecipeResponse::new(recipe, url))
}

pub async fn to_detail_response(
    state: &AppState,
    detail: RecipeDetail,
) -> Result<RecipeDetailResponse, ApiError> {
    let url = image_url(state, detail.recipe.image.as_deref()).await?;
    Ok(RecipeDetailResponse::new(detail, url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::services as attributes;
    use crate::test_utils::{seed_user, test_pool};
    use std::str::FromStr;

    fn payload(title: &str, minutes: i64, price: &str) -> RecipePayload {
        RecipePayload {
            title: Some(title.to_string()),
            time_minutes: Some(minutes),
            price: Some(Decimal::from_str(price).unwrap()),
            ..Default::default()
        }
    }

    fn field_errors(err: ApiError) -> serde_json::Value {
        match err {
            ApiError::Validation(fields) => serde_json::to_value(fields).unwrap(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn price_precision_limits() {
        let mut errors = FieldErrors::new();
        check_price(Decimal::from_str("999.99").unwrap(), &mut errors);
        check_price(Decimal::from_str("5.50000").unwrap(), &mut errors);
        assert!(errors.is_empty());

        check_price(Decimal::from_str("5.255").unwrap(), &mut errors);
        assert!(errors.contains("price"));

        let mut errors = FieldErrors::new();
        check_price(Decimal::from_str("1000").unwrap(), &mut errors);
        assert!(errors.contains("price"));
    }

    #[test]
    fn merge_requires_nothing() {
        let mut errors = FieldErrors::new();
        check_fields(&RecipePayload::default(), WriteMode::Merge, &mut errors);
        assert!(errors.is_empty());

        check_fields(&RecipePayload::default(), WriteMode::Create, &mut errors);
        for field in ["title", "time_minutes", "price"] {
            assert!(errors.contains(field), "{field} should be required");
        }
    }

    #[test]
    fn time_bounds() {
        for (minutes, ok) in [(0, false), (1, true), (520000, true), (520001, false)] {
            let mut errors = FieldErrors::new();
            check_fields(&payload("t", minutes, "1.00"), WriteMode::Create, &mut errors);
            assert_eq!(errors.is_empty(), ok, "time_minutes = {minutes}");
        }
    }

    #[test]
    fn ids_are_sorted_and_deduplicated() {
        assert_eq!(unique_ids(Some(&[3, 1, 3, 2])), Some(vec![1, 2, 3]));
        assert_eq!(unique_ids(None), None);
    }

    #[tokio::test]
    async fn create_links_tags_and_ingredients() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let vegan = attributes::create::<Tag>(&db, user.id, "Vegan").await.unwrap();
        let salt = attributes::create::<Ingredient>(&db, user.id, "Salt").await.unwrap();

        let mut body = payload("Soup", 30, "5.5");
        body.tags = Some(vec![vegan.id, vegan.id]);
        body.ingredients = Some(vec![salt.id]);
        let recipe = create(&db, user.id, body).await.unwrap();

        assert_eq!(recipe.price.to_string(), "5.50");
        assert_eq!(recipe.link, "");
        assert_eq!(recipe.tags, vec![vegan.id]);
        assert_eq!(recipe.ingredients, vec![salt.id]);
    }

    #[tokio::test]
    async fn unknown_ids_are_reported_and_nothing_is_written() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;

        let mut body = payload("Soup", 30, "5.00");
        body.tags = Some(vec![999]);
        let json = field_errors(create(&db, user.id, body).await.unwrap_err());
        assert_eq!(json["tags"][0], "Invalid pk \"999\" - object does not exist.");
        assert!(list(&db, user.id, &RecipeFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_resets_omitted_fields_and_merge_keeps_them() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let tag = attributes::create::<Tag>(&db, user.id, "Quick").await.unwrap();

        let mut body = payload("Soup", 30, "5.00");
        body.link = Some("https://example.com/soup".into());
        body.tags = Some(vec![tag.id]);
        let recipe = create(&db, user.id, body).await.unwrap();

        let merged = update(
            &db,
            user.id,
            recipe.id,
            RecipePayload {
                title: Some("Better soup".into()),
                ..Default::default()
            },
            WriteMode::Merge,
        )
        .await
        .unwrap();
        assert_eq!(merged.title, "Better soup");
        assert_eq!(merged.link, "https://example.com/soup");
        assert_eq!(merged.tags, vec![tag.id]);

        let replaced = update(&db, user.id, recipe.id, payload("Stew", 60, "7.25"), WriteMode::Replace)
            .await
            .unwrap();
        assert_eq!(replaced.title, "Stew");
        assert_eq!(replaced.link, "");
        assert!(replaced.tags.is_empty());
    }

    #[tokio::test]
    async fn foreign_recipe_is_not_found_before_validation() {
        let db = test_pool().await;
        let owner = seed_user(&db, "owner@example.com").await;
        let other = seed_user(&db, "other@example.com").await;
        let recipe = create(&db, owner.id, payload("Soup", 30, "5.00")).await.unwrap();

        let err = update(&db, other.id, recipe.id, RecipePayload::default(), WriteMode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
        assert!(matches!(get(&db, other.id, recipe.id).await, Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn filters_match_any_listed_id() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let vegan = attributes::create::<Tag>(&db, user.id, "Vegan").await.unwrap();
        let veggie = attributes::create::<Tag>(&db, user.id, "Vegetarian").await.unwrap();

        let mut a = payload("Curry", 20, "4.00");
        a.tags = Some(vec![vegan.id]);
        let a = create(&db, user.id, a).await.unwrap();
        let mut b = payload("Tahini", 20, "4.00");
        b.tags = Some(vec![veggie.id]);
        let b = create(&db, user.id, b).await.unwrap();
        let c = create(&db, user.id, payload("Fish", 20, "4.00")).await.unwrap();

        let filter = RecipeFilter {
            tags: Some(vec![vegan.id, veggie.id]),
            ingredients: None,
        };
        let ids: Vec<i64> = list(&db, user.id, &filter).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(!ids.contains(&c.id));
    }

    #[tokio::test]
    async fn detail_embeds_attributes_by_name() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let b = attributes::create::<Ingredient>(&db, user.id, "Basil").await.unwrap();
        let a = attributes::create::<Ingredient>(&db, user.id, "Almond").await.unwrap();

        let mut body = payload("Pesto", 10, "3.00");
        body.ingredients = Some(vec![b.id, a.id]);
        let recipe = create(&db, user.id, body).await.unwrap();

        let detail = get_detail(&db, user.id, recipe.id).await.unwrap();
        let names: Vec<&str> = detail.ingredients.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Almond", "Basil"]);
    }

    #[tokio::test]
    async fn oversized_id_list_is_a_field_error() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;

        let mut body = payload("Soup", 30, "5.00");
        body.tags = Some((1..=40_000).collect());
        let json = field_errors(create(&db, user.id, body).await.unwrap_err());
        assert_eq!(json["tags"][0], too_many_ids_message());
        assert!(list(&db, user.id, &RecipeFilter::default()).await.unwrap().is_empty());
    }
}
