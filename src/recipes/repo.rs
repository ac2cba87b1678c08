use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::{
    attributes::repo_types::{Attribute, AttributeKind, Ingredient, Tag},
    recipes::repo_types::{price_to_db, RecipeChanges, RecipeFilter, RecipeRow},
};

/// Link rows per multi-row insert (two bound values each).
const LINK_BATCH_SIZE: usize = 250;

const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, link, image";

/// Owner's recipes ordered by id, narrowed by whichever filters are present.
pub async fn list_by_user(
    db: &SqlitePool,
    user_id: i64,
    filter: &RecipeFilter,
) -> Result<Vec<RecipeRow>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE user_id = "
    ));
    qb.push_bind(user_id);
    if let Some(ids) = filter.tags.as_deref() {
        push_link_filter::<Tag>(&mut qb, ids);
    }
    if let Some(ids) = filter.ingredients.as_deref() {
        push_link_filter::<Ingredient>(&mut qb, ids);
    }
    qb.push(" ORDER BY id");

    qb.build_query_as::<RecipeRow>().fetch_all(db).await
}

fn push_link_filter<K: AttributeKind>(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    qb.push(format!(
        " AND id IN (SELECT recipe_id FROM {} WHERE {} IN (",
        K::LINK_TABLE,
        K::LINK_COLUMN
    ));
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated("))");
}

pub async fn get_for_user(
    db: &SqlitePool,
    user_id: i64,
    id: i64,
) -> Result<Option<RecipeRow>, sqlx::Error> {
    let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ? AND user_id = ?");
    sqlx::query_as::<_, RecipeRow>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
}

/// Linked ids of kind `K` per recipe, each list sorted ascending.
pub async fn link_ids<K: AttributeKind>(
    db: &SqlitePool,
    recipe_ids: &[i64],
) -> Result<HashMap<i64, Vec<i64>>, sqlx::Error> {
    let mut out: HashMap<i64, Vec<i64>> = HashMap::new();
    if recipe_ids.is_empty() {
        return Ok(out);
    }
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT recipe_id, {col} FROM {table} WHERE recipe_id IN (",
        col = K::LINK_COLUMN,
        table = K::LINK_TABLE,
    ));
    let mut sep = qb.separated(", ");
    for id in recipe_ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(format!(") ORDER BY recipe_id, {}", K::LINK_COLUMN));

    let rows: Vec<(i64, i64)> = qb.build_query_as().fetch_all(db).await?;
    for (recipe_id, attr_id) in rows {
        out.entry(recipe_id).or_default().push(attr_id);
    }
    Ok(out)
}

/// Full rows of kind `K` linked to one recipe, ordered by name.
pub async fn linked_attributes<K: AttributeKind>(
    db: &SqlitePool,
    recipe_id: i64,
) -> Result<Vec<Attribute>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT a.id, a.name, a.user_id
          FROM {table} a
          JOIN {link} l ON l.{col} = a.id
         WHERE l.recipe_id = ?
         ORDER BY a.name, a.id
        "#,
        table = K::TABLE,
        link = K::LINK_TABLE,
        col = K::LINK_COLUMN,
    );
    sqlx::query_as::<_, Attribute>(&sql)
        .bind(recipe_id)
        .fetch_all(db)
        .await
}

/// Insert a recipe row within a transaction. Title, time and price must be set.
pub async fn insert_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    changes: &RecipeChanges,
) -> Result<i64, sqlx::Error> {
    let id = sqlx::query(
        r#"
        INSERT INTO recipes (user_id, title, time_minutes, price, link)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(changes.title.as_deref())
    .bind(changes.time_minutes)
    .bind(changes.price.map(price_to_db))
    .bind(changes.link.as_deref().unwrap_or_default())
    .execute(&mut **tx)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Update the scalar columns present in `changes` within a transaction.
pub async fn update_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    changes: &RecipeChanges,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE recipes
           SET title = COALESCE(?, title),
               time_minutes = COALESCE(?, time_minutes),
               price = COALESCE(?, price),
               link = COALESCE(?, link)
         WHERE id = ?
        "#,
    )
    .bind(changes.title.as_deref())
    .bind(changes.time_minutes)
    .bind(changes.price.map(price_to_db))
    .bind(changes.link.as_deref())
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Make `ids` the complete set of `K` links for a recipe.
pub async fn replace_links_tx<K: AttributeKind>(
    tx: &mut Transaction<'_, Sqlite>,
    recipe_id: i64,
    ids: &[i64],
) -> Result<(), sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE recipe_id = ?", K::LINK_TABLE);
    sqlx::query(&sql).bind(recipe_id).execute(&mut **tx).await?;

    for chunk in ids.chunks(LINK_BATCH_SIZE) {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "INSERT OR IGNORE INTO {} (recipe_id, {}) ",
            K::LINK_TABLE,
            K::LINK_COLUMN
        ));
        qb.push_values(chunk, |mut b, id| {
            b.push_bind(recipe_id).push_bind(*id);
        });
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

pub async fn set_image(db: &SqlitePool, id: i64, key: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE recipes SET image = ? WHERE id = ?")
        .bind(key)
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Delete an owner's recipe; link rows go with it. Returns false when nothing matched.
pub async fn delete(db: &SqlitePool, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}
