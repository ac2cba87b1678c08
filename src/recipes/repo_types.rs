use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::FromRow;

use crate::attributes::repo_types::Attribute;

#[derive(Debug, Clone, FromRow)]
pub struct RecipeRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub time_minutes: i64,
    pub price: String, // decimal text, scale 2
    pub link: String,
    pub image: Option<String>, // storage key
}

/// A recipe with its price parsed and its links resolved to ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub time_minutes: i64,
    pub price: Decimal,
    pub link: String,
    pub image: Option<String>,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

impl Recipe {
    pub fn from_row(row: RecipeRow, tags: Vec<i64>, ingredients: Vec<i64>) -> anyhow::Result<Self> {
        let price = Decimal::from_str(&row.price)
            .map_err(|e| anyhow::anyhow!("recipe {} has invalid price {:?}: {e}", row.id, row.price))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            time_minutes: row.time_minutes,
            price,
            link: row.link,
            image: row.image,
            tags,
            ingredients,
        })
    }
}

/// A recipe plus the full tag and ingredient rows it links to.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub tags: Vec<Attribute>,
    pub ingredients: Vec<Attribute>,
}

/// Column values for an insert or a full/partial update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

/// Recipe list filters; each present set matches recipes linked to any of its ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

/// Price stored with exactly two decimal places.
pub fn price_to_db(price: Decimal) -> String {
    let mut p = price.normalize();
    p.rescale(2);
    p.to_string()
}
