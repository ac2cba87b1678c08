use serde::Serialize;
use sqlx::FromRow;

/// A per-user named label that recipes link to. Tag and Ingredient are the two kinds.
pub trait AttributeKind: Send + Sync + 'static {
    /// Table holding the rows of this kind.
    const TABLE: &'static str;
    /// Join table linking recipes to this kind.
    const LINK_TABLE: &'static str;
    /// Column in `LINK_TABLE` referencing `TABLE`.
    const LINK_COLUMN: &'static str;
    /// Capitalized name used in messages and logs.
    const LABEL: &'static str;
}

pub enum Tag {}

impl AttributeKind for Tag {
    const TABLE: &'static str = "tags";
    const LINK_TABLE: &'static str = "recipe_tags";
    const LINK_COLUMN: &'static str = "tag_id";
    const LABEL: &'static str = "Tag";
}

pub enum Ingredient {}

impl AttributeKind for Ingredient {
    const TABLE: &'static str = "ingredients";
    const LINK_TABLE: &'static str = "recipe_ingredients";
    const LINK_COLUMN: &'static str = "ingredient_id";
    const LABEL: &'static str = "Ingredient";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Attribute {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub user_id: i64,
}
