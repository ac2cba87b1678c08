use serde::{Deserialize, Serialize};

use crate::attributes::repo_types::Attribute;

/// Body for creating a tag or ingredient. The owner always comes from the token.
#[derive(Debug, Deserialize)]
pub struct CreateAttributeRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttributeResponse {
    pub id: i64,
    pub name: String,
}

impl From<Attribute> for AttributeResponse {
    fn from(a: Attribute) -> Self {
        Self {
            id: a.id,
            name: a.name,
        }
    }
}
