use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    attributes::{
        repo::AttributeRepo,
        repo_types::{Attribute, AttributeKind},
    },
    error::{is_unique_violation, ApiError},
};

pub const MAX_NAME_LEN: usize = 255;

fn duplicate_error<K: AttributeKind>() -> ApiError {
    ApiError::field("name", format!("{} with this name already exists.", K::LABEL))
}

/// Creates an attribute owned by `owner_id`.
///
/// The name is trimmed first. A blank, overlong, or already-used name
/// (for this owner) is reported under `name` without writing anything.
/// A concurrent insert that slips past the check hits the unique index
/// and is reported the same way.
pub async fn create<K: AttributeKind>(
    db: &SqlitePool,
    owner_id: i64,
    raw_name: &str,
) -> Result<Attribute, ApiError> {
    let name = raw_name.trim();
    if name.is_empty() {
        return Err(ApiError::field("name", "This field may not be blank."));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::field(
            "name",
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        ));
    }
    if AttributeRepo::<K>::exists_for_user(db, owner_id, name).await? {
        warn!(kind = K::LABEL, owner_id, attribute_name = name, "duplicate name rejected");
        return Err(duplicate_error::<K>());
    }

    let attribute = match AttributeRepo::<K>::create(db, owner_id, name).await {
        Ok(a) => a,
        Err(e) if is_unique_violation(&e) => return Err(duplicate_error::<K>()),
        Err(e) => return Err(e.into()),
    };
    info!(kind = K::LABEL, owner_id, id = attribute.id, "attribute created");
    Ok(attribute)
}

pub async fn list<K: AttributeKind>(
    db: &SqlitePool,
    owner_id: i64,
) -> Result<Vec<Attribute>, ApiError> {
    Ok(AttributeRepo::<K>::list_by_user(db, owner_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::repo_types::{Ingredient, Tag};
    use crate::test_utils::{seed_user, test_pool};

    #[tokio::test]
    async fn trims_and_stores_owner() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let tag = create::<Tag>(&db, user.id, "  vege ").await.unwrap();
        assert_eq!(tag.name, "vege");
        assert_eq!(tag.user_id, user.id);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let err = create::<Ingredient>(&db, user.id, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref f) if f.contains("name")));
        assert!(list::<Ingredient>(&db, user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlong_name_is_rejected() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        let name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(create::<Tag>(&db, user.id, &name).await.is_err());
    }

    #[tokio::test]
    async fn same_name_twice_for_one_owner_fails() {
        let db = test_pool().await;
        let user = seed_user(&db, "cook@example.com").await;
        create::<Ingredient>(&db, user.id, "Mayo").await.unwrap();
        let err = create::<Ingredient>(&db, user.id, "Mayo").await.unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            serde_json::to_value(&fields).unwrap()["name"][0],
            "Ingredient with this name already exists."
        );
        assert_eq!(list::<Ingredient>(&db, user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_name_for_different_owners_is_fine() {
        let db = test_pool().await;
        let alice = seed_user(&db, "alice@example.com").await;
        let bob = seed_user(&db, "bob@example.com").await;
        create::<Tag>(&db, alice.id, "Mayo").await.unwrap();
        create::<Tag>(&db, bob.id, "Mayo").await.unwrap();
    }
}
