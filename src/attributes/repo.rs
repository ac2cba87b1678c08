use std::marker::PhantomData;

use sqlx::SqlitePool;

use crate::attributes::repo_types::{Attribute, AttributeKind};

/// Ids bound per `IN (...)` query, well under SQLite's variable limit.
const ID_BATCH_SIZE: usize = 500;

/// Queries for one attribute kind. Every read and write is scoped by owner.
pub struct AttributeRepo<K>(PhantomData<K>);

impl<K: AttributeKind> AttributeRepo<K> {
    /// Owner's rows ordered by name.
    pub async fn list_by_user(db: &SqlitePool, user_id: i64) -> Result<Vec<Attribute>, sqlx::Error> {
        let sql = format!(
            "SELECT id, name, user_id FROM {} WHERE user_id = ? ORDER BY name, id",
            K::TABLE
        );
        sqlx::query_as::<_, Attribute>(&sql)
            .bind(user_id)
            .fetch_all(db)
            .await
    }

    pub async fn exists_for_user(
        db: &SqlitePool,
        user_id: i64,
        name: &str,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT id FROM {} WHERE user_id = ? AND name = ? LIMIT 1",
            K::TABLE
        );
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(name)
            .fetch_optional(db)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create(db: &SqlitePool, user_id: i64, name: &str) -> Result<Attribute, sqlx::Error> {
        let sql = format!("INSERT INTO {} (name, user_id) VALUES (?, ?)", K::TABLE);
        let id = sqlx::query(&sql)
            .bind(name)
            .bind(user_id)
            .execute(db)
            .await?
            .last_insert_rowid();

        Ok(Attribute {
            id,
            name: name.to_string(),
            user_id,
        })
    }

    /// Which of `ids` exist in the table, regardless of owner.
    pub async fn existing_ids(db: &SqlitePool, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error> {
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_BATCH_SIZE) {
            let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
                "SELECT id FROM {} WHERE id IN (",
                K::TABLE
            ));
            let mut sep = qb.separated(", ");
            for id in chunk {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");

            let rows: Vec<(i64,)> = qb.build_query_as().fetch_all(db).await?;
            found.extend(rows.into_iter().map(|(id,)| id));
        }
        Ok(found)
    }
}
