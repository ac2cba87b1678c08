use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::users::repo_types::{NewUser, ProfileChanges, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, is_active, is_staff, is_superuser, created_at";

impl User {
    /// Find a user by (already normalized) email.
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// True when another user (not `except_id`) already holds `email`.
    pub async fn email_taken(
        db: &SqlitePool,
        email: &str,
        except_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = ? AND id IS NOT ? LIMIT 1")
                .bind(email)
                .bind(except_id)
                .fetch_optional(db)
                .await?;
        Ok(row.is_some())
    }

    pub async fn create(db: &SqlitePool, new: &NewUser<'_>) -> Result<User, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, name, is_active, is_staff, is_superuser, created_at)
            VALUES (?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.name)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .bind(OffsetDateTime::now_utc())
        .execute(db)
        .await?
        .last_insert_rowid();

        Self::find_by_id(db, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_profile(
        db: &SqlitePool,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
               SET email = COALESCE(?, email),
                   name = COALESCE(?, name),
                   password_hash = COALESCE(?, password_hash)
             WHERE id = ?
            "#,
        )
        .bind(changes.email.as_deref())
        .bind(changes.name.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(id)
        .execute(db)
        .await?;

        Self::find_by_id(db, id).await?.ok_or(sqlx::Error::RowNotFound)
    }
}
