use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub coins: i64,
    pub is_admin: bool,
    pub profile_pic_key: Option<String>,
    pub created_at: OffsetDateTime,
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, coins, is_admin, profile_pic_key, created_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: impl PgExecutor<'_>, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
        is_admin: bool,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(is_admin)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn is_admin(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT is_admin FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(row.map(|r| r.0).unwrap_or(false))
    }

    /// Sets the profile picture and returns the key it replaced.
    pub async fn set_profile_pic(
        db: &PgPool,
        id: Uuid,
        key: &str,
    ) -> anyhow::Result<Option<String>> {
        let old: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE users u SET profile_pic_key = $2
              FROM users prev
             WHERE u.id = $1 AND prev.id = u.id
            RETURNING prev.profile_pic_key
            "#,
        )
        .bind(id)
        .bind(key)
        .fetch_optional(db)
        .await?;
        Ok(old.and_then(|r| r.0))
    }

    /// (photos uploaded, photos purchased)
    pub async fn activity_counts(db: &PgPool, id: Uuid) -> anyhow::Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM images WHERE user_id = $1),
                   (SELECT COUNT(*) FROM image_ownerships WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(db)
        .await?;
        Ok(counts)
    }
}
