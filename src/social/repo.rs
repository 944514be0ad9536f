use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub photo_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Inserts the pair if absent. Returns whether a row was written.
pub async fn like(db: &PgPool, photo_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO likes (image_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(photo_id)
    .bind(user_id)
    .execute(db)
    .await
    .context("insert like")?;
    Ok(res.rows_affected() == 1)
}

pub async fn unlike(db: &PgPool, photo_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM likes WHERE image_id = $1 AND user_id = $2")
        .bind(photo_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete like")?;
    Ok(res.rows_affected() == 1)
}

pub async fn likers(db: &PgPool, photo_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM likes WHERE image_id = $1 ORDER BY created_at ASC",
    )
    .bind(photo_id)
    .fetch_all(db)
    .await
    .context("list likes")?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn like_count(db: &PgPool, photo_id: Uuid) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM likes WHERE image_id = $1")
        .bind(photo_id)
        .fetch_one(db)
        .await
        .context("count likes")?;
    Ok(n)
}

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.image_id AS photo_id, c.user_id, u.username, c.content, c.created_at
      FROM comments c
      JOIN users u ON u.id = c.user_id
"#;

pub async fn add_comment(
    db: &PgPool,
    photo_id: Uuid,
    user_id: Uuid,
    content: &str,
) -> anyhow::Result<CommentRow> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO comments (image_id, user_id, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(photo_id)
    .bind(user_id)
    .bind(content)
    .fetch_one(db)
    .await
    .context("insert comment")?;

    let row = sqlx::query_as::<_, CommentRow>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_one(db)
        .await
        .context("reload comment")?;
    Ok(row)
}

pub async fn comments_for(db: &PgPool, photo_id: Uuid) -> anyhow::Result<Vec<CommentRow>> {
    let rows = sqlx::query_as::<_, CommentRow>(&format!(
        "{COMMENT_SELECT} WHERE c.image_id = $1 ORDER BY c.created_at ASC"
    ))
    .bind(photo_id)
    .fetch_all(db)
    .await
    .context("list comments")?;
    Ok(rows)
}

pub async fn comment_author(db: &PgPool, comment_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(db)
        .await
        .context("comment author")?;
    Ok(row.map(|r| r.0))
}

pub async fn delete_comment(db: &PgPool, comment_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(db)
        .await
        .context("delete comment")?;
    Ok(())
}
