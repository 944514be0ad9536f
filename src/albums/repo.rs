use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AlbumRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub photo_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const ALBUM_SELECT: &str = r#"
    SELECT a.id, a.user_id, a.name, a.description, a.created_at,
           (SELECT COUNT(*) FROM album_photos ap WHERE ap.album_id = a.id) AS photo_count
      FROM albums a
"#;

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO albums (user_id, name, description) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(user_id)
    .bind(name)
    .bind(description)
    .fetch_one(db)
    .await
    .context("insert album")?;
    Ok(id)
}

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<AlbumRow>> {
    let rows = sqlx::query_as::<_, AlbumRow>(&format!(
        "{ALBUM_SELECT} WHERE a.user_id = $1 ORDER BY a.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list albums")?;
    Ok(rows)
}

/// The album, only when `user_id` owns it.
pub async fn get_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<AlbumRow>> {
    let row = sqlx::query_as::<_, AlbumRow>(&format!(
        "{ALBUM_SELECT} WHERE a.id = $1 AND a.user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get album")?;
    Ok(row)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    user_id: Uuid,
    name: Option<&str>,
    description: Option<Option<&str>>,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE albums
           SET name = COALESCE($3, name),
               description = CASE WHEN $4 THEN $5 ELSE description END
         WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(description.is_some())
    .bind(description.flatten())
    .execute(db)
    .await
    .context("update album")?;
    Ok(res.rows_affected() == 1)
}

/// Album photo links cascade with the album.
pub async fn delete(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM albums WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete album")?;
    Ok(res.rows_affected() == 1)
}

pub async fn add_photo(db: &PgPool, album_id: Uuid, image_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO album_photos (album_id, image_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(album_id)
    .bind(image_id)
    .execute(db)
    .await
    .context("add album photo")?;
    Ok(res.rows_affected() == 1)
}

pub async fn remove_photo(db: &PgPool, album_id: Uuid, image_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM album_photos WHERE album_id = $1 AND image_id = $2")
        .bind(album_id)
        .bind(image_id)
        .execute(db)
        .await
        .context("remove album photo")?;
    Ok(res.rows_affected() == 1)
}
