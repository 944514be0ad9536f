use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TagCount {
    pub id: Uuid,
    pub name: String,
    pub photos: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// Get-or-create by normalised name.
pub async fn upsert(db: impl PgExecutor<'_>, name: &str) -> anyhow::Result<Tag> {
    let tag = sqlx::query_as::<_, Tag>(
        r#"
        INSERT INTO tags (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name
        "#,
    )
    .bind(name)
    .fetch_one(db)
    .await
    .with_context(|| format!("upsert tag {name}"))?;
    Ok(tag)
}

pub async fn list_with_counts(db: &PgPool) -> anyhow::Result<Vec<TagCount>> {
    let rows = sqlx::query_as::<_, TagCount>(
        r#"
        SELECT t.id, t.name, COUNT(it.image_id) AS photos
          FROM tags t
          LEFT JOIN image_tags it ON it.tag_id = t.id
         GROUP BY t.id, t.name
         ORDER BY photos DESC, t.name ASC
        "#,
    )
    .fetch_all(db)
    .await
    .context("list tags")?;
    Ok(rows)
}

/// Replaces the tag set of an image.
pub async fn set_image_tags_tx(
    tx: &mut Transaction<'_, Postgres>,
    image_id: Uuid,
    names: &[String],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM image_tags WHERE image_id = $1")
        .bind(image_id)
        .execute(&mut **tx)
        .await
        .context("clear image tags")?;

    for name in names {
        let tag = upsert(&mut **tx, name).await?;
        sqlx::query("INSERT INTO image_tags (image_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(image_id)
            .bind(tag.id)
            .execute(&mut **tx)
            .await
            .context("link image tag")?;
    }
    Ok(())
}

pub async fn remove_image_tag(db: &PgPool, image_id: Uuid, name: &str) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        DELETE FROM image_tags it
         USING tags t
         WHERE it.tag_id = t.id AND it.image_id = $1 AND t.name = $2
        "#,
    )
    .bind(image_id)
    .bind(name)
    .execute(db)
    .await
    .context("unlink image tag")?;
    Ok(res.rows_affected() > 0)
}
