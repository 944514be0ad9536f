use anyhow::Context;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// A gallery row: the image plus uploader name and aggregate counts.
#[derive(Debug, Clone, FromRow)]
pub struct PhotoRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub owner_username: String,
    pub storage_key: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub max_sales: Option<i32>,
    pub created_at: OffsetDateTime,
    pub likes: i64,
    pub sales: i64,
    pub tags: Vec<String>,
}

/// The columns a purchase needs, read under `FOR UPDATE`.
#[derive(Debug, Clone, FromRow)]
pub struct SaleImage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub price: i64,
    pub max_sales: Option<i32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageRef {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
}

pub struct NewPhoto<'a> {
    pub storage_key: &'a str,
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub price: i64,
    pub max_sales: Option<i32>,
}

/// `None` keeps a column, `Some(None)` clears a nullable one.
#[derive(Debug, Default, Clone)]
pub struct PhotoPatch {
    pub title: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub price: Option<i64>,
    pub max_sales: Option<Option<i32>>,
}

pub struct GalleryFilter<'a> {
    pub tag: Option<&'a str>,
    pub owner: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

pub(crate) const PHOTO_SELECT: &str = r#"
    SELECT i.id, i.user_id, u.username AS owner_username, i.storage_key, i.title,
           i.description, i.price, i.max_sales, i.created_at,
           (SELECT COUNT(*) FROM likes l WHERE l.image_id = i.id) AS likes,
           (SELECT COUNT(*) FROM image_ownerships o WHERE o.image_id = i.id) AS sales,
           ARRAY(SELECT t.name
                   FROM image_tags it JOIN tags t ON t.id = it.tag_id
                  WHERE it.image_id = i.id
                  ORDER BY t.name) AS tags
      FROM images i
      JOIN users u ON u.id = i.user_id
"#;

pub async fn list_gallery(db: &PgPool, f: &GalleryFilter<'_>) -> anyhow::Result<Vec<PhotoRow>> {
    let rows = sqlx::query_as::<_, PhotoRow>(&format!(
        r#"{PHOTO_SELECT}
         WHERE ($1::text IS NULL OR EXISTS (
                  SELECT 1 FROM image_tags it JOIN tags t ON t.id = it.tag_id
                   WHERE it.image_id = i.id AND t.name = $1))
           AND ($2::uuid IS NULL OR i.user_id = $2)
         ORDER BY i.created_at DESC
         LIMIT $3 OFFSET $4
        "#
    ))
    .bind(f.tag)
    .bind(f.owner)
    .bind(f.limit)
    .bind(f.offset)
    .fetch_all(db)
    .await
    .context("list gallery")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<PhotoRow>> {
    let row = sqlx::query_as::<_, PhotoRow>(&format!("{PHOTO_SELECT} WHERE i.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get photo")?;
    Ok(row)
}

pub async fn list_in_album(db: &PgPool, album_id: Uuid) -> anyhow::Result<Vec<PhotoRow>> {
    let rows = sqlx::query_as::<_, PhotoRow>(&format!(
        r#"{PHOTO_SELECT}
          JOIN album_photos ap ON ap.image_id = i.id
         WHERE ap.album_id = $1
         ORDER BY ap.added_at ASC
        "#
    ))
    .bind(album_id)
    .fetch_all(db)
    .await
    .context("list album photos")?;
    Ok(rows)
}

pub async fn list_in_cart(db: &PgPool, cart_id: Uuid) -> anyhow::Result<Vec<PhotoRow>> {
    let rows = sqlx::query_as::<_, PhotoRow>(&format!(
        r#"{PHOTO_SELECT}
          JOIN cart_items ci ON ci.image_id = i.id
         WHERE ci.cart_id = $1
         ORDER BY ci.added_at ASC
        "#
    ))
    .bind(cart_id)
    .fetch_all(db)
    .await
    .context("list cart photos")?;
    Ok(rows)
}

/// Insert a new image within a transaction.
pub async fn insert_photo_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    photo: &NewPhoto<'_>,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO images (user_id, storage_key, title, description, price, max_sales)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(photo.storage_key)
    .bind(photo.title)
    .bind(photo.description)
    .bind(photo.price)
    .bind(photo.max_sales)
    .fetch_one(&mut **tx)
    .await
    .context("insert photo")?;

    Ok(id)
}

pub async fn update_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    patch: &PhotoPatch,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE images
           SET title       = CASE WHEN $2 THEN $3 ELSE title END,
               description = CASE WHEN $4 THEN $5 ELSE description END,
               price       = COALESCE($6, price),
               max_sales   = CASE WHEN $7 THEN $8 ELSE max_sales END
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(patch.title.is_some())
    .bind(patch.title.clone().flatten())
    .bind(patch.description.is_some())
    .bind(patch.description.clone().flatten())
    .bind(patch.price)
    .bind(patch.max_sales.is_some())
    .bind(patch.max_sales.flatten())
    .execute(&mut **tx)
    .await
    .context("update photo")?;
    Ok(())
}

pub async fn find_by_key(db: &PgPool, key: &str) -> anyhow::Result<Option<ImageRef>> {
    let row = sqlx::query_as::<_, ImageRef>(
        "SELECT id, user_id, storage_key FROM images WHERE storage_key = $1",
    )
    .bind(key)
    .fetch_optional(db)
    .await
    .context("find photo by key")?;
    Ok(row)
}

pub async fn find_ref(db: impl PgExecutor<'_>, id: Uuid) -> anyhow::Result<Option<ImageRef>> {
    let row = sqlx::query_as::<_, ImageRef>(
        "SELECT id, user_id, storage_key FROM images WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find photo")?;
    Ok(row)
}

/// Deleting the row cascades to likes, comments, ownerships, cart items,
/// album links and tag links.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete photo")?;
    Ok(())
}

pub async fn lock_for_sale(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> anyhow::Result<Option<SaleImage>> {
    let row = sqlx::query_as::<_, SaleImage>(
        "SELECT id, user_id, price, max_sales, title FROM images WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock photo for sale")?;
    Ok(row)
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct PhotoStatus {
    pub owned: bool,
    pub is_uploader: bool,
    pub in_cart: bool,
}

pub async fn status_for(db: &PgPool, photo_id: Uuid, user_id: Uuid) -> anyhow::Result<PhotoStatus> {
    let status = sqlx::query_as::<_, PhotoStatus>(
        r#"
        SELECT EXISTS (SELECT 1 FROM image_ownerships WHERE image_id = $1 AND user_id = $2) AS owned,
               EXISTS (SELECT 1 FROM images WHERE id = $1 AND user_id = $2) AS is_uploader,
               EXISTS (SELECT 1 FROM cart_items ci JOIN carts c ON c.id = ci.cart_id
                        WHERE ci.image_id = $1 AND c.user_id = $2) AS in_cart
        "#,
    )
    .bind(photo_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .context("photo status")?;
    Ok(status)
}
