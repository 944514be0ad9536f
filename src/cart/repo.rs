use anyhow::Context;
use sqlx::{PgExecutor, Postgres, Transaction};
use uuid::Uuid;

/// Returns the user's cart id, creating the cart on first use.
pub async fn get_or_create_tx(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO carts (user_id) VALUES ($1)
        ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
        RETURNING id
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
    .context("get or create cart")?;
    Ok(id)
}

pub async fn find_cart(db: impl PgExecutor<'_>, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
        .context("find cart")?;
    Ok(row.map(|r| r.0))
}

pub async fn find_cart_tx(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    find_cart(&mut **tx, user_id).await
}

/// False when the photo is already in the cart.
pub async fn add_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
    image_id: Uuid,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO cart_items (cart_id, image_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(cart_id)
    .bind(image_id)
    .execute(&mut **tx)
    .await
    .context("add cart item")?;
    Ok(res.rows_affected() == 1)
}

pub async fn remove_item(db: impl PgExecutor<'_>, user_id: Uuid, image_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        DELETE FROM cart_items ci
         USING carts c
         WHERE c.id = ci.cart_id AND c.user_id = $1 AND ci.image_id = $2
        "#,
    )
    .bind(user_id)
    .bind(image_id)
    .execute(db)
    .await
    .context("remove cart item")?;
    Ok(res.rows_affected() == 1)
}

pub async fn remove_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    image_id: Uuid,
) -> anyhow::Result<bool> {
    remove_item(&mut **tx, user_id, image_id).await
}

/// Item image ids in id order, the order checkout takes row locks in.
pub async fn item_ids_tx(tx: &mut Transaction<'_, Postgres>, cart_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT image_id FROM cart_items WHERE cart_id = $1 ORDER BY image_id")
            .bind(cart_id)
            .fetch_all(&mut **tx)
            .await
            .context("list cart items")?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn clear_tx(tx: &mut Transaction<'_, Postgres>, cart_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await
        .context("clear cart")?;
    Ok(())
}
