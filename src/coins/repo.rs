use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Purchase,
    Sale,
    Topup,
    Withdraw,
}

impl TxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Purchase => "purchase",
            TxKind::Sale => "sale",
            TxKind::Topup => "topup",
            TxKind::Withdraw => "withdraw",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerRow {
    pub id: Uuid,
    pub amount: i64,
    pub kind: String,
    pub description: String,
    pub photo_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub photo_id: Uuid,
    pub storage_key: String,
    pub title: Option<String>,
    pub price_paid: i64,
    pub seller_id: Uuid,
    pub seller_username: String,
    pub purchased_at: OffsetDateTime,
}

/// Row-locks the given users in id order. Every balance change in a
/// purchase happens after this, so concurrent purchases that share users
/// queue on the same lock order. `NO KEY UPDATE` leaves foreign key checks
/// against these rows unblocked.
pub async fn lock_users_tx(tx: &mut Transaction<'_, Postgres>, user_ids: &[Uuid]) -> anyhow::Result<()> {
    sqlx::query("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE")
        .bind(user_ids)
        .fetch_all(&mut **tx)
        .await
        .context("lock users")?;
    Ok(())
}

/// Compare-and-set debit. `None` when the balance is below `amount`.
pub async fn debit_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
) -> anyhow::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE users SET coins = coins - $2
         WHERE id = $1 AND coins >= $2
        RETURNING coins
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await
    .context("debit coins")?;
    Ok(row.map(|r| r.0))
}

pub async fn credit_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
) -> anyhow::Result<i64> {
    let (coins,): (i64,) =
        sqlx::query_as("UPDATE users SET coins = coins + $2 WHERE id = $1 RETURNING coins")
            .bind(user_id)
            .bind(amount)
            .fetch_one(&mut **tx)
            .await
            .context("credit coins")?;
    Ok(coins)
}

pub async fn insert_ledger_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    amount: i64,
    kind: TxKind,
    description: &str,
    image_id: Option<Uuid>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coin_transactions (user_id, amount, kind, description, image_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind.as_str())
    .bind(description)
    .bind(image_id)
    .execute(&mut **tx)
    .await
    .context("insert coin transaction")?;
    Ok(())
}

pub async fn owns_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    image_id: Uuid,
) -> anyhow::Result<bool> {
    let (owned,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM image_ownerships WHERE user_id = $1 AND image_id = $2)",
    )
    .bind(user_id)
    .bind(image_id)
    .fetch_one(&mut **tx)
    .await
    .context("check ownership")?;
    Ok(owned)
}

pub async fn sales_count_tx(tx: &mut Transaction<'_, Postgres>, image_id: Uuid) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM image_ownerships WHERE image_id = $1")
        .bind(image_id)
        .fetch_one(&mut **tx)
        .await
        .context("count sales")?;
    Ok(n)
}

pub async fn insert_ownership_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    image_id: Uuid,
    price_paid: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO image_ownerships (user_id, image_id, price_paid) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(image_id)
    .bind(price_paid)
    .execute(&mut **tx)
    .await
    .context("insert ownership")?;
    Ok(())
}

pub async fn owns(db: &PgPool, user_id: Uuid, image_id: Uuid) -> anyhow::Result<bool> {
    let (owned,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM image_ownerships WHERE user_id = $1 AND image_id = $2)",
    )
    .bind(user_id)
    .bind(image_id)
    .fetch_one(db)
    .await
    .context("check ownership")?;
    Ok(owned)
}

pub async fn ledger(db: &PgPool, user_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT id, amount, kind, description, image_id AS photo_id, created_at
          FROM coin_transactions
         WHERE user_id = $1
         ORDER BY created_at DESC, id
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list coin transactions")?;
    Ok(rows)
}

pub async fn order_history(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<OrderRow>> {
    let rows = sqlx::query_as::<_, OrderRow>(
        r#"
        SELECT i.id AS photo_id, i.storage_key, i.title, o.price_paid,
               i.user_id AS seller_id, u.username AS seller_username, o.purchased_at
          FROM image_ownerships o
          JOIN images i ON i.id = o.image_id
          JOIN users u ON u.id = i.user_id
         WHERE o.user_id = $1
         ORDER BY o.purchased_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list orders")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::TxKind;

    #[test]
    fn kinds_match_schema_check() {
        let all = [TxKind::Purchase, TxKind::Sale, TxKind::Topup, TxKind::Withdraw];
        let names: Vec<_> = all.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["purchase", "sale", "topup", "withdraw"]);
    }
}
