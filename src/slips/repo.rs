use anyhow::Context;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{SlipKind, SlipStatus};

#[derive(Debug, Clone, FromRow)]
pub struct SlipRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub kind: String,
    pub amount: i64,
    pub storage_key: Option<String>,
    pub status: String,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
    pub reviewed_at: Option<OffsetDateTime>,
    pub reviewed_by: Option<Uuid>,
}

const SLIP_SELECT: &str = r#"
    SELECT s.id, s.user_id, u.username, s.kind, s.amount, s.storage_key, s.status,
           s.note, s.created_at, s.reviewed_at, s.reviewed_by
      FROM payment_slips s
      JOIN users u ON u.id = s.user_id
"#;

pub async fn insert(
    db: &PgPool,
    user_id: Uuid,
    kind: SlipKind,
    amount: i64,
    storage_key: Option<&str>,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO payment_slips (user_id, kind, amount, storage_key)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(storage_key)
    .fetch_one(db)
    .await
    .context("insert slip")?;
    Ok(id)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<SlipRow>> {
    let row = sqlx::query_as::<_, SlipRow>(&format!("{SLIP_SELECT} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("get slip")?;
    Ok(row)
}

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SlipRow>> {
    let rows = sqlx::query_as::<_, SlipRow>(&format!(
        "{SLIP_SELECT} WHERE s.user_id = $1 ORDER BY s.created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list own slips")?;
    Ok(rows)
}

/// Oldest first so the review queue reads in arrival order.
pub async fn list_by_status(db: &PgPool, status: Option<SlipStatus>) -> anyhow::Result<Vec<SlipRow>> {
    let rows = sqlx::query_as::<_, SlipRow>(&format!(
        "{SLIP_SELECT} WHERE ($1::text IS NULL OR s.status = $1) ORDER BY s.created_at ASC"
    ))
    .bind(status.map(SlipStatus::as_str))
    .fetch_all(db)
    .await
    .context("list slips")?;
    Ok(rows)
}

#[derive(Debug, Clone, FromRow)]
pub struct LockedSlip {
    pub user_id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub status: String,
}

/// Locks the slip row for review.
pub async fn lock_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> anyhow::Result<Option<LockedSlip>> {
    let row = sqlx::query_as::<_, LockedSlip>(
        "SELECT user_id, kind, amount, status FROM payment_slips WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock slip")?;
    Ok(row)
}

pub async fn mark_reviewed_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: SlipStatus,
    admin_id: Uuid,
    note: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE payment_slips
           SET status = $2, reviewed_by = $3, reviewed_at = now(), note = COALESCE($4, note)
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(admin_id)
    .bind(note)
    .execute(&mut **tx)
    .await
    .context("mark slip reviewed")?;
    Ok(())
}
