use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{ReviewResponse, SlipResponse},
    repo::{self, SlipRow},
    SlipKind, SlipStatus,
};
use crate::{
    auth::repo::User,
    coins::repo::{self as ledger, TxKind},
    error::{AppError, AppResult},
    state::AppState,
    storage::Bucket,
    uploads::{store_image, UploadItem},
};

const MAX_SLIP_AMOUNT: i64 = 1_000_000;

pub fn check_amount(amount: i64) -> AppResult<()> {
    if amount < 1 {
        return Err(AppError::bad_request("amount must be a positive number of coins"));
    }
    if amount > MAX_SLIP_AMOUNT {
        return Err(AppError::bad_request(format!(
            "amount must be at most {MAX_SLIP_AMOUNT}"
        )));
    }
    Ok(())
}

/// Files a pending slip. Top-ups need the transfer receipt; withdrawals need
/// the balance to cover the amount at request time.
pub async fn submit(
    st: &AppState,
    user_id: Uuid,
    kind: SlipKind,
    amount: i64,
    file: Option<UploadItem>,
) -> AppResult<Uuid> {
    check_amount(amount)?;
    match kind {
        SlipKind::Topup if file.is_none() => {
            return Err(AppError::bad_request("slip is required for a top-up"));
        }
        SlipKind::Withdraw => {
            let user = User::find_by_id(&st.db, user_id)
                .await?
                .ok_or_else(|| AppError::unauthorized("User not found"))?;
            if user.coins < amount {
                return Err(AppError::bad_request("Insufficient coins"));
            }
        }
        SlipKind::Topup => {}
    }

    let key = match file {
        Some(item) => Some(store_image(st, Bucket::Slip, item).await?),
        None => None,
    };

    match repo::insert(&st.db, user_id, kind, amount, key.as_deref()).await {
        Ok(id) => {
            info!(slip_id = %id, %user_id, kind = kind.as_str(), amount, "slip submitted");
            Ok(id)
        }
        Err(e) => {
            if let Some(key) = key {
                if let Err(cleanup) = st.storage.delete_object(&key).await {
                    warn!(error = %cleanup, %key, "orphaned slip left in storage");
                }
            }
            Err(e.into())
        }
    }
}

fn pending_kind(status: &str, kind: &str) -> AppResult<SlipKind> {
    if status.parse::<SlipStatus>() != Ok(SlipStatus::Pending) {
        return Err(AppError::bad_request("Slip has already been reviewed"));
    }
    kind.parse::<SlipKind>()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("unknown slip kind {kind}")))
}

/// Applies the slip to the owner's balance with one ledger row. A withdrawal
/// that no longer fits the balance fails and leaves the slip pending.
pub async fn approve(db: &PgPool, slip_id: Uuid, admin_id: Uuid) -> AppResult<ReviewResponse> {
    let mut tx = db.begin().await.context("begin tx")?;
    let slip = repo::lock_tx(&mut tx, slip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Slip not found"))?;
    let kind = pending_kind(&slip.status, &slip.kind)?;

    let balance = match kind {
        SlipKind::Topup => {
            let balance = ledger::credit_tx(&mut tx, slip.user_id, slip.amount).await?;
            ledger::insert_ledger_tx(
                &mut tx,
                slip.user_id,
                slip.amount,
                TxKind::Topup,
                "Top-up approved",
                None,
            )
            .await?;
            balance
        }
        SlipKind::Withdraw => {
            let balance = ledger::debit_tx(&mut tx, slip.user_id, slip.amount)
                .await?
                .ok_or_else(|| AppError::bad_request("Insufficient coins"))?;
            ledger::insert_ledger_tx(
                &mut tx,
                slip.user_id,
                -slip.amount,
                TxKind::Withdraw,
                "Withdrawal approved",
                None,
            )
            .await?;
            balance
        }
    };

    repo::mark_reviewed_tx(&mut tx, slip_id, SlipStatus::Approved, admin_id, None).await?;
    tx.commit().await.context("commit approval")?;

    info!(%slip_id, %admin_id, user_id = %slip.user_id, kind = kind.as_str(), amount = slip.amount, "slip approved");
    Ok(ReviewResponse {
        id: slip_id,
        status: SlipStatus::Approved.as_str(),
        balance,
    })
}

pub async fn reject(
    db: &PgPool,
    slip_id: Uuid,
    admin_id: Uuid,
    reason: Option<&str>,
) -> AppResult<ReviewResponse> {
    let mut tx = db.begin().await.context("begin tx")?;
    let slip = repo::lock_tx(&mut tx, slip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Slip not found"))?;
    pending_kind(&slip.status, &slip.kind)?;

    repo::mark_reviewed_tx(&mut tx, slip_id, SlipStatus::Rejected, admin_id, reason).await?;
    let owner = User::find_by_id(&mut *tx, slip.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Slip owner not found"))?;
    tx.commit().await.context("commit rejection")?;

    info!(%slip_id, %admin_id, "slip rejected");
    Ok(ReviewResponse {
        id: slip_id,
        status: SlipStatus::Rejected.as_str(),
        balance: owner.coins,
    })
}

pub async fn to_response(st: &AppState, row: SlipRow) -> anyhow::Result<SlipResponse> {
    let slip_url = match &row.storage_key {
        Some(key) => Some(st.storage.url_for(key).await?),
        None => None,
    };
    Ok(SlipResponse {
        id: row.id,
        user_id: row.user_id,
        username: row.username,
        kind: row.kind,
        amount: row.amount,
        slip_url,
        status: row.status,
        note: row.note,
        created_at: row.created_at,
        reviewed_at: row.reviewed_at,
        reviewed_by: row.reviewed_by,
    })
}

pub async fn to_responses(st: &AppState, rows: Vec<SlipRow>) -> anyhow::Result<Vec<SlipResponse>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(to_response(st, row).await?);
    }
    Ok(out)
}
