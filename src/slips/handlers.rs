use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::extract::{Json, Path, Query};

use super::{
    dto::{GenerateQrRequest, QrResponse, RejectRequest, ReviewResponse, SlipListQuery, SlipResponse},
    promptpay, repo, services, SlipKind, SlipStatus,
};
use crate::{
    auth::{AdminUser, AuthUser},
    error::{AppError, AppResult},
    state::AppState,
    uploads::UploadForm,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/generateQR", post(generate_qr))
        .route("/uploadSlip", post(upload_slip))
        .route("/slips", get(list_slips))
        .route("/slips/mine", get(my_slips))
        .route("/slips/approve/:id", post(approve_slip))
        .route("/slips/reject/:id", post(reject_slip))
}

#[instrument(skip(state))]
pub async fn generate_qr(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(body): Json<GenerateQrRequest>,
) -> AppResult<Json<QrResponse>> {
    services::check_amount(body.amount)?;
    let promptpay_id = state.config.promptpay_id.clone();
    let payload = promptpay::payload(&promptpay_id, Some(body.amount)).ok_or_else(|| {
        error!("PROMPTPAY_ID is not configured");
        AppError::Internal(anyhow::anyhow!("PromptPay id missing"))
    })?;
    let svg = promptpay::render_svg(&payload)?;
    Ok(Json(QrResponse {
        amount: body.amount,
        promptpay_id,
        payload,
        svg,
    }))
}

/// POST /uploadSlip (multipart)
/// Fields: kind (topup|withdraw), amount, slip (file, required for topup)
#[instrument(skip(state, mp))]
pub async fn upload_slip(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<SlipResponse>)> {
    let form = UploadForm::read(mp, &["slip", "image"]).await?;
    let kind = match form.text("kind") {
        None => SlipKind::Topup,
        Some(raw) => raw
            .parse::<SlipKind>()
            .map_err(|_| AppError::bad_request("kind must be topup or withdraw"))?,
    };
    let amount = form
        .parse::<i64>("amount")?
        .ok_or_else(|| AppError::bad_request("amount is required"))?;

    let id = services::submit(&state, user_id, kind, amount, form.file).await?;
    let row = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Slip not found"))?;
    Ok((StatusCode::CREATED, Json(services::to_response(&state, row).await?)))
}

#[instrument(skip(state))]
pub async fn my_slips(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<SlipResponse>>> {
    let rows = repo::list_for_user(&state.db, user_id).await?;
    Ok(Json(services::to_responses(&state, rows).await?))
}

#[instrument(skip(state))]
pub async fn list_slips(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(q): Query<SlipListQuery>,
) -> AppResult<Json<Vec<SlipResponse>>> {
    let status = match q.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            raw.parse::<SlipStatus>()
                .map_err(|_| AppError::bad_request("Invalid status"))?,
        ),
    };
    let rows = repo::list_by_status(&state.db, status).await?;
    Ok(Json(services::to_responses(&state, rows).await?))
}

#[instrument(skip(state))]
pub async fn approve_slip(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReviewResponse>> {
    Ok(Json(services::approve(&state.db, id, admin_id).await?))
}

#[instrument(skip(state, body))]
pub async fn reject_slip(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<ReviewResponse>> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    Ok(Json(services::reject(&state.db, id, admin_id, reason.as_deref()).await?))
}
