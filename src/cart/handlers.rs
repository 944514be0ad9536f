use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::extract::{Json, Path};

use super::repo;
use crate::{
    auth::AuthUser,
    coins::{self, dto::CheckoutResponse},
    error::{AppError, AppResult},
    photos::{self, dto::PhotoResponse},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub photo_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart_id: Option<Uuid>,
    pub items: Vec<PhotoResponse>,
    pub total: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart/add", post(add_to_cart))
        .route("/cart/remove", delete(remove_from_cart))
        .route("/cart/checkout", post(checkout))
        .route("/cart/:id", get(get_cart))
}

async fn load_cart(state: &AppState, user_id: Uuid) -> AppResult<CartResponse> {
    let Some(cart_id) = repo::find_cart(&state.db, user_id).await? else {
        return Ok(CartResponse {
            cart_id: None,
            items: Vec::new(),
            total: 0,
        });
    };
    let rows = photos::repo::list_in_cart(&state.db, cart_id).await?;
    let items = photos::services::to_responses(state, rows).await?;
    Ok(CartResponse {
        cart_id: Some(cart_id),
        total: items.iter().map(|p| p.price).sum(),
        items,
    })
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CartItemRequest>,
) -> AppResult<(StatusCode, Json<CartResponse>)> {
    let photo = photos::repo::find_ref(&state.db, body.photo_id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    if photo.user_id == user_id {
        return Err(AppError::bad_request("You cannot add your own photo to the cart"));
    }
    if coins::repo::owns(&state.db, user_id, photo.id).await? {
        return Err(AppError::bad_request("You already own this photo"));
    }

    let mut tx = state.db.begin().await.context("begin tx")?;
    let cart_id = repo::get_or_create_tx(&mut tx, user_id).await?;
    if !repo::add_item_tx(&mut tx, cart_id, photo.id).await? {
        return Err(AppError::bad_request("Photo is already in the cart"));
    }
    tx.commit().await.context("commit tx")?;

    info!(%user_id, photo_id = %photo.id, "added to cart");
    Ok((StatusCode::CREATED, Json(load_cart(&state, user_id).await?)))
}

/// GET /cart/:id where `:id` is the owning user's id
#[instrument(skip(state))]
pub async fn get_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CartResponse>> {
    if id != user_id {
        return Err(AppError::forbidden("You can only view your own cart"));
    }
    Ok(Json(load_cart(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CartItemRequest>,
) -> AppResult<Json<CartResponse>> {
    if !repo::remove_item(&state.db, user_id, body.photo_id).await? {
        return Err(AppError::not_found("Photo not in cart"));
    }
    Ok(Json(load_cart(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<CheckoutResponse>> {
    Ok(Json(coins::services::checkout(&state.db, user_id).await?))
}
