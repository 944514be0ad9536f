use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::extract::{Json, Path, Query};

use super::{
    dto::{OrderResponse, Receipt},
    repo::{self, LedgerRow},
    services,
};
use crate::{
    auth::AuthUser,
    error::AppResult,
    photos::{dto::PageQuery, services::filename_of},
    state::AppState,
    storage,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/photo/:id/buy", post(buy_photo))
        .route("/orders/history", get(order_history))
        .route("/transactions", get(transactions))
}

#[instrument(skip(state))]
pub async fn buy_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Receipt>> {
    Ok(Json(services::buy_photo(&state.db, user_id, id).await?))
}

#[instrument(skip(state))]
pub async fn order_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<OrderResponse>>> {
    let rows = repo::order_history(&state.db, user_id).await?;
    let keys: Vec<String> = rows.iter().map(|r| r.storage_key.clone()).collect();
    let urls = storage::urls_for(state.storage.as_ref(), &keys).await?;

    let orders = rows
        .into_iter()
        .zip(urls)
        .map(|(r, url)| OrderResponse {
            photo_id: r.photo_id,
            url,
            filename: filename_of(&r.storage_key).to_string(),
            title: r.title,
            price_paid: r.price_paid,
            seller_id: r.seller_id,
            seller_username: r.seller_username,
            purchased_at: r.purchased_at,
        })
        .collect();
    Ok(Json(orders))
}

#[instrument(skip(state))]
pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Vec<LedgerRow>>> {
    let rows = repo::ledger(&state.db, user_id, page.limit(), page.offset()).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{app::build_app, test_support::{insert_photo, insert_user}};
    use axum::{body::Body, http::{Request, StatusCode}};
    use sqlx::PgPool;
    use tower::ServiceExt;

    #[tokio::test]
    async fn buying_requires_login() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::post(format!("/api/photo/{}/buy", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn history_and_ledger_after_purchase(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let seller = insert_user(&db, "seller", 0).await;
        let buyer = insert_user(&db, "buyer", 40).await;
        let photo = insert_photo(&db, seller, 15, None).await;

        let Json(receipt) = buy_photo(State(state.clone()), AuthUser(buyer), Path(photo))
            .await
            .unwrap();
        assert_eq!(receipt.photo_id, photo);
        assert_eq!(receipt.balance, 25);

        let Json(orders) = order_history(State(state.clone()), AuthUser(buyer)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].price_paid, 15);
        assert_eq!(orders[0].seller_username, "seller");
        assert!(orders[0].url.starts_with("https://fake.local/images/"));

        let Json(ledger) = transactions(State(state.clone()), AuthUser(buyer), Query(PageQuery::default()))
            .await
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!((ledger[0].amount, ledger[0].kind.as_str()), (-15, "purchase"));

        let Json(ledger) = transactions(State(state), AuthUser(seller), Query(PageQuery::default()))
            .await
            .unwrap();
        assert_eq!((ledger[0].amount, ledger[0].kind.as_str()), (15, "sale"));
    }
}
