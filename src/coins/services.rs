use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{CheckoutResponse, Receipt},
    repo::{self, TxKind},
};
use crate::{
    cart,
    error::{AppError, AppResult},
    photos::repo::{lock_for_sale, SaleImage},
};

fn label(image: &SaleImage) -> &str {
    image.title.as_deref().unwrap_or("untitled")
}

/// Moves `image.price` coins from buyer to seller and records the ownership
/// plus one ledger row per side. The caller must hold the image row lock and
/// the buyer and seller locks from [`repo::lock_users_tx`].
pub async fn purchase_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    buyer: Uuid,
    image: &SaleImage,
) -> AppResult<Receipt> {
    if image.user_id == buyer {
        return Err(AppError::bad_request("You cannot buy your own photo"));
    }
    if repo::owns_tx(tx, buyer, image.id).await? {
        return Err(AppError::bad_request("You already own this photo"));
    }
    if let Some(max) = image.max_sales {
        if repo::sales_count_tx(tx, image.id).await? >= i64::from(max) {
            return Err(AppError::bad_request("This photo is sold out"));
        }
    }

    let balance = repo::debit_tx(tx, buyer, image.price)
        .await?
        .ok_or_else(|| AppError::bad_request("Insufficient coins"))?;
    repo::credit_tx(tx, image.user_id, image.price).await?;

    repo::insert_ownership_tx(tx, buyer, image.id, image.price).await?;
    repo::insert_ledger_tx(
        tx,
        buyer,
        -image.price,
        TxKind::Purchase,
        &format!("Purchased \"{}\"", label(image)),
        Some(image.id),
    )
    .await?;
    repo::insert_ledger_tx(
        tx,
        image.user_id,
        image.price,
        TxKind::Sale,
        &format!("Sold \"{}\"", label(image)),
        Some(image.id),
    )
    .await?;

    Ok(Receipt {
        photo_id: image.id,
        price: image.price,
        balance,
    })
}

pub async fn buy_photo(db: &PgPool, buyer: Uuid, photo_id: Uuid) -> AppResult<Receipt> {
    let mut tx = db.begin().await.context("begin tx")?;
    let image = lock_for_sale(&mut tx, photo_id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    repo::lock_users_tx(&mut tx, &[buyer, image.user_id]).await?;

    let receipt = purchase_in_tx(&mut tx, buyer, &image).await?;
    cart::repo::remove_item_tx(&mut tx, buyer, photo_id).await?;
    tx.commit().await.context("commit purchase")?;

    info!(%buyer, seller = %image.user_id, %photo_id, price = image.price, "photo purchased");
    Ok(receipt)
}

/// Buys every item in the caller's cart in one transaction and empties the
/// cart. Items already owned are dropped without charge. Any failure rolls
/// the whole checkout back.
///
/// All image rows are locked first, in id order, then the buyer and every
/// seller in one statement. Only then do balances move.
pub async fn checkout(db: &PgPool, buyer: Uuid) -> AppResult<CheckoutResponse> {
    let mut tx = db.begin().await.context("begin tx")?;
    let cart_id = cart::repo::find_cart_tx(&mut tx, buyer)
        .await?
        .ok_or_else(|| AppError::bad_request("Cart is empty"))?;
    let image_ids = cart::repo::item_ids_tx(&mut tx, cart_id).await?;
    if image_ids.is_empty() {
        return Err(AppError::bad_request("Cart is empty"));
    }

    let mut out = CheckoutResponse::default();
    let mut to_buy = Vec::with_capacity(image_ids.len());
    for id in image_ids {
        let Some(image) = lock_for_sale(&mut tx, id).await? else {
            continue;
        };
        if repo::owns_tx(&mut tx, buyer, id).await? {
            out.skipped.push(id);
        } else {
            to_buy.push(image);
        }
    }

    let mut users: Vec<Uuid> = to_buy.iter().map(|i| i.user_id).collect();
    users.push(buyer);
    repo::lock_users_tx(&mut tx, &users).await?;

    for image in &to_buy {
        let receipt = purchase_in_tx(&mut tx, buyer, image).await.map_err(|e| {
            warn!(%buyer, photo_id = %image.id, error = %e, "checkout aborted");
            e
        })?;
        out.total += receipt.price;
        out.balance = Some(receipt.balance);
        out.purchased.push(receipt);
    }

    cart::repo::clear_tx(&mut tx, cart_id).await?;
    tx.commit().await.context("commit checkout")?;

    info!(%buyer, items = out.purchased.len(), total = out.total, "checkout complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{coins_of, count, insert_photo, insert_user};

    async fn add_to_cart(db: &PgPool, user: Uuid, photo: Uuid) {
        let mut tx = db.begin().await.unwrap();
        let cart_id = cart::repo::get_or_create_tx(&mut tx, user).await.unwrap();
        cart::repo::add_item_tx(&mut tx, cart_id, photo).await.unwrap();
        tx.commit().await.unwrap();
    }

    const LEDGER_FOR_PHOTO: &str = "SELECT COUNT(*) FROM coin_transactions WHERE image_id = $1";

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn purchase_moves_price_and_writes_two_ledger_rows(db: PgPool) {
        let seller = insert_user(&db, "seller", 0).await;
        let buyer = insert_user(&db, "buyer", 100).await;
        let photo = insert_photo(&db, seller, 30, None).await;

        let receipt = buy_photo(&db, buyer, photo).await.unwrap();
        assert_eq!(receipt.price, 30);
        assert_eq!(receipt.balance, 70);
        assert_eq!(coins_of(&db, buyer).await, 70);
        assert_eq!(coins_of(&db, seller).await, 30);
        assert_eq!(count(&db, LEDGER_FOR_PHOTO, photo).await, 2);

        let (sum,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM coin_transactions WHERE image_id = $1",
        )
        .bind(photo)
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(sum, 0);

        let err = buy_photo(&db, buyer, photo).await.unwrap_err();
        assert_eq!(err.to_string(), "You already own this photo");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn insufficient_coins_leaves_balances_unchanged(db: PgPool) {
        let seller = insert_user(&db, "seller", 5).await;
        let buyer = insert_user(&db, "buyer", 10).await;
        let photo = insert_photo(&db, seller, 11, None).await;

        let err = buy_photo(&db, buyer, photo).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient coins");
        assert_eq!(coins_of(&db, buyer).await, 10);
        assert_eq!(coins_of(&db, seller).await, 5);
        assert_eq!(count(&db, LEDGER_FOR_PHOTO, photo).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn cannot_buy_own_or_sold_out_photo(db: PgPool) {
        let seller = insert_user(&db, "seller", 100).await;
        let a = insert_user(&db, "a", 100).await;
        let b = insert_user(&db, "b", 100).await;
        let photo = insert_photo(&db, seller, 10, Some(1)).await;

        let err = buy_photo(&db, seller, photo).await.unwrap_err();
        assert_eq!(err.to_string(), "You cannot buy your own photo");

        buy_photo(&db, a, photo).await.unwrap();
        let err = buy_photo(&db, b, photo).await.unwrap_err();
        assert_eq!(err.to_string(), "This photo is sold out");
        assert_eq!(coins_of(&db, b).await, 100);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_buyers_cannot_oversell(db: PgPool) {
        let seller = insert_user(&db, "seller", 0).await;
        let photo = insert_photo(&db, seller, 10, Some(1)).await;
        let mut buyers = Vec::new();
        for i in 0..4 {
            buyers.push(insert_user(&db, &format!("buyer{i}"), 50).await);
        }

        let handles: Vec<_> = buyers
            .into_iter()
            .map(|b| {
                let db = db.clone();
                tokio::spawn(async move { buy_photo(&db, b, photo).await.is_ok() })
            })
            .collect();
        let mut sold = 0;
        for h in handles {
            if h.await.unwrap() {
                sold += 1;
            }
        }
        assert_eq!(sold, 1);
        assert_eq!(coins_of(&db, seller).await, 10);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn checkout_and_crossing_purchase_do_not_deadlock(db: PgPool) {
        // X checks out photos from S and Y while Y buys X's photo.
        for round in 0..20 {
            let x = insert_user(&db, &format!("x{round}"), 100).await;
            let y = insert_user(&db, &format!("y{round}"), 100).await;
            let s = insert_user(&db, &format!("s{round}"), 0).await;
            let px = insert_photo(&db, x, 5, None).await;
            let py = insert_photo(&db, y, 7, None).await;
            let ps = insert_photo(&db, s, 11, None).await;
            add_to_cart(&db, x, ps).await;
            add_to_cart(&db, x, py).await;

            let checkout_db = db.clone();
            let buy_db = db.clone();
            let (checked_out, bought) = tokio::join!(
                tokio::spawn(async move { checkout(&checkout_db, x).await }),
                tokio::spawn(async move { buy_photo(&buy_db, y, px).await }),
            );
            let checked_out = checked_out.unwrap().unwrap();
            bought.unwrap().unwrap();

            assert_eq!(checked_out.total, 18);
            assert_eq!(coins_of(&db, x).await, 100 - 18 + 5);
            assert_eq!(coins_of(&db, y).await, 100 - 5 + 7);
            assert_eq!(coins_of(&db, s).await, 11);
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn checkout_empties_cart_and_skips_owned(db: PgPool) {
        let seller = insert_user(&db, "seller", 0).await;
        let buyer = insert_user(&db, "buyer", 100).await;
        let p1 = insert_photo(&db, seller, 10, None).await;
        let p2 = insert_photo(&db, seller, 20, None).await;
        let p3 = insert_photo(&db, seller, 30, None).await;

        add_to_cart(&db, buyer, p1).await;
        add_to_cart(&db, buyer, p2).await;
        add_to_cart(&db, buyer, p3).await;
        buy_photo(&db, buyer, p3).await.unwrap();
        // buying directly takes the photo out of the cart
        add_to_cart(&db, buyer, p3).await;

        let out = checkout(&db, buyer).await.unwrap();
        assert_eq!(out.purchased.len(), 2);
        assert_eq!(out.skipped, vec![p3]);
        assert_eq!(out.total, 30);
        assert_eq!(out.balance, Some(40));
        assert_eq!(coins_of(&db, buyer).await, 40);

        let carts = count(&db, "SELECT COUNT(*) FROM carts WHERE user_id = $1", buyer).await;
        assert_eq!(carts, 1);
        let items = count(
            &db,
            "SELECT COUNT(*) FROM cart_items ci JOIN carts c ON c.id = ci.cart_id WHERE c.user_id = $1",
            buyer,
        )
        .await;
        assert_eq!(items, 0);

        let err = checkout(&db, buyer).await.unwrap_err();
        assert_eq!(err.to_string(), "Cart is empty");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn failed_checkout_rolls_back_everything(db: PgPool) {
        let seller = insert_user(&db, "seller", 0).await;
        let buyer = insert_user(&db, "buyer", 25).await;
        let p1 = insert_photo(&db, seller, 10, None).await;
        let p2 = insert_photo(&db, seller, 20, None).await;
        add_to_cart(&db, buyer, p1).await;
        add_to_cart(&db, buyer, p2).await;

        let err = checkout(&db, buyer).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient coins");
        assert_eq!(coins_of(&db, buyer).await, 25);
        assert_eq!(coins_of(&db, seller).await, 0);
        let owned = count(&db, "SELECT COUNT(*) FROM image_ownerships WHERE user_id = $1", buyer).await;
        assert_eq!(owned, 0);
        let items = count(
            &db,
            "SELECT COUNT(*) FROM cart_items ci JOIN carts c ON c.id = ci.cart_id WHERE c.user_id = $1",
            buyer,
        )
        .await;
        assert_eq!(items, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn deleting_photo_cascades_but_keeps_ledger(db: PgPool) {
        let seller = insert_user(&db, "seller", 0).await;
        let buyer = insert_user(&db, "buyer", 50).await;
        let other = insert_user(&db, "other", 50).await;
        let photo = insert_photo(&db, seller, 10, None).await;
        buy_photo(&db, buyer, photo).await.unwrap();
        crate::social::repo::like(&db, photo, buyer).await.unwrap();
        crate::social::repo::add_comment(&db, photo, buyer, "lovely").await.unwrap();
        add_to_cart(&db, other, photo).await;
        let album = crate::albums::repo::create(&db, buyer, "keep", None).await.unwrap();
        crate::albums::repo::add_photo(&db, album, photo).await.unwrap();
        let mut tx = db.begin().await.unwrap();
        crate::tags::repo::set_image_tags_tx(&mut tx, photo, &["beach".to_string()])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        crate::photos::repo::delete(&db, photo).await.unwrap();

        for table in ["image_ownerships", "likes", "comments", "cart_items", "album_photos", "image_tags"] {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE image_id = $1");
            assert_eq!(count(&db, &sql, photo).await, 0, "{table} still references the photo");
        }
        let ledger = count(&db, "SELECT COUNT(*) FROM coin_transactions WHERE user_id = $1", buyer).await;
        assert_eq!(ledger, 1);
        let orphaned = count(
            &db,
            "SELECT COUNT(*) FROM coin_transactions WHERE user_id = $1 AND image_id IS NULL",
            seller,
        )
        .await;
        assert_eq!(orphaned, 1);
        let albums = count(&db, "SELECT COUNT(*) FROM albums WHERE id = $1", album).await;
        assert_eq!(albums, 1);
    }
}
