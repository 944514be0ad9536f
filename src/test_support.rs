//! Fixtures for `#[sqlx::test]` database tests.

use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert_user(db: &PgPool, username: &str, coins: i64) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (username, email, password_hash, coins)
        VALUES ($1, $1 || '@example.com', 'not-a-hash', $2)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(coins)
    .fetch_one(db)
    .await
    .expect("insert user");
    id
}

pub async fn make_admin(db: &PgPool, user_id: Uuid) {
    sqlx::query("UPDATE users SET is_admin = TRUE WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await
        .expect("make admin");
}

pub async fn insert_photo(db: &PgPool, owner: Uuid, price: i64, max_sales: Option<i32>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO images (user_id, storage_key, title, price, max_sales)
        VALUES ($1, 'images/' || gen_random_uuid() || '.jpg', 'fixture', $2, $3)
        RETURNING id
        "#,
    )
    .bind(owner)
    .bind(price)
    .bind(max_sales)
    .fetch_one(db)
    .await
    .expect("insert photo");
    id
}

pub async fn coins_of(db: &PgPool, user_id: Uuid) -> i64 {
    let (coins,): (i64,) = sqlx::query_as("SELECT coins FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
        .expect("read coins");
    coins
}

pub async fn count(db: &PgPool, sql: &str, id: Uuid) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql)
        .bind(id)
        .fetch_one(db)
        .await
        .expect("count");
    n
}
