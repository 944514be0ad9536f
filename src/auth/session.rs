//! Server-side sessions kept in the `sessions` table.
//!
//! The browser only holds the opaque `sid` cookie; the row's `sess` column holds
//! the serialized [`SessionData`].

use std::time::Duration;

use anyhow::Context;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;

pub const SESSION_COOKIE: &str = "sid";

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: Uuid,
}

pub async fn create_session(db: &PgPool, user_id: Uuid, ttl_hours: i64) -> anyhow::Result<String> {
    let sid = generate_sid();
    let sess = serde_json::to_value(SessionData { user_id })?;

    sqlx::query(
        r#"
        INSERT INTO sessions (sid, sess, expire)
        VALUES ($1, $2, now() + make_interval(hours => $3))
        "#,
    )
    .bind(&sid)
    .bind(sess)
    .bind(ttl_hours as i32)
    .execute(db)
    .await
    .context("insert session")?;

    Ok(sid)
}

/// Returns the session if it exists and has not expired.
pub async fn load_session(db: &PgPool, sid: &str) -> anyhow::Result<Option<SessionData>> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as(r#"SELECT sess FROM sessions WHERE sid = $1 AND expire > now()"#)
            .bind(sid)
            .fetch_optional(db)
            .await
            .context("load session")?;

    match row {
        Some((sess,)) => Ok(Some(serde_json::from_value(sess).context("decode session")?)),
        None => Ok(None),
    }
}

pub async fn destroy_session(db: &PgPool, sid: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE sid = $1")
        .bind(sid)
        .execute(db)
        .await
        .context("delete session")?;
    Ok(())
}

pub async fn purge_expired(db: &PgPool) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE expire <= now()")
        .execute(db)
        .await
        .context("purge expired sessions")?;
    Ok(res.rows_affected())
}

pub fn spawn_expiry_sweeper(db: PgPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            match purge_expired(&db).await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "expired sessions purged"),
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    })
}

pub fn session_cookie(sid: String, cfg: &SessionConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, sid))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cfg.cookie_secure)
        .max_age(time::Duration::hours(cfg.ttl_hours))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// 32 random bytes as lowercase hex.
fn generate_sid() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_is_64_hex_chars() {
        let sid = generate_sid();
        assert_eq!(sid.len(), 64);
        assert!(sid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sids_are_unique() {
        assert_ne!(generate_sid(), generate_sid());
    }

    #[test]
    fn cookie_attributes() {
        let cfg = SessionConfig {
            ttl_hours: 2,
            cookie_secure: true,
        };
        let cookie = session_cookie("abc".into(), &cfg);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(2)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn session_lifecycle(db: PgPool) {
        let user_id: (Uuid,) = sqlx::query_as(
            "INSERT INTO users (username, email, password_hash) VALUES ('s', 's@example.com', 'x') RETURNING id",
        )
        .fetch_one(&db)
        .await
        .unwrap();

        let sid = create_session(&db, user_id.0, 1).await.unwrap();
        let data = load_session(&db, &sid).await.unwrap().expect("live session");
        assert_eq!(data.user_id, user_id.0);

        destroy_session(&db, &sid).await.unwrap();
        assert!(load_session(&db, &sid).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn expired_sessions_are_invisible_and_purged(db: PgPool) {
        sqlx::query(
            "INSERT INTO sessions (sid, sess, expire) VALUES ('old', '{\"user_id\":\"00000000-0000-0000-0000-000000000000\"}', now() - interval '1 hour')",
        )
        .execute(&db)
        .await
        .unwrap();

        assert!(load_session(&db, "old").await.unwrap().is_none());
        assert_eq!(purge_expired(&db).await.unwrap(), 1);
    }
}
