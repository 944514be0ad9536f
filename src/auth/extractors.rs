use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use tracing::warn;
use uuid::Uuid;

use super::{
    jwt::{JwtKeys, TokenKind},
    repo::User,
    session::{self, SESSION_COOKIE},
};
use crate::{error::AppError, state::AppState};

/// The authenticated caller, from a bearer access token or a live session cookie.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(auth_header) = parts.headers.get(axum::http::header::AUTHORIZATION) {
            let token = auth_header
                .to_str()
                .ok()
                .and_then(|h| h.strip_prefix("Bearer "))
                .ok_or_else(|| AppError::unauthorized("Invalid Authorization header"))?;

            let keys = JwtKeys::from_ref(state);
            let claims = keys.verify(token).map_err(|_| {
                warn!("invalid or expired token");
                AppError::unauthorized("Invalid or expired token")
            })?;

            if claims.kind != TokenKind::Access {
                return Err(AppError::unauthorized("Access token required"));
            }
            return Ok(AuthUser(claims.sub));
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let sid = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or_else(|| AppError::unauthorized("Not logged in"))?;

        let data = session::load_session(&state.db, &sid)
            .await?
            .ok_or_else(|| AppError::unauthorized("Session expired"))?;

        Ok(AuthUser(data.user_id))
    }
}

/// An authenticated caller whose account has `is_admin` set.
pub struct AdminUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        if !User::is_admin(&state.db, user_id).await? {
            warn!(%user_id, "non-admin hit admin route");
            return Err(AppError::forbidden("Admin only"));
        }
        Ok(AdminUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(req: Request<()>) -> Result<AuthUser, AppError> {
        let state = AppState::fake();
        let (mut parts, _) = req.into_parts();
        AuthUser::from_request_parts(&mut parts, &state).await
    }

    #[tokio::test]
    async fn accepts_valid_bearer_token() {
        let state = AppState::fake();
        let user_id = Uuid::new_v4();
        let token = JwtKeys::from_ref(&state).sign_access(user_id).unwrap();
        let req = Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let AuthUser(got) = extract(req).await.unwrap();
        assert_eq!(got, user_id);
    }

    #[tokio::test]
    async fn rejects_refresh_token_as_access() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state).sign_refresh(Uuid::new_v4()).unwrap();
        let req = Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let err = extract(req).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Access token required");
    }

    #[tokio::test]
    async fn rejects_non_bearer_scheme() {
        let req = Request::builder()
            .header("Authorization", "Basic Zm9vOmJhcg==")
            .body(())
            .unwrap();
        let err = extract(req).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_missing_credentials() {
        let req = Request::builder().body(()).unwrap();
        let err = extract(req).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Not logged in");
    }
}
