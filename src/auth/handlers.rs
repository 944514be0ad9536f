use axum::{
    extract::{FromRef, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_extra::extract::CookieJar;
use tracing::{error, info, instrument, warn};

use crate::extract::Json;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, ProfilePicResponse, ProfileResponse, PublicUser,
            RefreshRequest, RegisterRequest,
        },
        extractors::{AdminUser, AuthUser},
        jwt::JwtKeys,
        password::{hash_password, is_valid_email, verify_password},
        repo::User,
        session::{self, SESSION_COOKIE},
    },
    error::{is_unique_violation, AppError, AppResult},
    state::AppState,
    storage::Bucket,
    uploads::{store_image, UploadForm},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/profile/picture", post(upload_profile_pic))
        .route("/allusers", get(all_users))
}

fn issue_tokens(state: &AppState, user: User) -> AppResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        AppError::Internal(e)
    })?;
    let refresh_token = keys.sign_refresh(user.id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        AppError::Internal(e)
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    payload.email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    if !(3..=32).contains(&username.chars().count()) {
        return Err(AppError::bad_request("Username must be 3-32 characters"));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::bad_request("Password too short"));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::bad_request("Email already registered"));
    }

    let hash = hash_password(&payload.password)?;
    let is_admin = state.config.is_admin_email(&payload.email);

    let user = match User::create(&state.db, &username, &payload.email, &hash, is_admin).await {
        Ok(u) => u,
        // lost a race with a concurrent registration
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::bad_request("Email already registered"));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    info!(user_id = %user.id, email = %user.email, is_admin, "user registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::unauthorized("Invalid credentials"));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let sid = session::create_session(&state.db, user.id, state.config.session.ttl_hours).await?;
    let jar = jar.add(session::session_cookie(sid, &state.config.session));

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((jar, Json(issue_tokens(&state, user)?)))
}

#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> AppResult<(CookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        session::destroy_session(&state.db, cookie.value()).await?;
        info!("session destroyed");
    }
    Ok((jar.remove(session::removal_cookie()), StatusCode::NO_CONTENT))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::unauthorized(e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let user = User::find_by_id(&state.db, user_id).await?.ok_or_else(|| {
        error!(%user_id, "user not found");
        AppError::not_found("User not found")
    })?;
    let (photos_uploaded, photos_owned) = User::activity_counts(&state.db, user_id).await?;

    let profile_pic_url = match &user.profile_pic_key {
        Some(key) => Some(state.storage.url_for(key).await?),
        None => None,
    };
    let created_at = user.created_at;

    Ok(Json(ProfileResponse {
        user: user.into(),
        profile_pic_url,
        photos_uploaded,
        photos_owned,
        created_at,
    }))
}

#[instrument(skip(state, mp))]
pub async fn upload_profile_pic(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> AppResult<Json<ProfilePicResponse>> {
    let form = UploadForm::read(mp, &["image", "file"]).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::bad_request("image is required"))?;

    let key = store_image(&state, Bucket::ProfilePic, file).await?;
    if let Some(old) = User::set_profile_pic(&state.db, user_id, &key).await? {
        if let Err(e) = state.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "failed to delete old profile picture");
        }
    }

    info!(%user_id, %key, "profile picture updated");
    Ok(Json(ProfilePicResponse {
        profile_pic_url: state.storage.url_for(&key).await?,
    }))
}

#[instrument(skip(state))]
pub async fn all_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<PublicUser>>> {
    let users = User::list_all(&state.db).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}
