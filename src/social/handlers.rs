use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::extract::{Json, Query};

use super::repo::{self, CommentRow};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    photos,
    state::AppState,
};

const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct PhotoRef {
    pub photo_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub photo_id: Uuid,
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Serialize)]
pub struct LikesResponse {
    pub photo_id: Uuid,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct NewComment {
    pub photo_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRef {
    pub comment_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/likes", post(like_photo))
        .route("/unlikes", delete(unlike_photo))
        .route("/getlikes", get(get_likes))
        .route("/comments", post(add_comment))
        .route("/getcomments", get(get_comments))
        .route("/deletecomment", delete(delete_comment))
}

async fn ensure_photo(state: &AppState, photo_id: Uuid) -> AppResult<()> {
    match photos::repo::find_ref(&state.db, photo_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("Photo not found")),
    }
}

pub fn clean_comment(raw: &str) -> AppResult<&str> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("Comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::bad_request("Comment is too long"));
    }
    Ok(content)
}

/// Liking twice is a no-op.
#[instrument(skip(state))]
pub async fn like_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PhotoRef>,
) -> AppResult<Json<LikeResponse>> {
    ensure_photo(&state, body.photo_id).await?;
    if repo::like(&state.db, body.photo_id, user_id).await? {
        info!(photo_id = %body.photo_id, %user_id, "photo liked");
    }
    Ok(Json(LikeResponse {
        photo_id: body.photo_id,
        liked: true,
        likes: repo::like_count(&state.db, body.photo_id).await?,
    }))
}

#[instrument(skip(state))]
pub async fn unlike_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PhotoRef>,
) -> AppResult<Json<LikeResponse>> {
    if !repo::unlike(&state.db, body.photo_id, user_id).await? {
        return Err(AppError::not_found("Like not found"));
    }
    info!(photo_id = %body.photo_id, %user_id, "photo unliked");
    Ok(Json(LikeResponse {
        photo_id: body.photo_id,
        liked: false,
        likes: repo::like_count(&state.db, body.photo_id).await?,
    }))
}

#[instrument(skip(state))]
pub async fn get_likes(
    State(state): State<AppState>,
    Query(q): Query<PhotoRef>,
) -> AppResult<Json<LikesResponse>> {
    ensure_photo(&state, q.photo_id).await?;
    let user_ids = repo::likers(&state.db, q.photo_id).await?;
    Ok(Json(LikesResponse {
        photo_id: q.photo_id,
        count: user_ids.len(),
        user_ids,
    }))
}

#[instrument(skip(state, body))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NewComment>,
) -> AppResult<(StatusCode, Json<CommentRow>)> {
    let content = clean_comment(&body.content)?;
    ensure_photo(&state, body.photo_id).await?;
    let comment = repo::add_comment(&state.db, body.photo_id, user_id, content).await?;
    info!(comment_id = %comment.id, photo_id = %body.photo_id, "comment added");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state))]
pub async fn get_comments(
    State(state): State<AppState>,
    Query(q): Query<PhotoRef>,
) -> AppResult<Json<Vec<CommentRow>>> {
    ensure_photo(&state, q.photo_id).await?;
    Ok(Json(repo::comments_for(&state.db, q.photo_id).await?))
}

#[instrument(skip(state))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CommentRef>,
) -> AppResult<StatusCode> {
    let author = repo::comment_author(&state.db, body.comment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))?;
    if author != user_id {
        warn!(comment_id = %body.comment_id, %user_id, "delete of another user's comment refused");
        return Err(AppError::forbidden("Only the author can delete this comment"));
    }
    repo::delete_comment(&state.db, body.comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
