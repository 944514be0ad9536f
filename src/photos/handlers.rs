use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::extract::{Json, Path, Query};

use super::{
    dto::{GalleryQuery, PhotoResponse, PhotoStatusResponse, UpdatePhotoRequest, UploadResponse},
    repo::{self, GalleryFilter, PhotoPatch},
    services::{self, PhotoDraft},
};
use crate::{
    auth::{repo::User, AuthUser},
    error::{AppError, AppResult},
    state::AppState,
    tags::parse_tag_list,
    uploads::UploadForm,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/photo", get(list_photos))
        .route("/photo/:id/user/:uid/status", get(photo_status))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_photo))
        // `:id` is the image uuid for GET/PUT and the stored filename for DELETE
        .route("/photo/:id", get(get_photo).put(update_photo).delete(delete_photo))
}

#[instrument(skip(state))]
pub async fn list_photos(
    State(state): State<AppState>,
    Query(q): Query<GalleryQuery>,
) -> AppResult<Json<Vec<PhotoResponse>>> {
    let tag = q.tag.as_deref().and_then(crate::tags::normalize_tag);
    let page = q.page();
    let rows = repo::list_gallery(
        &state.db,
        &GalleryFilter {
            tag: tag.as_deref(),
            owner: q.owner,
            limit: page.limit(),
            offset: page.offset(),
        },
    )
    .await?;
    Ok(Json(services::to_responses(&state, rows).await?))
}

#[instrument(skip(state))]
pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PhotoResponse>> {
    let row = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    Ok(Json(services::to_response(&state, row).await?))
}

/// POST /upload (multipart)
/// Fields: image (file), price, title?, description?, max_sales?, tags? (comma separated)
#[instrument(skip(state, mp))]
pub async fn upload_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, HeaderMap, Json<UploadResponse>)> {
    let form = UploadForm::read(mp, &["image", "file"]).await?;
    let price = form
        .parse::<i64>("price")?
        .ok_or_else(|| AppError::bad_request("price is required"))?;

    let draft = PhotoDraft {
        title: form.text("title").map(str::to_string),
        description: form.text("description").map(str::to_string),
        price,
        max_sales: form.parse::<i32>("max_sales")?,
        tags: form.text("tags").map(parse_tag_list).unwrap_or_default(),
    };
    let file = form
        .file
        .ok_or_else(|| AppError::bad_request("image is required"))?;

    let (id, key) = services::create_photo(&state, user_id, draft, file).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/photo/{}", id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(UploadResponse {
            id,
            url: state.storage.url_for(&key).await?,
            filename: services::filename_of(&key).to_string(),
        }),
    ))
}

#[instrument(skip(state, body))]
pub async fn update_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePhotoRequest>,
) -> AppResult<Json<PhotoResponse>> {
    // blank text clears the field like null does
    let cleaned = |field: Option<Option<String>>| {
        field.map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    };
    let patch = PhotoPatch {
        title: cleaned(body.title),
        description: cleaned(body.description),
        price: body.price,
        max_sales: body.max_sales,
    };
    services::validate_patch(&patch)?;
    services::update_photo(&state.db, id, user_id, &patch).await?;
    info!(photo_id = %id, "photo updated");

    let row = repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    Ok(Json(services::to_response(&state, row).await?))
}

#[instrument(skip(state))]
pub async fn delete_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(filename): Path<String>,
) -> AppResult<StatusCode> {
    if filename.is_empty() || filename.contains('/') || filename.contains("..") {
        return Err(AppError::bad_request("Invalid filename"));
    }
    let key = format!("images/{}", filename);

    let photo = repo::find_by_key(&state.db, &key)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;

    if photo.user_id != user_id && !User::is_admin(&state.db, user_id).await? {
        warn!(%user_id, photo_id = %photo.id, "delete of someone else's photo refused");
        return Err(AppError::forbidden("Only the uploader can delete this photo"));
    }

    repo::delete(&state.db, photo.id).await?;
    if let Err(e) = state.storage.delete_object(&photo.storage_key).await {
        warn!(error = %e, key = %photo.storage_key, "stored file not removed");
    }

    info!(photo_id = %photo.id, %user_id, "photo deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn photo_status(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path((photo_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<PhotoStatusResponse>> {
    if caller != user_id && !User::is_admin(&state.db, caller).await? {
        return Err(AppError::forbidden("Cannot inspect another user's purchases"));
    }
    if repo::find_ref(&state.db, photo_id).await?.is_none() {
        return Err(AppError::not_found("Photo not found"));
    }

    let status = repo::status_for(&state.db, photo_id, user_id).await?;
    Ok(Json(PhotoStatusResponse {
        photo_id,
        user_id,
        owned: status.owned,
        is_uploader: status.is_uploader,
        in_cart: status.in_cart,
    }))
}
