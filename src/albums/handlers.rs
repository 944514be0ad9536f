use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::extract::{nullable, Json, Path};

use super::repo::{self, AlbumRow};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    photos::{self, dto::PhotoResponse},
    state::AppState,
};

const MAX_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct NewAlbum {
    pub name: String,
    pub description: Option<String>,
}

/// `"description": null` clears the description; an absent key keeps it.
#[derive(Debug, Deserialize)]
pub struct AlbumPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumPhotoRequest {
    pub photo_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AlbumDetail {
    #[serde(flatten)]
    pub album: AlbumRow,
    pub photos: Vec<PhotoResponse>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/albums", post(create_album).get(list_albums))
        .route(
            "/albums/:id",
            get(get_album).put(update_album).delete(delete_album),
        )
        .route("/albums/:id/photos", post(add_photo))
        .route("/albums/:id/photos/:photo_id", delete(remove_photo))
}

pub fn clean_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Album name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::bad_request("Album name is too long"));
    }
    Ok(name.to_string())
}

/// Blank descriptions are stored as none.
fn clean_description(raw: Option<String>) -> AppResult<Option<String>> {
    let description = raw.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    if matches!(&description, Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(AppError::bad_request("Album description is too long"));
    }
    Ok(description)
}

async fn owned_album(state: &AppState, id: Uuid, user_id: Uuid) -> AppResult<AlbumRow> {
    repo::get_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Album not found"))
}

#[instrument(skip(state, body))]
pub async fn create_album(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NewAlbum>,
) -> AppResult<(StatusCode, Json<AlbumRow>)> {
    let name = clean_name(&body.name)?;
    let description = clean_description(body.description)?;
    let id = repo::create(&state.db, user_id, &name, description.as_deref()).await?;
    info!(album_id = %id, %user_id, "album created");
    Ok((StatusCode::CREATED, Json(owned_album(&state, id, user_id).await?)))
}

#[instrument(skip(state))]
pub async fn list_albums(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Vec<AlbumRow>>> {
    Ok(Json(repo::list_for_user(&state.db, user_id).await?))
}

#[instrument(skip(state))]
pub async fn get_album(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AlbumDetail>> {
    let album = owned_album(&state, id, user_id).await?;
    let rows = photos::repo::list_in_album(&state.db, id).await?;
    let photos = photos::services::to_responses(&state, rows).await?;
    Ok(Json(AlbumDetail { album, photos }))
}

#[instrument(skip(state, body))]
pub async fn update_album(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AlbumPatch>,
) -> AppResult<Json<AlbumRow>> {
    let name = body.name.as_deref().map(clean_name).transpose()?;
    let description = body.description.map(clean_description).transpose()?;
    let description = description.as_ref().map(Option::as_deref);
    if !repo::update(&state.db, id, user_id, name.as_deref(), description).await? {
        return Err(AppError::not_found("Album not found"));
    }
    Ok(Json(owned_album(&state, id, user_id).await?))
}

#[instrument(skip(state))]
pub async fn delete_album(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !repo::delete(&state.db, id, user_id).await? {
        return Err(AppError::not_found("Album not found"));
    }
    info!(album_id = %id, "album deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Only photos the caller uploaded or bought can be filed.
#[instrument(skip(state))]
pub async fn add_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AlbumPhotoRequest>,
) -> AppResult<(StatusCode, Json<AlbumRow>)> {
    owned_album(&state, id, user_id).await?;
    if photos::repo::find_ref(&state.db, body.photo_id).await?.is_none() {
        return Err(AppError::not_found("Photo not found"));
    }
    let status = photos::repo::status_for(&state.db, body.photo_id, user_id).await?;
    if !status.owned && !status.is_uploader {
        return Err(AppError::forbidden("Only photos you uploaded or bought can be added"));
    }
    if !repo::add_photo(&state.db, id, body.photo_id).await? {
        return Err(AppError::bad_request("Photo is already in the album"));
    }
    Ok((StatusCode::CREATED, Json(owned_album(&state, id, user_id).await?)))
}

#[instrument(skip(state))]
pub async fn remove_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, photo_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    owned_album(&state, id, user_id).await?;
    if !repo::remove_photo(&state.db, id, photo_id).await? {
        return Err(AppError::not_found("Photo not in album"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{count, insert_photo, insert_user};
    use sqlx::PgPool;

    #[test]
    fn name_rules() {
        assert_eq!(clean_name("  Trips ").unwrap(), "Trips");
        assert!(clean_name("  ").is_err());
        assert!(clean_name(&"n".repeat(101)).is_err());
        assert!(clean_name(&"n".repeat(100)).is_ok());
    }

    #[test]
    fn blank_description_is_none() {
        assert_eq!(clean_description(Some("  ".into())).unwrap(), None);
        assert_eq!(clean_description(Some(" trip ".into())).unwrap().as_deref(), Some("trip"));
        assert!(clean_description(Some("d".repeat(2001))).is_err());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn description_can_be_cleared(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let owner = insert_user(&db, "owner", 0).await;
        let (_, Json(album)) = create_album(
            State(state.clone()),
            AuthUser(owner),
            Json(NewAlbum { name: "Best".into(), description: Some("summer".into()) }),
        )
        .await
        .unwrap();

        let rename: AlbumPatch = serde_json::from_str(r#"{"name":"Better"}"#).unwrap();
        let Json(renamed) = update_album(State(state.clone()), AuthUser(owner), Path(album.id), Json(rename))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Better");
        assert_eq!(renamed.description.as_deref(), Some("summer"));

        let clear: AlbumPatch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        let Json(cleared) = update_album(State(state), AuthUser(owner), Path(album.id), Json(clear))
            .await
            .unwrap();
        assert_eq!(cleared.name, "Better");
        assert_eq!(cleared.description, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn albums_are_private_and_cascade(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let owner = insert_user(&db, "owner", 0).await;
        let stranger = insert_user(&db, "stranger", 0).await;
        let mine = insert_photo(&db, owner, 10, None).await;
        let theirs = insert_photo(&db, stranger, 10, None).await;

        let (_, Json(album)) = create_album(
            State(state.clone()),
            AuthUser(owner),
            Json(NewAlbum { name: "Best".into(), description: None }),
        )
        .await
        .unwrap();

        let err = get_album(State(state.clone()), AuthUser(stranger), Path(album.id))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let (_, Json(updated)) = add_photo(
            State(state.clone()),
            AuthUser(owner),
            Path(album.id),
            Json(AlbumPhotoRequest { photo_id: mine }),
        )
        .await
        .unwrap();
        assert_eq!(updated.photo_count, 1);

        let err = add_photo(
            State(state.clone()),
            AuthUser(owner),
            Path(album.id),
            Json(AlbumPhotoRequest { photo_id: theirs }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(detail) = get_album(State(state.clone()), AuthUser(owner), Path(album.id))
            .await
            .unwrap();
        assert_eq!(detail.photos.len(), 1);

        delete_album(State(state), AuthUser(owner), Path(album.id)).await.unwrap();
        let links = count(&db, "SELECT COUNT(*) FROM album_photos WHERE album_id = $1", album.id).await;
        assert_eq!(links, 0);
        let photos = count(&db, "SELECT COUNT(*) FROM images WHERE id = $1", mine).await;
        assert_eq!(photos, 1);
    }
}
