use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, put},
    Router,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::extract::{Json, Path, Query};

use super::{normalize_tag, repo};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    photos::{self, dto::{PageQuery, PhotoResponse}, repo::GalleryFilter},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetTagsRequest {
    pub names: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/:name/photos", get(photos_by_tag))
        .route("/photo/:id/tags", put(set_photo_tags))
        .route("/photo/:id/tags/:name", delete(remove_photo_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> AppResult<Json<Vec<repo::TagCount>>> {
    Ok(Json(repo::list_with_counts(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Json(body): Json<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<repo::Tag>)> {
    let name = normalize_tag(&body.name).ok_or_else(|| AppError::bad_request("Invalid tag name"))?;
    let tag = repo::upsert(&state.db, &name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(skip(state))]
pub async fn photos_by_tag(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(p): Query<PageQuery>,
) -> AppResult<Json<Vec<PhotoResponse>>> {
    let name = normalize_tag(&name).ok_or_else(|| AppError::bad_request("Invalid tag name"))?;
    let rows = photos::repo::list_gallery(
        &state.db,
        &GalleryFilter {
            tag: Some(&name),
            owner: None,
            limit: p.limit(),
            offset: p.offset(),
        },
    )
    .await?;
    Ok(Json(photos::services::to_responses(&state, rows).await?))
}

async fn ensure_uploader(state: &AppState, photo_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let photo = photos::repo::find_ref(&state.db, photo_id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    if photo.user_id != user_id {
        return Err(AppError::forbidden("Only the uploader can change tags"));
    }
    Ok(())
}

#[instrument(skip(state))]
pub async fn set_photo_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SetTagsRequest>,
) -> AppResult<Json<PhotoResponse>> {
    ensure_uploader(&state, id, user_id).await?;
    let names = super::normalize_tags(body.names.iter().map(String::as_str));

    let mut tx = state.db.begin().await?;
    repo::set_image_tags_tx(&mut tx, id, &names).await?;
    tx.commit().await?;

    info!(photo_id = %id, tags = ?names, "photo tags replaced");
    let row = photos::repo::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    Ok(Json(photos::services::to_response(&state, row).await?))
}

#[instrument(skip(state))]
pub async fn remove_photo_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((id, name)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    ensure_uploader(&state, id, user_id).await?;
    let name = normalize_tag(&name).ok_or_else(|| AppError::bad_request("Invalid tag name"))?;
    if !repo::remove_image_tag(&state.db, id, &name).await? {
        return Err(AppError::not_found("Tag not on photo"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_photo, insert_user};
    use sqlx::PgPool;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn uploader_replaces_and_removes_tags(db: PgPool) {
        let state = AppState::with_pool(db.clone());
        let owner = insert_user(&db, "owner", 0).await;
        let other = insert_user(&db, "other", 0).await;
        let photo = insert_photo(&db, owner, 10, None).await;

        let err = set_photo_tags(
            State(state.clone()),
            AuthUser(other),
            Path(photo),
            Json(SetTagsRequest { names: vec!["sea".into()] }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(res) = set_photo_tags(
            State(state.clone()),
            AuthUser(owner),
            Path(photo),
            Json(SetTagsRequest { names: vec!["#Sea".into(), "sky".into(), "sea".into()] }),
        )
        .await
        .unwrap();
        assert_eq!(res.tags, vec!["sea".to_string(), "sky".into()]);

        let Json(tagged) = photos_by_tag(State(state.clone()), Path("SKY".into()), Query(PageQuery::default()))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let status = remove_photo_tag(State(state.clone()), AuthUser(owner), Path((photo, "sky".into())))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = remove_photo_tag(State(state.clone()), AuthUser(owner), Path((photo, "sky".into())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let Json(counts) = list_tags(State(state)).await.unwrap();
        let sky = counts.iter().find(|t| t.name == "sky").unwrap();
        assert_eq!(sky.photos, 0);
    }
}
