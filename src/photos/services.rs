use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::PhotoResponse,
    repo::{self, NewPhoto, PhotoPatch, PhotoRow},
};
use crate::{
    coins,
    error::{AppError, AppResult},
    state::AppState,
    storage::{self, Bucket},
    tags,
    uploads::{store_image, UploadItem},
};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;

pub struct PhotoDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub max_sales: Option<i32>,
    pub tags: Vec<String>,
}

fn check_text(field: &str, value: Option<&str>, max: usize) -> AppResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn check_price(price: i64) -> AppResult<()> {
    if price < 1 {
        return Err(AppError::bad_request("price must be a positive number of coins"));
    }
    Ok(())
}

fn check_max_sales(max_sales: Option<i32>) -> AppResult<()> {
    if matches!(max_sales, Some(n) if n < 1) {
        return Err(AppError::bad_request("max_sales must be at least 1"));
    }
    Ok(())
}

pub fn validate_draft(d: &PhotoDraft) -> AppResult<()> {
    check_price(d.price)?;
    check_max_sales(d.max_sales)?;
    check_text("title", d.title.as_deref(), MAX_TITLE_LEN)?;
    check_text("description", d.description.as_deref(), MAX_DESCRIPTION_LEN)
}

pub fn validate_patch(p: &PhotoPatch) -> AppResult<()> {
    if let Some(price) = p.price {
        check_price(price)?;
    }
    check_max_sales(p.max_sales.flatten())?;
    check_text("title", p.title.as_ref().and_then(|t| t.as_deref()), MAX_TITLE_LEN)?;
    check_text(
        "description",
        p.description.as_ref().and_then(|d| d.as_deref()),
        MAX_DESCRIPTION_LEN,
    )
}

/// Applies `patch` under the image row lock, so a new `max_sales` is checked
/// against a sales count no purchase can change underneath it.
pub async fn update_photo(db: &PgPool, id: Uuid, user_id: Uuid, patch: &PhotoPatch) -> AppResult<()> {
    let mut tx = db.begin().await.context("begin tx")?;
    let image = repo::lock_for_sale(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Photo not found"))?;
    if image.user_id != user_id {
        return Err(AppError::forbidden("Only the uploader can edit this photo"));
    }
    if let Some(Some(max)) = patch.max_sales {
        let sold = coins::repo::sales_count_tx(&mut tx, id).await?;
        if sold > i64::from(max) {
            return Err(AppError::bad_request(format!(
                "max_sales cannot be below the {sold} copies already sold"
            )));
        }
    }
    repo::update_tx(&mut tx, id, patch).await?;
    tx.commit().await.context("commit photo update")?;
    Ok(())
}

/// Stores the file, then inserts the image and its tags in one transaction.
/// The stored object is removed again when the insert fails.
pub async fn create_photo(
    st: &AppState,
    user_id: Uuid,
    draft: PhotoDraft,
    file: UploadItem,
) -> AppResult<(Uuid, String)> {
    validate_draft(&draft)?;
    let key = store_image(st, Bucket::Images, file).await?;

    let inserted: anyhow::Result<Uuid> = async {
        let mut tx = st.db.begin().await.context("begin tx")?;
        let id = repo::insert_photo_tx(
            &mut tx,
            user_id,
            &NewPhoto {
                storage_key: &key,
                title: draft.title.as_deref(),
                description: draft.description.as_deref(),
                price: draft.price,
                max_sales: draft.max_sales,
            },
        )
        .await?;
        tags::repo::set_image_tags_tx(&mut tx, id, &draft.tags).await?;
        tx.commit().await.context("commit tx")?;
        Ok(id)
    }
    .await;

    match inserted {
        Ok(id) => {
            info!(photo_id = %id, %user_id, %key, "photo uploaded");
            Ok((id, key))
        }
        Err(e) => {
            if let Err(cleanup) = st.storage.delete_object(&key).await {
                warn!(error = %cleanup, %key, "orphaned upload left in storage");
            }
            Err(e.into())
        }
    }
}

/// `images/abc.jpg` -> `abc.jpg`
pub fn filename_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn build_response(row: PhotoRow, url: String) -> PhotoResponse {
    let sold_out = matches!(row.max_sales, Some(max) if row.sales >= i64::from(max));
    PhotoResponse {
        id: row.id,
        url,
        filename: filename_of(&row.storage_key).to_string(),
        owner_id: row.user_id,
        owner_username: row.owner_username,
        title: row.title,
        description: row.description,
        price: row.price,
        max_sales: row.max_sales,
        sold: row.sales,
        sold_out,
        likes: row.likes,
        tags: row.tags,
        created_at: row.created_at,
    }
}

pub async fn to_response(st: &AppState, row: PhotoRow) -> anyhow::Result<PhotoResponse> {
    let url = st.storage.url_for(&row.storage_key).await?;
    Ok(build_response(row, url))
}

pub async fn to_responses(st: &AppState, rows: Vec<PhotoRow>) -> anyhow::Result<Vec<PhotoResponse>> {
    let keys: Vec<String> = rows.iter().map(|r| r.storage_key.clone()).collect();
    let urls = storage::urls_for(st.storage.as_ref(), &keys).await?;
    Ok(rows
        .into_iter()
        .zip(urls)
        .map(|(row, url)| build_response(row, url))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn row(max_sales: Option<i32>, sales: i64) -> PhotoRow {
        PhotoRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            owner_username: "ann".into(),
            storage_key: "images/abc.jpg".into(),
            title: Some("Dunes".into()),
            description: None,
            price: 15,
            max_sales,
            created_at: OffsetDateTime::now_utc(),
            likes: 3,
            sales,
            tags: vec!["desert".into()],
        }
    }

    fn draft(price: i64, max_sales: Option<i32>) -> PhotoDraft {
        PhotoDraft {
            title: None,
            description: None,
            price,
            max_sales,
            tags: vec![],
        }
    }

    #[test]
    fn filename_strips_prefix() {
        assert_eq!(filename_of("images/abc.jpg"), "abc.jpg");
        assert_eq!(filename_of("abc.jpg"), "abc.jpg");
    }

    #[test]
    fn sold_out_follows_max_sales() {
        assert!(!build_response(row(None, 500), String::new()).sold_out);
        assert!(!build_response(row(Some(3), 2), String::new()).sold_out);
        assert!(build_response(row(Some(3), 3), String::new()).sold_out);
    }

    #[test]
    fn draft_validation() {
        assert!(validate_draft(&draft(10, None)).is_ok());
        assert!(validate_draft(&draft(0, None)).is_err());
        assert!(validate_draft(&draft(-3, None)).is_err());
        assert!(validate_draft(&draft(10, Some(0))).is_err());

        let mut long = draft(10, None);
        long.title = Some("t".repeat(201));
        assert_eq!(
            validate_draft(&long).unwrap_err().to_string(),
            "title must be at most 200 characters"
        );
    }

    #[test]
    fn patch_validation() {
        assert!(validate_patch(&PhotoPatch::default()).is_ok());
        assert!(validate_patch(&PhotoPatch {
            price: Some(0),
            ..Default::default()
        })
        .is_err());
        assert!(validate_patch(&PhotoPatch {
            max_sales: Some(Some(0)),
            ..Default::default()
        })
        .is_err());
        assert!(validate_patch(&PhotoPatch {
            title: Some(None),
            max_sales: Some(None),
            ..Default::default()
        })
        .is_ok());
        assert!(validate_patch(&PhotoPatch {
            description: Some(Some("d".repeat(2001))),
            ..Default::default()
        })
        .is_err());
    }

    #[tokio::test]
    async fn responses_carry_storage_urls() {
        let state = AppState::fake();
        let out = to_responses(&state, vec![row(None, 0), row(Some(1), 1)])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://fake.local/images/abc.jpg");
        assert_eq!(out[0].filename, "abc.jpg");
        assert!(out[1].sold_out);
    }

    #[derive(Default)]
    struct RecordingStorage {
        deleted: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl storage::StorageClient for RecordingStorage {
        async fn put_object(&self, _k: &str, _b: bytes::Bytes, _ct: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_object(&self, k: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(k.to_string());
            Ok(())
        }
        async fn url_for(&self, k: &str) -> anyhow::Result<String> {
            Ok(k.to_string())
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn failed_insert_removes_stored_file(db: PgPool) {
        let recorder = std::sync::Arc::new(RecordingStorage::default());
        let state = AppState::from_parts(
            db.clone(),
            std::sync::Arc::new(AppState::test_config()),
            recorder.clone(),
        );
        let file = UploadItem {
            body: bytes::Bytes::from_static(b"png"),
            content_type: "image/png".into(),
        };

        // no such user, so the images foreign key fails after the file is stored
        let err = create_photo(&state, Uuid::new_v4(), draft(10, None), file)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let deleted = recorder.deleted.lock().unwrap().clone();
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].starts_with("images/") && deleted[0].ends_with(".png"));
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }
}
