use std::collections::HashMap;

use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    storage::{ext_from_mime, Bucket},
};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// A drained multipart form: text fields by name plus at most one file.
#[derive(Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadItem>,
}

impl UploadForm {
    pub async fn read(mut mp: Multipart, file_fields: &[&str]) -> AppResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = mp.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if file_fields.contains(&name.as_str()) {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await?;
                if !body.is_empty() {
                    form.file = Some(UploadItem { body, content_type });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Trimmed text field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> AppResult<Option<T>> {
        match self.text(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| AppError::bad_request(format!("Invalid {name}"))),
        }
    }
}

/// Validates the content type and writes the file, returning its storage key.
pub async fn store_image(st: &AppState, bucket: Bucket, item: UploadItem) -> AppResult<String> {
    let ext = ext_from_mime(&item.content_type)
        .ok_or_else(|| AppError::bad_request("Unsupported image type"))?;
    let key = bucket.new_key(ext);
    st.storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "stored upload");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> UploadForm {
        UploadForm {
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            file: None,
        }
    }

    #[test]
    fn text_trims_and_drops_blank() {
        let f = form(&[("title", "  Sunset "), ("description", "   ")]);
        assert_eq!(f.text("title"), Some("Sunset"));
        assert_eq!(f.text("description"), None);
        assert_eq!(f.text("missing"), None);
    }

    #[test]
    fn parse_reports_field_name() {
        let f = form(&[("price", "12"), ("max_sales", "lots")]);
        assert_eq!(f.parse::<i64>("price").unwrap(), Some(12));
        assert_eq!(f.parse::<i64>("absent").unwrap(), None);
        let err = f.parse::<i32>("max_sales").unwrap_err();
        assert_eq!(err.to_string(), "Invalid max_sales");
    }

    #[tokio::test]
    async fn store_image_rejects_non_images() {
        let state = AppState::fake();
        let item = UploadItem {
            body: Bytes::from_static(b"<html>"),
            content_type: "text/html".into(),
        };
        let err = store_image(&state, Bucket::Images, item).await.unwrap_err();
        assert_eq!(err.to_string(), "Unsupported image type");
    }

    #[tokio::test]
    async fn store_image_returns_prefixed_key() {
        let state = AppState::fake();
        let item = UploadItem {
            body: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        };
        let key = store_image(&state, Bucket::ProfilePic, item).await.unwrap();
        assert!(key.starts_with("profilePic/"));
        assert!(key.ends_with(".png"));
    }
}
