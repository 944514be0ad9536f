use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::extract::nullable;

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub id: Uuid,
    pub url: String,
    pub filename: String,
    pub owner_id: Uuid,
    pub owner_username: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub max_sales: Option<i32>,
    pub sold: i64,
    pub sold_out: bool,
    pub likes: i64,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub url: String,
    pub filename: String,
}

/// Absent fields are left alone. `null` clears `title`, `description` and
/// `max_sales`.
#[derive(Debug, Deserialize)]
pub struct UpdatePhotoRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_sales: Option<Option<i32>>,
}

#[derive(Debug, Serialize)]
pub struct PhotoStatusResponse {
    pub photo_id: Uuid,
    pub user_id: Uuid,
    pub owned: bool,
    pub is_uploader: bool,
    pub in_cart: bool,
}

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub tag: Option<String>,
    pub owner: Option<Uuid>,
}

impl GalleryQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_clamps() {
        let p = PageQuery::default();
        assert_eq!((p.limit(), p.offset()), (20, 0));

        let p = PageQuery { limit: Some(1000), offset: Some(-5) };
        assert_eq!((p.limit(), p.offset()), (100, 0));

        let p = PageQuery { limit: Some(0), offset: Some(40) };
        assert_eq!((p.limit(), p.offset()), (1, 40));
    }
}
