use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GenerateQrRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub amount: i64,
    pub promptpay_id: String,
    pub payload: String,
    pub svg: String,
}

#[derive(Debug, Serialize)]
pub struct SlipResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub kind: String,
    pub amount: i64,
    pub slip_url: Option<String>,
    pub status: String,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    pub reviewed_by: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SlipListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub status: &'static str,
    /// Slip owner's balance after the review.
    pub balance: i64,
}
