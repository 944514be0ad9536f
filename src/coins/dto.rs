use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub photo_id: Uuid,
    pub price: i64,
    /// Buyer balance after the debit.
    pub balance: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct CheckoutResponse {
    pub purchased: Vec<Receipt>,
    /// Cart items dropped because the buyer already owned them.
    pub skipped: Vec<Uuid>,
    pub total: i64,
    pub balance: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub photo_id: Uuid,
    pub url: String,
    pub filename: String,
    pub title: Option<String>,
    pub price_paid: i64,
    pub seller_id: Uuid,
    pub seller_username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub purchased_at: OffsetDateTime,
}
