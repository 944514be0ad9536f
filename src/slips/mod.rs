pub mod dto;
mod handlers;
pub mod promptpay;
pub mod repo;
pub mod services;

use std::str::FromStr;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipKind {
    Topup,
    Withdraw,
}

impl SlipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SlipKind::Topup => "topup",
            SlipKind::Withdraw => "withdraw",
        }
    }
}

impl FromStr for SlipKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topup" | "top-up" | "deposit" => Ok(SlipKind::Topup),
            "withdraw" | "withdrawal" => Ok(SlipKind::Withdraw),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipStatus {
    Pending,
    Approved,
    Rejected,
}

impl SlipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlipStatus::Pending => "pending",
            SlipStatus::Approved => "approved",
            SlipStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for SlipStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SlipStatus::Pending),
            "approved" => Ok(SlipStatus::Approved),
            "rejected" => Ok(SlipStatus::Rejected),
            _ => Err(()),
        }
    }
}
