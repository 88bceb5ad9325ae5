//! Error taxonomy for the bidding engine
//!
//! Handlers convert `BiddingError` into `(StatusCode, Json<ErrorResponse>)`
//! so every route answers with the same `{ "error": ... }` body.

use axum::{http::StatusCode, Json};
use thiserror::Error;

use crate::models::bidding::ErrorResponse;
use crate::services::auction_store::StoreError;

/// Reasons a bid (or a bid-like admin request) is rejected before any mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Bid amount must be positive")]
    NonPositiveAmount,
    #[error("Bids must be in increments of ${increment} (got ${amount})")]
    InvalidIncrement { amount: i64, increment: i64 },
    #[error("First bid must be at least ${starting_amount} (the contract amount)")]
    BelowStartingAmount { amount: i64, starting_amount: i64 },
    #[error("Bid must be at least ${minimum} (current bid + ${increment})")]
    BelowMinimumBid { amount: i64, minimum: i64, increment: i64 },
    #[error("Bidding for this player has already closed")]
    AuctionClosed,
    #[error("Player belongs to tier {record_tier}, not {requested_tier}")]
    TierMismatch {
        record_tier: String,
        requested_tier: String,
    },
    #[error("This bid would put your team over the salary cap of ${salary_cap}")]
    OverSalaryCap { salary_cap: i64 },
    #[error(
        "This bid would not leave enough cap space to complete your roster. You still need {missing} at minimum salary ({minimum_budget})."
    )]
    InsufficientRosterBudget { missing: String, minimum_budget: i64 },
}

#[derive(Debug, Error)]
pub enum BiddingError {
    #[error("Authentication required")]
    AuthenticationRequired,
    #[error("{0}")]
    AuthorizationDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Bidding is not currently active for league {0}")]
    NotActive(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Storage error: {0}")]
    TransientStore(String),
    #[error("Invalid auction record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("Server configuration error: {0}")]
    Config(String),
}

impl BiddingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BiddingError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            BiddingError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            BiddingError::NotFound(_) => StatusCode::NOT_FOUND,
            BiddingError::Validation(_)
            | BiddingError::NotActive(_)
            | BiddingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BiddingError::Conflict(_) => StatusCode::CONFLICT,
            BiddingError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            BiddingError::CorruptRecord { .. } | BiddingError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response_parts(self) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.status_code();
        let error = match &self {
            // Never echo backend details to clients
            BiddingError::Config(_) => "Server configuration error".to_string(),
            BiddingError::TransientStore(_) => "Bidding storage temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error }))
    }
}

impl From<StoreError> for BiddingError {
    fn from(e: StoreError) -> Self {
        BiddingError::TransientStore(e.to_string())
    }
}

impl From<sea_orm::DbErr> for BiddingError {
    fn from(e: sea_orm::DbErr) -> Self {
        BiddingError::TransientStore(format!("Database error: {}", e))
    }
}
