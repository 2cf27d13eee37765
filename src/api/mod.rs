//! Contracts of the marketplace endpoints the bidding core consumes.
// region:    --- Imports
use crate::auction::Auction;
use crate::bidding::model::BidRecord;
use crate::de;
use crate::error::ApiError;
use crate::live::sse::SseFrame;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

pub mod http;

pub use http::HttpAuctionApi;

// endregion: --- Imports

// region:    --- Requests

/// Body of `POST /auctions/{id}/bid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub user_id: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_high_bid: Option<bool>,
}

/// Body of `POST /auctions/{id}/accept-sale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptSaleRequest {
    pub bidder_id: String,
    pub amount: i64,
    pub reason: String,
}

// endregion: --- Requests

// region:    --- Responses

/// `{success, data, error, message}` wrapper used by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server verdict on a bid submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidResponse {
    Accepted {
        bid_id: Option<String>,
    },
    AuthenticationRequired,
    TooLow {
        recommended_min: Option<i64>,
        min_increment: Option<i64>,
        message: Option<String>,
    },
    ConfirmationRequired {
        recommended_min: Option<i64>,
        min_increment: Option<i64>,
        message: Option<String>,
    },
    Rejected {
        message: Option<String>,
    },
}

fn opt_amount(body: &Value, key: &str) -> Option<i64> {
    body.get(key)
        .map(de::amount_from_value)
        .filter(|amount| *amount > 0)
}

fn opt_string(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Maps a bid endpoint response onto a [`BidResponse`].
pub fn classify_bid_response(status: u16, body: &Value) -> BidResponse {
    let error = body.get("error").and_then(Value::as_str).unwrap_or_default();
    let message = opt_string(body, "message");

    if status == 401 || error == "UNAUTHORIZED" {
        return BidResponse::AuthenticationRequired;
    }

    let requires_confirm = body
        .get("requiredConfirm")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if error == "HIGH_BID_CONFIRMATION_REQUIRED" || requires_confirm {
        return BidResponse::ConfirmationRequired {
            recommended_min: opt_amount(body, "recommendedMin"),
            min_increment: opt_amount(body, "minIncrement"),
            message,
        };
    }

    if error == "BID_TOO_LOW" {
        return BidResponse::TooLow {
            recommended_min: opt_amount(body, "recommendedMin"),
            min_increment: opt_amount(body, "minIncrement"),
            message,
        };
    }

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(true);
    if (200..300).contains(&status) && success {
        let bid_id = body
            .get("data")
            .and_then(|data| data.get("bidId"))
            .map(de::id_from_value)
            .filter(|id| !id.is_empty());
        return BidResponse::Accepted { bid_id };
    }

    BidResponse::Rejected {
        message: message.or_else(|| opt_string(body, "error")),
    }
}

// endregion: --- Responses

// region:    --- Traits

/// Marketplace REST endpoints.
#[async_trait]
pub trait AuctionApi: Send + Sync {
    async fn fetch_auction(&self, auction_id: &str) -> Result<Auction, ApiError>;

    async fn fetch_bids(&self, auction_id: &str) -> Result<Vec<BidRecord>, ApiError>;

    async fn place_bid(
        &self,
        auction_id: &str,
        request: &PlaceBidRequest,
    ) -> Result<BidResponse, ApiError>;

    /// Returns the server's confirmation message.
    async fn accept_sale(
        &self,
        auction_id: &str,
        request: &AcceptSaleRequest,
    ) -> Result<String, ApiError>;
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, ApiError>> + Send>>;

/// Opens the server-push stream for a comma-joined set of auction ids.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, auction_ids: &str) -> Result<FrameStream, ApiError>;
}

// endregion: --- Traits
