use crate::auction::AuctionStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Seller-accepted sale, recorded locally the moment the seller confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedSale {
    pub buyer_id: String,
    pub buyer_name: String,
    pub amount: i64,
    pub confirmed_at: DateTime<Utc>,
    pub payment_deadline: DateTime<Utc>,
}

impl ConfirmedSale {
    pub fn new(
        buyer_id: String,
        buyer_name: String,
        amount: i64,
        confirmed_at: DateTime<Utc>,
        payment_window: Duration,
    ) -> Self {
        Self {
            buyer_id,
            buyer_name,
            amount,
            confirmed_at,
            payment_deadline: confirmed_at + payment_window,
        }
    }

    pub fn payment_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.payment_deadline
    }
}

/// Shown in the seller's confirmation dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePrompt {
    pub bidder_id: String,
    pub bidder_name: String,
    pub amount: i64,
}

/// Tentative sale awaiting the accept-sale response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSale {
    pub previous_status: AuctionStatus,
    /// A server `sold` push arrived while the request was in flight.
    pub server_confirmed: bool,
}
