use super::model::AuctionStatus;
use crate::de;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BID_UPDATED: &str = "bid_updated";
pub const STATUS_CHANGED: &str = "status_changed";

/// Payload of a `bid_updated` push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidUpdate {
    #[serde(deserialize_with = "de::lenient_id")]
    pub auction_id: String,
    #[serde(deserialize_with = "de::lenient_amount")]
    pub current_bid: i64,
    #[serde(default, deserialize_with = "de::lenient_opt_count")]
    pub bid_count: Option<u32>,
    #[serde(default, deserialize_with = "de::lenient_opt_id")]
    pub highest_bidder_id: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of a `status_changed` push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    #[serde(deserialize_with = "de::lenient_id")]
    pub auction_id: String,
    pub status: AuctionStatus,
    #[serde(default, deserialize_with = "de::lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Typed server-push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    BidUpdated(BidUpdate),
    StatusChanged(StatusChange),
    /// Any other event type. Only proves the connection is alive.
    Heartbeat,
}

impl LiveEvent {
    /// Decodes one named event. `None` when a known event carries a malformed payload.
    pub fn parse(event_type: Option<&str>, data: &str) -> Option<LiveEvent> {
        match event_type {
            Some(BID_UPDATED) => serde_json::from_str(data).ok().map(LiveEvent::BidUpdated),
            Some(STATUS_CHANGED) => serde_json::from_str(data)
                .ok()
                .map(LiveEvent::StatusChanged),
            _ => Some(LiveEvent::Heartbeat),
        }
    }
}
