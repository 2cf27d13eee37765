use crate::de;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// region:    --- Auction Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Upcoming,
    Live,
    Ended,
    Sold,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Upcoming => "upcoming",
            AuctionStatus::Live => "live",
            AuctionStatus::Ended => "ended",
            AuctionStatus::Sold => "sold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Sold)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown auction status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for AuctionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" | "scheduled" | "pending" => Ok(AuctionStatus::Upcoming),
            "live" | "active" => Ok(AuctionStatus::Live),
            "ended" | "completed" | "expired" | "closed" => Ok(AuctionStatus::Ended),
            "sold" => Ok(AuctionStatus::Sold),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for AuctionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unknown or missing status flags decode to `None` instead of failing the snapshot.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<AuctionStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(|s| s.parse().ok()))
}

// endregion: --- Auction Status

// region:    --- Auction Snapshot
/// One auction as returned by the marketplace API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    #[serde(default, deserialize_with = "de::lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de::lenient_amount")]
    pub starting_price: i64,
    #[serde(default, deserialize_with = "de::lenient_amount")]
    pub current_price: i64,
    #[serde(
        default,
        alias = "salePrice",
        deserialize_with = "de::lenient_opt_amount"
    )]
    pub reserve_price: Option<i64>,
    #[serde(
        default,
        alias = "minIncrement",
        deserialize_with = "de::lenient_opt_amount"
    )]
    pub min_bid_increment: Option<i64>,
    #[serde(default, alias = "startDate", deserialize_with = "de::lenient_timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "endDate", deserialize_with = "de::lenient_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<AuctionStatus>,
    #[serde(default, deserialize_with = "de::lenient_id")]
    pub seller_id: String,
    #[serde(default, deserialize_with = "de::lenient_count")]
    pub bid_count: u32,
}

impl Auction {
    /// Authoritative highest bid, never below the starting price.
    pub fn current_price(&self) -> i64 {
        self.current_price.max(self.starting_price)
    }

    /// Whether the current price has reached the seller's reserve.
    /// Informational only: bidding is never blocked on it.
    pub fn reserve_met(&self) -> Option<bool> {
        self.reserve_price
            .map(|reserve| self.current_price() >= reserve)
    }
}
// endregion: --- Auction Snapshot
