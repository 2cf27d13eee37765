use crate::de;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// region:    --- Bid History

/// Public profile attached to each bid in the history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidderProfile {
    #[serde(default, deserialize_with = "de::lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One raw bid as returned by `GET /auctions/{id}/bid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidRecord {
    #[serde(default, deserialize_with = "de::lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de::lenient_id")]
    pub user_id: String,
    #[serde(default, deserialize_with = "de::lenient_amount")]
    pub amount: i64,
    #[serde(default, deserialize_with = "de::lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bidder: Option<BidderProfile>,
}

impl BidRecord {
    /// Bidder key: the bid's `userId`, falling back to the nested profile id.
    pub fn bidder_key(&self) -> Option<&str> {
        let direct = self.user_id.trim();
        if !direct.is_empty() {
            return Some(direct);
        }
        self.bidder
            .as_ref()
            .map(|profile| profile.id.trim())
            .filter(|id| !id.is_empty())
    }
}

// endregion: --- Bid History

// region:    --- Aggregated Bidder

/// Coarse "time since last bid" bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "value", rename_all = "lowercase")]
pub enum TimeSince {
    Now,
    Minutes(i64),
    Hours(i64),
    Days(i64),
}

impl TimeSince {
    pub fn between(then: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let minutes = (now - then).num_minutes().max(0);
        if minutes < 1 {
            TimeSince::Now
        } else if minutes < 60 {
            TimeSince::Minutes(minutes)
        } else if minutes < 24 * 60 {
            TimeSince::Hours(minutes / 60)
        } else {
            TimeSince::Days(minutes / (24 * 60))
        }
    }
}

impl fmt::Display for TimeSince {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSince::Now => f.write_str("الآن"),
            TimeSince::Minutes(n) => write!(f, "منذ {n} دقيقة"),
            TimeSince::Hours(n) => write!(f, "منذ {n} ساعة"),
            TimeSince::Days(n) => write!(f, "منذ {n} يوم"),
        }
    }
}

/// Per-user projection over one auction's bids. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bidder {
    pub user_id: String,
    pub name: String,
    pub profile_image: Option<String>,
    pub verified: bool,
    pub phone: Option<String>,
    pub highest_amount: i64,
    pub total_bids: u32,
    pub latest_bid_at: Option<DateTime<Utc>>,
    pub time_since: Option<TimeSince>,
    pub rank: usize,
    pub is_winning: bool,
    /// Gap to the next lower bidder; `None` for the lowest entry.
    pub increase_amount: Option<i64>,
}

impl Bidder {
    /// Contact details are only shown to the auction's seller.
    pub fn visible_phone(&self, viewer_is_seller: bool) -> Option<&str> {
        if viewer_is_seller {
            self.phone.as_deref().filter(|phone| !phone.trim().is_empty())
        } else {
            None
        }
    }
}

/// `tel:` target for a bidder's phone number, digits and a leading `+` only.
pub fn contact_link(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let prefix = if trimmed.starts_with('+') { "tel:+" } else { "tel:" };
    Some(format!("{prefix}{digits}"))
}

// endregion: --- Aggregated Bidder
