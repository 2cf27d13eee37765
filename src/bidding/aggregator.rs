//! Collapses raw bid history into a ranked, one-entry-per-user bidder list.
// region:    --- Imports
use super::model::{BidRecord, Bidder, BidderProfile, TimeSince};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

// endregion: --- Imports

// region:    --- Aggregation

#[derive(Debug)]
struct Group<'a> {
    user_id: &'a str,
    profile: Option<&'a BidderProfile>,
    highest_amount: i64,
    highest_at: Option<DateTime<Utc>>,
    total_bids: u32,
    latest_bid_at: Option<DateTime<Utc>>,
}

impl<'a> Group<'a> {
    fn new(user_id: &'a str) -> Self {
        Self {
            user_id,
            profile: None,
            highest_amount: 0,
            highest_at: None,
            total_bids: 0,
            latest_bid_at: None,
        }
    }

    fn add(&mut self, bid: &'a BidRecord) {
        self.total_bids += 1;
        if self.profile.is_none() {
            self.profile = bid.bidder.as_ref();
        }

        if self.total_bids == 1 || bid.amount > self.highest_amount {
            self.highest_amount = bid.amount;
            self.highest_at = bid.timestamp;
        } else if bid.amount == self.highest_amount {
            self.highest_at = earliest(self.highest_at, bid.timestamp);
        }

        if bid.timestamp > self.latest_bid_at {
            self.latest_bid_at = bid.timestamp;
        }
    }
}

/// Earlier of two optional instants; a known instant beats an unknown one.
fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Ranking order: highest amount first, then whoever reached that amount first,
/// then user id.
fn rank_order(a: &Group<'_>, b: &Group<'_>) -> Ordering {
    b.highest_amount
        .cmp(&a.highest_amount)
        .then_with(|| match (a.highest_at, b.highest_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.user_id.cmp(b.user_id))
}

/// Builds the ranked bidder list for one auction's bid history.
///
/// Bids without a bidder id are dropped. Rank 1 is the winning entry.
pub fn aggregate(bids: &[BidRecord], now: DateTime<Utc>) -> Vec<Bidder> {
    let mut groups: HashMap<&str, Group<'_>> = HashMap::new();
    for bid in bids {
        let Some(user_id) = bid.bidder_key() else {
            continue;
        };
        groups
            .entry(user_id)
            .or_insert_with(|| Group::new(user_id))
            .add(bid);
    }

    let mut ordered: Vec<Group<'_>> = groups.into_values().collect();
    ordered.sort_by(rank_order);

    let lower_amounts: Vec<Option<i64>> = ordered
        .iter()
        .skip(1)
        .map(|group| Some(group.highest_amount))
        .chain(std::iter::once(None))
        .collect();

    ordered
        .into_iter()
        .zip(lower_amounts)
        .enumerate()
        .map(|(position, (group, next_lower))| {
            let profile = group.profile;
            Bidder {
                user_id: group.user_id.to_string(),
                name: profile
                    .and_then(|p| p.name.clone())
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| group.user_id.to_string()),
                profile_image: profile.and_then(|p| p.profile_image.clone()),
                verified: profile.map(|p| p.verified).unwrap_or(false),
                phone: profile.and_then(|p| p.phone.clone()),
                highest_amount: group.highest_amount,
                total_bids: group.total_bids,
                latest_bid_at: group.latest_bid_at,
                time_since: group
                    .latest_bid_at
                    .map(|latest| TimeSince::between(latest, now)),
                rank: position + 1,
                is_winning: position == 0,
                increase_amount: next_lower.map(|lower| group.highest_amount.saturating_sub(lower)),
            }
        })
        .collect()
}

// endregion: --- Aggregation
