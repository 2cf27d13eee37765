//! Minimum bid increment schedule and quick-bid suggestions.
// region:    --- Imports
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// endregion: --- Imports

// region:    --- Bidding Rules

/// One price band of the tiered increment schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementTier {
    /// Exclusive upper bound of the band. `None` for the open-ended top band.
    pub below: Option<i64>,
    pub increment: i64,
}

/// Marketplace-wide bidding constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiddingRules {
    /// No bid may ever raise the price by less than this.
    pub min_bid_floor: i64,
    pub quick_bid_increments: Vec<i64>,
    /// Bands ordered by ascending `below`.
    pub tiers: Vec<IncrementTier>,
}

impl Default for BiddingRules {
    fn default() -> Self {
        let tier = |below: Option<i64>, increment: i64| IncrementTier { below, increment };
        Self {
            min_bid_floor: 100,
            quick_bid_increments: vec![250, 500, 1_000, 2_500, 5_000],
            tiers: vec![
                tier(Some(5_000), 100),
                tier(Some(20_000), 250),
                tier(Some(50_000), 500),
                tier(Some(100_000), 1_000),
                tier(Some(500_000), 2_500),
                tier(None, 5_000),
            ],
        }
    }
}

impl BiddingRules {
    /// Increment for `current_price`'s band, or the server-advertised one when present.
    pub fn tiered_increment(&self, current_price: i64, server_override: Option<i64>) -> i64 {
        if let Some(advertised) = server_override.filter(|value| *value > 0) {
            return advertised;
        }
        self.tiers
            .iter()
            .find(|tier| tier.below.map_or(true, |below| current_price < below))
            .map(|tier| tier.increment)
            .unwrap_or(self.min_bid_floor)
    }

    /// `max(floor, tiered_increment)`: the smallest raise the client will submit.
    pub fn effective_min_increment(&self, current_price: i64, server_override: Option<i64>) -> i64 {
        self.min_bid_floor
            .max(self.tiered_increment(current_price, server_override))
    }

    pub fn minimum_next_bid(&self, current_price: i64, server_override: Option<i64>) -> i64 {
        current_price.saturating_add(self.effective_min_increment(current_price, server_override))
    }

    /// One-tap bid amounts: the minimum next bid plus each configured increment,
    /// clamped up to the minimum, ascending and without duplicates.
    pub fn quick_bid_amounts(&self, current_price: i64, server_override: Option<i64>) -> Vec<i64> {
        let minimum = self.effective_min_increment(current_price, server_override);
        let mut amounts = BTreeSet::new();
        amounts.insert(current_price.saturating_add(minimum));
        for increment in &self.quick_bid_increments {
            amounts.insert(current_price.saturating_add((*increment).max(minimum)));
        }
        amounts.into_iter().collect()
    }
}

// endregion: --- Bidding Rules
