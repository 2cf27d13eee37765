//! Time-based lifecycle classification of an auction snapshot.
// region:    --- Imports
use super::model::{Auction, AuctionStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

// endregion: --- Imports

// region:    --- Clock

/// Source of "now" for everything that ticks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// endregion: --- Clock

// region:    --- Resolver

/// Lifecycle state of `auction` at `now`.
///
/// A persisted `sold` flag wins over any timestamp. Missing or inconsistent
/// timestamps resolve to `live`.
pub fn resolve(auction: &Auction, now: DateTime<Utc>) -> AuctionStatus {
    if auction.status == Some(AuctionStatus::Sold) {
        return AuctionStatus::Sold;
    }

    let (start, end) = match (auction.start_time, auction.end_time) {
        (Some(start), Some(end)) if end >= start => (start, end),
        _ => return AuctionStatus::Live,
    };

    if now < start {
        AuctionStatus::Upcoming
    } else if now >= end {
        AuctionStatus::Ended
    } else {
        AuctionStatus::Live
    }
}

/// Countdown to the next boundary: until start when upcoming, until end when live.
pub fn time_remaining(auction: &Auction, now: DateTime<Utc>) -> Option<Duration> {
    match resolve(auction, now) {
        AuctionStatus::Upcoming => auction.start_time.map(|start| start - now),
        AuctionStatus::Live => auction.end_time.map(|end| end - now),
        AuctionStatus::Ended | AuctionStatus::Sold => None,
    }
}

// endregion: --- Resolver
