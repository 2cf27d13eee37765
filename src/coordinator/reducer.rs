//! Monotonic merges shared by every update source (tick, poll, push, local intents).
//! Applying the same input twice, or inputs in any order, yields the same state.
use crate::auction::AuctionStatus;

/// Price only moves up.
pub fn merge_price(current: i64, incoming: i64) -> i64 {
    current.max(incoming)
}

/// Status only moves forward along upcoming → live → ended → sold; `sold` is absorbing.
pub fn merge_status(current: AuctionStatus, incoming: AuctionStatus) -> AuctionStatus {
    if current.is_terminal() {
        return current;
    }
    current.max(incoming)
}

pub fn merge_count(current: u32, incoming: Option<u32>) -> u32 {
    incoming.map_or(current, |count| current.max(count))
}
