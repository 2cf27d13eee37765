pub mod aggregator;
pub mod commands;
pub mod increment;
pub mod model;

pub use aggregator::aggregate;
pub use commands::{BidCallbacks, BidContext, BidController, BidSuccess, HighBidPrompt};
pub use increment::BiddingRules;
pub use model::{BidRecord, Bidder, BidderProfile, TimeSince};
