pub mod api;
pub mod auction;
pub mod bidding;
pub mod config;
pub mod coordinator;
pub mod de;
pub mod error;
pub mod live;
