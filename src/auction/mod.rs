pub mod events;
pub mod model;
pub mod status;

pub use model::{Auction, AuctionStatus};
pub use status::{resolve, Clock, ManualClock, SystemClock};
