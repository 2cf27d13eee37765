// region:    --- Imports
use async_trait::async_trait;
use auction_bidding_client::api::HttpAuctionApi;
use auction_bidding_client::auction::SystemClock;
use auction_bidding_client::bidding::HighBidPrompt;
use auction_bidding_client::config::ClientConfig;
use auction_bidding_client::coordinator::{
    AuctionCoordinator, CoordinatorDeps, PageCallbacks, SalePrompt,
};
use std::sync::Arc;
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Console Callbacks

/// Headless page: logs prompts and declines anything needing a human.
struct ConsoleCallbacks;

#[async_trait]
impl PageCallbacks for ConsoleCallbacks {
    fn on_require_login(&self) {
        warn!("{:<12} --> login required", "Main");
    }

    fn on_bid_success(&self, new_amount: i64) {
        info!("{:<12} --> bid accepted at {}", "Main", new_amount);
    }

    async fn confirm_high_bid(&self, prompt: &HighBidPrompt) -> bool {
        warn!("{:<12} --> high bid {} needs confirmation, declining", "Main", prompt.amount);
        false
    }

    async fn confirm_sale(&self, prompt: &SalePrompt) -> bool {
        warn!(
            "{:<12} --> sale to {} for {} needs confirmation, declining",
            "Main", prompt.bidder_name, prompt.amount
        );
        false
    }

    fn on_sale_failed(&self, message: &str) {
        error!("{:<12} --> sale failed: {}", "Main", message);
    }

    fn on_contact_bidder(&self, phone: &str) {
        info!("{:<12} --> contact {}", "Main", phone);
    }
}

// endregion: --- Console Callbacks

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(auction_id) = args.next() else {
        error!("{:<12} --> usage: auction-bidding-client <auction-id> [viewer-id]", "Main");
        return Err("missing auction id".into());
    };
    let viewer_id = args.next();

    let config = ClientConfig::from_env();
    info!("{:<12} --> API base url: {}", "Main", config.api_base_url);

    let api = Arc::new(HttpAuctionApi::new(&config));
    let deps = CoordinatorDeps {
        api: api.clone(),
        events: api,
        clock: Arc::new(SystemClock),
        callbacks: Arc::new(ConsoleCallbacks),
        config,
    };

    let coordinator = match AuctionCoordinator::load(deps, &auction_id, viewer_id).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("{:<12} --> failed to load auction {}: {}", "Main", auction_id, e);
            return Err(e.into());
        }
    };

    let mut channel = coordinator.start();
    let mut view = coordinator.watch();
    let mut last_logged = None;
    info!("{:<12} --> watching auction {}", "Main", coordinator.auction_id());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                let key = (
                    snapshot.status,
                    snapshot.current_price,
                    snapshot.bid_count,
                    snapshot.bidders.len(),
                );
                if last_logged == Some(key) {
                    continue;
                }
                last_logged = Some(key);
                info!(
                    "{:<12} --> status={} price={} bids={} next>={} bidders={}",
                    "Main",
                    snapshot.status,
                    snapshot.current_price,
                    snapshot.bid_count,
                    snapshot.minimum_next_bid,
                    snapshot.bidders.len()
                );
            }
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
                let connected = channel.borrow_and_update().connected;
                info!("{:<12} --> live channel connected={}", "Main", connected);
            }
        }
    }

    coordinator.shutdown();
    Ok(())
}
// endregion: --- Main
