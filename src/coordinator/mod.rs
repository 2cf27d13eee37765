//! Page-level owner of one auction's status, price and bidder list.
//!
//! The resolver tick, the periodic refresh and the live push channel all feed the
//! same monotonic reducers. Everything else only emits intents.
// region:    --- Imports
use crate::api::{AcceptSaleRequest, AuctionApi, EventSource};
use crate::auction::events::{BidUpdate, StatusChange};
use crate::auction::status::{resolve, time_remaining, Clock};
use crate::auction::{Auction, AuctionStatus};
use crate::bidding::aggregate;
use crate::bidding::commands::{
    BidCallbacks, BidContext, BidController, BidSuccess, HighBidPrompt,
};
use crate::bidding::model::{contact_link, Bidder};
use crate::config::ClientConfig;
use crate::error::{ApiError, BidError, SaleError};
use crate::live::{ChannelState, LiveUpdateChannel, LiveUpdateHandler};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant};
use tracing::{debug, info, warn};

pub mod debounce;
pub mod reducer;
pub mod sale;

use debounce::Debouncer;
pub use reducer::{merge_count, merge_price, merge_status};
use sale::PendingSale;
pub use sale::{ConfirmedSale, SalePrompt};

// endregion: --- Imports

// region:    --- Callbacks And View

/// Everything the surrounding page provides to the bidding core.
#[async_trait]
pub trait PageCallbacks: Send + Sync {
    fn on_require_login(&self);

    fn on_bid_success(&self, new_amount: i64);

    /// Resolves `true` only on explicit user confirmation.
    async fn confirm_high_bid(&self, prompt: &HighBidPrompt) -> bool;

    /// Seller-side dialog naming the bidder and amount.
    async fn confirm_sale(&self, prompt: &SalePrompt) -> bool;

    fn on_sale_failed(&self, message: &str);

    fn on_contact_bidder(&self, phone: &str);
}

struct BidHooks {
    page: Arc<dyn PageCallbacks>,
    view: Arc<watch::Sender<AuctionView>>,
}

#[async_trait]
impl BidCallbacks for BidHooks {
    fn on_require_login(&self) {
        self.page.on_require_login();
    }

    fn on_bid_success(&self, new_amount: i64) {
        self.page.on_bid_success(new_amount);
    }

    async fn confirm_high_bid(&self, prompt: &HighBidPrompt) -> bool {
        self.page.confirm_high_bid(prompt).await
    }

    fn on_pending_changed(&self, pending: bool) {
        self.view.send_modify(|view| view.bid_pending = pending);
    }
}

/// Immutable render snapshot published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionView {
    pub auction: Auction,
    pub status: AuctionStatus,
    pub current_price: i64,
    pub bid_count: u32,
    pub highest_bidder_id: Option<String>,
    pub bidders: Vec<Bidder>,
    pub confirmed_sale: Option<ConfirmedSale>,
    pub minimum_next_bid: i64,
    pub quick_bids: Vec<i64>,
    pub seconds_remaining: Option<i64>,
    pub viewer_is_seller: bool,
    pub bid_pending: bool,
}

/// Collaborators injected into a coordinator.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub api: Arc<dyn AuctionApi>,
    pub events: Arc<dyn EventSource>,
    pub clock: Arc<dyn Clock>,
    pub callbacks: Arc<dyn PageCallbacks>,
    pub config: ClientConfig,
}

// endregion: --- Callbacks And View

// region:    --- Page State

struct PageState {
    snapshot: Auction,
    status: AuctionStatus,
    current_price: i64,
    bid_count: u32,
    highest_bidder_id: Option<String>,
    bidders: Vec<Bidder>,
    confirmed_sale: Option<ConfirmedSale>,
    pending_sale: Option<PendingSale>,
}

impl PageState {
    fn new(snapshot: Auction, status: AuctionStatus) -> Self {
        Self {
            status,
            current_price: snapshot.current_price(),
            bid_count: snapshot.bid_count,
            highest_bidder_id: None,
            bidders: Vec::new(),
            confirmed_sale: None,
            pending_sale: None,
            snapshot,
        }
    }

    fn apply_status(&mut self, incoming: AuctionStatus, source: &str) {
        let next = merge_status(self.status, incoming);
        if next != self.status {
            info!(
                "{:<12} --> status {} -> {} ({})",
                "Coordinator", self.status, next, source
            );
            self.status = next;
        } else if incoming != self.status {
            debug!(
                "{:<12} --> discarded {} while {} ({})",
                "Coordinator", incoming, self.status, source
            );
        }
    }

    /// Raises the price; the bidder behind a strictly higher price becomes the leader.
    fn apply_price(&mut self, incoming: i64, bidder_id: Option<String>) {
        let next = merge_price(self.current_price, incoming);
        if next != self.current_price {
            self.current_price = next;
            if bidder_id.is_some() {
                self.highest_bidder_id = bidder_id;
            }
        }
    }
}

// endregion: --- Page State

// region:    --- Coordinator Core

struct Inner {
    auction_id: String,
    viewer_id: Option<String>,
    api: Arc<dyn AuctionApi>,
    clock: Arc<dyn Clock>,
    callbacks: Arc<dyn PageCallbacks>,
    config: ClientConfig,
    controller: BidController,
    state: Mutex<PageState>,
    view: Arc<watch::Sender<AuctionView>>,
    bidder_refresh: Debouncer,
}

impl Inner {
    fn viewer_is_seller(&self, state: &PageState) -> bool {
        match &self.viewer_id {
            Some(viewer) => !viewer.is_empty() && *viewer == state.snapshot.seller_id,
            None => false,
        }
    }

    fn render(&self, state: &PageState) -> AuctionView {
        let rules = self.controller.rules();
        let override_increment = state.snapshot.min_bid_increment;
        AuctionView {
            auction: state.snapshot.clone(),
            status: state.status,
            current_price: state.current_price,
            bid_count: state.bid_count,
            highest_bidder_id: state.highest_bidder_id.clone(),
            bidders: state.bidders.clone(),
            confirmed_sale: state.confirmed_sale.clone(),
            minimum_next_bid: rules.minimum_next_bid(state.current_price, override_increment),
            quick_bids: rules.quick_bid_amounts(state.current_price, override_increment),
            seconds_remaining: match state.status {
                AuctionStatus::Upcoming | AuctionStatus::Live => {
                    time_remaining(&state.snapshot, self.clock.now())
                        .map(|left| left.num_seconds())
                }
                AuctionStatus::Ended | AuctionStatus::Sold => None,
            },
            viewer_is_seller: self.viewer_is_seller(state),
            bid_pending: self.controller.is_pending(),
        }
    }

    fn publish(&self, state: &PageState) {
        self.view.send_replace(self.render(state));
    }

    /// Resolver tick over the latest snapshot.
    async fn tick(&self) {
        let mut state = self.state.lock().await;
        let resolved = resolve(&state.snapshot, self.clock.now());
        state.apply_status(resolved, "tick");
        self.publish(&state);
    }

    fn apply_snapshot(&self, state: &mut PageState, auction: Auction) {
        let resolved = resolve(&auction, self.clock.now());
        state.apply_price(auction.current_price(), None);
        state.bid_count = merge_count(state.bid_count, Some(auction.bid_count));
        state.snapshot = auction;
        state.apply_status(resolved, "refresh");
    }

    /// Full refresh: auction data then bid history.
    async fn refresh(self: &Arc<Self>) -> Result<(), ApiError> {
        let auction = self.api.fetch_auction(&self.auction_id).await?;
        {
            let mut state = self.state.lock().await;
            self.apply_snapshot(&mut state, auction);
            self.publish(&state);
        }
        self.refresh_bidders().await;
        Ok(())
    }

    async fn refresh_bidders(&self) {
        let bids = match self.api.fetch_bids(&self.auction_id).await {
            Ok(bids) => bids,
            Err(e) => {
                warn!("{:<12} --> bidder refresh failed: {}", "Coordinator", e);
                return;
            }
        };

        let bidders = aggregate(&bids, self.clock.now());
        let mut state = self.state.lock().await;
        if let Some(top) = bidders.first() {
            state.apply_price(top.highest_amount, Some(top.user_id.clone()));
        }
        state.bid_count = merge_count(state.bid_count, u32::try_from(bids.len()).ok());
        state.bidders = bidders;
        self.publish(&state);
    }

    fn schedule_bidder_refresh(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.bidder_refresh
            .trigger(async move { inner.refresh_bidders().await });
    }

    async fn handle_bid_update(self: &Arc<Self>, update: BidUpdate) {
        if update.auction_id != self.auction_id {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.apply_price(update.current_bid, update.highest_bidder_id);
            state.bid_count = merge_count(state.bid_count, update.bid_count);
            self.publish(&state);
        }
        self.schedule_bidder_refresh();
    }

    async fn handle_status_change(&self, change: StatusChange) {
        if change.auction_id != self.auction_id {
            return;
        }
        let mut state = self.state.lock().await;
        if change.status == AuctionStatus::Sold {
            if let Some(pending) = state.pending_sale.as_mut() {
                pending.server_confirmed = true;
            }
        }
        state.apply_status(change.status, "push");
        self.publish(&state);
    }

    async fn place_bid(
        self: &Arc<Self>,
        amount: f64,
        confirm_high_bid: bool,
    ) -> Result<BidSuccess, BidError> {
        let ctx = {
            let state = self.state.lock().await;
            BidContext {
                auction_id: self.auction_id.clone(),
                seller_id: state.snapshot.seller_id.clone(),
                user_id: self.viewer_id.clone(),
                status: state.status,
                current_price: state.current_price,
                min_increment_override: state.snapshot.min_bid_increment,
            }
        };

        let result = self.controller.submit(&ctx, amount, confirm_high_bid).await;

        let mut state = self.state.lock().await;
        match &result {
            Ok(success) => {
                let before = state.current_price;
                state.apply_price(success.new_amount, self.viewer_id.clone());
                if state.current_price > before {
                    state.bid_count = state.bid_count.saturating_add(1);
                }
            }
            Err(BidError::TooLow {
                server_price: Some(price),
                ..
            }) => state.apply_price(*price, None),
            Err(_) => {}
        }
        self.publish(&state);
        drop(state);

        if result.is_ok() {
            self.schedule_bidder_refresh();
        }
        result
    }

    async fn accept_bid(&self, bidder_id: &str, amount: i64) -> Result<ConfirmedSale, SaleError> {
        let prompt = {
            let state = self.state.lock().await;
            if !self.viewer_is_seller(&state) {
                return Err(SaleError::NotSeller);
            }
            if state.status == AuctionStatus::Sold {
                return Err(SaleError::AlreadySold);
            }
            let bidder_name = state
                .bidders
                .iter()
                .find(|bidder| bidder.user_id == bidder_id)
                .map(|bidder| bidder.name.clone())
                .unwrap_or_else(|| bidder_id.to_string());
            SalePrompt {
                bidder_id: bidder_id.to_string(),
                bidder_name,
                amount,
            }
        };

        if !self.callbacks.confirm_sale(&prompt).await {
            info!("{:<12} --> sale confirmation cancelled", "Coordinator");
            return Err(SaleError::Cancelled);
        }

        let sale = {
            let mut state = self.state.lock().await;
            if state.status == AuctionStatus::Sold {
                return Err(SaleError::AlreadySold);
            }
            let sale = ConfirmedSale::new(
                prompt.bidder_id.clone(),
                prompt.bidder_name.clone(),
                amount,
                self.clock.now(),
                self.config.payment_window,
            );
            let previous_status = state.status;
            state.pending_sale = Some(PendingSale {
                previous_status,
                server_confirmed: false,
            });
            state.apply_status(AuctionStatus::Sold, "accept-sale");
            state.confirmed_sale = Some(sale.clone());
            self.publish(&state);
            sale
        };

        let request = AcceptSaleRequest {
            bidder_id: prompt.bidder_id.clone(),
            amount,
            reason: "seller accepted bid".to_string(),
        };
        match self.api.accept_sale(&self.auction_id, &request).await {
            Ok(message) => {
                info!(
                    "{:<12} --> sale confirmed to {} for {}: {}",
                    "Coordinator", sale.buyer_id, sale.amount, message
                );
                let mut state = self.state.lock().await;
                state.pending_sale = None;
                state.apply_price(amount, Some(prompt.bidder_id));
                self.publish(&state);
                Ok(sale)
            }
            Err(e) => {
                warn!("{:<12} --> accept-sale failed: {}", "Coordinator", e);
                let mut state = self.state.lock().await;
                let pending = state.pending_sale.take();
                state.confirmed_sale = None;
                match pending {
                    // The only backward write: undo our own tentative sale.
                    Some(pending) if !pending.server_confirmed => {
                        state.status = pending.previous_status;
                    }
                    _ => {}
                }
                self.publish(&state);
                drop(state);
                self.callbacks.on_sale_failed(&e.to_string());
                Err(SaleError::RequestFailed(e))
            }
        }
    }

    async fn contact_bidder(&self, bidder_id: &str) -> Option<String> {
        let phone = {
            let state = self.state.lock().await;
            let is_seller = self.viewer_is_seller(&state);
            state
                .bidders
                .iter()
                .find(|bidder| bidder.user_id == bidder_id)
                .and_then(|bidder| bidder.visible_phone(is_seller))
                .map(str::to_string)?
        };
        self.callbacks.on_contact_bidder(&phone);
        contact_link(&phone)
    }
}

struct PushHandler(Arc<Inner>);

#[async_trait]
impl LiveUpdateHandler for PushHandler {
    async fn on_bid(&self, update: BidUpdate) {
        self.0.handle_bid_update(update).await;
    }

    async fn on_status(&self, change: StatusChange) {
        self.0.handle_status_change(change).await;
    }
}

// endregion: --- Coordinator Core

// region:    --- Auction Coordinator

pub struct AuctionCoordinator {
    inner: Arc<Inner>,
    channel: StdMutex<LiveUpdateChannel>,
    background: StdMutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl AuctionCoordinator {
    /// Coordinator over an already fetched snapshot. Nothing runs until [`start`].
    ///
    /// [`start`]: AuctionCoordinator::start
    pub fn new(deps: CoordinatorDeps, auction: Auction, viewer_id: Option<String>) -> Self {
        let CoordinatorDeps {
            api,
            events,
            clock,
            callbacks,
            config,
        } = deps;

        let status = resolve(&auction, clock.now());
        let state = PageState::new(auction, status);
        let view = Arc::new(watch::channel(placeholder_view()).0);
        let hooks = BidHooks {
            page: Arc::clone(&callbacks),
            view: Arc::clone(&view),
        };
        let controller =
            BidController::new(Arc::clone(&api), config.rules.clone(), Arc::new(hooks));
        let channel = LiveUpdateChannel::new(events, Arc::clone(&clock), config.stream.clone());

        let inner = Inner {
            auction_id: state.snapshot.id.clone(),
            viewer_id: viewer_id.filter(|id| !id.trim().is_empty()),
            api,
            clock,
            callbacks,
            bidder_refresh: Debouncer::new(config.bidder_refresh_debounce),
            config,
            controller,
            view,
            state: Mutex::new(state),
        };
        if let Ok(state) = inner.state.try_lock() {
            inner.publish(&state);
        }

        Self {
            inner: Arc::new(inner),
            channel: StdMutex::new(channel),
            background: StdMutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Fetches the auction and its bid history, then builds the coordinator.
    pub async fn load(
        deps: CoordinatorDeps,
        auction_id: &str,
        viewer_id: Option<String>,
    ) -> Result<Self, ApiError> {
        info!("{:<12} --> load auction id: {}", "Coordinator", auction_id);
        let mut auction = deps.api.fetch_auction(auction_id).await?;
        if auction.id.is_empty() {
            auction.id = auction_id.to_string();
        }
        let coordinator = Self::new(deps, auction, viewer_id);
        coordinator.inner.refresh_bidders().await;
        Ok(coordinator)
    }

    /// Starts the resolver tick, periodic refresh and live subscription.
    ///
    /// A second call while running only hands out another channel receiver.
    pub fn start(&self) -> watch::Receiver<ChannelState> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("{:<12} --> already started id: {}", "Coordinator", self.inner.auction_id);
            return match self.channel.lock() {
                Ok(channel) => channel.watch(),
                Err(poisoned) => poisoned.into_inner().watch(),
            };
        }

        let tick_every = self.inner.config.tick_interval;
        let poll_every = self.inner.config.poll_interval;

        let inner = Arc::clone(&self.inner);
        let ticker = tokio::spawn(async move {
            let mut ticks = interval(tick_every);
            loop {
                ticks.tick().await;
                inner.tick().await;
            }
        });

        let inner = Arc::clone(&self.inner);
        let poller = tokio::spawn(async move {
            let mut polls = interval_at(Instant::now() + poll_every, poll_every);
            loop {
                polls.tick().await;
                if let Err(e) = inner.refresh().await {
                    warn!("{:<12} --> periodic refresh failed: {}", "Coordinator", e);
                }
            }
        });
        self.track(ticker);
        self.track(poller);

        let handler: Arc<dyn LiveUpdateHandler> =
            Arc::new(PushHandler(Arc::clone(&self.inner)));
        match self.channel.lock() {
            Ok(mut channel) => channel.subscribe([self.inner.auction_id.as_str()], handler),
            Err(poisoned) => poisoned
                .into_inner()
                .subscribe([self.inner.auction_id.as_str()], handler),
        }
    }

    /// Cancels every task and closes the live channel. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.background.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if let Ok(mut channel) = self.channel.lock() {
            channel.unsubscribe();
        }
        self.inner.bidder_refresh.cancel();
        self.started.store(false, Ordering::Release);
        info!("{:<12} --> shut down id: {}", "Coordinator", self.inner.auction_id);
    }

    pub fn auction_id(&self) -> &str {
        &self.inner.auction_id
    }

    pub fn view(&self) -> AuctionView {
        self.inner.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuctionView> {
        self.inner.view.subscribe()
    }

    pub async fn tick(&self) {
        self.inner.tick().await;
    }

    /// `onRefresh`: immediate full refresh.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        self.inner.refresh().await
    }

    pub async fn place_bid(
        &self,
        amount: f64,
        confirm_high_bid: bool,
    ) -> Result<BidSuccess, BidError> {
        self.inner.place_bid(amount, confirm_high_bid).await
    }

    /// `onAcceptBid`: seller accepts `amount` from `bidder_id`.
    ///
    /// Allowed from any non-sold status, including before start and after end.
    pub async fn accept_bid(
        &self,
        bidder_id: &str,
        amount: i64,
    ) -> Result<ConfirmedSale, SaleError> {
        let sale = self.inner.accept_bid(bidder_id, amount).await?;

        let inner = Arc::clone(&self.inner);
        let delays = self.inner.config.sale_reconcile_delays.clone();
        self.track(tokio::spawn(async move {
            let mut waited = std::time::Duration::ZERO;
            for delay in delays {
                tokio::time::sleep(delay.saturating_sub(waited)).await;
                waited = delay;
                if let Err(e) = inner.refresh().await {
                    warn!("{:<12} --> post-sale refresh failed: {}", "Coordinator", e);
                }
            }
        }));
        Ok(sale)
    }

    /// `onContactBidder`: the bidder's `tel:` link, visible to the seller only.
    pub async fn contact_bidder(&self, bidder_id: &str) -> Option<String> {
        self.inner.contact_bidder(bidder_id).await
    }

    fn track(&self, task: JoinHandle<()>) {
        match self.background.lock() {
            Ok(mut tasks) => {
                tasks.retain(|task| !task.is_finished());
                tasks.push(task);
            }
            Err(_) => task.abort(),
        }
    }
}

impl Drop for AuctionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn placeholder_view() -> AuctionView {
    AuctionView {
        auction: Auction::default(),
        status: AuctionStatus::Live,
        current_price: 0,
        bid_count: 0,
        highest_bidder_id: None,
        bidders: Vec::new(),
        confirmed_sale: None,
        minimum_next_bid: 0,
        quick_bids: Vec::new(),
        seconds_remaining: None,
        viewer_is_seller: false,
        bid_pending: false,
    }
}

// endregion: --- Auction Coordinator
