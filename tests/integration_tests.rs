use async_trait::async_trait;
use auction_bidding_client::api::{
    AcceptSaleRequest, AuctionApi, BidResponse, EventSource, FrameStream, HttpAuctionApi,
    PlaceBidRequest,
};
use auction_bidding_client::auction::{Auction, AuctionStatus, ManualClock};
use auction_bidding_client::bidding::{aggregate, BidRecord, HighBidPrompt};
use auction_bidding_client::config::{ClientConfig, StreamSettings};
use auction_bidding_client::coordinator::{
    AuctionCoordinator, AuctionView, CoordinatorDeps, PageCallbacks, SalePrompt,
};
use auction_bidding_client::error::{ApiError, BidError, InactiveReason, SaleError};
use auction_bidding_client::live::reconnect_delay;
use auction_bidding_client::live::sse::SseFrame;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::channel::mpsc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

// region:    --- Fakes

/// In-memory marketplace recording every call.
#[derive(Default)]
struct FakeApi {
    auction: Mutex<Auction>,
    bids: Mutex<Vec<BidRecord>>,
    bid_responses: Mutex<VecDeque<BidResponse>>,
    sale_fails: AtomicBool,
    placed: Mutex<Vec<(i64, Option<bool>)>>,
    place_error: Mutex<Option<ApiError>>,
    bid_fetches: AtomicUsize,
    sale_calls: AtomicUsize,
    hold_sale: AtomicBool,
    sale_started: Notify,
    release_sale: Notify,
}

impl FakeApi {
    fn with_auction(auction: Auction) -> Self {
        Self {
            auction: Mutex::new(auction),
            ..Default::default()
        }
    }

    fn place_calls(&self) -> usize {
        self.placed.lock().unwrap().len()
    }
}

#[async_trait]
impl AuctionApi for FakeApi {
    async fn fetch_auction(&self, _auction_id: &str) -> Result<Auction, ApiError> {
        Ok(self.auction.lock().unwrap().clone())
    }

    async fn fetch_bids(&self, _auction_id: &str) -> Result<Vec<BidRecord>, ApiError> {
        self.bid_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.bids.lock().unwrap().clone())
    }

    async fn place_bid(
        &self,
        _auction_id: &str,
        request: &PlaceBidRequest,
    ) -> Result<BidResponse, ApiError> {
        self.placed
            .lock()
            .unwrap()
            .push((request.amount, request.confirm_high_bid));
        if let Some(e) = self.place_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self
            .bid_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BidResponse::Accepted { bid_id: None }))
    }

    async fn accept_sale(
        &self,
        _auction_id: &str,
        _request: &AcceptSaleRequest,
    ) -> Result<String, ApiError> {
        self.sale_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_sale.load(Ordering::SeqCst) {
            self.sale_started.notify_one();
            self.release_sale.notified().await;
        }
        if self.sale_fails.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("sale window closed".to_string()));
        }
        Ok("sale confirmed".to_string())
    }
}

/// Push source fed by the test; the first connection receives the frames.
struct PushSource {
    frames: Mutex<Option<mpsc::UnboundedReceiver<Result<SseFrame, ApiError>>>>,
    connects: Arc<AtomicUsize>,
}

impl PushSource {
    fn new() -> (Self, mpsc::UnboundedSender<Result<SseFrame, ApiError>>) {
        let (tx, rx) = mpsc::unbounded();
        (
            Self {
                frames: Mutex::new(Some(rx)),
                connects: Arc::default(),
            },
            tx,
        )
    }

    fn silent() -> Self {
        Self {
            frames: Mutex::new(None),
            connects: Arc::default(),
        }
    }
}

#[async_trait]
impl EventSource for PushSource {
    async fn connect(&self, _auction_ids: &str) -> Result<FrameStream, ApiError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.frames.lock().unwrap().take() {
            Some(rx) => Ok(Box::pin(rx)),
            None => Ok(Box::pin(futures::stream::pending::<Result<SseFrame, ApiError>>())),
        }
    }
}

#[derive(Default)]
struct PageRecorder {
    accept_high_bids: AtomicBool,
    hold_high_bid: AtomicBool,
    high_bid_prompted: Notify,
    release_high_bid: Notify,
    accept_sales: AtomicBool,
    login_prompts: AtomicUsize,
    successes: Mutex<Vec<i64>>,
    high_bid_prompts: Mutex<Vec<HighBidPrompt>>,
    sale_failures: Mutex<Vec<String>>,
    contacted: Mutex<Vec<String>>,
}

#[async_trait]
impl PageCallbacks for PageRecorder {
    fn on_require_login(&self) {
        self.login_prompts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_bid_success(&self, new_amount: i64) {
        self.successes.lock().unwrap().push(new_amount);
    }

    async fn confirm_high_bid(&self, prompt: &HighBidPrompt) -> bool {
        self.high_bid_prompts.lock().unwrap().push(prompt.clone());
        if self.hold_high_bid.load(Ordering::SeqCst) {
            self.high_bid_prompted.notify_one();
            self.release_high_bid.notified().await;
        }
        self.accept_high_bids.load(Ordering::SeqCst)
    }

    async fn confirm_sale(&self, _prompt: &SalePrompt) -> bool {
        self.accept_sales.load(Ordering::SeqCst)
    }

    fn on_sale_failed(&self, message: &str) {
        self.sale_failures.lock().unwrap().push(message.to_string());
    }

    fn on_contact_bidder(&self, phone: &str) {
        self.contacted.lock().unwrap().push(phone.to_string());
    }
}

// endregion: --- Fakes

// region:    --- Helpers

const SELLER: &str = "seller-1";
const BUYER: &str = "buyer-1";

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn live_auction(starting_price: i64) -> Auction {
    Auction {
        id: "a1".to_string(),
        starting_price,
        seller_id: SELLER.to_string(),
        start_time: Some(fixed_now() - Duration::hours(1)),
        end_time: Some(fixed_now() + Duration::hours(1)),
        ..Default::default()
    }
}

fn bid_history() -> Vec<BidRecord> {
    serde_json::from_value(json!([
        {"id": 1, "userId": "A", "amount": 5000, "timestamp": "2024-05-01T11:00:00Z",
         "bidder": {"id": "A", "name": "Ahmed", "phone": "+966 55 123 4567"}},
        {"id": 2, "userId": "B", "amount": "7000", "timestamp": "2024-05-01T11:10:00Z",
         "bidder": {"id": "B", "name": "Basma", "verified": true}},
        {"id": 3, "userId": "A", "amount": 6000, "timestamp": "2024-05-01T11:20:00Z",
         "bidder": {"id": "A", "name": "Ahmed", "phone": "+966 55 123 4567"}}
    ]))
    .unwrap()
}

struct Harness {
    api: Arc<FakeApi>,
    page: Arc<PageRecorder>,
    coordinator: AuctionCoordinator,
}

fn harness(auction: Auction, viewer: &str, events: PushSource) -> Harness {
    let api = Arc::new(FakeApi::with_auction(auction.clone()));
    let page = Arc::new(PageRecorder::default());
    let deps = CoordinatorDeps {
        api: api.clone(),
        events: Arc::new(events),
        clock: Arc::new(ManualClock::new(fixed_now())),
        callbacks: page.clone(),
        config: ClientConfig::default(),
    };
    let coordinator = AuctionCoordinator::new(deps, auction, Some(viewer.to_string()));
    Harness {
        api,
        page,
        coordinator,
    }
}

async fn wait_for(
    view: &mut watch::Receiver<AuctionView>,
    condition: impl Fn(&AuctionView) -> bool,
) -> AuctionView {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            {
                let current = view.borrow_and_update();
                if condition(&current) {
                    return current.clone();
                }
            }
            view.changed().await.expect("view sender dropped");
        }
    })
    .await
    .expect("view never reached the expected state")
}

fn bid_frame(auction_id: &str, current_bid: i64, bid_count: u32) -> Result<SseFrame, ApiError> {
    Ok(SseFrame {
        event: Some("bid_updated".to_string()),
        data: json!({
            "auctionId": auction_id,
            "currentBid": current_bid,
            "bidCount": bid_count,
            "highestBidderId": "B"
        })
        .to_string(),
    })
}

fn status_frame(auction_id: &str, status: &str) -> Result<SseFrame, ApiError> {
    Ok(SseFrame {
        event: Some("status_changed".to_string()),
        data: json!({"auctionId": auction_id, "status": status}).to_string(),
    })
}

async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(std::time::Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

// endregion: --- Helpers

// region:    --- Scenarios

/// Scenario A: a bid under the tiered increment never reaches the server.
#[tokio::test]
async fn bid_below_increment_is_rejected_locally() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());

    let result = h.coordinator.place_bid(10_100.0, false).await;

    match result {
        Err(BidError::TooLow {
            minimum_bid,
            min_increment,
            server_price,
        }) => {
            assert_eq!(minimum_bid, 10_250);
            assert_eq!(min_increment, 250);
            assert_eq!(server_price, None);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.api.place_calls(), 0);
    assert_eq!(h.coordinator.view().current_price, 10_000);
}

/// Scenario B: history collapses to one ranked entry per user.
#[tokio::test]
async fn bid_history_aggregates_per_bidder() {
    let bidders = aggregate(&bid_history(), fixed_now());

    assert_eq!(bidders.len(), 2);
    assert_eq!(bidders[0].user_id, "B");
    assert_eq!(bidders[0].highest_amount, 7_000);
    assert_eq!(bidders[0].total_bids, 1);
    assert_eq!(bidders[0].rank, 1);
    assert!(bidders[0].is_winning);
    assert_eq!(bidders[1].user_id, "A");
    assert_eq!(bidders[1].highest_amount, 6_000);
    assert_eq!(bidders[1].total_bids, 2);
    assert_eq!(bidders[1].rank, 2);
    assert!(!bidders[1].is_winning);

    assert_eq!(aggregate(&bid_history(), fixed_now()), bidders);

    let api = Arc::new(FakeApi::with_auction(live_auction(1_000)));
    *api.bids.lock().unwrap() = bid_history();
    let deps = CoordinatorDeps {
        api: api.clone(),
        events: Arc::new(PushSource::silent()),
        clock: Arc::new(ManualClock::new(fixed_now())),
        callbacks: Arc::new(PageRecorder::default()),
        config: ClientConfig::default(),
    };
    let coordinator = AuctionCoordinator::load(deps, "a1", Some(BUYER.to_string()))
        .await
        .unwrap();
    let view = coordinator.view();
    assert_eq!(view.bidders.len(), 2);
    assert_eq!(view.current_price, 7_000);
    assert_eq!(view.highest_bidder_id.as_deref(), Some("B"));
    assert_eq!(view.bid_count, 3);
}

/// Scenario C: push raises the price; a stale push never lowers it.
#[tokio::test]
async fn push_updates_are_monotonic() {
    let (source, frames) = PushSource::new();
    let mut auction = live_auction(5_000);
    auction.current_price = 7_000;
    let h = harness(auction, BUYER, source);
    let mut view = h.coordinator.watch();
    let _channel = h.coordinator.start();

    frames.unbounded_send(bid_frame("a1", 8_000, 5)).unwrap();
    let updated = wait_for(&mut view, |v| v.current_price == 8_000).await;
    assert_eq!(updated.bid_count, 5);
    assert_eq!(updated.highest_bidder_id.as_deref(), Some("B"));

    frames.unbounded_send(bid_frame("other", 50_000, 40)).unwrap();
    frames.unbounded_send(bid_frame("a1", 7_000, 9)).unwrap();
    let after_stale = wait_for(&mut view, |v| v.bid_count == 9).await;
    assert_eq!(after_stale.current_price, 8_000);

    h.coordinator.shutdown();
}

/// Scenario D: a confirmed sale survives a racing refresh that still says live.
#[tokio::test]
async fn confirmed_sale_is_never_reverted() {
    let h = harness(live_auction(5_000), SELLER, PushSource::silent());
    h.page.accept_sales.store(true, Ordering::SeqCst);

    let sale = h.coordinator.accept_bid("X", 9_000).await.unwrap();
    assert_eq!(sale.amount, 9_000);
    assert_eq!(sale.payment_deadline, fixed_now() + Duration::hours(24));

    let view = h.coordinator.view();
    assert_eq!(view.status, AuctionStatus::Sold);
    assert_eq!(view.current_price, 9_000);
    assert_eq!(view.confirmed_sale, Some(sale));

    h.api.auction.lock().unwrap().status = Some(AuctionStatus::Live);
    h.coordinator.refresh().await.unwrap();
    h.coordinator.tick().await;
    assert_eq!(h.coordinator.view().status, AuctionStatus::Sold);

    assert!(matches!(
        h.coordinator.accept_bid("Y", 9_500).await,
        Err(SaleError::AlreadySold)
    ));
    assert_eq!(h.api.sale_calls.load(Ordering::SeqCst), 1);
}

/// Scenario E: bidding before start is refused without a network call.
#[tokio::test]
async fn bid_before_start_is_rejected_locally() {
    let mut auction = live_auction(10_000);
    auction.start_time = Some(fixed_now() + Duration::hours(2));
    auction.end_time = Some(fixed_now() + Duration::hours(26));
    let h = harness(auction, BUYER, PushSource::silent());
    assert_eq!(h.coordinator.view().status, AuctionStatus::Upcoming);

    let err = h.coordinator.place_bid(20_000.0, false).await.unwrap_err();

    assert_eq!(err, BidError::AuctionNotActive(InactiveReason::NotStarted));
    assert!(err.to_string().contains("لم يبدأ بعد"));
    assert_eq!(h.api.place_calls(), 0);
}

// endregion: --- Scenarios

// region:    --- Bid And Sale Flows

#[tokio::test]
async fn high_bid_confirmation_resubmits_once() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());
    h.page.accept_high_bids.store(true, Ordering::SeqCst);
    h.api
        .bid_responses
        .lock()
        .unwrap()
        .push_back(BidResponse::ConfirmationRequired {
            recommended_min: Some(10_250),
            min_increment: Some(250),
            message: None,
        });

    let success = h.coordinator.place_bid(40_000.0, false).await.unwrap();

    assert_eq!(success.new_amount, 40_000);
    assert_eq!(
        *h.api.placed.lock().unwrap(),
        vec![(40_000, None), (40_000, Some(true))]
    );
    assert_eq!(h.page.high_bid_prompts.lock().unwrap().len(), 1);
    assert_eq!(*h.page.successes.lock().unwrap(), vec![40_000]);
    let view = h.coordinator.view();
    assert_eq!(view.current_price, 40_000);
    assert_eq!(view.bid_count, 1);
    assert_eq!(view.highest_bidder_id.as_deref(), Some(BUYER));
}

#[tokio::test]
async fn declined_high_bid_is_not_resubmitted() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());
    h.api
        .bid_responses
        .lock()
        .unwrap()
        .push_back(BidResponse::ConfirmationRequired {
            recommended_min: None,
            min_increment: None,
            message: None,
        });

    let err = h.coordinator.place_bid(40_000.0, false).await.unwrap_err();

    assert_eq!(err, BidError::HighBidDeclined);
    assert_eq!(h.api.place_calls(), 1);
    assert_eq!(h.coordinator.view().current_price, 10_000);
}

#[tokio::test]
async fn server_too_low_raises_local_price() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());
    h.api
        .bid_responses
        .lock()
        .unwrap()
        .push_back(BidResponse::TooLow {
            recommended_min: Some(12_750),
            min_increment: Some(250),
            message: None,
        });

    let err = h.coordinator.place_bid(10_500.0, false).await.unwrap_err();

    assert!(matches!(
        err,
        BidError::TooLow {
            server_price: Some(12_500),
            ..
        }
    ));
    assert_eq!(h.coordinator.view().current_price, 12_500);
}

#[tokio::test]
async fn seller_and_anonymous_viewers_cannot_bid() {
    let seller = harness(live_auction(10_000), SELLER, PushSource::silent());
    assert_eq!(
        seller.coordinator.place_bid(20_000.0, false).await.unwrap_err(),
        BidError::OwnerCannotBid
    );

    let api = Arc::new(FakeApi::with_auction(live_auction(10_000)));
    let page = Arc::new(PageRecorder::default());
    let deps = CoordinatorDeps {
        api: api.clone(),
        events: Arc::new(PushSource::silent()),
        clock: Arc::new(ManualClock::new(fixed_now())),
        callbacks: page.clone(),
        config: ClientConfig::default(),
    };
    let anonymous = AuctionCoordinator::new(deps, live_auction(10_000), None);
    assert_eq!(
        anonymous.place_bid(20_000.0, false).await.unwrap_err(),
        BidError::LoginRequired
    );
    assert_eq!(page.login_prompts.load(Ordering::SeqCst), 1);
    assert_eq!(api.place_calls(), 0);
}

#[tokio::test]
async fn failed_sale_restores_previous_status() {
    let h = harness(live_auction(5_000), SELLER, PushSource::silent());
    h.page.accept_sales.store(true, Ordering::SeqCst);
    h.api.sale_fails.store(true, Ordering::SeqCst);

    let result = h.coordinator.accept_bid("X", 9_000).await;

    assert!(matches!(result, Err(SaleError::RequestFailed(_))));
    let view = h.coordinator.view();
    assert_eq!(view.status, AuctionStatus::Live);
    assert_eq!(view.confirmed_sale, None);
    assert_eq!(h.page.sale_failures.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sale_requires_seller_and_confirmation() {
    let buyer = harness(live_auction(5_000), BUYER, PushSource::silent());
    assert!(matches!(
        buyer.coordinator.accept_bid("X", 9_000).await,
        Err(SaleError::NotSeller)
    ));
    assert_eq!(buyer.api.sale_calls.load(Ordering::SeqCst), 0);

    let seller = harness(live_auction(5_000), SELLER, PushSource::silent());
    assert!(matches!(
        seller.coordinator.accept_bid("X", 9_000).await,
        Err(SaleError::Cancelled)
    ));
    assert_eq!(seller.coordinator.view().status, AuctionStatus::Live);
    assert_eq!(seller.api.sale_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sale_is_allowed_after_the_auction_ended() {
    let mut auction = live_auction(5_000);
    auction.end_time = Some(fixed_now() - Duration::minutes(5));
    let h = harness(auction, SELLER, PushSource::silent());
    h.page.accept_sales.store(true, Ordering::SeqCst);
    assert_eq!(h.coordinator.view().status, AuctionStatus::Ended);

    h.coordinator.accept_bid("X", 7_000).await.unwrap();

    assert_eq!(h.coordinator.view().status, AuctionStatus::Sold);
}

#[tokio::test]
async fn only_the_seller_can_contact_bidders() {
    let seller = harness(live_auction(1_000), SELLER, PushSource::silent());
    *seller.api.bids.lock().unwrap() = bid_history();
    seller.coordinator.refresh().await.unwrap();

    assert_eq!(
        seller.coordinator.contact_bidder("A").await.as_deref(),
        Some("tel:+966551234567")
    );
    assert_eq!(seller.coordinator.contact_bidder("B").await, None);
    assert_eq!(
        *seller.page.contacted.lock().unwrap(),
        vec!["+966 55 123 4567".to_string()]
    );

    let buyer = harness(live_auction(1_000), BUYER, PushSource::silent());
    *buyer.api.bids.lock().unwrap() = bid_history();
    buyer.coordinator.refresh().await.unwrap();
    assert_eq!(buyer.coordinator.contact_bidder("A").await, None);
}

#[tokio::test]
async fn view_shows_pending_bid_and_overlapping_bid_is_refused() {
    let h = Arc::new(harness(live_auction(10_000), BUYER, PushSource::silent()));
    h.page.accept_high_bids.store(true, Ordering::SeqCst);
    h.page.hold_high_bid.store(true, Ordering::SeqCst);
    h.api
        .bid_responses
        .lock()
        .unwrap()
        .push_back(BidResponse::ConfirmationRequired {
            recommended_min: None,
            min_increment: None,
            message: None,
        });
    let mut view = h.coordinator.watch();
    assert!(!view.borrow_and_update().bid_pending);

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.coordinator.place_bid(40_000.0, false).await })
    };
    within(h.page.high_bid_prompted.notified()).await;

    assert!(h.coordinator.view().bid_pending);
    assert!(view.has_changed().unwrap());

    let second = h.coordinator.place_bid(50_000.0, false).await;
    assert_eq!(second, Err(BidError::SubmissionPending));
    assert_eq!(h.api.place_calls(), 1);
    assert!(h.coordinator.view().bid_pending);

    h.page.release_high_bid.notify_one();
    let first = within(first).await.unwrap();

    assert_eq!(first.map(|success| success.new_amount), Ok(40_000));
    assert_eq!(h.api.place_calls(), 2);
    let settled = h.coordinator.view();
    assert!(!settled.bid_pending);
    assert_eq!(settled.current_price, 40_000);
}

#[tokio::test]
async fn unauthorized_bid_asks_for_login_and_keeps_price() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());
    *h.api.place_error.lock().unwrap() = Some(ApiError::Unauthorized);

    let err = h.coordinator.place_bid(12_000.0, false).await.unwrap_err();

    assert_eq!(err, BidError::LoginRequired);
    assert!(!err.is_displayed());
    assert_eq!(h.page.login_prompts.load(Ordering::SeqCst), 1);
    assert!(h.page.successes.lock().unwrap().is_empty());

    h.api
        .bid_responses
        .lock()
        .unwrap()
        .push_back(BidResponse::AuthenticationRequired);
    let err = h.coordinator.place_bid(12_000.0, false).await.unwrap_err();

    assert_eq!(err, BidError::LoginRequired);
    assert_eq!(h.page.login_prompts.load(Ordering::SeqCst), 2);
    let view = h.coordinator.view();
    assert_eq!(view.current_price, 10_000);
    assert_eq!(view.bid_count, 0);
    assert!(!view.bid_pending);
}

#[tokio::test]
async fn transport_failure_reports_generic_network_error() {
    let h = harness(live_auction(10_000), BUYER, PushSource::silent());
    *h.api.place_error.lock().unwrap() = Some(ApiError::Status(
        reqwest::StatusCode::BAD_GATEWAY,
        "upstream unavailable".to_string(),
    ));

    let err = h.coordinator.place_bid(12_000.0, false).await.unwrap_err();

    assert_eq!(err, BidError::Network);
    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_eq!(err.to_string(), "حدثت مشكلة في الاتصال، يرجى المحاولة مرة أخرى");
    assert_eq!(h.coordinator.view().current_price, 10_000);
    assert!(!h.coordinator.view().bid_pending);
}

#[tokio::test]
async fn stale_status_push_never_leaves_sold() {
    let (source, frames) = PushSource::new();
    let h = harness(live_auction(5_000), BUYER, source);
    let mut view = h.coordinator.watch();
    let _channel = h.coordinator.start();

    frames.unbounded_send(status_frame("a1", "SOLD")).unwrap();
    wait_for(&mut view, |v| v.status == AuctionStatus::Sold).await;

    frames.unbounded_send(status_frame("a1", "live")).unwrap();
    frames.unbounded_send(status_frame("a1", "upcoming")).unwrap();
    frames.unbounded_send(bid_frame("a1", 5_000, 7)).unwrap();
    let after = wait_for(&mut view, |v| v.bid_count == 7).await;
    assert_eq!(after.status, AuctionStatus::Sold);

    h.coordinator.tick().await;
    assert_eq!(h.coordinator.view().status, AuctionStatus::Sold);
    h.coordinator.shutdown();
}

#[tokio::test]
async fn server_sold_push_during_failed_sale_keeps_sold() {
    let (source, frames) = PushSource::new();
    let h = Arc::new(harness(live_auction(5_000), SELLER, source));
    h.page.accept_sales.store(true, Ordering::SeqCst);
    h.api.sale_fails.store(true, Ordering::SeqCst);
    h.api.hold_sale.store(true, Ordering::SeqCst);
    let mut view = h.coordinator.watch();
    let _channel = h.coordinator.start();

    let sale = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.coordinator.accept_bid("X", 9_000).await })
    };
    within(h.api.sale_started.notified()).await;
    assert_eq!(h.coordinator.view().status, AuctionStatus::Sold);

    frames.unbounded_send(status_frame("a1", "sold")).unwrap();
    frames.unbounded_send(bid_frame("a1", 5_000, 3)).unwrap();
    wait_for(&mut view, |v| v.bid_count == 3).await;

    h.api.release_sale.notify_one();
    let result = within(sale).await.unwrap();

    assert!(matches!(result, Err(SaleError::RequestFailed(_))));
    let settled = h.coordinator.view();
    assert_eq!(settled.status, AuctionStatus::Sold);
    assert_eq!(settled.confirmed_sale, None);
    assert_eq!(h.page.sale_failures.lock().unwrap().len(), 1);
    h.coordinator.shutdown();
}

#[tokio::test]
async fn push_burst_triggers_one_bidder_refetch() {
    let (source, frames) = PushSource::new();
    let h = harness(live_auction(5_000), BUYER, source);
    let mut view = h.coordinator.watch();
    let _channel = h.coordinator.start();

    for step in 1..=5u32 {
        let price = 5_000 + i64::from(step) * 500;
        frames.unbounded_send(bid_frame("a1", price, step)).unwrap();
    }
    wait_for(&mut view, |v| v.bid_count == 5).await;
    assert_eq!(h.api.bid_fetches.load(Ordering::SeqCst), 0);

    tokio::time::sleep(std::time::Duration::from_millis(900)).await;
    assert_eq!(h.api.bid_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.coordinator.view().current_price, 7_500);
    h.coordinator.shutdown();
}

#[tokio::test]
async fn second_start_does_not_spawn_more_sources() {
    let (source, frames) = PushSource::new();
    let connects = Arc::clone(&source.connects);
    let h = harness(live_auction(5_000), BUYER, source);
    let mut view = h.coordinator.watch();
    let _first = h.coordinator.start();
    let _second = h.coordinator.start();

    frames.unbounded_send(bid_frame("a1", 6_000, 1)).unwrap();
    let updated = wait_for(&mut view, |v| v.current_price == 6_000).await;
    assert_eq!(updated.bid_count, 1);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    h.coordinator.shutdown();
    let _restarted = h.coordinator.start();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    h.coordinator.shutdown();
}

#[test]
fn reconnect_delay_stays_within_bounds() {
    let settings = StreamSettings::default();
    for attempt in 0..40 {
        for jitter_ms in [0, 200, 400] {
            let jitter = std::time::Duration::from_millis(jitter_ms);
            let delay = reconnect_delay(&settings, attempt, jitter);
            assert!(delay >= std::time::Duration::from_millis(800));
            assert!(delay <= std::time::Duration::from_millis(30_400));
        }
    }
}

// endregion: --- Bid And Sale Flows

// region:    --- Http Round Trip

mod http {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::sse::{Event, Sse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    async fn get_auction(Path(id): Path<String>) -> Json<Value> {
        Json(json!({
            "success": true,
            "data": {
                "id": id,
                "startingPrice": "10000",
                "currentPrice": 12000,
                "minIncrement": 500,
                "startDate": "2024-05-01T11:00:00Z",
                "endDate": "2024-05-01T13:00:00Z",
                "status": "active",
                "sellerId": 77,
                "bidCount": 3
            }
        }))
    }

    async fn get_bids() -> Json<Value> {
        Json(json!({
            "success": true,
            "data": [
                {"id": 10, "userId": 5, "amount": 12000, "timestamp": 1714561200000_i64,
                 "bidder": {"id": 5, "name": "Omar"}}
            ]
        }))
    }

    async fn post_bid(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let amount = body.get("amount").and_then(Value::as_i64).unwrap_or_default();
        if amount < 13_000 {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "BID_TOO_LOW",
                    "recommendedMin": 13000,
                    "minIncrement": 500,
                    "message": "bid too low"
                })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"success": true, "data": {"bidId": 99}})),
        )
    }

    async fn accept_sale(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "success": true,
            "message": format!("sold to {}", body["bidderId"].as_str().unwrap_or_default())
        }))
    }

    async fn stream() -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
        let events = vec![
            Ok(Event::default().event("ping").data("{}")),
            Ok(Event::default().event("bid_updated").data(
                json!({"auctionId": "a1", "currentBid": 15000, "bidCount": 4, "highestBidderId": 8})
                    .to_string(),
            )),
        ];
        Sse::new(futures::StreamExt::chain(
            futures::stream::iter(events),
            futures::stream::pending(),
        ))
    }

    async fn serve() -> ClientConfig {
        let routes = Router::new()
            .route("/auctions/stream", get(stream))
            .route("/auctions/:id", get(get_auction))
            .route("/auctions/:id/bid", get(get_bids).post(post_bid))
            .route("/auctions/:id/accept-sale", post(accept_sale));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes.into_make_service()).await.unwrap();
        });
        ClientConfig {
            api_base_url: format!("http://{addr}"),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn http_client_speaks_the_marketplace_contracts() {
        let config = serve().await;
        let api = HttpAuctionApi::new(&config);

        let auction = api.fetch_auction("a1").await.unwrap();
        assert_eq!(auction.starting_price, 10_000);
        assert_eq!(auction.min_bid_increment, Some(500));
        assert_eq!(auction.status, Some(AuctionStatus::Live));
        assert_eq!(auction.seller_id, "77");

        let bids = api.fetch_bids("a1").await.unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].user_id, "5");
        assert!(bids[0].timestamp.is_some());

        let low = PlaceBidRequest {
            user_id: "5".to_string(),
            amount: 12_500,
            confirm_high_bid: None,
        };
        assert_eq!(
            api.place_bid("a1", &low).await.unwrap(),
            BidResponse::TooLow {
                recommended_min: Some(13_000),
                min_increment: Some(500),
                message: Some("bid too low".to_string()),
            }
        );
        let ok = PlaceBidRequest {
            amount: 13_000,
            ..low
        };
        assert_eq!(
            api.place_bid("a1", &ok).await.unwrap(),
            BidResponse::Accepted {
                bid_id: Some("99".to_string())
            }
        );

        let message = api
            .accept_sale(
                "a1",
                &AcceptSaleRequest {
                    bidder_id: "5".to_string(),
                    amount: 13_000,
                    reason: "seller accepted bid".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(message, "sold to 5");
    }

    #[tokio::test]
    async fn coordinator_follows_the_live_stream() {
        let config = serve().await;
        let api = Arc::new(HttpAuctionApi::new(&config));
        let deps = CoordinatorDeps {
            api: api.clone(),
            events: api,
            clock: Arc::new(ManualClock::new(fixed_now())),
            callbacks: Arc::new(PageRecorder::default()),
            config,
        };

        let coordinator = AuctionCoordinator::load(deps, "a1", Some("5".to_string()))
            .await
            .unwrap();
        assert_eq!(coordinator.view().current_price, 12_000);
        assert_eq!(coordinator.view().minimum_next_bid, 12_500);

        let mut view = coordinator.watch();
        let mut channel = coordinator.start();
        let live = wait_for(&mut view, |v| v.current_price == 15_000).await;
        assert_eq!(live.bid_count, 4);
        assert_eq!(live.highest_bidder_id.as_deref(), Some("8"));
        assert!(channel.borrow_and_update().connected);

        coordinator.shutdown();
        assert!(!channel.borrow().connected);
    }
}

// endregion: --- Http Round Trip
