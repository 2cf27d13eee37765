//! Bid submission: local validation, high-bid confirmation and server reconciliation.
// region:    --- Imports
use super::increment::BiddingRules;
use crate::api::{AuctionApi, BidResponse, PlaceBidRequest};
use crate::auction::AuctionStatus;
use crate::error::{ApiError, BidError, InactiveReason};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Commands

/// Snapshot of the auction as the bid control sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidContext {
    pub auction_id: String,
    pub seller_id: String,
    pub user_id: Option<String>,
    pub status: AuctionStatus,
    pub current_price: i64,
    pub min_increment_override: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidSuccess {
    pub new_amount: i64,
    pub bid_id: Option<String>,
}

/// Shown before a bid far above the current price is resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighBidPrompt {
    pub amount: i64,
    pub recommended_min: Option<i64>,
    pub min_increment: Option<i64>,
    pub message: Option<String>,
}

/// Host hooks for the bidding control.
#[async_trait]
pub trait BidCallbacks: Send + Sync {
    fn on_require_login(&self);

    fn on_bid_success(&self, new_amount: i64);

    /// Resolves `true` only on explicit user confirmation.
    async fn confirm_high_bid(&self, prompt: &HighBidPrompt) -> bool;

    /// A submission started (`true`) or finished (`false`).
    fn on_pending_changed(&self, _pending: bool) {}
}

/// Client-side checks run before any network call. Returns the whole-unit amount.
pub fn validate_bid(rules: &BiddingRules, ctx: &BidContext, amount: f64) -> Result<i64, BidError> {
    if ctx.user_id.as_deref() == Some(ctx.seller_id.as_str()) && !ctx.seller_id.is_empty() {
        return Err(BidError::OwnerCannotBid);
    }
    if let Some(reason) = InactiveReason::from_status(ctx.status) {
        return Err(BidError::AuctionNotActive(reason));
    }
    if ctx.user_id.as_deref().map_or(true, |user| user.trim().is_empty()) {
        return Err(BidError::LoginRequired);
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(BidError::InvalidAmount);
    }
    let amount = amount.round() as i64;
    if amount <= 0 {
        return Err(BidError::InvalidAmount);
    }

    let min_increment =
        rules.effective_min_increment(ctx.current_price, ctx.min_increment_override);
    if amount.saturating_sub(ctx.current_price) < min_increment {
        return Err(BidError::TooLow {
            minimum_bid: ctx.current_price.saturating_add(min_increment),
            min_increment,
            server_price: None,
        });
    }
    Ok(amount)
}

/// Clears the in-flight flag when the submission finishes, however it finishes.
struct PendingGuard<'a> {
    flag: &'a AtomicBool,
    callbacks: &'a dyn BidCallbacks,
}

impl<'a> PendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool, callbacks: &'a dyn BidCallbacks) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        callbacks.on_pending_changed(true);
        Some(Self { flag, callbacks })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.callbacks.on_pending_changed(false);
    }
}

pub struct BidController {
    api: Arc<dyn AuctionApi>,
    rules: BiddingRules,
    callbacks: Arc<dyn BidCallbacks>,
    pending: AtomicBool,
}

impl BidController {
    pub fn new(
        api: Arc<dyn AuctionApi>,
        rules: BiddingRules,
        callbacks: Arc<dyn BidCallbacks>,
    ) -> Self {
        Self {
            api,
            rules,
            callbacks,
            pending: AtomicBool::new(false),
        }
    }

    pub fn rules(&self) -> &BiddingRules {
        &self.rules
    }

    /// Whether a submission is in flight; the bid action stays disabled meanwhile.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Validates and submits one bid.
    ///
    /// Never propagates transport failures: every path ends in a `BidError`.
    pub async fn submit(
        &self,
        ctx: &BidContext,
        amount: f64,
        confirm_high_bid: bool,
    ) -> Result<BidSuccess, BidError> {
        let Some(_pending) = PendingGuard::acquire(&self.pending, self.callbacks.as_ref()) else {
            warn!("{:<12} --> submission already in flight", "Bidding");
            return Err(BidError::SubmissionPending);
        };

        let amount = match validate_bid(&self.rules, ctx, amount) {
            Ok(amount) => amount,
            Err(BidError::LoginRequired) => {
                self.callbacks.on_require_login();
                return Err(BidError::LoginRequired);
            }
            Err(e) => {
                info!("{:<12} --> rejected locally: {}", "Bidding", e.code());
                return Err(e);
            }
        };
        let user_id = ctx.user_id.clone().unwrap_or_default();

        let mut confirmed = confirm_high_bid;
        loop {
            let request = PlaceBidRequest {
                user_id: user_id.clone(),
                amount,
                confirm_high_bid: confirmed.then_some(true),
            };

            let response = match self.api.place_bid(&ctx.auction_id, &request).await {
                Ok(response) => response,
                Err(ApiError::Unauthorized) => BidResponse::AuthenticationRequired,
                Err(e) => {
                    error!("{:<12} --> bid request failed: {}", "Bidding", e);
                    return Err(BidError::Network);
                }
            };

            match response {
                BidResponse::Accepted { bid_id } => {
                    info!(
                        "{:<12} --> bid accepted id: {}, amount: {}",
                        "Bidding", ctx.auction_id, amount
                    );
                    self.callbacks.on_bid_success(amount);
                    return Ok(BidSuccess {
                        new_amount: amount,
                        bid_id,
                    });
                }
                BidResponse::AuthenticationRequired => {
                    self.callbacks.on_require_login();
                    return Err(BidError::LoginRequired);
                }
                BidResponse::ConfirmationRequired {
                    recommended_min,
                    min_increment,
                    message,
                } if !confirmed => {
                    let prompt = HighBidPrompt {
                        amount,
                        recommended_min,
                        min_increment,
                        message,
                    };
                    if !self.callbacks.confirm_high_bid(&prompt).await {
                        info!("{:<12} --> high bid declined by user", "Bidding");
                        return Err(BidError::HighBidDeclined);
                    }
                    confirmed = true;
                }
                BidResponse::ConfirmationRequired { message, .. } => {
                    return Err(BidError::Rejected(
                        message.unwrap_or_else(|| BidError::HighBidDeclined.to_string()),
                    ));
                }
                BidResponse::TooLow {
                    recommended_min,
                    min_increment,
                    ..
                } => {
                    return Err(self.too_low(ctx, recommended_min, min_increment));
                }
                BidResponse::Rejected { message } => {
                    warn!("{:<12} --> bid rejected: {:?}", "Bidding", message);
                    return Err(BidError::Rejected(
                        message.unwrap_or_else(|| "تعذر تقديم المزايدة".to_string()),
                    ));
                }
            }
        }
    }

    /// Builds the `BID_TOO_LOW` outcome, carrying the server's implied price when it
    /// is ahead of ours.
    fn too_low(
        &self,
        ctx: &BidContext,
        recommended_min: Option<i64>,
        min_increment: Option<i64>,
    ) -> BidError {
        let implied = match (recommended_min, min_increment) {
            (Some(minimum), Some(increment)) if minimum > increment => Some(minimum - increment),
            _ => None,
        };
        let server_price = implied.filter(|price| *price > ctx.current_price);
        let base_price = server_price.unwrap_or(ctx.current_price);

        let increment = min_increment
            .map(|increment| increment.max(self.rules.min_bid_floor))
            .unwrap_or_else(|| {
                self.rules
                    .effective_min_increment(base_price, ctx.min_increment_override)
            });
        let minimum_bid = recommended_min.unwrap_or_else(|| base_price.saturating_add(increment));

        if let Some(price) = server_price {
            info!(
                "{:<12} --> local price {} behind server {}, reconciling",
                "Bidding", ctx.current_price, price
            );
        }
        BidError::TooLow {
            minimum_bid,
            min_increment: increment,
            server_price,
        }
    }
}

// endregion: --- Commands
