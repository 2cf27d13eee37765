// region:    --- Imports
use crate::bidding::increment::BiddingRules;
use std::time::Duration;

// endregion: --- Imports

// region:    --- Stream Settings

/// Timing of the live update channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// How often the idle watchdog looks at the connection.
    pub watchdog_interval: Duration,
    /// Silence after which a nominally open connection is considered dead.
    pub idle_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_floor: Duration,
    /// Upper bound (inclusive) of the random jitter added to each backoff.
    pub backoff_jitter: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(30_000),
            backoff_floor: Duration::from_millis(800),
            backoff_jitter: Duration::from_millis(400),
        }
    }
}

// endregion: --- Stream Settings

// region:    --- Client Config

/// Everything an auction page needs to talk to the marketplace.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    /// Full refresh of auction data and bid history.
    pub poll_interval: Duration,
    /// Resolver tick.
    pub tick_interval: Duration,
    /// Coalescing window for bidder-list refetches triggered by push events.
    pub bidder_refresh_debounce: Duration,
    /// Background refreshes after a confirmed sale.
    pub sale_reconcile_delays: Vec<Duration>,
    /// Window the buyer has to pay after a sale is confirmed.
    pub payment_window: chrono::Duration,
    pub stream: StreamSettings,
    pub rules: BiddingRules,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            poll_interval: Duration::from_secs(20),
            tick_interval: Duration::from_secs(1),
            bidder_refresh_debounce: Duration::from_millis(500),
            sale_reconcile_delays: vec![Duration::from_millis(1_500), Duration::from_millis(5_000)],
            payment_window: chrono::Duration::hours(24),
            stream: StreamSettings::default(),
            rules: BiddingRules::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `MARKETPLACE_API_URL`, `MARKETPLACE_AUTH_TOKEN`
    /// and `MARKETPLACE_POLL_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_base_url =
            std::env::var("MARKETPLACE_API_URL").unwrap_or_else(|_| defaults.api_base_url.clone());
        let auth_token = std::env::var("MARKETPLACE_AUTH_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let poll_interval = std::env::var("MARKETPLACE_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        Self {
            api_base_url,
            auth_token,
            poll_interval,
            ..defaults
        }
    }
}

// endregion: --- Client Config
