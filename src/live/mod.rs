//! Long-lived server-push subscription for a set of auctions.
//!
//! One connection per id set. The connection is re-established with jittered
//! exponential backoff after errors, server closes, or 60 s of silence.
// region:    --- Imports
use crate::api::{EventSource, FrameStream};
use crate::auction::events::{BidUpdate, LiveEvent, StatusChange};
use crate::auction::Clock;
use crate::config::StreamSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sse::SseFrame;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

pub mod backoff;
pub mod sse;

pub use backoff::{random_jitter, reconnect_delay};

// endregion: --- Imports

// region:    --- Types

/// Receiver of decoded push events.
#[async_trait]
pub trait LiveUpdateHandler: Send + Sync {
    async fn on_bid(&self, update: BidUpdate);

    async fn on_status(&self, change: StatusChange);
}

/// What subscribers can observe about the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub connected: bool,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Sorted, de-duplicated, comma-joined ids plus the enabled flag.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubscriptionKey {
    ids: String,
    enabled: bool,
}

impl SubscriptionKey {
    fn new<I, S>(ids: I, enabled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: BTreeSet<String> = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self {
            ids: ids.into_iter().collect::<Vec<_>>().join(","),
            enabled,
        }
    }
}

type HandlerSlot = Arc<Mutex<Option<Arc<dyn LiveUpdateHandler>>>>;

// endregion: --- Types

// region:    --- Live Update Channel

pub struct LiveUpdateChannel {
    source: Arc<dyn EventSource>,
    clock: Arc<dyn Clock>,
    settings: StreamSettings,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ChannelState>>,
    key: Option<SubscriptionKey>,
    task: Option<JoinHandle<()>>,
}

impl LiveUpdateChannel {
    pub fn new(
        source: Arc<dyn EventSource>,
        clock: Arc<dyn Clock>,
        settings: StreamSettings,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::default());
        Self {
            source,
            clock,
            settings,
            handler: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
            key: None,
            task: None,
        }
    }

    /// Installs `handler` and connects to the given auctions.
    pub fn subscribe<I, S>(
        &mut self,
        auction_ids: I,
        handler: Arc<dyn LiveUpdateHandler>,
    ) -> watch::Receiver<ChannelState>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
        self.update(auction_ids, true);
        self.watch()
    }

    /// Re-keys the subscription. Returns `true` when the connection was torn down
    /// and, if enabled, re-established; an unchanged key is a no-op.
    pub fn update<I, S>(&mut self, auction_ids: I, enabled: bool) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = SubscriptionKey::new(auction_ids, enabled);
        if self.key.as_ref() == Some(&key) {
            return false;
        }

        self.teardown();
        if key.enabled && !key.ids.is_empty() {
            info!("{:<12} --> subscribe ids={}", "Channel", key.ids);
            let stream = StreamTask {
                source: Arc::clone(&self.source),
                clock: Arc::clone(&self.clock),
                settings: self.settings.clone(),
                handler: Arc::clone(&self.handler),
                state: Arc::clone(&self.state),
                ids: key.ids.clone(),
            };
            self.task = Some(tokio::spawn(stream.run()));
        }
        self.key = Some(key);
        true
    }

    /// Closes the connection and stops reconnecting. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        self.teardown();
        self.key = None;
    }

    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("{:<12} --> connection closed", "Channel");
        }
        self.state.send_modify(|state| state.connected = false);
    }
}

impl Drop for LiveUpdateChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}

// endregion: --- Live Update Channel

// region:    --- Stream Task

struct StreamTask {
    source: Arc<dyn EventSource>,
    clock: Arc<dyn Clock>,
    settings: StreamSettings,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ChannelState>>,
    ids: String,
}

impl StreamTask {
    async fn run(self) {
        let mut attempt: u32 = 0;
        loop {
            match self.source.connect(&self.ids).await {
                Ok(stream) => {
                    info!("{:<12} --> connected ids={}", "Channel", self.ids);
                    self.state.send_modify(|state| state.connected = true);
                    attempt = 0;
                    self.pump(stream).await;
                    self.state.send_modify(|state| state.connected = false);
                }
                Err(e) => {
                    warn!("{:<12} --> connect failed: {}", "Channel", e);
                    self.state.send_modify(|state| state.connected = false);
                }
            }

            let delay = reconnect_delay(
                &self.settings,
                attempt,
                random_jitter(self.settings.backoff_jitter),
            );
            attempt = attempt.saturating_add(1);
            info!(
                "{:<12} --> reconnect in {}ms (attempt {})",
                "Channel",
                delay.as_millis(),
                attempt
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Delivers frames until the stream errors, closes, or goes idle.
    async fn pump(&self, mut stream: FrameStream) {
        let mut last_activity = Instant::now();
        let mut watchdog = interval_at(
            Instant::now() + self.settings.watchdog_interval,
            self.settings.watchdog_interval,
        );

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(frame)) => {
                        last_activity = Instant::now();
                        self.dispatch(frame).await;
                    }
                    Some(Err(e)) => {
                        warn!("{:<12} --> stream error: {}", "Channel", e);
                        return;
                    }
                    None => {
                        info!("{:<12} --> stream closed by server", "Channel");
                        return;
                    }
                },
                _ = watchdog.tick() => {
                    if last_activity.elapsed() > self.settings.idle_timeout {
                        warn!(
                            "{:<12} --> no events for {}s, forcing reconnect",
                            "Channel",
                            last_activity.elapsed().as_secs()
                        );
                        return;
                    }
                }
            }
        }
    }

    async fn dispatch(&self, frame: SseFrame) {
        let now = self.clock.now();
        self.state
            .send_modify(|state| state.last_event_at = Some(now));

        let Some(event) = LiveEvent::parse(frame.event.as_deref(), &frame.data) else {
            debug!(
                "{:<12} --> dropped malformed {:?} payload",
                "Channel", frame.event
            );
            return;
        };

        let handler = match self.handler.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        let Some(handler) = handler else {
            return;
        };

        match event {
            LiveEvent::BidUpdated(update) => handler.on_bid(update).await,
            LiveEvent::StatusChanged(change) => handler.on_status(change).await,
            LiveEvent::Heartbeat => {}
        }
    }
}

// endregion: --- Stream Task
