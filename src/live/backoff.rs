use crate::config::StreamSettings;
use rand::Rng;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (0-based):
/// `max(floor, min(cap, base * 2^attempt) + jitter)`.
pub fn reconnect_delay(settings: &StreamSettings, attempt: u32, jitter: Duration) -> Duration {
    let base = settings.backoff_base.as_millis() as u64;
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let capped = base
        .saturating_mul(factor)
        .min(settings.backoff_cap.as_millis() as u64);
    let delay = capped.saturating_add(jitter.as_millis() as u64);
    Duration::from_millis(delay.max(settings.backoff_floor.as_millis() as u64))
}

/// Uniform jitter in `0..=max`.
pub fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
