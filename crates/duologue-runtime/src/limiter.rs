//! Per-vendor token-bucket rate limiting, shared by every conversation in
//! the process that talks to the same vendor.
//!
//! Two dimensions refill continuously: requests per minute and tokens per
//! minute. Admission is FIFO; a waiter holds the admission mutex for its
//! whole wait so later callers cannot jump the queue.

use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use duologue_types::Vendor;

use crate::config::RateLimitSettings;

/// Maximum random addition to a computed sleep
const JITTER_MS: u64 = 100;

struct BucketState {
    request_allowance: f64,
    token_allowance: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    vendor: String,
    enabled: bool,
    requests_per_minute: f64,
    tokens_per_minute: f64,
    admission: tokio::sync::Mutex<()>,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(vendor: impl Into<String>, limits: RateLimitSettings, enabled: bool) -> Self {
        Self {
            vendor: vendor.into(),
            enabled,
            requests_per_minute: limits.requests_per_minute as f64,
            tokens_per_minute: limits.tokens_per_minute as f64,
            admission: tokio::sync::Mutex::new(()),
            state: Mutex::new(BucketState {
                request_allowance: limits.requests_per_minute as f64,
                token_allowance: limits.tokens_per_minute as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Wait until both buckets admit a request of `estimated_tokens`, then
    /// consume the permit. Returns the total time slept so the caller can
    /// announce paces above its reporting threshold.
    pub async fn acquire(&self, estimated_tokens: u64) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }

        // FIFO: hold admission for the whole wait
        let _admission = self.admission.lock().await;
        let mut waited = Duration::ZERO;

        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);

                let tokens_needed = (estimated_tokens as f64).min(self.tokens_per_minute);
                if state.request_allowance >= 1.0 && state.token_allowance >= tokens_needed {
                    state.request_allowance -= 1.0;
                    state.token_allowance -= tokens_needed;
                    return waited;
                }

                let request_wait = if state.request_allowance >= 1.0 {
                    0.0
                } else {
                    (1.0 - state.request_allowance) / (self.requests_per_minute / 60.0)
                };
                let token_wait = if state.token_allowance >= tokens_needed {
                    0.0
                } else {
                    (tokens_needed - state.token_allowance) / (self.tokens_per_minute / 60.0)
                };
                Duration::from_secs_f64(request_wait.max(token_wait))
            };

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MS));
            let sleep = wait + jitter;
            tokio::time::sleep(sleep).await;
            waited += sleep;
        }
    }

    /// Settle the difference between the estimate consumed at admission and
    /// the vendor-reported totals
    pub fn reconcile(&self, estimated_tokens: u64, actual_tokens: u64) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock().unwrap();
        let delta = estimated_tokens as f64 - actual_tokens as f64;
        state.token_allowance =
            (state.token_allowance + delta).clamp(0.0, self.tokens_per_minute);
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.last_refill = Instant::now();
        state.request_allowance = (state.request_allowance
            + elapsed * self.requests_per_minute / 60.0)
            .min(self.requests_per_minute);
        state.token_allowance = (state.token_allowance
            + elapsed * self.tokens_per_minute / 60.0)
            .min(self.tokens_per_minute);
    }
}

// One limiter per vendor per process: legitimate shared state behind a
// single mutex
static REGISTRY: Lazy<Mutex<HashMap<String, Arc<RateLimiter>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The process-wide limiter for a vendor, created on first use with the
/// given settings. Later callers share the first instance regardless of
/// their settings, matching the one-limiter-per-vendor contract.
pub fn limiter_for(vendor: Vendor, limits: RateLimitSettings, enabled: bool) -> Arc<RateLimiter> {
    let mut registry = REGISTRY.lock().unwrap();
    registry
        .entry(vendor.as_str().to_string())
        .or_insert_with(|| Arc::new(RateLimiter::new(vendor.as_str(), limits, enabled)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: u32, tpm: u64) -> RateLimitSettings {
        RateLimitSettings {
            requests_per_minute: rpm,
            tokens_per_minute: tpm,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_within_capacity_do_not_wait() {
        let limiter = RateLimiter::new("test", limits(10, 100_000), true);
        for _ in 0..10 {
            let waited = limiter.acquire(100).await;
            assert_eq!(waited, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_request_bucket_sleeps() {
        let limiter = RateLimiter::new("test", limits(2, 1_000_000), true);
        limiter.acquire(1).await;
        limiter.acquire(1).await;

        let start = Instant::now();
        let waited = limiter.acquire(1).await;
        // 2 rpm means one permit every 30 s
        assert!(waited >= Duration::from_secs(29));
        assert!(start.elapsed() >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_gates_large_requests() {
        let limiter = RateLimiter::new("test", limits(1_000, 600), true);
        limiter.acquire(600).await;
        // Bucket is empty; 300 tokens refill in 30 s
        let waited = limiter.acquire(300).await;
        assert!(waited >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::new("test", limits(1, 1), false);
        for _ in 0..50 {
            assert_eq!(limiter.acquire(10_000).await, Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_returns_overestimate() {
        let limiter = RateLimiter::new("test", limits(1_000, 1_000), true);
        limiter.acquire(900).await;
        // Vendor reports far less than estimated; allowance comes back
        limiter.reconcile(900, 100);
        let waited = limiter.acquire(800).await;
        assert_eq!(waited, Duration::ZERO);
    }

    #[test]
    fn test_registry_shares_instances() {
        let first = limiter_for(Vendor::Test, limits(10, 1_000), true);
        let second = limiter_for(Vendor::Test, limits(99, 9_999), true);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
