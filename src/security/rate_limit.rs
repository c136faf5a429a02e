//! Per-client token-bucket rate limiting.
//!
//! Buckets live in a sharded map keyed by client identity, so admission
//! checks for different clients lock different shards and checks for the
//! same client serialize on that client's entry. Idle buckets are swept
//! periodically so one-shot clients do not accumulate.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::LimiterConfig;
use crate::lifecycle::ShutdownHandle;

/// Token balance for one client. `tokens` stays within `[0, burst]`.
#[derive(Debug, Clone)]
struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Admission gate bounding the request rate of each client.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, ClientBucket>,
    enabled: bool,
    refill_rate: f64,
    capacity: f64,
    sweep_interval: Duration,
    stale_after: Duration,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            enabled: config.enabled,
            refill_rate: config.requests_per_second,
            capacity: f64::from(config.burst),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Decide whether `client` may proceed, consuming one token if so.
    ///
    /// Always `true` when the limiter is disabled.
    pub fn allow(&self, client: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        if let Some(mut bucket) = self.buckets.get_mut(client) {
            return bucket.try_acquire(now, self.capacity, self.refill_rate);
        }

        self.buckets
            .entry(client.to_owned())
            .or_insert_with(|| ClientBucket::new(self.capacity, now))
            .try_acquire(now, self.capacity, self.refill_rate)
    }

    /// Remove buckets idle for longer than the staleness threshold.
    ///
    /// Returns the number of evicted clients.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= self.stale_after);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Sweep on a fixed interval until draining begins.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: ShutdownHandle) {
        if !self.enabled {
            tracing::debug!("Rate limiter disabled, sweeper not started");
            return;
        }

        tracing::debug!(
            interval_secs = self.sweep_interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Rate limiter sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.tracked_clients(), "Evicted idle rate limit buckets");
                    }
                }
                _ = shutdown.draining() => {
                    tracing::debug!("Rate limiter sweeper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&LimiterConfig {
            enabled: true,
            requests_per_second: rps,
            burst,
            ..LimiterConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let limiter = limiter(2.0, 4);

        for _ in 0..4 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));

        // 0.5s at 2 tokens/s refills exactly one token.
        time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_burst() {
        let limiter = limiter(2.0, 4);
        assert!(limiter.allow("10.0.0.1"));

        time::advance(Duration::from_secs(60)).await;
        let admitted = (0..10).filter(|_| limiter.allow("10.0.0.1")).count();
        assert_eq!(admitted, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_requests_do_not_double_penalize() {
        let limiter = limiter(2.0, 1);
        assert!(limiter.allow("10.0.0.1"));

        // A denial halfway through the refill must not push the next token further away.
        time::advance(Duration::from_millis(250)).await;
        assert!(!limiter.allow("10.0.0.1"));
        assert_eq!(limiter.buckets.get("10.0.0.1").unwrap().tokens, 0.5);

        time::advance(Duration::from_millis(250)).await;
        assert!(limiter.allow("10.0.0.1"));
    }

    #[test]
    fn clients_do_not_share_capacity() {
        let limiter = limiter(2.0, 4);

        while limiter.allow("10.0.0.1") {}
        assert!(!limiter.allow("10.0.0.1"));

        for _ in 0..4 {
            assert!(limiter.allow("10.0.0.2"));
        }
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(&LimiterConfig {
            enabled: false,
            burst: 1,
            ..LimiterConfig::default()
        });

        assert!((0..10_000).all(|_| limiter.allow("10.0.0.1")));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_stale_buckets() {
        let limiter = limiter(2.0, 4);
        for _ in 0..4 {
            limiter.allow("idle");
        }

        time::advance(Duration::from_secs(120)).await;
        limiter.allow("active");

        time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);

        // The evicted client starts over with a full bucket.
        let admitted = (0..10).filter(|_| limiter.allow("idle")).count();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn concurrent_checks_for_one_client_lose_no_updates() {
        let limiter = RateLimiter::new(&LimiterConfig {
            enabled: true,
            requests_per_second: 0.000_001,
            burst: 100,
            ..LimiterConfig::default()
        });

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..50).filter(|_| limiter.allow("10.0.0.1")).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_draining() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let limiter = Arc::new(limiter(2.0, 4));
        limiter.allow("10.0.0.1");

        let sweeper = tokio::spawn(limiter.clone().run_sweeper(shutdown.handle()));

        time::sleep(Duration::from_secs(250)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        shutdown.begin_draining();
        sweeper.await.unwrap();
    }
}
