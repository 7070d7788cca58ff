//! Token buckets keyed by [`EndpointClass`].
//!
//! Each class gets its own GCRA limiter plus a bounded set of waiter slots.
//! Waiting past the caller's deadline fails with `RateLimitTimeout`; arriving
//! when every slot is taken fails with `RateLimitQueueFull`. Neither is
//! retried here.

use crate::core::errors::ExchangeError;
use crate::core::kernel::router::EndpointClass;
use governor::{
    clock::MonotonicClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, warn};

type Limiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, MonotonicClock, NoOpMiddleware<std::time::Instant>>;

/// One bucket: `capacity` tokens, one token back every `refill_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub capacity: u32,
    pub refill_interval: Duration,
}

impl BucketConfig {
    pub const fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
        }
    }

    /// `requests` spread evenly over `window`, all of them available as burst.
    pub fn per_window(requests: u32, window: Duration) -> Self {
        let requests = requests.max(1);
        Self::new(requests, window / requests)
    }

    fn quota(&self) -> Result<Quota, ExchangeError> {
        let burst = NonZeroU32::new(self.capacity).ok_or_else(|| {
            ExchangeError::InvalidParameters("bucket capacity must be non-zero".to_string())
        })?;
        Quota::with_period(self.refill_interval)
            .map(|quota| quota.allow_burst(burst))
            .ok_or_else(|| {
                ExchangeError::InvalidParameters("bucket refill interval must be non-zero".to_string())
            })
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub buckets: HashMap<EndpointClass, BucketConfig>,
    /// Waiters allowed per class before acquisitions fail fast
    pub max_pending: usize,
    /// Deadline applied by [`RateLimiter::acquire_default`]
    pub acquire_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            buckets: HashMap::from([
                (
                    EndpointClass::Default,
                    BucketConfig::per_window(20, Duration::from_secs(1)),
                ),
                (
                    EndpointClass::Order,
                    BucketConfig::per_window(10, Duration::from_secs(1)),
                ),
                (
                    EndpointClass::MarketData,
                    BucketConfig::per_window(20, Duration::from_secs(1)),
                ),
            ]),
            max_pending: 64,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl RateLimitConfig {
    /// No buckets at all: every acquisition passes straight through.
    pub fn unlimited() -> Self {
        Self {
            buckets: HashMap::new(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bucket(mut self, class: EndpointClass, bucket: BucketConfig) -> Self {
        self.buckets.insert(class, bucket);
        self
    }

    #[must_use]
    pub const fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

struct Bucket {
    limiter: Limiter,
    waiters: Semaphore,
    capacity: usize,
}

/// Per-class token bucket limiter shared by every call on one connector.
pub struct RateLimiter {
    buckets: HashMap<EndpointClass, Arc<Bucket>>,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("classes", &self.buckets.keys().collect::<Vec<_>>())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ExchangeError> {
        let max_pending = config.max_pending.max(1);
        let clock = MonotonicClock;
        let buckets = config
            .buckets
            .iter()
            .map(|(class, bucket)| -> Result<_, ExchangeError> {
                let limiter = GovernorRateLimiter::direct_with_clock(bucket.quota()?, &clock);
                debug!(
                    %class,
                    capacity = bucket.capacity,
                    refill_ms = bucket.refill_interval.as_millis() as u64,
                    "Rate limit bucket configured"
                );
                Ok((
                    *class,
                    Arc::new(Bucket {
                        limiter,
                        waiters: Semaphore::new(max_pending),
                        capacity: max_pending,
                    }),
                ))
            })
            .collect::<Result<HashMap<_, _>, ExchangeError>>()?;

        Ok(Self {
            buckets,
            acquire_timeout: config.acquire_timeout,
        })
    }

    /// Classes without their own bucket share the `Default` one.
    fn bucket(&self, class: EndpointClass) -> Option<&Arc<Bucket>> {
        self.buckets
            .get(&class)
            .or_else(|| self.buckets.get(&EndpointClass::Default))
    }

    /// Wait for a token of `class`, giving up at `deadline`.
    pub async fn acquire(&self, class: EndpointClass, deadline: Instant) -> Result<(), ExchangeError> {
        let Some(bucket) = self.bucket(class) else {
            return Ok(());
        };

        let _slot = match bucket.waiters.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                warn!(%class, capacity = bucket.capacity, "Rate limit queue full");
                return Err(ExchangeError::RateLimitQueueFull {
                    class,
                    capacity: bucket.capacity,
                });
            }
        };

        if bucket.limiter.check().is_ok() {
            return Ok(());
        }

        debug!(%class, "Waiting for rate limit token");
        tokio::time::timeout_at(deadline, bucket.limiter.until_ready())
            .await
            .map_err(|_| {
                warn!(%class, "Rate limit wait exceeded deadline");
                ExchangeError::RateLimitTimeout { class }
            })
    }

    pub async fn acquire_with_timeout(
        &self,
        class: EndpointClass,
        timeout: Duration,
    ) -> Result<(), ExchangeError> {
        self.acquire(class, Instant::now() + timeout).await
    }

    pub async fn acquire_default(&self, class: EndpointClass) -> Result<(), ExchangeError> {
        self.acquire_with_timeout(class, self.acquire_timeout).await
    }

    /// Take a token only if one is available right now.
    pub fn try_acquire(&self, class: EndpointClass) -> bool {
        self.bucket(class)
            .map_or(true, |bucket| bucket.limiter.check().is_ok())
    }

    pub fn available_waiter_slots(&self, class: EndpointClass) -> Option<usize> {
        self.bucket(class)
            .map(|bucket| bucket.waiters.available_permits())
    }
}
