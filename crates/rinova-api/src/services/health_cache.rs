//! Time-bounded cache for health check results.
//!
//! Probing the database and the text-generation service on every `/health`
//! request is wasteful, so the last report is reused until it expires. The
//! clock is a parameter so expiry can be tested without sleeping.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Single-value cache holding `(stored_at, value)`.
pub struct TtlCache<T, C = SystemClock> {
    ttl: Duration,
    clock: C,
    entry: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<T: Clone, C: Clock> TtlCache<T, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            clock,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value if it is younger than the TTL, otherwise run
    /// `refresh`, store its output and return it.
    ///
    /// The lock is held across `refresh`, so concurrent callers on an expired
    /// entry wait for one refresh instead of each starting their own.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut entry = self.entry.lock().await;
        let now = self.clock.now();
        if let Some((stored_at, value)) = entry.as_ref() {
            if now.saturating_duration_since(*stored_at) < self.ttl {
                return value.clone();
            }
        }

        let value = refresh().await;
        *entry = Some((now, value.clone()));
        value
    }

    /// Age of the cached value, if any.
    pub async fn age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.entry
            .lock()
            .await
            .as_ref()
            .map(|(stored_at, _)| now.saturating_duration_since(*stored_at))
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }
}
