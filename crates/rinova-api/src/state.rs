//! Shared application state.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};

use rinova_core::{AnalyticsRepository, Error, InferenceBackend, NoteRepository, Result};
use rinova_jobs::ExtractionPipeline;

use crate::config::ApiConfig;
use crate::handlers::system::HealthReport;
use crate::services::TtlCache;

/// Global rate limiter type (direct quota, no per-client buckets).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<dyn NoteRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub pipeline: Arc<ExtractionPipeline>,
    /// Probed by `/health`; extraction goes through `pipeline`.
    pub inference: Arc<dyn InferenceBackend>,
    pub health: Arc<TtlCache<HealthReport>>,
    /// None when rate limiting is disabled.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
        pipeline: Arc<ExtractionPipeline>,
        inference: Arc<dyn InferenceBackend>,
        config: ApiConfig,
    ) -> Result<Self> {
        let rate_limiter = if config.rate_limit_enabled {
            Some(Arc::new(build_rate_limiter(
                config.rate_limit_requests,
                config.rate_limit_period_secs,
            )?))
        } else {
            None
        };

        Ok(Self {
            notes,
            analytics,
            pipeline,
            inference,
            health: Arc::new(TtlCache::new(config.health_cache_ttl)),
            rate_limiter,
            config: Arc::new(config),
        })
    }
}

/// Allow `requests` per `period_secs`, all of them available as a burst.
fn build_rate_limiter(requests: u64, period_secs: u64) -> Result<GlobalRateLimiter> {
    let burst = u32::try_from(requests)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| Error::Config(format!("invalid rate limit: {requests} requests")))?;
    let quota = Quota::with_period(Duration::from_secs(period_secs) / burst.get())
        .ok_or_else(|| Error::Config(format!("invalid rate limit period: {period_secs}s")))?
        .allow_burst(burst);
    Ok(RateLimiter::direct(quota))
}
