//! Supporting services for the HTTP layer.

pub mod health_cache;

pub use health_cache::{Clock, SystemClock, TtlCache};
