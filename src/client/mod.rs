//! Client side of the API: a typed HTTP client, a per-day log cache and the
//! tracker that applies count changes optimistically.

pub mod api;
pub mod cache;
pub mod tracker;

pub use api::{ApiClient, ApiConfig, ClientError, LogBackend, NewAction};
pub use cache::LogsCache;
pub use tracker::{AdjustOutcome, DailyTracker};
