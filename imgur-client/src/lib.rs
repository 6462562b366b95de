pub mod api;
pub mod auth;
pub mod metrics;
pub mod rate_limiter;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;


pub use api::{ApiReply, Download, GalleryApi, ImgurApiClient};
pub use auth::{ImgurOAuth2Config, TokenManager};
pub use metrics::{CallOutcome, MetricsCollector, UsageSnapshot};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimitedClient};
