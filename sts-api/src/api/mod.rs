//! HTTP API handlers for sts-api
//!
//! REST for scraping, polling and prioritization; WebSocket and SSE for
//! progress push.

pub mod health;
pub mod prioritize;
pub mod progress;
pub mod scrape;
pub mod tasks;

pub use health::health_routes;
pub use prioritize::prioritize_routes;
pub use progress::progress_routes;
pub use scrape::scrape_routes;
pub use tasks::task_routes;
