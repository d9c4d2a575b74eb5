//! Passive signal sources for the rotation scheduler.
//!
//! Both monitors read IDE-local state only (the `storage.json` key/value
//! file, the `state.vscdb` SQLite store and the tail of recent log files),
//! never fail outward, and cache their last result for a fixed time.

pub mod api;
pub mod logs;
pub mod store;
pub mod token;

pub use api::{ApiHealth, RateLimitMonitor, RateLimitObservation};
pub use logs::LogScanner;
pub use token::TokenMonitor;

/// Key/value config file inside each IDE state directory.
pub const STORAGE_FILE: &str = "storage.json";
/// SQLite key/value store inside each IDE state directory.
pub const DATABASE_FILE: &str = "state.vscdb";
