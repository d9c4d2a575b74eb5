//! Append-only, retention-windowed JSON logs of rotations and API
//! observations. Entries never change after being appended; they are only
//! dropped wholesale by age (on load) or by count (oldest first).

pub mod api;
pub mod retention;
pub mod rotation;

pub use api::{ApiCall, ApiErrorEvent, ApiHistory, ApiStats, RateLimitEvent};
pub use retention::ExportFormat;
pub use rotation::{RotationHistory, RotationRecord, RotationStats};
