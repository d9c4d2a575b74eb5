//! Shared types for the rotor workspace: the trigger enum, per-stage
//! rotation records, the coordinator state shape, and the narrow traits
//! through which the engine reaches IDE state it does not own.

pub mod cache;
pub mod collaborators;
pub mod error;
pub mod trigger;
pub mod types;

pub use cache::CachedValue;
pub use error::AppError;
pub use trigger::RotationTrigger;
