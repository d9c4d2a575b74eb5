//! Validated, backed-up, rollback-capable rotation of IDE identifiers.
//!
//! The engine never edits IDE state itself: the mutation is delegated to an
//! [`rotor_core::collaborators::IdeStateHandler`]. What lives here is the
//! protocol around it (pre-checks, snapshots, post-checks, restore) and the
//! host-side collaborators the binary wires in.

pub mod backup;
pub mod engine;
pub mod handler_cmd;
pub mod host;
pub mod targets;
pub mod validator;

pub use backup::FsBackupStore;
pub use engine::{EngineSettings, RotationCallback, RotationEngine, RotationOptions};
pub use handler_cmd::{CommandStateHandler, UnconfiguredHandler};
pub use host::SysinfoHost;
pub use targets::ConfiguredPaths;
