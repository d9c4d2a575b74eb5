//! Long-running and one-shot service entry points: the cross-process
//! coordinator, the notification sink, and the watcher loop that ties the
//! scheduler to the rotation engine.

pub mod coordinator;
pub mod notifier;
pub mod watcher;

pub use coordinator::ServiceCoordinator;
pub use notifier::{LogNotifier, QuietHours};
pub use watcher::{StopSignal, Watcher};
