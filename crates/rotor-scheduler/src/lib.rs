pub mod pool;
pub mod scheduler;

pub use pool::{Account, AccountPool, PoolStats};
pub use scheduler::{
    HybridRotationScheduler, RateLimitSignal, RotationDecision, SchedulerSettings,
    SchedulerStatus, TokenSignal,
};
