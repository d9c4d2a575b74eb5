pub mod config;
pub mod paths;

pub use config::{
    CoordinationConfig, HistoryConfig, MonitorConfig, NotificationConfig, PathsConfig,
    RotationConfig, RotorConfig, ServiceConfig,
};
