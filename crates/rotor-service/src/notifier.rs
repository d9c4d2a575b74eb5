//! Operator notifications written through `tracing`.

use chrono::{Local, Timelike};
use rotor_config::NotificationConfig;
use rotor_core::RotationTrigger;
use rotor_core::collaborators::Notifier;
use rotor_core::types::RotationResult;
use tracing::{error, info};

/// Hour-of-day window `[start, end)`. Wraps midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start > self.end {
            hour >= self.start || hour < self.end
        } else {
            self.start <= hour && hour < self.end
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogNotifier {
    enabled: bool,
    quiet_hours: Option<QuietHours>,
}

impl LogNotifier {
    pub fn new(enabled: bool, quiet_hours: Option<QuietHours>) -> Self {
        Self {
            enabled,
            quiet_hours,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        let quiet_hours = config.respect_quiet_hours.then_some(QuietHours {
            start: config.quiet_hours_start,
            end: config.quiet_hours_end,
        });
        Self::new(config.enable_log, quiet_hours)
    }

    /// Errors always go out; anything else is held back during quiet hours.
    fn should_deliver(&self, level: Level, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }
        level == Level::Error || !self.quiet_hours.is_some_and(|q| q.contains(hour))
    }

    fn emit(&self, level: Level, message: &str) {
        if !self.should_deliver(level, Local::now().hour()) {
            return;
        }
        match level {
            Level::Info => info!("NOTIFICATION: {message}"),
            Level::Error => error!("NOTIFICATION: {message}"),
        }
    }
}

pub fn start_message(trigger: RotationTrigger, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("Rotation started: {} ({reason})", trigger.title()),
        None => format!("Rotation started: {}", trigger.title()),
    }
}

pub fn complete_message(trigger: RotationTrigger, success: bool, result: &RotationResult) -> String {
    if success {
        return format!("Rotation Success: {}", trigger.title());
    }
    let detail = result
        .first_error()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unknown error".to_string());
    format!("Rotation Failed: {} - {detail}", trigger.title())
}

impl Notifier for LogNotifier {
    fn notify_rotation_start(&self, trigger: RotationTrigger, reason: Option<&str>) {
        self.emit(Level::Info, &start_message(trigger, reason));
    }

    fn notify_rotation_complete(&self, trigger: RotationTrigger, success: bool, result: &RotationResult) {
        let level = if success { Level::Info } else { Level::Error };
        self.emit(level, &complete_message(trigger, success, result));
    }

    fn notify_error(&self, message: &str) {
        self.emit(Level::Error, &format!("Error: {message}"));
    }

    fn notify_service_started(&self) {
        self.emit(Level::Info, "Rotation service started");
    }

    fn notify_service_stopped(&self) {
        self.emit(Level::Info, "Rotation service stopped");
    }
}
