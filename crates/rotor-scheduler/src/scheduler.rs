//! Hybrid rotation trigger evaluation.
//!
//! Four independent conditions are checked in fixed priority order
//! (`RotationTrigger::BY_PRIORITY`); the first that holds is reported and
//! nothing below it is evaluated. The only state kept between calls is the
//! time of the last successful rotation and the one-shot manual flag.

use chrono::{DateTime, Duration, Utc};
use rotor_config::RotationConfig;
use rotor_core::RotationTrigger;
use rotor_monitor::{RateLimitMonitor, TokenMonitor};
use serde::Serialize;
use tracing::{info, warn};

/// Source of the token-expiration signal.
pub trait TokenSignal: Send {
    /// `Some(reason)` when the token should be treated as expired.
    fn expired_reason(&mut self) -> Option<String>;
}

/// Source of the rate-limit signal.
pub trait RateLimitSignal: Send {
    fn is_rate_limited(&mut self) -> bool;
}

impl TokenSignal for TokenMonitor {
    fn expired_reason(&mut self) -> Option<String> {
        let status = self.status();
        status
            .expired
            .then(|| status.reason.unwrap_or_else(|| "Token expired".to_string()))
    }
}

impl RateLimitSignal for RateLimitMonitor {
    fn is_rate_limited(&mut self) -> bool {
        RateLimitMonitor::is_rate_limited(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSettings {
    pub scheduled_interval_hours: f64,
    pub enable_token_check: bool,
    pub enable_rate_limit_check: bool,
    pub enable_scheduled_rotation: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&RotationConfig::default())
    }
}

impl From<&RotationConfig> for SchedulerSettings {
    fn from(config: &RotationConfig) -> Self {
        Self {
            scheduled_interval_hours: config.scheduled_interval_hours,
            enable_token_check: config.enable_token_check,
            enable_rate_limit_check: config.enable_rate_limit_check,
            enable_scheduled_rotation: config.enable_scheduled_rotation,
        }
    }
}

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationDecision {
    pub should_rotate: bool,
    pub trigger: RotationTrigger,
    pub reason: Option<String>,
}

impl RotationDecision {
    pub fn none() -> Self {
        Self {
            should_rotate: false,
            trigger: RotationTrigger::None,
            reason: None,
        }
    }

    fn fire(trigger: RotationTrigger, reason: String) -> Self {
        Self {
            should_rotate: true,
            trigger,
            reason: Some(reason),
        }
    }
}

/// Non-consuming snapshot for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub manual_trigger_pending: bool,
    pub last_rotation: Option<DateTime<Utc>>,
    pub next_scheduled_rotation: Option<DateTime<Utc>>,
    pub scheduled_due: bool,
    pub settings: SchedulerSettings,
}

pub struct HybridRotationScheduler {
    token: Box<dyn TokenSignal>,
    rate_limit: Box<dyn RateLimitSignal>,
    settings: SchedulerSettings,
    last_rotation_time: Option<DateTime<Utc>>,
    manual_trigger_pending: bool,
}

impl HybridRotationScheduler {
    pub fn new(
        token: Box<dyn TokenSignal>,
        rate_limit: Box<dyn RateLimitSignal>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            token,
            rate_limit,
            settings,
            last_rotation_time: None,
            manual_trigger_pending: false,
        }
    }

    pub fn should_rotate(&mut self) -> RotationDecision {
        self.should_rotate_at(Utc::now())
    }

    /// Evaluate every trigger in priority order as of `now`.
    ///
    /// A pending manual request is consumed by the call that reports it.
    pub fn should_rotate_at(&mut self, now: DateTime<Utc>) -> RotationDecision {
        for trigger in RotationTrigger::BY_PRIORITY {
            if let Some(reason) = self.evaluate(trigger, now) {
                if trigger == RotationTrigger::Manual {
                    self.manual_trigger_pending = false;
                }
                return RotationDecision::fire(trigger, reason);
            }
        }
        RotationDecision::none()
    }

    fn evaluate(&mut self, trigger: RotationTrigger, now: DateTime<Utc>) -> Option<String> {
        match trigger {
            RotationTrigger::Manual => self
                .manual_trigger_pending
                .then(|| "Manual rotation requested".to_string()),
            RotationTrigger::TokenExpired if self.settings.enable_token_check => {
                self.token.expired_reason()
            }
            RotationTrigger::RateLimited if self.settings.enable_rate_limit_check => self
                .rate_limit
                .is_rate_limited()
                .then(|| "API rate limited".to_string()),
            RotationTrigger::Scheduled if self.settings.enable_scheduled_rotation => {
                self.scheduled_due(now).then(|| {
                    format!(
                        "Scheduled rotation (interval: {}h)",
                        self.settings.scheduled_interval_hours
                    )
                })
            }
            _ => None,
        }
    }

    fn interval(&self) -> Duration {
        Duration::milliseconds((self.settings.scheduled_interval_hours * 3_600_000.0) as i64)
    }

    /// Elapsed time since the last successful rotation reached the interval.
    /// Never true before the first successful rotation.
    fn scheduled_due(&self, now: DateTime<Utc>) -> bool {
        self.last_rotation_time
            .is_some_and(|last| now - last >= self.interval())
    }

    pub fn trigger_manual_rotation(&mut self) {
        self.manual_trigger_pending = true;
        info!("Manual rotation triggered");
    }

    pub fn manual_trigger_pending(&self) -> bool {
        self.manual_trigger_pending
    }

    pub fn notify_rotation_complete(&mut self, trigger: RotationTrigger, success: bool) {
        self.notify_rotation_complete_at(trigger, success, Utc::now());
    }

    /// Only a successful rotation restarts the scheduled-interval clock.
    pub fn notify_rotation_complete_at(
        &mut self,
        trigger: RotationTrigger,
        success: bool,
        at: DateTime<Utc>,
    ) {
        if success {
            self.last_rotation_time = Some(at);
            info!(trigger = %trigger, "Rotation completed successfully");
        } else {
            warn!(trigger = %trigger, "Rotation failed");
        }
    }

    pub fn last_rotation_time(&self) -> Option<DateTime<Utc>> {
        self.last_rotation_time
    }

    /// Seed the interval clock, e.g. from the persisted coordinator state.
    pub fn set_last_rotation_time(&mut self, at: Option<DateTime<Utc>>) {
        self.last_rotation_time = at;
    }

    /// Update any subset of the settings.
    pub fn configure(
        &mut self,
        enable_token_check: Option<bool>,
        enable_rate_limit_check: Option<bool>,
        enable_scheduled_rotation: Option<bool>,
        scheduled_interval_hours: Option<f64>,
    ) {
        let s = &mut self.settings;
        if let Some(v) = enable_token_check {
            s.enable_token_check = v;
        }
        if let Some(v) = enable_rate_limit_check {
            s.enable_rate_limit_check = v;
        }
        if let Some(v) = enable_scheduled_rotation {
            s.enable_scheduled_rotation = v;
        }
        if let Some(v) = scheduled_interval_hours {
            s.scheduled_interval_hours = v;
        }
        info!(
            token_check = s.enable_token_check,
            rate_limit_check = s.enable_rate_limit_check,
            scheduled = s.enable_scheduled_rotation,
            interval_hours = s.scheduled_interval_hours,
            "Scheduler configured"
        );
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Does not consume a pending manual trigger and does not query the
    /// monitors.
    pub fn get_status(&self) -> SchedulerStatus {
        self.get_status_at(Utc::now())
    }

    pub fn get_status_at(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let next = self
            .last_rotation_time
            .filter(|_| self.settings.enable_scheduled_rotation)
            .map(|last| last + self.interval());
        SchedulerStatus {
            manual_trigger_pending: self.manual_trigger_pending,
            last_rotation: self.last_rotation_time,
            next_scheduled_rotation: next,
            scheduled_due: self.settings.enable_scheduled_rotation && self.scheduled_due(now),
            settings: self.settings.clone(),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
