//! The polling loop and its one-shot variant.

use anyhow::{Context, Result};
use chrono::Utc;
use rotor_core::RotationTrigger;
use rotor_core::collaborators::Notifier;
use rotor_core::types::RotationResult;
use rotor_engine::{RotationEngine, RotationOptions};
use rotor_history::RotationHistory;
use rotor_scheduler::{AccountPool, HybridRotationScheduler};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::coordinator::ServiceCoordinator;

/// Cooperative stop flag with an interruptible wait.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`. Returns true if stopped before or during the wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = cvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

pub struct Watcher {
    scheduler: HybridRotationScheduler,
    engine: RotationEngine,
    coordinator: ServiceCoordinator,
    notifier: Arc<dyn Notifier>,
    history: RotationHistory,
    pool: Option<AccountPool>,
    options: RotationOptions,
    poll_interval: Duration,
}

impl Watcher {
    pub fn new(
        scheduler: HybridRotationScheduler,
        engine: RotationEngine,
        coordinator: ServiceCoordinator,
        notifier: Arc<dyn Notifier>,
        history: RotationHistory,
        options: RotationOptions,
    ) -> Self {
        Self {
            scheduler,
            engine,
            coordinator,
            notifier,
            history,
            pool: None,
            options,
            poll_interval: Duration::from_secs(60),
        }
    }

    pub fn with_pool(mut self, pool: AccountPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn scheduler(&self) -> &HybridRotationScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &RotationHistory {
        &self.history
    }

    /// Request a manual rotation from this process; honoured on the next
    /// iteration.
    pub fn trigger_manual_rotation(&mut self) {
        self.scheduler.trigger_manual_rotation();
    }

    /// Restart the interval clock from the persisted state when the last
    /// recorded rotation succeeded. The scheduler itself keeps it in memory
    /// only.
    pub fn seed_from_state(&mut self) {
        let state = self.coordinator.get_state();
        if state.last_rotation_success == Some(true) && state.last_rotation.is_some() {
            self.scheduler.set_last_rotation_time(state.last_rotation);
        }
    }

    /// Run until `stop` fires, one iteration per poll interval.
    pub fn run(&mut self, stop: &StopSignal) {
        self.seed_from_state();
        self.coordinator.mark_service_running();
        self.notifier.notify_service_started();
        info!(interval = ?self.poll_interval, "Watcher started");

        while !stop.is_stopped() {
            if let Err(e) = self.iteration() {
                error!("Error in watcher loop: {e:#}");
                self.notifier.notify_error(&format!("Service error: {e:#}"));
            }
            if stop.wait(self.poll_interval) {
                break;
            }
        }

        self.coordinator.mark_service_stopped();
        self.notifier.notify_service_stopped();
        info!("Watcher stopped");
    }

    /// The scheduled-task path: one evaluation, at most one rotation.
    pub fn run_once(&mut self) -> Result<Option<RotationResult>> {
        self.seed_from_state();
        self.iteration()
    }

    /// Evaluate triggers and rotate if one fires.
    pub fn iteration(&mut self) -> Result<Option<RotationResult>> {
        if self.coordinator.take_manual_trigger() {
            self.scheduler.trigger_manual_rotation();
        }

        let decision = self.scheduler.should_rotate();
        let outcome = if decision.should_rotate {
            info!(
                trigger = %decision.trigger,
                reason = decision.reason.as_deref().unwrap_or(""),
                "Rotation triggered"
            );
            self.perform_rotation(decision.trigger, decision.reason.as_deref())
        } else {
            Ok(None)
        };

        self.coordinator.update_status(Some(Utc::now()), None);
        outcome
    }

    fn perform_rotation(
        &mut self,
        trigger: RotationTrigger,
        reason: Option<&str>,
    ) -> Result<Option<RotationResult>> {
        if self.coordinator.is_rotation_in_progress() {
            warn!(trigger = %trigger, "Rotation already in progress, skipping");
            return Ok(None);
        }
        self.coordinator.mark_rotation_in_progress();
        self.notifier.notify_rotation_start(trigger, reason);

        let result = self.engine.rotate(trigger, self.options);
        let account = self.current_account();
        let recorded = self.history.log_rotation(&result, account.as_deref());

        self.notifier
            .notify_rotation_complete(trigger, result.success, &result);
        self.coordinator.mark_rotation_complete(result.success);
        self.scheduler
            .notify_rotation_complete(trigger, result.success);
        if result.success
            && let Some(pool) = &self.pool
            && let Err(e) = pool.record_rotation(account.as_deref())
        {
            warn!("Failed to record rotation in account pool: {e:#}");
        }
        self.coordinator.mark_rotation_idle();

        info!(trigger = %trigger, success = result.success, "Rotation finished");
        recorded.context("Failed to record rotation history")?;
        Ok(Some(result))
    }

    fn current_account(&self) -> Option<String> {
        let pool = self.pool.as_ref()?;
        match pool.current() {
            Ok(account) => account.map(|a| a.id),
            Err(e) => {
                warn!("Failed to read account pool: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
