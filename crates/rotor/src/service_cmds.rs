use anyhow::{Context, Result, bail};
use rotor_config::RotorConfig;
use rotor_core::types::{ApiStatus, RotationResult, ServiceState, TokenStatus};
use rotor_scheduler::SchedulerStatus;
use rotor_service::StopSignal;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::cli::OutputFormat;
use crate::components;

pub(crate) async fn handle_watch(config: RotorConfig, interval: Option<u64>) -> Result<()> {
    let mut watcher = components::watcher(&config)?;
    if let Some(secs) = interval {
        watcher = watcher.with_poll_interval(Duration::from_secs(secs));
    }

    let stop = StopSignal::new();
    let loop_stop = stop.clone();
    let mut handle = tokio::task::spawn_blocking(move || watcher.run(&loop_stop));

    tokio::select! {
        joined = &mut handle => {
            joined.context("Watcher task panicked")?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received, stopping watcher");
            stop.stop();
        }
    }

    // A rotation already underway is allowed to finish.
    handle.await.context("Watcher task panicked")?;
    Ok(())
}

pub(crate) async fn handle_run_once(config: RotorConfig, manual: bool, format: OutputFormat) -> Result<()> {
    let mut watcher = components::watcher(&config)?;
    if manual {
        watcher.trigger_manual_rotation();
    }
    let outcome = tokio::task::spawn_blocking(move || watcher.run_once())
        .await
        .context("Rotation task panicked")??;

    let Some(result) = outcome else {
        if format == OutputFormat::Json {
            println!("null");
        } else {
            println!("No rotation needed.");
        }
        return Ok(());
    };
    print_result(&result, format)?;
    if !result.success {
        let detail = result
            .first_error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Rotation failed: {detail}");
    }
    Ok(())
}

fn print_result(result: &RotationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            println!(
                "Rotation {} ({}) in {:.2}s",
                if result.success { "succeeded" } else { "failed" },
                result.trigger,
                result.duration_seconds
            );
            for error in &result.errors {
                println!("  {error}");
            }
            if result.rollback_performed {
                println!("  Backed-up files were restored.");
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_trigger(config: &RotorConfig) -> Result<()> {
    let coordinator = components::coordinator(config);
    if !coordinator.request_manual_trigger() {
        bail!(
            "Could not update {} (lock busy); try again",
            coordinator.state_file().display()
        );
    }
    if coordinator.is_service_running() {
        eprintln!("Manual rotation requested; the watcher will pick it up on its next pass.");
    } else {
        eprintln!("Manual rotation requested, but no watcher is running. Use `rotor run-once --manual` to rotate now.");
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    service: ServiceState,
    scheduler: SchedulerStatus,
    token: TokenStatus,
    api: ApiStatus,
}

pub(crate) fn handle_status(config: &RotorConfig, format: OutputFormat) -> Result<()> {
    let service = components::coordinator(config).get_state();
    let mut scheduler = components::scheduler(config);
    if service.last_rotation_success == Some(true) {
        scheduler.set_last_rotation_time(service.last_rotation);
    }
    let report = StatusReport {
        scheduler: scheduler.get_status(),
        token: components::token_monitor(config).status(),
        api: components::rate_limit_monitor(config).status(),
        service,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_status(&report)),
    }
    Ok(())
}

fn render_status(report: &StatusReport) -> String {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };
    let s = &report.service;
    let mut out = String::new();
    out.push_str(&format!(
        "Watcher:            {}\n",
        if s.service_running { "running" } else { "stopped" }
    ));
    out.push_str(&format!("Rotation underway:  {}\n", s.rotation_in_progress));
    out.push_str(&format!("Rotations:          {}\n", s.rotation_count));
    out.push_str(&format!("Last rotation:      {}", fmt_time(s.last_rotation)));
    if let Some(ok) = s.last_rotation_success {
        out.push_str(if ok { " (ok)" } else { " (failed)" });
    }
    out.push('\n');
    out.push_str(&format!(
        "Next scheduled:     {}\n",
        fmt_time(report.scheduler.next_scheduled_rotation)
    ));
    out.push_str(&format!(
        "Token:              {}\n",
        match (report.token.expired, report.token.reason.as_deref()) {
            (true, Some(reason)) => format!("expired ({reason})"),
            (true, None) => "expired".to_string(),
            (false, _) => "ok".to_string(),
        }
    ));
    out.push_str(&format!(
        "API:                {}\n",
        if report.api.rate_limited {
            format!("rate limited ({} hits)", report.api.rate_limit_count)
        } else if report.api.api_healthy {
            "healthy".to_string()
        } else {
            format!("{} error line(s) in logs", report.api.errors_found.len())
        }
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rotor_scheduler::{HybridRotationScheduler, RateLimitSignal, SchedulerSettings, TokenSignal};

    struct Quiet;

    impl TokenSignal for Quiet {
        fn expired_reason(&mut self) -> Option<String> {
            None
        }
    }

    impl RateLimitSignal for Quiet {
        fn is_rate_limited(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn test_render_status() {
        let now = Utc::now();
        let scheduler =
            HybridRotationScheduler::new(Box::new(Quiet), Box::new(Quiet), SchedulerSettings::default());
        let mut token = TokenStatus::new(now);
        token.expired = true;
        token.reason = Some("Subscription expired: cursorAuth/trialExpiration".into());
        let mut api = ApiStatus::new(now);
        api.rate_limited = true;
        api.rate_limit_count = 3;
        let report = StatusReport {
            service: ServiceState {
                rotation_count: 2,
                last_rotation_success: Some(false),
                last_rotation: Some(now),
                ..ServiceState::default()
            },
            scheduler: scheduler.get_status_at(now),
            token,
            api,
        };

        let text = render_status(&report);
        assert!(text.contains("Watcher:            stopped"));
        assert!(text.contains("(failed)"));
        assert!(text.contains("Next scheduled:     never"));
        assert!(text.contains("expired (Subscription expired: cursorAuth/trialExpiration)"));
        assert!(text.contains("rate limited (3 hits)"));
    }
}
