use anyhow::Result;
use rotor_config::RotorConfig;
use rotor_history::{ApiStats, ExportFormat, RotationRecord, RotationStats};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::components;

pub(crate) fn handle_stats(config: &RotorConfig, days: i64, format: OutputFormat) -> Result<()> {
    let stats = components::rotation_history(config).statistics(days);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print!("{}", render_rotation_stats(&stats)),
    }
    Ok(())
}

pub(crate) fn handle_recent(config: &RotorConfig, count: usize, format: OutputFormat) -> Result<()> {
    let history = components::rotation_history(config);
    let recent = history.recent(count);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(recent)?),
        OutputFormat::Text => {
            if recent.is_empty() {
                println!("No rotations recorded.");
            }
            for record in recent {
                println!("{}", render_record(record));
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_api(config: &RotorConfig, hours: i64, format: OutputFormat) -> Result<()> {
    let stats = components::api_history(config).statistics(hours);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print!("{}", render_api_stats(&stats)),
    }
    Ok(())
}

pub(crate) fn handle_export(config: &RotorConfig, output: &Path, format: &str, api: bool) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    if api {
        components::api_history(config).export(output, format)?;
    } else {
        components::rotation_history(config).export(output, format)?;
    }
    eprintln!("Exported history to: {}", output.display());
    Ok(())
}

pub(crate) fn handle_clear(config: &RotorConfig, api: bool) -> Result<()> {
    if api {
        components::api_history(config).clear()?;
        eprintln!("API history cleared");
    } else {
        components::rotation_history(config).clear()?;
        eprintln!("Rotation history cleared");
    }
    Ok(())
}

fn render_record(record: &RotationRecord) -> String {
    let r = &record.result;
    let status = if r.success { "ok    " } else { "FAILED" };
    let mut line = format!(
        "{}  {status}  {:<13} {:>6.2}s",
        r.timestamp.format("%Y-%m-%d %H:%M:%S"),
        r.trigger.as_str(),
        r.duration_seconds
    );
    if let Some(account) = &record.account_id {
        line.push_str(&format!("  [{account}]"));
    }
    if let Some(error) = r.first_error() {
        line.push_str(&format!("  {error}"));
    }
    line
}

fn render_rotation_stats(stats: &RotationStats) -> String {
    let mut out = format!(
        "Rotations in the last {} days: {} ({} ok, {} failed)\nAverage duration: {:.2}s\n",
        stats.time_period_days,
        stats.total_rotations,
        stats.successful_rotations,
        stats.failed_rotations,
        stats.avg_duration_seconds
    );
    for (trigger, count) in &stats.by_trigger {
        out.push_str(&format!("  {trigger:<13} {count}\n"));
    }
    out
}

fn render_api_stats(stats: &ApiStats) -> String {
    let mut out = format!(
        "API calls in the last {}h: {} ({} ok, {} failed)\nRate limits: {}  Errors: {}\nAverage response time: {:.1}ms\n",
        stats.time_period_hours,
        stats.total_calls,
        stats.successful_calls,
        stats.failed_calls,
        stats.rate_limits,
        stats.errors,
        stats.avg_response_time
    );
    for (status, count) in &stats.status_codes {
        out.push_str(&format!("  HTTP {status}: {count}\n"));
    }
    out
}
