use chrono::{DateTime, Duration, Utc};
use rotor_core::AppError;
use std::str::FromStr;

/// Anything stored in a history log.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Drop entries older than `retention` relative to `now`.
pub fn prune_by_age<T: Timestamped>(entries: &mut Vec<T>, retention: Duration, now: DateTime<Utc>) {
    let cutoff = now - retention;
    entries.retain(|e| e.timestamp() >= cutoff);
}

/// Keep only the newest `max` entries (the tail).
pub fn cap_tail<T>(entries: &mut Vec<T>, max: usize) {
    if entries.len() > max {
        let excess = entries.len() - max;
        entries.drain(..excess);
    }
}

/// Entries newer than `now - window`.
pub fn within<T: Timestamped>(entries: &[T], window: Duration, now: DateTime<Utc>) -> Vec<&T> {
    let cutoff = now - window;
    entries.iter().filter(|e| e.timestamp() >= cutoff).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(AppError::UnsupportedExportFormat(s.to_string())),
        }
    }
}

/// Quote a CSV field when it contains a separator, quote or newline.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn csv_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",")
}
