//! Tail scanning of IDE log files.

use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Longest line kept in diagnostics.
pub const MAX_LINE_CHARS: usize = 200;

/// Compile case-insensitive patterns, pairing each regex with its source
/// text for diagnostics. Patterns that fail to compile are skipped.
pub fn compile_patterns(patterns: &[&'static str]) -> Vec<(&'static str, Regex)> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok().map(|re| (*p, re)))
        .collect()
}

/// First pattern (in declaration order) matching `line`.
pub fn first_match<'a>(patterns: &'a [(&'static str, Regex)], line: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|(_, re)| re.is_match(line))
        .map(|(p, _)| *p)
}

/// Trimmed line capped at [`MAX_LINE_CHARS`] characters.
pub fn truncate_line(line: &str) -> String {
    line.trim().chars().take(MAX_LINE_CHARS).collect()
}

/// The `max` most recently modified `*.log` files directly under `dir`.
pub fn recent_log_files(dir: &Path, max: usize) -> Vec<PathBuf> {
    let Some(dir_str) = dir.to_str() else {
        return Vec::new();
    };
    let pattern = format!("{}/*.log", glob::Pattern::escape(dir_str));
    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };

    let mut files: Vec<(SystemTime, PathBuf)> = paths
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| {
            let modified = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));
    files.into_iter().take(max).map(|(_, p)| p).collect()
}

/// Last `n` lines of `path`, decoding invalid UTF-8 lossily.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}

/// Walks the recent log files of a set of directories.
#[derive(Debug, Clone)]
pub struct LogScanner {
    dirs: Vec<PathBuf>,
    max_files: usize,
    tail: usize,
}

impl LogScanner {
    pub fn new(dirs: Vec<PathBuf>, max_files: usize, tail: usize) -> Self {
        Self {
            dirs,
            max_files,
            tail,
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Call `visit(file, line)` for every line in the tail window of every
    /// recent log file. Missing directories are skipped silently; unreadable
    /// files are reported in the returned list and skipped.
    pub fn scan(&self, mut visit: impl FnMut(&Path, &str)) -> Vec<String> {
        let mut errors = Vec::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                continue;
            }
            for file in recent_log_files(dir, self.max_files) {
                match tail_lines(&file, self.tail) {
                    Ok(lines) => {
                        for line in &lines {
                            visit(&file, line);
                        }
                    }
                    Err(e) => {
                        debug!(file = %file.display(), "Cannot read log file: {e}");
                        errors.push(format!("Cannot read {}: {e}", file.display()));
                    }
                }
            }
        }
        errors
    }
}
