use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDateTime};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

pub(crate) const LOG_ENV_VAR: &str = "SCPC_LOG";
pub(crate) const LOG_TIMESTAMP_FORMAT: &str = "%m-%d %H:%M:%S";
const LOG_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LOG_TIMESTAMP_LEN: usize = "01-31 23:59:59".len();
const LOG_RETENTION_DAYS: i64 = 7;
const LOG_MAX_ENTRIES: usize = 10_000;

/// Prunes the log file, then routes every `tracing` event into it.
pub(crate) fn init_tracing(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create log dir")?;
    }
    prune_log_file(path);
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocal::new(LOG_TIMESTAMP_FORMAT.to_string()))
        .try_init()
        .map_err(|err| anyhow::anyhow!("install log subscriber: {err}"))?;
    Ok(())
}

/// Drops entries older than the retention window and caps the line count.
/// Lines without a leading timestamp are dropped as well.
pub(crate) fn prune_log_file(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let kept = retained_lines(&content, chrono::Local::now().naive_local());
    if kept.is_empty() {
        let _ = fs::remove_file(path);
    } else {
        let _ = fs::write(path, kept.join("\n") + "\n");
    }
}

fn retained_lines(content: &str, now: NaiveDateTime) -> Vec<&str> {
    let cutoff = now - chrono::Duration::days(LOG_RETENTION_DAYS);
    let mut kept: Vec<&str> = content
        .lines()
        .filter(|line| entry_time(line, now).is_some_and(|at| at >= cutoff))
        .collect();
    if kept.len() > LOG_MAX_ENTRIES {
        kept = kept.split_off(kept.len() - LOG_MAX_ENTRIES);
    }
    kept
}

/// Timestamps carry no year; one that would lie in the future belongs to last year.
fn entry_time(line: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let timestamp = line.get(..LOG_TIMESTAMP_LEN)?;
    let parse = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year}-{timestamp}"), LOG_PARSE_FORMAT).ok()
    };
    match parse(now.year()) {
        Some(at) if at <= now + chrono::Duration::days(1) => Some(at),
        _ => parse(now.year() - 1),
    }
}
