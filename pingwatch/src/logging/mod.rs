//! Logging setup.
//!
//! This module provides:
//! - Console output, plus a daily-rolling log file when a directory is configured
//! - Log file retention cleanup
//! - Local timezone timestamps for logs

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LoggingConfig;
use crate::utils::fs;

/// Prefix of the daily log files (`pingwatch.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "pingwatch.log";

const VERBOSE_LOG_FILTER: &str = "pingwatch=debug,reachability=debug";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Pick the filter directive from the command-line flags and config.
///
/// `RUST_LOG`, when set, takes precedence over the result.
pub fn resolve_filter(config: &LoggingConfig, verbose: bool, quiet: bool) -> String {
    if quiet {
        "error".to_string()
    } else if verbose {
        VERBOSE_LOG_FILTER.to_string()
    } else {
        config.filter.clone()
    }
}

/// Initialize the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the lifetime of the process.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
    quiet: bool,
) -> crate::Result<Option<WorkerGuard>> {
    let directive = resolve_filter(config, verbose, quiet);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive).map_err(|e| {
            crate::Error::config(format!("Invalid log filter '{directive}': {e}"))
        })?,
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(log_dir) => {
            fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

/// Start the log retention cleanup task.
///
/// Runs once immediately, then daily, until `cancel_token` fires.
pub fn start_retention_cleanup(
    log_dir: PathBuf,
    retention_days: u32,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let cleanup_interval = Duration::from_secs(24 * 60 * 60);

        loop {
            if let Err(e) = cleanup_old_logs(&log_dir, retention_days, Utc::now()).await {
                warn!(error = %e, "Failed to cleanup old logs");
            }

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Log retention cleanup task shutting down");
                    break;
                }
                _ = tokio::time::sleep(cleanup_interval) => {}
            }
        }
    })
}

/// Delete daily log files dated more than `retention_days` before `now`.
///
/// Returns the number of deleted files.
pub async fn cleanup_old_logs(
    log_dir: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
) -> std::io::Result<usize> {
    // A retention window reaching past the earliest representable date keeps everything.
    let Some(cutoff) = chrono::Duration::try_days(i64::from(retention_days))
        .and_then(|window| now.checked_sub_signed(window))
        .map(|cutoff| cutoff.date_naive())
    else {
        return Ok(0);
    };

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let Some(file_date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(log_file_date)
        else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

fn log_file_date(filename: &str) -> Option<NaiveDate> {
    let date = filename.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
