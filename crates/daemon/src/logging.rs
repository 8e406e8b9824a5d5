//! Tracing subscriber setup.
//!
//! Logs always go to stderr. When a log directory is configured they are
//! also written to a daily rolling file through a non-blocking writer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "diskbridge.log";
const KEEP_DAYS: u64 = 7;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Fails if a subscriber is already
/// installed.
pub fn init(level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {level}"))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_dir {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let _ = LOG_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

fn file_writer(dir: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("create log directory failed: {}", dir.display()))?;

    cleanup_old_logs(dir, LOG_FILE_PREFIX);

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Remove rolled log files older than [`KEEP_DAYS`]. Returns the removed paths.
fn cleanup_old_logs(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let Some(cutoff) =
        SystemTime::now().checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60))
    else {
        return removed;
    };

    let Ok(entries) = fs::read_dir(dir) else {
        return removed;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only touch files created by the rolling appender.
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        if fs::remove_file(entry.path()).is_ok() {
            removed.push(entry.path());
        }
    }

    removed
}
