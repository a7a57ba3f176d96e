//! Logging initialization and log file retention.
//!
//! Human-readable logs always go to stderr. With `--log-dir`, every run also
//! writes JSON logs to `<log-dir>/llama/<model-stem>/<timestamp>.log`, so runs
//! against the same model are grouped together. Retention only ever touches
//! the `llama/` subtree, since `--log-dir` may be shared with other programs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log files older than this are deleted at startup.
const LOG_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Subdirectory of `--log-dir` owned by this tool.
const LOGS_SUBDIR: &str = "llama";

/// Install the global tracing subscriber.
///
/// The returned [`WorkerGuard`] flushes the JSON file on drop and must be
/// held until the program exits. It is `None` when no `log_dir` is given.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(log_dir: Option<&Path>, slug: &str) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(None);
    };

    let (writer, guard) = open_log_writer(log_dir, slug)?;
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    Ok(Some(guard))
}

/// Create `<log_dir>/llama/<slug>/` and a fresh timestamped log file inside it.
fn open_log_writer(log_dir: &Path, slug: &str) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = log_file_path(log_dir, slug, SystemTime::now());
    let parent = owned_root(log_dir).join(slug);

    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
    let file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(file))
}

fn owned_root(log_dir: &Path) -> PathBuf {
    log_dir.join(LOGS_SUBDIR)
}

fn log_file_path(log_dir: &Path, slug: &str, now: SystemTime) -> PathBuf {
    owned_root(log_dir)
        .join(slug)
        .join(format!("{}.log", utc_timestamp(now)))
}

/// `YYYYMMDD_HHMMSS` in UTC.
fn utc_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;

    format!(
        "{year:04}{month:02}{day:02}_{:02}{:02}{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a Gregorian (year, month, day).
///
/// Howard Hinnant's `civil_from_days`, with eras starting on March 1st.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);

    (year as u64, month, day)
}

/// Delete `.log` files older than three days from the slug directories
/// under `<log_dir>/llama/`, removing a slug directory once its last log is
/// gone.
///
/// Nothing outside `<log_dir>/llama/` is visited, and only one level of slug
/// directories inside it. Runs before tracing is installed, so problems are
/// reported with `eprintln!` and never abort the program.
pub fn cleanup_old_logs(log_dir: &Path) {
    let root = owned_root(log_dir);
    if !root.is_dir() {
        return;
    }
    let cutoff = SystemTime::now() - LOG_RETENTION;

    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: cannot read log directory {}: {e}", root.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let slug_dir = entry.path();
        if !slug_dir.is_dir() {
            continue;
        }
        if prune_slug_dir(&slug_dir, cutoff) > 0 {
            // fails while other files remain, which is fine
            let _ = fs::remove_dir(&slug_dir);
        }
    }
}

/// Remove expired `.log` files directly inside `dir`, returning how many
/// were deleted. Subdirectories are left alone.
fn prune_slug_dir(dir: &Path, cutoff: SystemTime) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: cannot read log directory {}: {e}", dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_expired_log(&path, cutoff) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("warning: cannot remove old log {}: {e}", path.display()),
        }
    }
    removed
}

fn is_expired_log(path: &Path, cutoff: SystemTime) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("log") {
        return false;
    }
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified < cutoff,
        Err(e) => {
            eprintln!("warning: cannot stat {}: {e}", path.display());
            false
        }
    }
}
