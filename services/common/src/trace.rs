use std::{
    env,
    fs,
    panic,
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime},
};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Keeps the non-blocking file writer alive for the lifetime of the process.
pub struct TracingGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber: env-filtered stdout, plus a daily-rolling
/// file layer when the log directory is writable.
pub fn init_tracing(service_name: &str) -> TracingGuards {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    match file_writer(service_name) {
        Some((writer, guard)) => {
            let subscriber = Registry::default()
                .with(filter)
                .with(stdout_layer)
                .with(fmt::layer().with_writer(writer));
            let _ = tracing::subscriber::set_global_default(subscriber);
            TracingGuards {
                _file_guard: Some(guard),
            }
        }
        None => {
            let subscriber = Registry::default().with(filter).with(stdout_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            TracingGuards { _file_guard: None }
        }
    }
}

fn file_writer(service_name: &str) -> Option<(NonBlocking, WorkerGuard)> {
    let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "/var/log/siderea".to_string());
    let log_root = PathBuf::from(log_dir).join(service_name);
    fs::create_dir_all(&log_root).ok()?;

    // rolling::daily panics on unwritable paths instead of erroring.
    let appender = panic::catch_unwind(|| {
        tracing_appender::rolling::daily(&log_root, format!("{service_name}.log"))
    })
    .ok()?;

    let (writer, guard) = tracing_appender::non_blocking(appender);

    let retention_days = crate::env_or("LOG_RETENTION_DAYS", 14u64);
    let cleanup_interval_minutes = crate::env_or("LOG_CLEANUP_INTERVAL_MINUTES", 360u64);
    spawn_log_cleanup(log_root, retention_days, cleanup_interval_minutes);

    Some((writer, guard))
}

fn spawn_log_cleanup(log_root: PathBuf, retention_days: u64, cleanup_interval_minutes: u64) {
    if retention_days == 0 || cleanup_interval_minutes == 0 {
        return;
    }

    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let interval = Duration::from_secs(cleanup_interval_minutes * 60);

    thread::spawn(move || loop {
        if let Some(cutoff) = SystemTime::now().checked_sub(retention) {
            remove_logs_older_than(&log_root, cutoff);
        }
        thread::sleep(interval);
    });
}

fn remove_logs_older_than(root: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_logs_older_than(&path, cutoff);
            continue;
        }
        let modified = match fs::metadata(&path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        if modified < cutoff {
            let _ = fs::remove_file(&path);
        }
    }
}
