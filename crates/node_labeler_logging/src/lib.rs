//! Shared logging setup for node labeler binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "node_labeler=info,node_labeler_manifest=info";
const DEBUG_LOG_FILTER: &str = "node_labeler=debug,node_labeler_manifest=debug";

/// Logging configuration shared by node labeler binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub debug: bool,
    /// Also write a daily-rolling log file here when set.
    pub log_dir: Option<PathBuf>,
}

/// Default filter directive for the given verbosity. `RUST_LOG` wins over it.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        DEBUG_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Initialize tracing with stderr output and an optional rolling file.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<WorkerGuard>> {
    let make_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(config.debug)))
    };

    let mut guard = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let file_appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", sanitize_name(config.app_name)));
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_filter(make_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(make_filter()),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("node-labeler"), "node-labeler");
        assert_eq!(sanitize_name("node labeler/v2"), "node_labeler_v2");
    }

    #[test]
    fn test_default_filter() {
        assert!(default_filter(true).contains("debug"));
        assert!(default_filter(false).contains("info"));
    }

    #[test]
    fn test_init_logging_creates_log_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let result = init_logging(LogConfig {
            app_name: "node-labeler",
            debug: false,
            log_dir: Some(log_dir.clone()),
        });
        // Another test in this process may already own the global subscriber.
        if let Ok(guard) = result {
            assert!(guard.is_some());
        }
        assert!(log_dir.is_dir());
    }
}
