//! Logging setup
//!
//! - console: filtered by `LOG_LEVEL`, text or JSON
//! - `<log_dir>/app.YYYY-MM-DD.log`: one file per UTC day (tracing-appender
//!   puts the date between prefix and suffix), 365 files kept
//! - `<log_dir>/error.log`: ERROR and above from every target, never rotated

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{Config, LogFormat};

pub const APP_LOG_PREFIX: &str = "app";
pub const ERROR_LOG_NAME: &str = "error.log";
pub const APP_LOG_RETENTION: usize = 365;

/// Keeps the non-blocking file writers flushing; hold for the process lifetime
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. A second call leaves the first subscriber in place.
pub fn init(config: &Config) -> anyhow::Result<LogGuards> {
    fs::create_dir_all(&config.log_dir)?;

    let app_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(APP_LOG_PREFIX)
        .filename_suffix("log")
        .max_log_files(APP_LOG_RETENTION)
        .build(&config.log_dir)?;
    let (app_writer, app_guard) = tracing_appender::non_blocking(app_appender);

    let error_appender = rolling::never(&config.log_dir, ERROR_LOG_NAME);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    let console = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    let result = tracing_subscriber::registry()
        .with(console.with_filter(env_filter(&config.log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(app_writer)
                .with_ansi(false)
                .with_filter(env_filter(&config.log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init();

    if let Err(e) = result {
        tracing::warn!("Logging already initialized, keeping existing subscriber: {}", e);
    }

    Ok(LogGuards {
        _guards: vec![app_guard, error_guard],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_log_dir_and_tolerates_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            log_dir: dir.path().join("logs"),
            ..Config::default()
        };

        let first = init(&config).unwrap();
        let second = init(&config).unwrap();
        tracing::error!("logging smoke test");
        drop(second);
        drop(first);

        assert!(config.log_dir.join(ERROR_LOG_NAME).exists());

        let dated: Vec<String> = fs::read_dir(&config.log_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("app.") && n.ends_with(".log"))
            .collect();
        assert_eq!(dated.len(), 1, "{dated:?}");
        // app.YYYY-MM-DD.log
        let date = &dated[0]["app.".len()..dated[0].len() - ".log".len()];
        assert!(chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok(), "{}", dated[0]);
    }
}
