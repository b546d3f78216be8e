//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveTime;

use crate::booster::BoostParams;

pub const DEFAULT_MODEL_PATH: &str = "models/model.json";
pub const DEFAULT_TRAIN_DATA_PATH: &str = "data/train.csv";
pub const DEFAULT_RETRAIN_AT: &str = "02:00";

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Canonical ("latest") model path
    pub model_path: PathBuf,

    /// Training CSV used when a request does not name one
    pub train_data_path: PathBuf,

    /// tracing filter directive, e.g. `info` or `ml_server=debug`
    pub log_level: String,

    pub log_dir: PathBuf,

    pub log_format: LogFormat,

    /// Skip the daily retraining task
    pub scheduler_disabled: bool,

    /// Local time of day at which the scheduler retrains
    pub retrain_at: NaiveTime,

    /// Hyper-parameters for training from CSV
    pub boost: BoostParams,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = BoostParams::default();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: parse_var("PORT", 8000),

            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODEL_PATH)),

            train_data_path: env::var("TRAIN_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_TRAIN_DATA_PATH)),

            log_level: env::var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|_| "info".to_string()),

            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),

            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },

            scheduler_disabled: env::var("DISABLE_SCHEDULER")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),

            retrain_at: env::var("RETRAIN_AT")
                .ok()
                .and_then(|v| match parse_time_of_day(&v) {
                    Some(t) => Some(t),
                    None => {
                        eprintln!("Invalid RETRAIN_AT '{}', using {}", v, DEFAULT_RETRAIN_AT);
                        None
                    }
                })
                .unwrap_or_else(default_retrain_at),

            boost: BoostParams {
                num_boost_round: parse_var("NUM_BOOST_ROUND", defaults.num_boost_round),
                learning_rate: parse_var("LEARNING_RATE", defaults.learning_rate),
                max_depth: parse_var("MAX_DEPTH", defaults.max_depth),
                ..defaults
            },
        }
    }

    /// Resolve the training source: request value, then `TRAIN_DATA_PATH`, then the default.
    /// Blank request values are rejected by `TrainRequest` validation before this point.
    pub fn resolve_data_path(&self, requested: Option<&str>) -> PathBuf {
        requested.map(PathBuf::from).unwrap_or_else(|| self.train_data_path.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            train_data_path: PathBuf::from(DEFAULT_TRAIN_DATA_PATH),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            log_format: LogFormat::Text,
            scheduler_disabled: false,
            retrain_at: default_retrain_at(),
            boost: BoostParams::default(),
        }
    }
}

// Logging is not initialized while config is read, hence eprintln.
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            eprintln!("Invalid value '{}' for {}, using default", raw, name);
            default
        }),
        Err(_) => default,
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn default_retrain_at() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN)
}
