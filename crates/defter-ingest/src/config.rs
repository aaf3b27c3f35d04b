//! Runtime configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | [`defaults::DATABASE_URL`] |
//! | `DEFTER_STORAGE_PATH` | [`defaults::STORAGE_PATH`] |
//! | `DEFTER_MAX_UPLOAD_BYTES` | [`defaults::MAX_UPLOAD_BYTES`] |
//! | `DEFTER_CLASSIFIER_MIN_SCORE` | [`defaults::CLASSIFIER_MIN_SCORE`] |
//! | `DEFTER_DB_MAX_CONNECTIONS` | [`defaults::DB_MAX_CONNECTIONS`] |
//!
//! Unparseable values fall back to the default with a warning.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use defter_core::defaults;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_STORAGE_PATH: &str = "DEFTER_STORAGE_PATH";
pub const ENV_MAX_UPLOAD_BYTES: &str = "DEFTER_MAX_UPLOAD_BYTES";
pub const ENV_CLASSIFIER_MIN_SCORE: &str = "DEFTER_CLASSIFIER_MIN_SCORE";
pub const ENV_DB_MAX_CONNECTIONS: &str = "DEFTER_DB_MAX_CONNECTIONS";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub database_url: String,
    pub storage_path: PathBuf,
    pub max_upload_bytes: u64,
    pub classifier_min_score: f32,
    pub db_max_connections: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DATABASE_URL.to_string(),
            storage_path: PathBuf::from(defaults::STORAGE_PATH),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            classifier_min_score: defaults::CLASSIFIER_MIN_SCORE,
            db_max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl IngestConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = Self::default();
        Self {
            database_url: lookup(ENV_DATABASE_URL)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(base.database_url),
            storage_path: lookup(ENV_STORAGE_PATH)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(base.storage_path),
            max_upload_bytes: parse_or(
                &lookup,
                ENV_MAX_UPLOAD_BYTES,
                base.max_upload_bytes,
                |v: &u64| *v > 0,
            ),
            classifier_min_score: parse_or(
                &lookup,
                ENV_CLASSIFIER_MIN_SCORE,
                base.classifier_min_score,
                |v: &f32| v.is_finite() && *v >= 0.0,
            ),
            db_max_connections: parse_or(
                &lookup,
                ENV_DB_MAX_CONNECTIONS,
                base.db_max_connections,
                |v: &u32| *v > 0,
            ),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) if valid(&v) => v,
        _ => {
            warn!(
                subsystem = "config",
                key = key,
                value = %raw,
                default = %default,
                "Invalid configuration value, using default"
            );
            default
        }
    }
}
