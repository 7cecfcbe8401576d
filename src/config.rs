// src/config.rs
//! Worker configuration, read from the process environment (after `.env`).
//! Every knob has a default except `DATABASE_URL`.

use anyhow::{anyhow, Context, Result};
use chrono::Duration as ChronoDuration;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::policy::parse_allowlist;
use crate::fetch::{FetchSettings, DEFAULT_MAX_BYTES, DEFAULT_TIMEOUT};
use crate::ingest::scheduler::SchedulerCfg;
use crate::ingest::{IngestSettings, DEFAULT_SCORE_BATCH_LIMIT, DEFAULT_SCORE_LOOKBACK_DAYS};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const DEFAULT_SCORING_CONFIG_PATH: &str = "config/scoring.toml";
const DEFAULT_INTERVAL_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_fetch_bytes: usize,
    pub fetch_timeout: Duration,
    pub fetch_header_timeout: Duration,
    pub allowed_fetch_hosts: Vec<String>,
    pub worker_interval: Duration,
    pub run_timeout: Duration,
    pub score_lookback_days: i64,
    pub score_batch_limit: i64,
    pub scoring_config_path: PathBuf,
    /// Prometheus listener; `None` leaves metrics unexported.
    pub metrics_addr: Option<SocketAddr>,
    pub seed_default_sources: bool,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var(ENV_DATABASE_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("{ENV_DATABASE_URL} is not set"))?;

        let fetch_timeout = Duration::from_secs(env_or("FETCH_TIMEOUT_SECONDS", DEFAULT_TIMEOUT.as_secs())?);
        let fetch_header_timeout =
            Duration::from_secs(env_or("FETCH_HEADER_TIMEOUT_SECONDS", fetch_timeout.as_secs())?);

        let metrics_addr = match std::env::var("METRICS_ADDR") {
            Ok(v) if !v.trim().is_empty() => Some(
                v.trim()
                    .parse::<SocketAddr>()
                    .with_context(|| format!("METRICS_ADDR={v:?} is not a socket address"))?,
            ),
            _ => None,
        };

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref().map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Ok(Self {
            database_url,
            max_fetch_bytes: env_or("MAX_FETCH_BYTES", DEFAULT_MAX_BYTES)?,
            fetch_timeout,
            fetch_header_timeout,
            allowed_fetch_hosts: parse_allowlist(&std::env::var("ALLOWED_FETCH_HOSTS").unwrap_or_default()),
            worker_interval: Duration::from_secs(env_or("WORKER_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?),
            run_timeout: Duration::from_secs(env_or("RUN_TIMEOUT_SECS", DEFAULT_INTERVAL_SECS)?),
            score_lookback_days: env_or("SCORE_LOOKBACK_DAYS", DEFAULT_SCORE_LOOKBACK_DAYS)?,
            score_batch_limit: env_or("SCORE_BATCH_LIMIT", DEFAULT_SCORE_BATCH_LIMIT)?,
            scoring_config_path: std::env::var("SCORING_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCORING_CONFIG_PATH)),
            metrics_addr,
            seed_default_sources: env_flag("SEED_DEFAULT_SOURCES"),
            log_format,
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_bytes: self.max_fetch_bytes,
            timeout: self.fetch_timeout,
            header_timeout: self.fetch_header_timeout,
            allowed_hosts: self.allowed_fetch_hosts.clone(),
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            score_lookback: ChronoDuration::days(self.score_lookback_days),
            score_batch_limit: self.score_batch_limit,
        }
    }

    pub fn scheduler(&self) -> SchedulerCfg {
        SchedulerCfg {
            interval: self.worker_interval,
            run_timeout: self.run_timeout,
        }
    }
}

/// Unset or blank falls back to `default`; anything unparsable is an error.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{key}={v:?}: {e}")),
        _ => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
