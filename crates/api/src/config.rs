//! Process configuration read from environment variables.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use docembed_infra::embedding::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use docembed_infra::embedding::DEFAULT_BATCH_SIZE;
use docembed_infra::jobs::{DEFAULT_DISPATCH_BATCH_SIZE, DEFAULT_MAX_RETRIES};

const DEV_CRON_SECRET: &str = "dev-cron-secret";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Shared secret expected in `x-cron-secret` on `POST /jobs/process`.
    pub cron_secret: String,
    /// `None` runs on in-memory stores.
    pub database_url: Option<String>,
    /// `None` falls back to the local hashing provider.
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_batch_size: usize,
    pub embedding_timeout: Duration,
    pub dispatch_batch_size: usize,
    pub max_retries: u32,
    /// In-process dispatch interval; `None` leaves triggering to an external cron.
    pub dispatch_interval: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            cron_secret: DEV_CRON_SECRET.to_string(),
            database_url: None,
            embedding_api_key: None,
            embedding_base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_MODEL.to_string(),
            embedding_batch_size: DEFAULT_BATCH_SIZE,
            embedding_timeout: Duration::from_secs(30),
            dispatch_batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            dispatch_interval: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database_url = get("DATABASE_URL");
        let cron_secret = match get("CRON_SECRET") {
            Some(secret) => secret,
            None if database_url.is_some() => {
                bail!("CRON_SECRET must be set when DATABASE_URL is configured")
            }
            None => {
                tracing::warn!("CRON_SECRET not set; using insecure dev default");
                DEV_CRON_SECRET.to_string()
            }
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            cron_secret,
            database_url,
            embedding_api_key: get("EMBEDDING_API_KEY"),
            embedding_base_url: get("EMBEDDING_BASE_URL").unwrap_or(defaults.embedding_base_url),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_batch_size: parse_or(&get, "EMBEDDING_BATCH_SIZE", defaults.embedding_batch_size)?,
            embedding_timeout: Duration::from_secs(parse_or(
                &get,
                "EMBEDDING_TIMEOUT_SECS",
                defaults.embedding_timeout.as_secs(),
            )?),
            dispatch_batch_size: parse_or(&get, "DISPATCH_BATCH_SIZE", defaults.dispatch_batch_size)?,
            max_retries: parse_or(&get, "JOB_MAX_RETRIES", defaults.max_retries)?,
            dispatch_interval: match get("DISPATCH_INTERVAL_SECS") {
                Some(raw) => Some(Duration::from_secs(parse("DISPATCH_INTERVAL_SECS", &raw)?))
                    .filter(|d| !d.is_zero()),
                None => None,
            },
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: '{raw}'"))
}
