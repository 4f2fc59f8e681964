use std::time::Duration;

use conduit_core::{DrbgConfig, StoreConfig, DEFAULT_STATE_TTL};
use thiserror::Error;
use tracing::info;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLIENTS: usize = 5;
pub const MAX_CLIENTS: usize = 50;
const DEFAULT_MAX_TRIPS: u32 = 5;
const DEFAULT_MAX_DELAY_MS: u64 = 100;
const DEFAULT_BATCHES: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote peer, without a trailing slash.
    pub server_url: String,
    pub request_timeout: Duration,
    pub store: StoreConfig,
    /// Concurrent conversations per batch.
    pub clients: usize,
    /// Upper bound of the random trip count per conversation per batch.
    pub max_trips: u32,
    /// Upper bound of the random pause between trips.
    pub max_delay: Duration,
    pub batches: u32,
    pub engine: DrbgConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            store: StoreConfig::default(),
            clients: DEFAULT_CLIENTS,
            max_trips: DEFAULT_MAX_TRIPS,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            batches: DEFAULT_BATCHES,
            engine: DrbgConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Priority: runtime env -> build-time env -> default
        let server_url = lookup("CONDUIT_SERVER_URL")
            .or_else(|| option_env!("CONDUIT_SERVER_URL").map(String::from))
            .unwrap_or(defaults.server_url)
            .trim_end_matches('/')
            .to_string();
        info!(url = %server_url, "Using peer URL");

        let request_timeout = parse(&lookup, "CONDUIT_REQUEST_TIMEOUT_SECS", |v: u64| v > 0)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let ttl = parse(&lookup, "CONDUIT_STATE_TTL_MINUTES", |v: u64| v > 0)?
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
            .unwrap_or(DEFAULT_STATE_TTL);
        let max_entries = parse(&lookup, "CONDUIT_STATE_MAX_ENTRIES", |v: usize| v > 0)?;

        let clients = parse(&lookup, "CONDUIT_CLIENTS", valid_client_count)?
            .unwrap_or(defaults.clients);
        let max_trips =
            parse(&lookup, "CONDUIT_MAX_TRIPS", |v: u32| v > 0)?.unwrap_or(defaults.max_trips);
        let max_delay = parse(&lookup, "CONDUIT_MAX_DELAY_MS", |_: u64| true)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay);
        let batches =
            parse(&lookup, "CONDUIT_BATCHES", |v: u32| v > 0)?.unwrap_or(defaults.batches);

        let engine = match parse(&lookup, "CONDUIT_RESEED_INTERVAL", |v: u64| v > 0)? {
            Some(reseed_interval) => DrbgConfig { reseed_interval },
            None => defaults.engine,
        };

        Ok(Self {
            server_url,
            request_timeout,
            store: StoreConfig { ttl, max_entries },
            clients,
            max_trips,
            max_delay,
            batches,
            engine,
        })
    }

    /// Apply the client count given as the first command-line argument.
    pub fn with_clients_arg(mut self, arg: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(raw) = arg {
            self.clients = parse_value("clients argument", raw, valid_client_count)?;
        }
        Ok(self)
    }
}

fn valid_client_count(v: usize) -> bool {
    (1..=MAX_CLIENTS).contains(&v)
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    valid: impl Fn(T) -> bool,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => parse_value(name, &raw, valid).map(Some),
        _ => Ok(None),
    }
}

fn parse_value<T>(name: &'static str, raw: &str, valid: impl Fn(T) -> bool) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason,
    };
    let value = raw.trim().parse::<T>().map_err(|e| invalid(e.to_string()))?;
    if valid(value) {
        Ok(value)
    } else {
        Err(invalid("out of range".to_string()))
    }
}
