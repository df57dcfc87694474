use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::warn;
use url::Url;

use crate::constants::{
    DEFAULT_BACKEND_URI, DEFAULT_DISTRIBUTION_RATIO, DEFAULT_PAGE_COUNT_WAIT_MS,
    DEFAULT_RECONNECT_MAX_MS, DEFAULT_RECONNECT_MIN_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    SOCKET_IO_PATH,
};

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: Url,
    pub stream_url: Url,
    pub request_timeout: Duration,
    pub page_count_wait: Duration,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    pub distribution_ratio: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend_override =
            read_env_first(&["BACKEND_SERVER_URI", "REACT_APP_BACKEND_SERVER_URI"]);
        let backend = match backend_override {
            Some(value) => value,
            None => {
                warn!(
                    "BACKEND_SERVER_URI not set; defaulting to {}",
                    DEFAULT_BACKEND_URI
                );
                DEFAULT_BACKEND_URI.to_string()
            }
        };

        let mut config = Self::for_backend(&backend)?;

        config.request_timeout = Duration::from_millis(
            read_env_u64("REQUEST_TIMEOUT_MS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        );
        config.page_count_wait = Duration::from_millis(
            read_env_u64("PAGE_COUNT_WAIT_MS").unwrap_or(DEFAULT_PAGE_COUNT_WAIT_MS),
        );
        config.reconnect_min = Duration::from_millis(
            read_env_u64("STREAM_RECONNECT_MIN_MS").unwrap_or(DEFAULT_RECONNECT_MIN_MS),
        );
        config.reconnect_max = Duration::from_millis(
            read_env_u64("STREAM_RECONNECT_MAX_MS").unwrap_or(DEFAULT_RECONNECT_MAX_MS),
        );
        if config.reconnect_max < config.reconnect_min {
            warn!("STREAM_RECONNECT_MAX_MS below minimum; clamping");
            config.reconnect_max = config.reconnect_min;
        }
        config.distribution_ratio = env::var("DISTRIBUTION_RATIO")
            .ok()
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_DISTRIBUTION_RATIO);

        Ok(config)
    }

    /// Builds a config with default tuning for the given backend base URL.
    pub fn for_backend(backend: &str) -> Result<Self> {
        let backend_url = Url::parse(backend.trim_end_matches('/'))
            .with_context(|| format!("invalid backend URL {}", backend))?;
        let stream_url = derive_stream_url(&backend_url)?;
        Ok(Self {
            backend_url,
            stream_url,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            page_count_wait: Duration::from_millis(DEFAULT_PAGE_COUNT_WAIT_MS),
            reconnect_min: Duration::from_millis(DEFAULT_RECONNECT_MIN_MS),
            reconnect_max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            distribution_ratio: DEFAULT_DISTRIBUTION_RATIO,
        })
    }
}

pub fn read_env_first(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

fn read_env_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Maps the REST base URL onto the Socket.IO websocket endpoint.
pub fn derive_stream_url(backend_url: &Url) -> Result<Url> {
    let mut url = backend_url.clone();
    match url.scheme() {
        "http" => {
            let _ = url.set_scheme("ws");
        }
        "https" => {
            let _ = url.set_scheme("wss");
        }
        "ws" | "wss" => {}
        other => return Err(anyhow!("unsupported backend scheme {}", other)),
    }
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}{}", base_path, SOCKET_IO_PATH));
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}
