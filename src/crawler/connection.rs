//! Persistent connection to the register host
//!
//! This module owns the single HTTP connection used by a crawl:
//! - Building the client with the crawler's user agent
//! - Keeping one keep-alive connection to the host
//! - Reconnecting and retrying after transport failures
//!
//! Retrying is unconditional and unbounded unless a [`RetryPolicy`] caps it.

use crate::config::{ConnectionConfig, UserAgentConfig};
use crate::CrawlError;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// How often and how patiently a request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request; `None` retries forever
    pub max_attempts: Option<u32>,

    /// Pause before reconnecting after a failure
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.retry_delay(),
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Builds an HTTP client holding at most one idle connection to the host
///
/// # Arguments
///
/// * `config` - Timeouts for the connection
/// * `user_agent` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &ConnectionConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(config.read_timeout())
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(1)
        .tcp_keepalive(Duration::from_secs(60))
        .gzip(true)
        .brotli(true)
        .build()
}

/// One persistent connection to the register
pub struct Connection {
    client: Client,
    base_url: Url,
    config: ConnectionConfig,
    user_agent: UserAgentConfig,
    policy: RetryPolicy,
    reconnects: u64,
}

impl Connection {
    /// Opens a connection using the configured retry policy
    pub fn open(config: &ConnectionConfig, user_agent: &UserAgentConfig) -> Result<Self, CrawlError> {
        Self::with_policy(config, user_agent, RetryPolicy::from_config(config))
    }

    pub fn with_policy(
        config: &ConnectionConfig,
        user_agent: &UserAgentConfig,
        policy: RetryPolicy,
    ) -> Result<Self, CrawlError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            crate::ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", config.base_url, e))
        })?;

        Ok(Self {
            client: build_http_client(config, user_agent)?,
            base_url,
            config: config.clone(),
            user_agent: user_agent.clone(),
            policy,
            reconnects: 0,
        })
    }

    /// Number of times the connection has been re-established
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Absolute URL for a path-and-query on the register host
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// GETs `path` and returns the raw body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Send error (refused, reset, timeout) | Reconnect, retry |
    /// | Body read error | Reconnect, retry |
    /// | HTTP 5xx | Reconnect, retry |
    /// | Any other status | Return body |
    ///
    /// With the default policy the loop never gives up. A capped policy
    /// returns `CrawlError::RetriesExhausted` after `max_attempts`.
    pub async fn request(&mut self, path: &str) -> Result<Vec<u8>, CrawlError> {
        let url = self.url_for(path);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            tracing::debug!("GET {} (attempt {})", url, attempts);

            let reason = match self.client.get(&url).send().await {
                Ok(response) if response.status().is_server_error() => {
                    format!("HTTP {}", response.status().as_u16())
                }
                Ok(response) => match response.bytes().await {
                    Ok(body) => return Ok(body.to_vec()),
                    Err(e) => format!("body read failed: {}", e),
                },
                Err(e) if e.is_timeout() => "request timeout".to_string(),
                Err(e) if e.is_connect() => format!("connect failed: {}", e),
                Err(e) => e.to_string(),
            };

            if self.policy.exhausted(attempts) {
                tracing::error!("Giving up on {} after {} attempts: {}", url, attempts, reason);
                return Err(CrawlError::RetriesExhausted {
                    url,
                    attempts,
                    reason,
                });
            }

            tracing::warn!("Transport failure for {}: {}; reconnecting", url, reason);
            if !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }
            self.reconnect()?;
        }
    }

    /// Drops the current client (and its pooled connection) and builds a new one
    fn reconnect(&mut self) -> Result<(), CrawlError> {
        self.client = build_http_client(&self.config, &self.user_agent)?;
        self.reconnects += 1;
        Ok(())
    }
}
