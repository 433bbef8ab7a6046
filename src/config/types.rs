use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Register-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub connection: ConnectionConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl range and record policy
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// First year to enumerate (inclusive)
    #[serde(rename = "start-year")]
    pub start_year: i32,

    /// Year at which enumeration stops (exclusive)
    #[serde(rename = "finish-year")]
    pub finish_year: i32,

    /// What to do with a record whose fields cannot be made valid UTF-8
    #[serde(rename = "on-encoding-error", default)]
    pub on_encoding_error: EncodingPolicy,
}

/// Policy applied when a record fails encoding normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingPolicy {
    /// Surface the failure to the caller
    #[default]
    Abort,

    /// Log the failure and continue with the next record
    Skip,
}

/// Connection and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Scheme and host of the register, e.g. `http://www.classification.gov.au`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Read timeout per request (milliseconds)
    #[serde(rename = "read-timeout-ms", default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Connect timeout (milliseconds)
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum attempts per request; absent means retry forever
    #[serde(rename = "max-attempts", default)]
    pub max_attempts: Option<u32>,

    /// Pause between a failed attempt and the reconnect (milliseconds)
    #[serde(rename = "retry-delay-ms", default)]
    pub retry_delay_ms: u64,
}

impl ConnectionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_read_timeout_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
