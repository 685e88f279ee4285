//! Client and engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BlueskyError, BlueskyResult};

/// Configuration for the Bluesky graph tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// PDS / entryway base URL (default: https://bsky.social)
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// Request timeout
    #[serde(default = "default_timeout", with = "duration_millis")]
    pub timeout: Duration,

    /// Graph crawler settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Action queue settings
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_service_url() -> String {
    "https://bsky.social".into()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl BlueskyConfig {
    /// Check the configuration for values the engines cannot work with.
    pub fn validate(&self) -> BlueskyResult<()> {
        if !self.service_url.starts_with("http://") && !self.service_url.starts_with("https://")
        {
            return Err(BlueskyError::Config(format!(
                "service_url must start with http:// or https://, got: {}",
                self.service_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(BlueskyError::Config("timeout must be non-zero".into()));
        }
        if self.crawl.scan_ceiling == 0 {
            return Err(BlueskyError::Config("crawl.scan_ceiling must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            timeout: default_timeout(),
            crawl: CrawlConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Graph crawler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Courtesy delay between page requests, in milliseconds
    #[serde(default = "default_page_delay", with = "duration_millis")]
    pub page_delay: Duration,

    /// Hard ceiling on raw records scanned in one crawl
    #[serde(default = "default_scan_ceiling")]
    pub scan_ceiling: usize,
}

const fn default_page_delay() -> Duration {
    Duration::from_millis(80)
}

const fn default_scan_ceiling() -> usize {
    100_000
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_delay: default_page_delay(),
            scan_ceiling: default_scan_ceiling(),
        }
    }
}

/// Action queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delay between consecutive tasks, in milliseconds
    #[serde(default = "default_pace", with = "duration_millis")]
    pub pace: Duration,

    /// Pause after a rate-limited mutation, in milliseconds
    #[serde(default = "default_cooldown", with = "duration_millis")]
    pub rate_limit_cooldown: Duration,
}

const fn default_pace() -> Duration {
    Duration::from_millis(1000)
}

const fn default_cooldown() -> Duration {
    Duration::from_secs(5)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pace: default_pace(),
            rate_limit_cooldown: default_cooldown(),
        }
    }
}

/// Rate limit information from PDS response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// Maximum number of requests allowed in the window
    pub limit: Option<u32>,

    /// Remaining requests in the current window
    pub remaining: Option<u32>,

    /// Unix timestamp when the rate limit resets
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Parse rate limit info from response headers.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        fn header<T: std::str::FromStr>(headers: &reqwest::header::HeaderMap, name: &str) -> Option<T> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        }

        Self {
            limit: header(headers, "ratelimit-limit"),
            remaining: header(headers, "ratelimit-remaining"),
            reset: header(headers, "ratelimit-reset"),
        }
    }

    /// Check if we're rate limited (remaining == 0).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Get the duration until rate limit resets.
    #[must_use]
    pub fn time_until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();

        if reset > now {
            Some(Duration::from_secs(reset - now))
        } else {
            None
        }
    }
}
