//! Bluesky client error types.

use std::time::Duration;

use thiserror::Error;

use crate::types::AccountRecord;

/// Errors raised by the XRPC client and identity helpers.
#[derive(Error, Debug)]
pub enum BlueskyError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The XRPC endpoint returned an error body.
    ///
    /// `message` is the server-provided text and is shown to operators verbatim.
    #[error("{message}")]
    Api {
        status: u16,
        error: Option<String>,
        message: String,
    },

    /// HTTP 429 from the PDS
    #[error("Rate limited (429), retry after {}", describe_retry(*.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// A handle could not be resolved to a did
    #[error("{0}")]
    NotFound(String),

    /// Malformed did or edge reference
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_retry(retry_after: Option<u64>) -> String {
    retry_after.map_or_else(|| "an unknown delay".into(), |s| format!("{s} seconds"))
}

impl BlueskyError {
    /// Whether the server signalled rate limiting.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Api { status: 429, .. }
        )
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Server-suggested delay before the next request.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

/// Result type for Bluesky operations.
pub type BlueskyResult<T> = Result<T, BlueskyError>;

/// A crawl that could not complete.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// The target identity did not resolve; no page was requested.
    #[error("{source}")]
    Resolution {
        input: String,
        #[source]
        source: BlueskyError,
    },

    /// A page request failed. `partial` holds the records accepted before it.
    #[error("{source}")]
    Transport {
        #[source]
        source: BlueskyError,
        partial: Vec<AccountRecord>,
    },
}

impl CrawlError {
    /// The underlying client error.
    #[must_use]
    pub const fn client_error(&self) -> &BlueskyError {
        match self {
            Self::Resolution { source, .. } | Self::Transport { source, .. } => source,
        }
    }

    /// Records accepted before the failure. Empty for resolution failures.
    #[must_use]
    pub fn partial(&self) -> &[AccountRecord] {
        match self {
            Self::Resolution { .. } => &[],
            Self::Transport { partial, .. } => partial,
        }
    }
}
