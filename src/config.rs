//! Session configuration.
//!
//! Provides a type-safe interface for configuring where a session connects
//! and how it reacts to closed connections.
//!
//! # Example
//!
//! ```ignore
//! use jscall::{RetryPolicy, SessionConfig};
//!
//! let config = SessionConfig::new("3f2a9c")
//!     .with_page_url("https://app.example.com/dashboard")
//!     .with_retry(RetryPolicy::exponential(5));
//! ```
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `JSCALL_SESSION_ID` | Session identifier (required) |
//! | `JSCALL_PAGE_URL` | Page location the connection URL derives from |
//! | `JSCALL_WEBSOCKET_PROXY_URL` | Overrides the page location |

// ============================================================================
// Imports
// ============================================================================

use std::env;

use crate::error::{Error, Result};
use crate::transport::RetryPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Page location used when none is configured.
pub const DEFAULT_PAGE_URL: &str = "http://127.0.0.1:8081/";

/// Environment variable holding the session identifier.
pub const ENV_SESSION_ID: &str = "JSCALL_SESSION_ID";

/// Environment variable holding the page location.
pub const ENV_PAGE_URL: &str = "JSCALL_PAGE_URL";

/// Environment variable holding the proxy override.
pub const ENV_PROXY_URL: &str = "JSCALL_WEBSOCKET_PROXY_URL";

// ============================================================================
// SessionConfig
// ============================================================================

/// Configuration of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Identifier appended to the connection URL.
    session_id: String,

    /// Page location, `DEFAULT_PAGE_URL` if unset.
    page_url: Option<String>,

    /// Overrides the page location when set.
    proxy_url: Option<String>,

    /// Reaction to closed connections.
    retry: RetryPolicy,
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionConfig {
    /// Creates a configuration for `session_id` with default settings.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            page_url: None,
            proxy_url: None,
            retry: RetryPolicy::never(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `JSCALL_SESSION_ID` is missing.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the session id is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let session_id = lookup(ENV_SESSION_ID)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::config(format!("{ENV_SESSION_ID} is not set")))?;

        let mut config = Self::new(session_id);
        config.page_url = lookup(ENV_PAGE_URL).filter(|url| !url.is_empty());
        config.proxy_url = lookup(ENV_PROXY_URL).filter(|url| !url.is_empty());
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionConfig {
    /// Sets the page location.
    #[inline]
    #[must_use]
    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }

    /// Sets the proxy override.
    #[inline]
    #[must_use]
    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    /// Sets the retry policy.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl SessionConfig {
    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the configured page location.
    #[inline]
    #[must_use]
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    /// Returns the configured proxy override.
    #[inline]
    #[must_use]
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    /// Returns the location the connection URL derives from.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.proxy_url()
            .or_else(|| self.page_url())
            .unwrap_or(DEFAULT_PAGE_URL)
    }

    /// Returns the retry policy.
    #[inline]
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Checks the session identifier is usable as one path segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if it is empty or contains `/`.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.is_empty() {
            return Err(Error::config("session id is empty"));
        }
        if self.session_id.contains('/') {
            return Err(Error::config(format!(
                "session id must be a single path segment: {}",
                self.session_id
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
