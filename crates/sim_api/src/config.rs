use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_BASE_URL;

/// Connection establishment timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Transport configuration for simulation backend requests.
#[derive(Debug, Clone)]
pub struct SimApiConfig {
    /// Base URL of the simulation backend.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional whole-request timeout for start/stop calls.
    ///
    /// Never applied to the event stream, which is long-lived.
    pub timeout: Option<Duration>,
    /// Timeout for establishing a TCP connection.
    pub connect_timeout: Duration,
}

impl Default for SimApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SimApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
