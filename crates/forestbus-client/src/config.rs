use std::time::Duration;

use forestbus_common::transport::DEFAULT_CONNECT_TIMEOUT;

/// Client configuration.
///
/// # Default Configuration
///
/// - `connect_timeout`: 5 seconds
/// - `request_timeout`: none, a call waits as long as the node holds it
///   (long-polling reads may be held for a long time)
/// - `retry_not_leader`: true
///
/// # Example
///
/// ```
/// use forestbus_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_connect_timeout(Duration::from_secs(2))
///     .with_request_timeout(Duration::from_secs(60));
/// assert!(config.retry_not_leader);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on establishing a TCP connection to one node
    pub connect_timeout: Duration,
    /// Bound on a single call; expiry counts as a transport failure
    pub request_timeout: Option<Duration>,
    /// Move on to the next node when a node answers "not leader" or
    /// "no leader" instead of failing the call
    pub retry_not_leader: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            retry_not_leader: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry_not_leader(mut self, enabled: bool) -> Self {
        self.retry_not_leader = enabled;
        self
    }
}
