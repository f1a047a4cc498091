// Shared transport configuration for building the reqwest::Client.
//
// The gateway speaks plain HTTP on the local network; the knobs that
// matter are the request timeout and how many requests may be in flight.

use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on concurrent outbound requests.
pub const DEFAULT_MAX_SOCKETS: usize = 20;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Transport-level timeout for a single request.
    pub timeout: Duration,
    /// Maximum number of requests in flight at once. Further requests
    /// wait for a free slot.
    pub max_sockets: usize,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_sockets: DEFAULT_MAX_SOCKETS,
            user_agent: concat!("deconz-api/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .pool_max_idle_per_host(self.max_sockets)
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
