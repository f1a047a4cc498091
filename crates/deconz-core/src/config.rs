// ── Runtime gateway configuration ──
//
// These types describe *how* to synchronize with one gateway. They
// carry the API key and tuning, but never touch disk. The runner (or
// any embedding application) constructs a `GatewayConfig` and hands it in.

use std::collections::HashMap;
use std::time::Duration;

use deconz_api::client::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use deconz_api::throttle::{DEFAULT_GROUP_PUT_DELAY, DEFAULT_PUT_DELAY};
use deconz_api::websocket::DEFAULT_RETRY_TIME;
use deconz_api::{ClientConfig, TransportConfig};
use secrecy::SecretString;

/// Default poll interval.
pub const DEFAULT_HEARTRATE: Duration = Duration::from_secs(5);

/// Default number of key-creation attempts while the gateway is locked.
pub const DEFAULT_KEY_ATTEMPTS: u32 = 5;

/// Default initial delay between key-creation attempts. Doubles per attempt.
pub const DEFAULT_KEY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// `devicetype` sent when creating an API key.
pub const DEFAULT_DEVICETYPE: &str = "deconz-sync";

/// Configuration for synchronizing with a single gateway.
///
/// Built by the runner, passed to `Gateway` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host, optionally with port (e.g. `192.168.1.10:80`).
    pub host: String,
    /// API key. When absent, one is created on connect (gateway must be unlocked).
    pub api_key: Option<SecretString>,
    /// Poll interval.
    pub heartrate: Duration,
    /// Open the push stream after the initial poll.
    pub stream_enabled: bool,
    /// Push stream port. Taken from the gateway config when unset.
    pub websocket_port: Option<u16>,
    /// Wait before reconnecting the push stream. Zero disables reconnection.
    pub retry_time: Duration,
    /// Per-device expose decision. Devices not listed are exposed.
    pub expose: HashMap<String, bool>,
    /// Key-creation attempts while the gateway is locked.
    pub key_attempts: u32,
    pub key_retry_delay: Duration,
    pub devicetype: String,
    pub transport: TransportConfig,
    pub put_delay: Duration,
    pub group_put_delay: Duration,
    pub retry_delay: Duration,
    pub max_attempts: u32,
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Whether the device should be handed to the presentation layer.
    pub fn is_exposed(&self, device_id: &str) -> bool {
        self.expose.get(device_id).copied().unwrap_or(true)
    }

    /// Protocol client settings derived from this config.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            transport: self.transport.clone(),
            put_delay: self.put_delay,
            group_put_delay: self.group_put_delay,
            retry_delay: self.retry_delay,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "localhost:80".into(),
            api_key: None,
            heartrate: DEFAULT_HEARTRATE,
            stream_enabled: true,
            websocket_port: None,
            retry_time: DEFAULT_RETRY_TIME,
            expose: HashMap::new(),
            key_attempts: DEFAULT_KEY_ATTEMPTS,
            key_retry_delay: DEFAULT_KEY_RETRY_DELAY,
            devicetype: DEFAULT_DEVICETYPE.into(),
            transport: TransportConfig::default(),
            put_delay: DEFAULT_PUT_DELAY,
            group_put_delay: DEFAULT_GROUP_PUT_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
