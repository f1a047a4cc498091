//! Settings for the deconz-sync runner.
//!
//! A TOML file of named gateway profiles plus global defaults, merged with
//! `DECONZ_` environment overrides, and translated into
//! `deconz_core::GatewayConfig`. The core crate never reads files; this
//! crate is the only place that does.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use deconz_api::TransportConfig;
use deconz_core::GatewayConfig;
use deconz_core::config::{DEFAULT_DEVICETYPE, DEFAULT_KEY_ATTEMPTS};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest accepted poll interval, in seconds.
pub const MIN_HEARTRATE_SECS: u64 = 1;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no gateway profile named '{name}'")]
    UnknownGateway { name: String },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Values applied to every gateway unless its profile overrides them.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub gateways: BTreeMap<String, GatewayProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Poll interval in seconds.
    #[serde(default = "default_heartrate")]
    pub heartrate: u64,

    /// Push stream reconnect delay in seconds. 0 disables reconnection.
    #[serde(default = "default_retry_time")]
    pub retry_time: u64,

    /// Open the push stream.
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_sockets")]
    pub max_sockets: usize,

    #[serde(default = "default_put_delay_ms")]
    pub put_delay_ms: u64,

    #[serde(default = "default_group_put_delay_ms")]
    pub group_put_delay_ms: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// `devicetype` reported when creating an API key.
    #[serde(default = "default_devicetype")]
    pub devicetype: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            heartrate: default_heartrate(),
            retry_time: default_retry_time(),
            stream: true,
            timeout: default_timeout(),
            max_sockets: default_max_sockets(),
            put_delay_ms: default_put_delay_ms(),
            group_put_delay_ms: default_group_put_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            devicetype: default_devicetype(),
        }
    }
}

fn default_heartrate() -> u64 {
    5
}
fn default_retry_time() -> u64 {
    15
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    5
}
fn default_max_sockets() -> usize {
    20
}
fn default_put_delay_ms() -> u64 {
    50
}
fn default_group_put_delay_ms() -> u64 {
    1000
}
fn default_retry_delay_ms() -> u64 {
    300
}
fn default_max_attempts() -> u32 {
    5
}
fn default_devicetype() -> String {
    DEFAULT_DEVICETYPE.into()
}

/// A named gateway profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayProfile {
    /// Gateway host, optionally with port (e.g., "192.168.1.10:80").
    pub host: String,

    /// API key (plaintext). Created on first connect when absent.
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Push stream port. Read from the gateway when unset.
    pub websocket_port: Option<u16>,

    /// Override the poll interval.
    pub heartrate: Option<u64>,

    /// Override whether the push stream is opened.
    pub stream: Option<bool>,

    /// Override the push stream reconnect delay.
    pub retry_time: Option<u64>,

    /// Key-creation attempts while the gateway is locked.
    pub key_attempts: Option<u32>,

    /// Per-device expose decisions, keyed by device id.
    #[serde(default)]
    pub expose: HashMap<String, bool>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "deconz-sync", "deconz-sync").map_or_else(
        || PathBuf::from("deconz-sync.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load settings from the platform config path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load settings from `path` and the environment.
///
/// A missing file is not an error; defaults and environment still apply.
/// Nested keys are separated by `__`, e.g. `DECONZ_DEFAULTS__HEARTRATE=10`
/// or `DECONZ_GATEWAYS__HOME__HOST=10.0.0.2`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DECONZ_").split("__"));

    Ok(figment.extract()?)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize settings to TOML and write them to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

/// Record a newly created API key in the profile stored at `path`.
///
/// Only the file is rewritten; environment overrides are not baked in.
pub fn store_api_key(path: &Path, name: &str, key: &str) -> Result<(), ConfigError> {
    let mut cfg: Config = match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };
    let profile = cfg.gateways.get_mut(name).ok_or_else(|| ConfigError::UnknownGateway {
        name: name.into(),
    })?;
    profile.api_key = Some(key.into());
    save_config(&cfg, path)
}

// ── Profile resolution ──────────────────────────────────────────────

/// Resolve the API key: named environment variable first, then plaintext.
pub fn resolve_api_key(profile: &GatewayProfile) -> Option<SecretString> {
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    profile.api_key.clone().map(SecretString::from)
}

/// Build a `GatewayConfig` from a profile and the global defaults.
pub fn profile_to_gateway_config(
    profile: &GatewayProfile,
    defaults: &Defaults,
) -> Result<GatewayConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }

    let heartrate = profile.heartrate.unwrap_or(defaults.heartrate);
    if heartrate < MIN_HEARTRATE_SECS {
        return Err(ConfigError::Validation {
            field: "heartrate".into(),
            reason: format!("must be at least {MIN_HEARTRATE_SECS}s, got {heartrate}s"),
        });
    }
    if defaults.max_sockets == 0 {
        return Err(ConfigError::Validation {
            field: "max_sockets".into(),
            reason: "must be at least 1".into(),
        });
    }
    if defaults.max_attempts == 0 {
        return Err(ConfigError::Validation {
            field: "max_attempts".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(GatewayConfig {
        host: profile.host.trim().to_owned(),
        api_key: resolve_api_key(profile),
        heartrate: Duration::from_secs(heartrate),
        stream_enabled: profile.stream.unwrap_or(defaults.stream),
        websocket_port: profile.websocket_port,
        retry_time: Duration::from_secs(profile.retry_time.unwrap_or(defaults.retry_time)),
        expose: profile.expose.clone(),
        key_attempts: profile.key_attempts.unwrap_or(DEFAULT_KEY_ATTEMPTS),
        devicetype: defaults.devicetype.clone(),
        transport: TransportConfig {
            timeout: Duration::from_secs(defaults.timeout),
            max_sockets: defaults.max_sockets,
            ..TransportConfig::default()
        },
        put_delay: Duration::from_millis(defaults.put_delay_ms),
        group_put_delay: Duration::from_millis(defaults.group_put_delay_ms),
        retry_delay: Duration::from_millis(defaults.retry_delay_ms),
        max_attempts: defaults.max_attempts,
        ..GatewayConfig::default()
    })
}

/// Resolve every profile, or only the named one.
pub fn gateway_configs(
    cfg: &Config,
    only: Option<&str>,
) -> Result<Vec<(String, GatewayConfig)>, ConfigError> {
    if let Some(name) = only {
        let profile = cfg.gateways.get(name).ok_or_else(|| ConfigError::UnknownGateway {
            name: name.into(),
        })?;
        return Ok(vec![(name.to_owned(), profile_to_gateway_config(profile, &cfg.defaults)?)]);
    }

    cfg.gateways
        .iter()
        .map(|(name, profile)| {
            profile_to_gateway_config(profile, &cfg.defaults).map(|c| (name.clone(), c))
        })
        .collect()
}
