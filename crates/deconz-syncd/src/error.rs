//! Runner error types with miette diagnostics.
//!
//! Maps settings and engine failures into errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use deconz_config::ConfigError;
use deconz_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum SyncdError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No gateways configured")]
    #[diagnostic(
        code(deconz::no_gateways),
        help(
            "Add a [gateways.<name>] table with a host to {path},\n\
             or run a single gateway with --host."
        )
    )]
    NoGateways { path: String },

    #[error(transparent)]
    #[diagnostic(code(deconz::config))]
    Config(#[from] ConfigError),

    // ── Gateway ──────────────────────────────────────────────────────
    #[error("Could not connect to gateway '{name}'")]
    #[diagnostic(
        code(deconz::connection_failed),
        help("Check that the gateway is running and reachable at the configured host.")
    )]
    ConnectionFailed {
        name: String,
        #[source]
        source: CoreError,
    },

    #[error("Gateway '{name}' rejected the API key")]
    #[diagnostic(
        code(deconz::auth_failed),
        help(
            "Remove the api_key from the profile to have a new one created,\n\
             then unlock the gateway in Phoscon before starting again."
        )
    )]
    AuthFailed { name: String },

    #[error("Gateway '{name}' is locked")]
    #[diagnostic(
        code(deconz::gateway_locked),
        help("Unlock the gateway in Phoscon (Gateway > Advanced > Authenticate app) and retry.")
    )]
    GatewayLocked { name: String },

    #[error("Gateway '{name}' failed: {source}")]
    #[diagnostic(code(deconz::gateway))]
    Gateway {
        name: String,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncdError {
    /// Attach the gateway profile name to an engine error.
    pub fn gateway(name: &str, err: CoreError) -> Self {
        let name = name.to_owned();
        match err {
            CoreError::AuthenticationFailed { .. } => Self::AuthFailed { name },
            CoreError::GatewayLocked { .. } => Self::GatewayLocked { name },
            e @ (CoreError::ConnectionFailed { .. } | CoreError::Disconnected) => {
                Self::ConnectionFailed { name, source: e }
            }
            source => Self::Gateway { name, source },
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoGateways { .. } | Self::Config(_) => exit_code::USAGE,
            Self::AuthFailed { .. } | Self::GatewayLocked { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Gateway { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}
