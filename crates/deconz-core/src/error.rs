// ── Core error types ──
//
// User-facing errors from deconz-core. Consumers never see reqwest
// errors or raw envelope fragments directly; the `From<deconz_api::Error>`
// impl translates transport-layer errors into domain variants.
//
// `CoreError` is `Clone` so one write result can be handed to every
// caller whose change was folded into it.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to gateway at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Key creation refused because the gateway is not unlocked.
    #[error("Gateway locked: {message}")]
    GatewayLocked { message: String },

    #[error("Gateway disconnected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // ── Model errors ─────────────────────────────────────────────────
    /// A second resource maps to a subtype the device already has.
    #[error("{device_id}: duplicate subtype {subtype} ({resource})")]
    DuplicateSubtype {
        device_id: String,
        subtype: String,
        resource: String,
    },

    /// A resource disagrees with the device it maps to.
    #[error("{device_id}: cannot combine {resource}: {reason}")]
    CannotCombine {
        device_id: String,
        resource: String,
        reason: String,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// Gateway error type from the envelope, if any.
        api_type: Option<u16>,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for errors raised while deriving the device model.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSubtype { .. } | Self::CannotCombine { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<deconz_api::Error> for CoreError {
    fn from(err: deconz_api::Error) -> Self {
        if err.is_unauthorized() {
            return CoreError::AuthenticationFailed {
                message: err.to_string(),
            };
        }
        if let deconz_api::Error::Api(api) = &err {
            if err.is_not_found() {
                return CoreError::NotFound {
                    path: api.address.clone().unwrap_or_default(),
                };
            }
        }

        let api_type = err.api_error_type();
        match err {
            deconz_api::Error::Transport(ref e) if e.is_connect() || e.is_timeout() => {
                CoreError::ConnectionFailed {
                    url: e
                        .url()
                        .map_or_else(|| "<unknown>".into(), |u| u.to_string()),
                    reason: e.to_string(),
                }
            }
            deconz_api::Error::Transport(e) => CoreError::Api {
                message: e.to_string(),
                api_type: None,
                status: e.status().map(|s| s.as_u16()),
            },
            deconz_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            deconz_api::Error::Http { status, message } => CoreError::Api {
                message,
                api_type: None,
                status: Some(status),
            },
            deconz_api::Error::Api(api) => CoreError::Api {
                message: api.to_string(),
                api_type,
                status: None,
            },
            deconz_api::Error::GatewayLocked(api) => CoreError::GatewayLocked {
                message: api.description,
            },
            deconz_api::Error::InvalidArgument(message) => CoreError::InvalidArgument { message },
            deconz_api::Error::NotFound { path } => CoreError::NotFound { path },
            deconz_api::Error::NoApiKey => CoreError::AuthenticationFailed {
                message: "no API key configured".into(),
            },
            deconz_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            deconz_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
