use thiserror::Error;

/// API error types the gateway reports for a single sub-operation that
/// do not invalidate the rest of a multi-target write.
///
/// 6: parameter not available, 7: invalid value, 8: parameter not
/// modifiable, 201: parameter not modifiable while the device is off.
pub const NON_CRITICAL_ERROR_TYPES: [u16; 4] = [6, 7, 8, 201];

/// API error type for "unauthorized user".
pub const ERROR_UNAUTHORIZED: u16 = 1;

/// API error type for "link button not pressed" (gateway locked).
pub const ERROR_LINK_BUTTON: u16 = 101;

/// API error type for a transient gateway overload.
pub const ERROR_OVERLOADED: u16 = 901;

/// One `error` fragment from the gateway's response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Numeric error type (`type` on the wire).
    pub kind: u16,
    /// Resource path the error refers to, when the gateway supplies one.
    pub address: Option<String>,
    /// Human-readable description.
    pub description: String,
}

impl ApiError {
    /// Returns `true` if this error does not fail the enclosing call.
    pub fn is_non_critical(&self) -> bool {
        NON_CRITICAL_ERROR_TYPES.contains(&self.kind)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.address {
            Some(address) => write!(
                f,
                "{address}: api error {}: {}",
                self.kind, self.description
            ),
            None => write!(f, "api error {}: {}", self.kind, self.description),
        }
    }
}

/// Top-level error type for the `deconz-api` crate.
///
/// Covers every failure mode of the REST and push surfaces:
/// transport, HTTP status, gateway error fragments, WebSocket, and
/// local argument validation. `deconz-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, reset, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success HTTP status outside the envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Gateway API ─────────────────────────────────────────────────
    /// Critical error fragment from the response envelope.
    #[error("{0}")]
    Api(ApiError),

    /// The gateway must be unlocked before an API key can be created.
    #[error("Gateway locked: {0}")]
    GatewayLocked(ApiError),

    // ── Local ───────────────────────────────────────────────────────
    /// The caller passed an argument the client cannot act on.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A leaf attribute was absent after projecting it out of its resource.
    #[error("{path}: not found in resource")]
    NotFound { path: String },

    /// An operation requires an API key, but none is configured.
    #[error("No API key configured")]
    NoApiKey,

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the same call should be sent again after a delay.
    ///
    /// Covers connection resets and refused connects, HTTP 503, and
    /// gateway error type 901.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || is_connection_reset(e),
            Self::Http { status, .. } => *status == 503,
            Self::Api(api) => api.kind == ERROR_OVERLOADED,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Http { status, .. } => *status == 404,
            Self::Api(api) => api.kind == 3,
            _ => false,
        }
    }

    /// Returns `true` if the gateway rejected the API key.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 401 || *status == 403,
            Self::Api(api) => api.kind == ERROR_UNAUTHORIZED,
            Self::NoApiKey => true,
            _ => false,
        }
    }

    /// Returns `true` if the gateway is locked for key creation.
    pub fn is_gateway_locked(&self) -> bool {
        matches!(self, Self::GatewayLocked(_))
    }

    /// Extract the gateway error type, if available.
    pub fn api_error_type(&self) -> Option<u16> {
        match self {
            Self::Api(api) | Self::GatewayLocked(api) => Some(api.kind),
            _ => None,
        }
    }
}

/// Walk the source chain looking for an I/O connection reset.
fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
