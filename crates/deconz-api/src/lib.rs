// deconz-api: Async Rust client for the deCONZ gateway (REST + push stream)

pub mod client;
pub mod error;
pub mod keys;
pub mod throttle;
pub mod transport;
pub mod websocket;

pub use client::{ApiClient, ApiResponse, ClientConfig, ClientEvent};
pub use error::{ApiError, Error};
pub use keys::GatewayInfo;
pub use transport::TransportConfig;
pub use websocket::{ChangeScope, EventStream, StreamConfig, StreamEvent};
