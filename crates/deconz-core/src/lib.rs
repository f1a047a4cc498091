// deconz-core: Device model and synchronization engine on top of deconz-api.

pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod store;
mod write;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::GatewayConfig;
pub use error::CoreError;
pub use gateway::{ConnectionState, Gateway, Pass, SyncEvent};
pub use model::{Device, Resource, ResourceType, ServiceKind, UniqueId};
pub use store::{Directory, DirectoryDiff, FullState};
