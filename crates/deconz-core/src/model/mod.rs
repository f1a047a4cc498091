// ── Device model ──
//
// Pure derivation, no I/O: raw gateway resources in, devices out.

pub mod device;
pub mod resource;
pub mod unique_id;

pub use device::Device;
pub use resource::{Resource, ResourceType, ServiceKind};
pub use unique_id::UniqueId;
