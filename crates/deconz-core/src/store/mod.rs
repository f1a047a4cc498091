// ── Snapshot and directory ──
//
// The raw full state, the device directory derived from it, and the
// diff between two directories.

mod diff;
mod directory;
mod snapshot;

pub use diff::{DirectoryDiff, diff};
pub use directory::Directory;
pub use snapshot::{Collection, FullState, collection_from_value, object_from_value, ordered_ids};
