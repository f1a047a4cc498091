// ── Directory diff ──
//
// Compares the previous pass's directory with the new one, given which
// devices currently have a live instance in the presentation layer.

use std::collections::BTreeSet;

use super::directory::Directory;

/// Lifecycle decisions for one poll pass. Each list is ordered by device id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryDiff {
    /// Live devices that are gone or no longer exposed.
    pub removed: Vec<String>,
    /// Exposed devices without a live instance.
    pub added: Vec<String>,
    /// Live devices whose resource set changed shape.
    pub re_expose: Vec<String>,
    /// Live devices that can be updated in place.
    pub polled: Vec<String>,
}

impl DirectoryDiff {
    /// No device appears, disappears, or needs rebuilding.
    pub fn is_quiet(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.re_expose.is_empty()
    }

    /// Apply the decisions to the set of live device ids.
    pub fn apply(&self, live: &mut BTreeSet<String>) {
        for id in &self.removed {
            live.remove(id);
        }
        live.extend(self.added.iter().cloned());
    }
}

/// Diff two directories.
///
/// `exposed` is the external expose decision per device id.
pub fn diff<F>(
    previous: &Directory,
    current: &Directory,
    live: &BTreeSet<String>,
    exposed: F,
) -> DirectoryDiff
where
    F: Fn(&str) -> bool,
{
    let mut out = DirectoryDiff::default();

    for id in live {
        if !current.contains(id) || !exposed(id) {
            out.removed.push(id.clone());
        }
    }

    for device in current.devices() {
        let id = device.id();
        if !exposed(id) {
            continue;
        }
        if !live.contains(id) {
            out.added.push(id.to_owned());
            continue;
        }
        match previous.device(id) {
            Some(before) if before.same_shape(device) => out.polled.push(id.to_owned()),
            _ => out.re_expose.push(id.to_owned()),
        }
    }

    out
}
