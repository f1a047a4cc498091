// ── Device directory ──
//
// Built from scratch out of a snapshot on every poll. Nothing mutates a
// directory after `build` returns; the engine swaps whole directories.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use strum::IntoEnumIterator;
use tracing::debug;

use super::snapshot::{FullState, ordered_ids};
use crate::error::CoreError;
use crate::model::{Device, Resource, ResourceType};

#[derive(Debug, Clone, Default)]
pub struct Directory {
    devices: BTreeMap<String, Arc<Device>>,
    /// Resource path (`/lights/1`) → device id.
    paths: HashMap<String, String>,
}

impl Directory {
    /// Derive every device from a snapshot.
    ///
    /// Resources are visited lights, sensors, then groups, each in numeric
    /// id order. Unsupported resources are skipped. A resource that cannot
    /// join its device is left out and its error returned alongside the
    /// directory; the rest of the pass is unaffected.
    pub fn build(gateway_id: &str, snapshot: &FullState) -> (Self, Vec<CoreError>) {
        let mut devices: BTreeMap<String, Device> = BTreeMap::new();
        let mut paths = HashMap::new();
        let mut rejected = Vec::new();

        for rtype in ResourceType::iter() {
            let collection = snapshot.collection(rtype);
            for id in ordered_ids(collection) {
                let Some(body) = collection.get(id) else {
                    continue;
                };
                let resource = Resource::derive(gateway_id, rtype, id, body.clone());
                if !resource.kind.is_supported() {
                    debug!(
                        resource = %resource.path(),
                        type_name = resource.type_name().unwrap_or_default(),
                        "unsupported resource skipped"
                    );
                    continue;
                }

                let path = resource.path();
                let device_id = resource.device_id.clone();
                let added = match devices.get_mut(&device_id) {
                    Some(device) => device.add_resource(resource),
                    None => {
                        devices.insert(device_id.clone(), Device::from_resource(resource));
                        Ok(())
                    }
                };
                match added {
                    Ok(()) => {
                        paths.insert(path, device_id);
                    }
                    Err(e) => rejected.push(e),
                }
            }
        }

        let devices = devices
            .into_iter()
            .map(|(id, device)| (id, Arc::new(device)))
            .collect();
        (Self { devices, paths }, rejected)
    }

    pub fn device(&self, id: &str) -> Option<&Arc<Device>> {
        self.devices.get(id)
    }

    /// Devices ordered by id.
    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Device owning the resource a path points into.
    ///
    /// Accepts the bare resource path or any path below it
    /// (`/lights/1/state/on`).
    pub fn device_for_path(&self, path: &str) -> Option<&Arc<Device>> {
        let id = self.paths.get(&resource_path(path)?)?;
        self.devices.get(id)
    }

    /// Resource a path points into.
    pub fn resource(&self, path: &str) -> Option<&Resource> {
        let base = resource_path(path)?;
        let device = self.devices.get(self.paths.get(&base)?)?;
        device.resources().find(|r| r.path() == base)
    }

    /// Whether any device is backed by a group.
    pub fn has_groups(&self) -> bool {
        self.devices
            .values()
            .flat_map(|d| d.resources())
            .any(|r| r.rtype == ResourceType::Groups)
    }
}

/// `/lights/1/state/on` → `/lights/1`.
fn resource_path(path: &str) -> Option<String> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let rtype = segments.next()?;
    let id = segments.next()?;
    Some(format!("/{rtype}/{id}"))
}
