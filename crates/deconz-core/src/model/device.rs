// ── Device domain types ──

use std::collections::BTreeMap;

use super::resource::{Resource, ResourceType};
use crate::error::CoreError;

/// All resources sharing one device id, plus the one chosen to represent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: String,
    is_physical: bool,
    address: Option<String>,
    resources: BTreeMap<String, Resource>,
    primary: Option<String>,
}

impl Device {
    /// An empty device. The first resource added becomes primary.
    pub fn new(id: impl Into<String>, is_physical: bool, address: Option<String>) -> Self {
        Self {
            id: id.into(),
            is_physical,
            address,
            resources: BTreeMap::new(),
            primary: None,
        }
    }

    /// Start a device from its first resource.
    pub fn from_resource(resource: Resource) -> Self {
        let mut device = Self::new(
            resource.device_id.clone(),
            resource.is_physical,
            resource.address().map(String::from),
        );
        device.resources.insert(resource.subtype.clone(), resource.clone());
        device.primary = Some(resource.subtype);
        device
    }

    /// Add a resource and re-evaluate the primary.
    ///
    /// A resource replaces the primary only if it has the same resource
    /// type and a strictly higher priority. A device without a primary
    /// takes any resource.
    pub fn add_resource(&mut self, resource: Resource) -> Result<(), CoreError> {
        if resource.device_id != self.id {
            return Err(self.cannot_combine(&resource, "different device id"));
        }
        if resource.is_physical != self.is_physical {
            return Err(self.cannot_combine(&resource, "physical and virtual resources"));
        }
        if resource.address() != self.address.as_deref() {
            return Err(self.cannot_combine(&resource, "different radio address"));
        }
        if let Some(existing) = self.resources.get(&resource.subtype) {
            return Err(CoreError::DuplicateSubtype {
                device_id: self.id.clone(),
                subtype: resource.subtype.clone(),
                resource: format!("{} and {}", existing.path(), resource.path()),
            });
        }

        let promote = match self.primary() {
            None => true,
            Some(primary) => {
                primary.rtype == resource.rtype && resource.priority > primary.priority
            }
        };
        if promote {
            self.primary = Some(resource.subtype.clone());
        }
        self.resources.insert(resource.subtype.clone(), resource);
        Ok(())
    }

    fn cannot_combine(&self, resource: &Resource, reason: &str) -> CoreError {
        CoreError::CannotCombine {
            device_id: self.id.clone(),
            resource: resource.path(),
            reason: reason.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_physical(&self) -> bool {
        self.is_physical
    }

    pub fn primary_subtype(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn primary(&self) -> Option<&Resource> {
        self.primary.as_ref().and_then(|s| self.resources.get(s))
    }

    /// Resource type of the primary resource.
    pub fn rtype(&self) -> Option<ResourceType> {
        self.primary().map(|r| r.rtype)
    }

    /// Display name, taken from the primary resource.
    pub fn name(&self) -> Option<&str> {
        self.primary().and_then(Resource::name)
    }

    pub fn resource(&self, subtype: &str) -> Option<&Resource> {
        self.resources.get(subtype)
    }

    /// Resources ordered by subtype.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether both devices are backed by the same resources in the same
    /// roles. Attribute values are ignored.
    pub fn same_shape(&self, other: &Device) -> bool {
        self.primary == other.primary
            && self.resources.len() == other.resources.len()
            && self
                .resources
                .iter()
                .zip(&other.resources)
                .all(|((sa, a), (sb, b))| {
                    sa == sb && a.rtype == b.rtype && a.id == b.id && a.kind == b.kind
                })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;

    const GW: &str = "00212EFFFF012345";
    const ADDR: &str = "00:15:8d:00:01:02:03:04";

    fn sensor(id: &str, kind: &str, suffix: &str) -> Resource {
        Resource::derive(
            GW,
            ResourceType::Sensors,
            id,
            json!({"type": kind, "uniqueid": format!("{ADDR}-{suffix}")}),
        )
    }

    fn light(id: &str, suffix: &str) -> Resource {
        Resource::derive(
            GW,
            ResourceType::Lights,
            id,
            json!({"type": "On/Off plug-in unit", "uniqueid": format!("{ADDR}-{suffix}")}),
        )
    }

    #[test]
    fn higher_priority_same_type_becomes_primary() {
        let mut device = Device::from_resource(sensor("1", "ZHAPower", "01-0b04"));
        device.add_resource(sensor("2", "ZHAConsumption", "01-0702")).unwrap();
        assert_eq!(device.primary_subtype(), Some("01-0702"));
        assert_eq!(device.len(), 2);
    }

    #[test]
    fn lower_or_equal_priority_keeps_primary() {
        let mut device = Device::from_resource(sensor("1", "ZHATemperature", "01-0402"));
        device.add_resource(sensor("2", "ZHAPower", "01-0b04")).unwrap();
        device.add_resource(sensor("3", "ZHAHumidity", "01-0405")).unwrap();
        assert_eq!(device.primary_subtype(), Some("01-0402"));
        assert_eq!(device.len(), 3);
    }

    #[test]
    fn other_type_never_competes() {
        let mut device = Device::from_resource(light("1", "01"));
        device.add_resource(sensor("7", "ZHAPower", "01-0b04")).unwrap();
        assert_eq!(device.primary_subtype(), Some("01"));
        assert_eq!(device.rtype(), Some(ResourceType::Lights));
    }

    #[test]
    fn empty_device_takes_first_resource() {
        let mut device = Device::new("00158D0001020304", true, Some(ADDR.into()));
        assert!(device.primary().is_none());
        device.add_resource(sensor("5", "ZHAHumidity", "01-0405")).unwrap();
        assert_eq!(device.primary_subtype(), Some("01-0405"));
    }

    #[test]
    fn duplicate_subtype_is_rejected() {
        let mut device = Device::from_resource(sensor("1", "ZHASwitch", "01-1000"));
        let err = device.add_resource(sensor("2", "ZHASwitch", "01-1000")).unwrap_err();
        assert!(
            matches!(err, CoreError::DuplicateSubtype { ref subtype, .. } if subtype == "01-1000")
        );
        assert_eq!(device.len(), 1);
    }

    #[test]
    fn address_spelling_mismatch_cannot_combine() {
        let mut device = Device::from_resource(sensor("1", "ZHATemperature", "01-0402"));
        let other = Resource::derive(
            GW,
            ResourceType::Sensors,
            "2",
            json!({"type": "ZHAHumidity", "uniqueid": "00:15:8D:00:01:02:03:04-01-0405"}),
        );
        assert_eq!(other.device_id, device.id());
        let err = device.add_resource(other).unwrap_err();
        assert!(matches!(err, CoreError::CannotCombine { .. }), "{err:?}");
        assert!(err.is_structural());
    }

    #[test]
    fn physical_flag_mismatch_cannot_combine() {
        let mut device = Device::new("00212EFFFF012345-S3", true, None);
        let virtual_sensor =
            Resource::derive(GW, ResourceType::Sensors, "3", json!({"type": "CLIPPresence"}));
        let err = device.add_resource(virtual_sensor).unwrap_err();
        assert!(matches!(err, CoreError::CannotCombine { .. }), "{err:?}");
    }

    #[test]
    fn shape_ignores_attribute_values() {
        let a = Device::from_resource(light("1", "01"));
        let mut changed = light("1", "01");
        changed.body["state"] = json!({"on": true});
        let b = Device::from_resource(changed);
        assert!(a.same_shape(&b));

        let mut c = a.clone();
        c.add_resource(sensor("9", "ZHAPower", "01-0b04")).unwrap();
        assert!(!a.same_shape(&c));
        assert_eq!(
            c.resource("01-0b04").map(|r| r.body["type"].clone()),
            Some(Value::from("ZHAPower"))
        );
    }
}
