// ── Resource domain types ──
//
// A resource is one gateway object (`/lights/1`, `/sensors/4`, ...).
// Everything the engine needs to group and rank it is derived from its
// type, id, and body once, when the directory is built.

use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::unique_id::UniqueId;

// ── ResourceType ────────────────────────────────────────────────────

/// Gateway resource collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceType {
    Lights,
    Sensors,
    Groups,
}

impl ResourceType {
    /// One-letter tag used in virtual device ids and subtypes.
    pub fn prefix(self) -> char {
        match self {
            Self::Lights => 'L',
            Self::Sensors => 'S',
            Self::Groups => 'G',
        }
    }
}

// ── ServiceKind ─────────────────────────────────────────────────────

/// What a resource represents, as far as the presentation layer cares.
///
/// Resources of an unknown type classify as [`Unsupported`](Self::Unsupported)
/// and never enter the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum ServiceKind {
    // Lights
    Light,
    Outlet,
    WindowCovering,
    WarningDevice,
    DoorLock,
    Fan,
    // Groups
    Group,
    // Sensors
    AirPurifier,
    AirQuality,
    Alarm,
    Battery,
    CarbonMonoxide,
    Consumption,
    Contact,
    Daylight,
    Fire,
    Flag,
    Humidity,
    LightLevel,
    Motion,
    Power,
    Pressure,
    Status,
    Switch,
    Temperature,
    Thermostat,
    Vibration,
    Water,
    Unsupported,
}

impl ServiceKind {
    /// Classify a resource by its collection and `type` attribute.
    pub fn classify(rtype: ResourceType, type_name: &str) -> Self {
        match rtype {
            ResourceType::Lights => match type_name {
                "Color light"
                | "Color dimmable light"
                | "Color temperature light"
                | "Dimmable light"
                | "Dimmable plug-in unit"
                | "Extended color light"
                | "On/Off light" => Self::Light,
                "On/Off light switch" | "On/Off output" | "On/Off plug-in unit" | "Smart plug" => {
                    Self::Outlet
                }
                "Window covering controller" | "Window covering device" => Self::WindowCovering,
                "Warning device" => Self::WarningDevice,
                "Door Lock" | "Door lock" => Self::DoorLock,
                "Fan" => Self::Fan,
                _ => Self::Unsupported,
            },
            ResourceType::Groups => match type_name {
                "LightGroup" | "Room" | "Zone" | "Luminaire" | "Lightsource" => Self::Group,
                _ => Self::Unsupported,
            },
            ResourceType::Sensors => {
                let name = type_name
                    .strip_prefix("ZHA")
                    .or_else(|| type_name.strip_prefix("CLIP"))
                    .unwrap_or(type_name);
                match name {
                    "AirPurifier" => Self::AirPurifier,
                    "AirQuality" => Self::AirQuality,
                    "Alarm" => Self::Alarm,
                    "Battery" => Self::Battery,
                    "CarbonMonoxide" => Self::CarbonMonoxide,
                    "Consumption" => Self::Consumption,
                    "OpenClose" => Self::Contact,
                    "Daylight" => Self::Daylight,
                    "Fire" => Self::Fire,
                    "GenericFlag" => Self::Flag,
                    "Humidity" => Self::Humidity,
                    "LightLevel" => Self::LightLevel,
                    "Presence" => Self::Motion,
                    "Power" => Self::Power,
                    "Pressure" => Self::Pressure,
                    "GenericStatus" => Self::Status,
                    "Switch" => Self::Switch,
                    "Temperature" => Self::Temperature,
                    "Thermostat" => Self::Thermostat,
                    "Vibration" => Self::Vibration,
                    "Water" => Self::Water,
                    _ => Self::Unsupported,
                }
            }
        }
    }

    /// Rank for primary selection among same-type resources of one
    /// device. Higher wins; unranked kinds are 0.
    pub fn priority(self) -> u8 {
        match self {
            Self::Power => 1,
            Self::Consumption => 2,
            Self::Temperature => 3,
            Self::LightLevel => 4,
            Self::Motion => 5,
            Self::Contact => 6,
            Self::AirPurifier => 7,
            Self::Thermostat => 8,
            Self::Flag => 9,
            _ => 0,
        }
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }
}

// ── Resource ────────────────────────────────────────────────────────

/// One gateway resource with its derived identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub rtype: ResourceType,
    pub id: String,
    pub body: Value,
    /// Stable id of the device this resource belongs to.
    pub device_id: String,
    /// Key of this resource within its device.
    pub subtype: String,
    pub kind: ServiceKind,
    pub priority: u8,
    /// Backed by a radio device rather than software on the gateway.
    pub is_physical: bool,
    address: Option<String>,
}

impl Resource {
    /// Derive a resource's identity from its type, id, and body.
    ///
    /// Lights and sensors with a well-formed radio `uniqueid` are
    /// physical and grouped by radio address. Everything else, including
    /// every group, gets a device of its own named after the gateway.
    pub fn derive(
        gateway_id: &str,
        rtype: ResourceType,
        id: impl Into<String>,
        body: Value,
    ) -> Self {
        let id = id.into();
        let type_name = body.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = ServiceKind::classify(rtype, type_name);

        let unique_id = match rtype {
            ResourceType::Groups => None,
            ResourceType::Lights | ResourceType::Sensors => body
                .get("uniqueid")
                .and_then(Value::as_str)
                .and_then(UniqueId::parse),
        };

        let (device_id, subtype, address) = match unique_id {
            Some(uid) => (
                uid.device_id(),
                uid.subtype(),
                Some(uid.address().to_owned()),
            ),
            None => {
                let tag = format!("{}{id}", rtype.prefix());
                (format!("{gateway_id}-{tag}"), tag, None)
            }
        };

        Self {
            rtype,
            is_physical: address.is_some(),
            id,
            body,
            device_id,
            subtype,
            kind,
            priority: kind.priority(),
            address,
        }
    }

    /// REST path of the resource, e.g. `/lights/1`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.rtype, self.id)
    }

    /// Radio address as reported, for physical resources.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.body.get("name").and_then(Value::as_str)
    }

    /// The gateway's `type` attribute.
    pub fn type_name(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const GW: &str = "00212EFFFF012345";

    #[test]
    fn resource_type_names() {
        assert_eq!(ResourceType::Lights.to_string(), "lights");
        assert_eq!("sensors".parse::<ResourceType>(), Ok(ResourceType::Sensors));
        assert!("scenes".parse::<ResourceType>().is_err());
    }

    #[test]
    fn physical_sensor() {
        let r = Resource::derive(
            GW,
            ResourceType::Sensors,
            "4",
            json!({"type": "ZHATemperature", "uniqueid": "00:15:8d:00:01:02:03:04-01-0402"}),
        );
        assert!(r.is_physical);
        assert_eq!(r.device_id, "00158D0001020304");
        assert_eq!(r.subtype, "01-0402");
        assert_eq!(r.kind, ServiceKind::Temperature);
        assert_eq!(r.priority, 3);
        assert_eq!(r.address(), Some("00:15:8d:00:01:02:03:04"));
        assert_eq!(r.path(), "/sensors/4");
    }

    #[test]
    fn virtual_sensor_is_named_after_gateway() {
        let r = Resource::derive(
            GW,
            ResourceType::Sensors,
            "12",
            json!({"type": "CLIPGenericFlag", "uniqueid": "flag-12"}),
        );
        assert!(!r.is_physical);
        assert_eq!(r.device_id, "00212EFFFF012345-S12");
        assert_eq!(r.subtype, "S12");
        assert_eq!(r.kind, ServiceKind::Flag);
        assert_eq!(r.priority, 9);
    }

    #[test]
    fn groups_are_always_virtual() {
        let r = Resource::derive(
            GW,
            ResourceType::Groups,
            "0",
            json!({"type": "LightGroup", "uniqueid": "00:15:8d:00:01:02:03:04-01"}),
        );
        assert!(!r.is_physical);
        assert_eq!(r.device_id, "00212EFFFF012345-G0");
        assert_eq!(r.kind, ServiceKind::Group);
    }

    #[test]
    fn virtual_ids_do_not_collide_across_types() {
        let light =
            Resource::derive(GW, ResourceType::Lights, "1", json!({"type": "Dimmable light"}));
        let sensor =
            Resource::derive(GW, ResourceType::Sensors, "1", json!({"type": "CLIPPresence"}));
        assert_ne!(light.device_id, sensor.device_id);
    }

    #[test]
    fn priority_table() {
        let ranked = [
            ServiceKind::Power,
            ServiceKind::Consumption,
            ServiceKind::Temperature,
            ServiceKind::LightLevel,
            ServiceKind::Motion,
            ServiceKind::Contact,
            ServiceKind::AirPurifier,
            ServiceKind::Thermostat,
            ServiceKind::Flag,
        ];
        for pair in ranked.windows(2) {
            assert!(pair[0].priority() < pair[1].priority(), "{pair:?}");
        }
        assert_eq!(ServiceKind::Humidity.priority(), 0);
        assert_eq!(ServiceKind::Light.priority(), 0);
    }

    #[test]
    fn unknown_types_are_unsupported() {
        assert_eq!(
            ServiceKind::classify(ResourceType::Lights, "Configuration tool"),
            ServiceKind::Unsupported
        );
        assert_eq!(
            ServiceKind::classify(ResourceType::Sensors, "ZHATime"),
            ServiceKind::Unsupported
        );
        assert!(!ServiceKind::Unsupported.is_supported());
        assert_eq!(
            ServiceKind::classify(ResourceType::Sensors, "CLIPPresence"),
            ServiceKind::Motion
        );
    }
}
