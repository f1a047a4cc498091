// ── Full-state snapshot ──
//
// The gateway's configuration plus every resource collection, as last
// fetched. Replaced as a whole by each successful poll; never patched
// in place by push events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::model::ResourceType;

/// Raw resource bodies keyed by resource id.
pub type Collection = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub lights: Collection,
    #[serde(default)]
    pub sensors: Collection,
    #[serde(default)]
    pub groups: Collection,
    #[serde(default)]
    pub schedules: Collection,
}

impl FullState {
    /// Decode the reply to `GET /api/<key>`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::Internal(format!("unexpected full state: {e}")))
    }

    pub fn collection(&self, rtype: ResourceType) -> &Collection {
        match rtype {
            ResourceType::Lights => &self.lights,
            ResourceType::Sensors => &self.sensors,
            ResourceType::Groups => &self.groups,
        }
    }

    pub fn collection_mut(&mut self, rtype: ResourceType) -> &mut Collection {
        match rtype {
            ResourceType::Lights => &mut self.lights,
            ResourceType::Sensors => &mut self.sensors,
            ResourceType::Groups => &mut self.groups,
        }
    }

    /// Raw body of `/<rtype>/<id>`.
    pub fn resource(&self, rtype: ResourceType, id: &str) -> Option<&Value> {
        self.collection(rtype).get(id)
    }

    /// The gateway hides `UTC` from callers without a valid key.
    pub fn is_authorized(&self) -> bool {
        self.config.contains_key("UTC")
    }

    /// `bridgeid`, uppercased.
    pub fn gateway_id(&self) -> Option<String> {
        self.config
            .get("bridgeid")
            .and_then(Value::as_str)
            .map(str::to_ascii_uppercase)
    }

    pub fn websocket_port(&self) -> Option<u16> {
        self.config
            .get("websocketport")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
    }

    pub fn has_schedules(&self) -> bool {
        !self.schedules.is_empty()
    }
}

/// Decode a collection reply (`GET /lights`, ...).
pub fn collection_from_value(path: &str, value: Value) -> Result<Collection, CoreError> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(Collection::new()),
        other => Err(CoreError::Internal(format!(
            "{path}: expected an object, got {other}"
        ))),
    }
}

/// Decode a single-object reply (`GET /config`, `GET /groups/0`).
pub fn object_from_value(path: &str, value: Value) -> Result<Map<String, Value>, CoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::Internal(format!(
            "{path}: expected an object, got {other}"
        ))),
    }
}

/// Resource ids in numeric order; non-numeric ids sort last.
pub fn ordered_ids(collection: &Collection) -> Vec<&str> {
    let mut ids: Vec<&str> = collection.keys().map(String::as_str).collect();
    ids.sort_by_key(|id| (id.parse::<u64>().unwrap_or(u64::MAX), *id));
    ids
}
