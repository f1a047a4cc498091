// Gateway identity and API key management
//
// The unauthenticated config probe, key creation (only while the
// gateway is unlocked), key deletion, and unlocking. Keys are held in
// memory only; persisting them is the caller's business.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::{ERROR_LINK_BUTTON, Error};

/// Seconds the gateway stays unlocked after [`ApiClient::unlock`].
pub const UNLOCK_SECONDS: u64 = 60;

/// Gateway identity, as returned by `GET /api/config` without a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayInfo {
    /// Stable gateway id (`00212EFFFF0123AB`).
    #[serde(rename = "bridgeid", default)]
    pub bridge_id: String,

    #[serde(rename = "apiversion", default)]
    pub api_version: Option<String>,

    #[serde(rename = "devicename", default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "swversion", default)]
    pub sw_version: Option<String>,

    #[serde(rename = "modelid", default)]
    pub model_id: Option<String>,

    /// Push stream port. Only reported to authenticated callers.
    #[serde(rename = "websocketport", default)]
    pub websocket_port: Option<u16>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ApiClient {
    /// Fetch the gateway's public configuration. Needs no API key.
    pub async fn gateway_info(&self) -> Result<GatewayInfo, Error> {
        let response = self
            .request_inner(Method::GET, "/config", None, false)
            .await?;
        serde_json::from_value(response.body.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: response.body.to_string(),
        })
    }

    /// Create a new API key for `devicetype`.
    ///
    /// The gateway must be unlocked; otherwise this fails with
    /// [`Error::GatewayLocked`]. On success the key is installed in this
    /// client and returned.
    pub async fn create_api_key(&self, devicetype: &str) -> Result<SecretString, Error> {
        debug!(devicetype, "requesting API key");
        let response = self
            .request_inner(
                Method::POST,
                "/",
                Some(json!({ "devicetype": devicetype })),
                false,
            )
            .await
            .map_err(|e| match e {
                Error::Api(api) if api.kind == ERROR_LINK_BUTTON => Error::GatewayLocked(api),
                other => other,
            })?;

        let key = response
            .success
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Deserialization {
                message: "no username in key creation reply".into(),
                body: response.body.to_string(),
            })?;

        let key = SecretString::from(key.to_owned());
        self.set_api_key(Some(key.clone()));
        info!("API key created");
        Ok(key)
    }

    /// Delete the configured API key from the gateway and forget it.
    pub async fn delete_api_key(&self) -> Result<(), Error> {
        let key = self.api_key().ok_or(Error::NoApiKey)?;
        let path = format!("/config/whitelist/{}", key.expose_secret());
        self.delete(&path, None).await?;
        self.set_api_key(None);
        info!("API key deleted");
        Ok(())
    }

    /// Unlock the gateway so another application can create a key.
    pub async fn unlock(&self) -> Result<(), Error> {
        self.put("/config", json!({ "unlock": UNLOCK_SECONDS }))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gateway_info_keeps_unknown_fields() {
        let info: GatewayInfo = serde_json::from_value(serde_json::json!({
            "bridgeid": "00212EFFFF012345",
            "apiversion": "1.16.0",
            "name": "Phoscon-GW",
            "swversion": "2.26.3",
            "mac": "00:21:2e:01:23:45",
            "factorynew": false
        }))
        .unwrap();
        assert_eq!(info.bridge_id, "00212EFFFF012345");
        assert_eq!(info.name.as_deref(), Some("Phoscon-GW"));
        assert_eq!(info.websocket_port, None);
        assert_eq!(info.extra["mac"], "00:21:2e:01:23:45");
    }
}
