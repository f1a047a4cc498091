//! WebSocket push stream with auto-reconnect.
//!
//! Connects to the gateway's push port and streams normalized events
//! through a [`tokio::sync::broadcast`] channel. When the connection
//! drops it waits `retry_time` and reconnects, unless the stream was
//! closed on purpose.
//!
//! # Example
//!
//! ```rust,ignore
//! use deconz_api::websocket::{EventStream, StreamConfig};
//!
//! let stream = EventStream::new(StreamConfig::new("ws://192.168.1.10:443".parse()?));
//! let mut rx = stream.subscribe();
//! stream.listen().await;
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//!
//! stream.close().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Group id the gateway reports for the "all lights" group in push
/// frames, instead of its resource id `0`.
const ALL_GROUP_RADIO_ID: &str = "65520";

/// Default wait before reconnecting after the stream closed.
pub const DEFAULT_RETRY_TIME: Duration = Duration::from_secs(15);

// ── StreamConfig ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Push endpoint, e.g. `ws://192.168.1.10:443`.
    pub url: Url,
    /// Wait before reconnecting. Zero disables reconnection.
    pub retry_time: Duration,
    /// Emit every frame as an unparsed [`StreamEvent::Notification`].
    pub raw: bool,
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            retry_time: DEFAULT_RETRY_TIME,
            raw: false,
        }
    }
}

// ── StreamEvent ──────────────────────────────────────────────────────

/// Which fragment of a resource a `changed` frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
    State,
    Config,
    /// Top-level attributes (name, firmware version, ...).
    Attr,
}

/// A normalized event from the push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The connection is open.
    Listening { url: String },
    /// The connection closed. `retry_in` is zero when no reconnect follows.
    Closed { url: String, retry_in: Duration },
    Changed {
        rtype: String,
        id: String,
        scope: ChangeScope,
        body: Value,
    },
    Added {
        rtype: String,
        id: String,
        body: Value,
    },
    Deleted { rtype: String, id: String },
    /// A scene was recalled; `path` is `/groups/<gid>/scenes/<scid>`.
    SceneRecall { path: String },
    /// Unrecognized event kind, or any frame in raw mode.
    Notification(Value),
    Error { message: String },
}

impl StreamEvent {
    /// REST path the event refers to, if it refers to one.
    ///
    /// `changed` events are scoped to `/<rtype>/<id>/state`,
    /// `/<rtype>/<id>/config`, or `/<rtype>/<id>`.
    pub fn resource_path(&self) -> Option<String> {
        match self {
            Self::Changed {
                rtype, id, scope, ..
            } => Some(match scope {
                ChangeScope::State => format!("/{rtype}/{id}/state"),
                ChangeScope::Config => format!("/{rtype}/{id}/config"),
                ChangeScope::Attr => format!("/{rtype}/{id}"),
            }),
            Self::Added { rtype, id, .. } | Self::Deleted { rtype, id } => {
                Some(format!("/{rtype}/{id}"))
            }
            Self::SceneRecall { path } => Some(path.clone()),
            _ => None,
        }
    }
}

// ── EventStream ──────────────────────────────────────────────────────

/// Handle to the gateway push stream.
///
/// Create it, [`subscribe`](Self::subscribe), then [`listen`](Self::listen).
/// [`close`](Self::close) disables reconnection and waits for the socket
/// to shut down.
pub struct EventStream {
    config: StreamConfig,
    event_tx: broadcast::Sender<Arc<StreamEvent>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventStream {
    pub fn new(config: StreamConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            event_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamEvent>> {
        self.event_tx.subscribe()
    }

    /// Spawn the connection loop. Calling it again while it runs is a no-op.
    pub async fn listen(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            stream_loop(config, event_tx, cancel).await;
        }));
    }

    /// Disable reconnection, close the socket, and wait until it is closed.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "push stream task ended abnormally");
            }
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on close, wait `retry_time` → reconnect.
async fn stream_loop(
    config: StreamConfig,
    event_tx: broadcast::Sender<Arc<StreamEvent>>,
    cancel: CancellationToken,
) {
    let url = config.url.to_string();

    loop {
        if let Err(e) = connect_and_read(&config, &event_tx, &cancel).await {
            tracing::warn!(error = %e, %url, "push stream error");
            let _ = event_tx.send(Arc::new(StreamEvent::Error {
                message: e.to_string(),
            }));
        }

        let retry_in = if cancel.is_cancelled() {
            Duration::ZERO
        } else {
            config.retry_time
        };
        tracing::info!(%url, retry_in_secs = retry_in.as_secs(), "push stream closed");
        let _ = event_tx.send(Arc::new(StreamEvent::Closed {
            url: url.clone(),
            retry_in,
        }));

        if retry_in.is_zero() {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(retry_in) => {}
        }
    }

    tracing::debug!("push stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single WebSocket connection, read frames until it drops.
async fn connect_and_read(
    config: &StreamConfig,
    event_tx: &broadcast::Sender<Arc<StreamEvent>>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %config.url, "connecting to push stream");

    let connect = tokio_tungstenite::connect_async(config.url.as_str());
    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = connect => result.map_err(|e| Error::WebSocketConnect(e.to_string()))?,
    };

    let _ = event_tx.send(Arc::new(StreamEvent::Listening {
        url: config.url.to_string(),
    }));
    tracing::info!("push stream listening");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = write.send(tungstenite::Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(event) = parse_frame(&text, config.raw) {
                            // Ignore send errors -- just means no active subscribers right now
                            let _ = event_tx.send(Arc::new(event));
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "close frame received"
                            );
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => return Ok(()),
                    // Ping/pong are answered by tungstenite; binary frames are not used.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Keys every event frame carries; anything else is an attribute.
const FRAME_KEYS: &[&str] = &["t", "e", "r", "id", "uniqueid"];

/// Parse a push frame into a [`StreamEvent`].
///
/// Returns `None` for a `changed` frame that carries nothing usable.
pub fn parse_frame(text: &str, raw: bool) -> Option<StreamEvent> {
    let mut obj: Map<String, Value> = match serde_json::from_str(text) {
        Ok(Value::Object(obj)) => obj,
        Ok(other) => return Some(StreamEvent::Notification(other)),
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse push frame");
            return Some(StreamEvent::Error {
                message: format!("invalid push frame: {e}"),
            });
        }
    };

    if raw {
        return Some(StreamEvent::Notification(Value::Object(obj)));
    }

    // The gateway reports the "all" group by its radio address.
    if obj.get("r").and_then(Value::as_str) == Some("groups")
        && obj.get("id").and_then(Value::as_str) == Some(ALL_GROUP_RADIO_ID)
    {
        obj.insert("id".into(), Value::String("0".into()));
    }

    if obj.get("t").and_then(Value::as_str) != Some("event") {
        return Some(StreamEvent::Notification(Value::Object(obj)));
    }

    let rtype = obj.get("r").and_then(Value::as_str).map(String::from);
    let id = obj.get("id").and_then(Value::as_str).map(String::from);
    let kind = obj.get("e").and_then(Value::as_str).unwrap_or_default();

    match (kind, rtype, id) {
        ("changed", Some(rtype), Some(id)) => parse_changed(rtype, id, &obj),
        ("added", Some(rtype), Some(id)) => {
            let body = obj
                .get(singular(&rtype))
                .cloned()
                .unwrap_or(Value::Null);
            Some(StreamEvent::Added { rtype, id, body })
        }
        ("deleted", Some(rtype), Some(id)) => Some(StreamEvent::Deleted { rtype, id }),
        ("scene-called", _, _) => {
            let gid = obj.get("gid").and_then(Value::as_str)?;
            let scid = obj.get("scid").and_then(Value::as_str)?;
            Some(StreamEvent::SceneRecall {
                path: format!("/groups/{gid}/scenes/{scid}"),
            })
        }
        _ => Some(StreamEvent::Notification(Value::Object(obj))),
    }
}

fn parse_changed(rtype: String, id: String, obj: &Map<String, Value>) -> Option<StreamEvent> {
    let fragment = |key: &str| obj.get(key).filter(|v| v.is_object()).cloned();

    let (scope, body) = if let Some(state) = fragment("state") {
        (ChangeScope::State, state)
    } else if let Some(config) = fragment("config") {
        (ChangeScope::Config, config)
    } else if let Some(attr) = fragment("attr") {
        (ChangeScope::Attr, attr)
    } else {
        let attrs: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| !FRAME_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if attrs.is_empty() {
            tracing::debug!(%rtype, %id, "changed frame without state, config, or attributes");
            return None;
        }
        (ChangeScope::Attr, Value::Object(attrs))
    };

    Some(StreamEvent::Changed {
        rtype,
        id,
        scope,
        body,
    })
}

/// `lights` → `light`, the key of the body in an `added` frame.
fn singular(rtype: &str) -> &str {
    rtype.strip_suffix('s').unwrap_or(rtype)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn parse(v: &Value) -> Option<StreamEvent> {
        parse_frame(&v.to_string(), false)
    }

    #[test]
    fn changed_state() {
        let event = parse(&json!({
            "t": "event", "e": "changed", "r": "lights", "id": "1",
            "state": {"on": true, "bri": 100}
        }))
        .unwrap();
        assert_eq!(event.resource_path().as_deref(), Some("/lights/1/state"));
        assert_eq!(
            event,
            StreamEvent::Changed {
                rtype: "lights".into(),
                id: "1".into(),
                scope: ChangeScope::State,
                body: json!({"on": true, "bri": 100}),
            }
        );
    }

    #[test]
    fn changed_config() {
        let event = parse(&json!({
            "t": "event", "e": "changed", "r": "sensors", "id": "4",
            "config": {"battery": 90}
        }))
        .unwrap();
        assert_eq!(event.resource_path().as_deref(), Some("/sensors/4/config"));
    }

    #[test]
    fn changed_bare_attributes() {
        let event = parse(&json!({
            "t": "event", "e": "changed", "r": "lights", "id": "2",
            "uniqueid": "00:11:22:33:44:55:66:77-01", "name": "Desk"
        }))
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::Changed {
                rtype: "lights".into(),
                id: "2".into(),
                scope: ChangeScope::Attr,
                body: json!({"name": "Desk"}),
            }
        );
        assert_eq!(event.resource_path().as_deref(), Some("/lights/2"));
    }

    #[test]
    fn changed_without_fragment_is_dropped() {
        assert!(
            parse(&json!({"t": "event", "e": "changed", "r": "lights", "id": "2"})).is_none()
        );
    }

    #[test]
    fn all_group_radio_id_is_remapped() {
        let event = parse(&json!({
            "t": "event", "e": "changed", "r": "groups", "id": "65520",
            "state": {"any_on": true}
        }))
        .unwrap();
        assert_eq!(event.resource_path().as_deref(), Some("/groups/0/state"));
    }

    #[test]
    fn radio_id_only_remapped_for_groups() {
        let event = parse(&json!({
            "t": "event", "e": "changed", "r": "lights", "id": "65520",
            "state": {"on": true}
        }))
        .unwrap();
        assert_eq!(event.resource_path().as_deref(), Some("/lights/65520/state"));
    }

    #[test]
    fn added_uses_singular_key() {
        let event = parse(&json!({
            "t": "event", "e": "added", "r": "sensors", "id": "9",
            "sensor": {"type": "ZHATemperature", "uniqueid": "00:11:22:33:44:55:66:77-01-0402"}
        }))
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::Added {
                rtype: "sensors".into(),
                id: "9".into(),
                body: json!({"type": "ZHATemperature", "uniqueid": "00:11:22:33:44:55:66:77-01-0402"}),
            }
        );
    }

    #[test]
    fn deleted() {
        let event = parse(&json!({"t": "event", "e": "deleted", "r": "lights", "id": "3"})).unwrap();
        assert_eq!(
            event,
            StreamEvent::Deleted {
                rtype: "lights".into(),
                id: "3".into()
            }
        );
    }

    #[test]
    fn scene_called() {
        let event = parse(&json!({
            "t": "event", "e": "scene-called", "r": "scenes", "gid": "5", "scid": "2"
        }))
        .unwrap();
        assert_eq!(
            event,
            StreamEvent::SceneRecall {
                path: "/groups/5/scenes/2".into()
            }
        );
    }

    #[test]
    fn unknown_kind_is_notification() {
        let frame = json!({"t": "event", "e": "sensor-reading", "r": "sensors", "id": "1"});
        assert_eq!(parse(&frame), Some(StreamEvent::Notification(frame)));
    }

    #[test]
    fn raw_mode_skips_parsing() {
        let frame = json!({"t": "event", "e": "changed", "r": "groups", "id": "65520", "state": {}});
        assert_eq!(
            parse_frame(&frame.to_string(), true),
            Some(StreamEvent::Notification(frame))
        );
    }

    #[test]
    fn malformed_frame_is_reported() {
        assert!(matches!(
            parse_frame("not json at all", false),
            Some(StreamEvent::Error { .. })
        ));
    }
}
