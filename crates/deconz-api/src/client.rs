// deCONZ REST API client
//
// Wraps `reqwest::Client` with API-key path construction, write pacing,
// transient-failure retry, and decoding of the gateway's per-operation
// success/error envelope. Key management lives in `keys.rs`.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::{Semaphore, broadcast};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{ApiError, Error};
use crate::throttle::{self, WriteGate};
use crate::transport::TransportConfig;

const OBSERVER_CHANNEL_CAPACITY: usize = 256;

/// Default delay between attempts of a transiently failing call.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Default number of attempts before a transient failure propagates.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// ── Configuration ────────────────────────────────────────────────────

/// Everything needed to talk to one gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway host, optionally with port (e.g. `192.168.1.10:80`).
    pub host: String,
    /// API key. `None` until one is created or supplied.
    pub api_key: Option<SecretString>,
    pub transport: TransportConfig,
    /// Spacing per radio message for single-device writes.
    pub put_delay: Duration,
    /// Spacing per radio message for group writes.
    pub group_put_delay: Duration,
    /// Delay between attempts of a transiently failing call.
    pub retry_delay: Duration,
    /// Total attempts for a transiently failing call.
    pub max_attempts: u32,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: None,
            transport: TransportConfig::default(),
            put_delay: throttle::DEFAULT_PUT_DELAY,
            group_put_delay: throttle::DEFAULT_GROUP_PUT_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }
}

// ── Observations ─────────────────────────────────────────────────────

/// Structured observation of the request/response cycle.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Request {
        id: u64,
        method: String,
        path: String,
        body: Option<Value>,
    },
    Response {
        id: u64,
        status: u16,
        body: Value,
    },
    /// An error was observed. `retrying` is set when the call will be
    /// sent again; `fatal` when the call as a whole fails with it.
    Error {
        id: u64,
        path: String,
        message: String,
        api_type: Option<u16>,
        retrying: bool,
        fatal: bool,
    },
}

// ── Response ─────────────────────────────────────────────────────────

/// Decoded reply to a REST call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Raw response body (`Value::Null` when empty).
    pub body: Value,
    /// All `success` fragments, merged into one object nested by path.
    pub success: Map<String, Value>,
    /// Non-critical `error` fragments. Critical ones fail the call instead.
    pub errors: Vec<ApiError>,
}

impl ApiResponse {
    /// The success subtree at a slash-separated path, e.g.
    /// `/lights/1/state` for a write to that resource.
    pub fn success_at(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.success.get(first)?;
        for segment in segments {
            node = node.get(segment)?;
        }
        Some(node)
    }
}

/// Split an envelope body into merged success and error fragments.
///
/// Bodies that are not an array of fragments are left untouched.
pub fn decode_envelope(body: &Value) -> (Map<String, Value>, Vec<ApiError>) {
    let mut success = Map::new();
    let mut errors = Vec::new();

    let Some(items) = body.as_array() else {
        return (success, errors);
    };

    for item in items {
        if let Some(fragment) = item.get("success").and_then(Value::as_object) {
            for (path, value) in fragment {
                merge_success(&mut success, path, value.clone());
            }
        }
        if let Some(err) = item.get("error").and_then(Value::as_object) {
            errors.push(ApiError {
                kind: err
                    .get("type")
                    .and_then(Value::as_u64)
                    .and_then(|t| u16::try_from(t).ok())
                    .unwrap_or(0),
                address: err.get("address").and_then(Value::as_str).map(String::from),
                description: err
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            });
        }
    }

    (success, errors)
}

fn merge_success(root: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut node = root;
    for segment in parents {
        let entry = node
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    node.insert((*leaf).to_owned(), value);
}

// ── Path handling ────────────────────────────────────────────────────

/// Split a GET path into the smallest fetchable resource and the leaf
/// attribute path to project out of it.
///
/// `/lights/1/state/on` fetches `/lights/1` and projects `state.on`;
/// `/config/name` fetches `/config`; scene paths keep their scene id.
pub fn split_get_path(path: &str) -> (String, Vec<String>) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let keep = match segments.as_slice() {
        ["groups", _, "scenes", ..] => segments.len().min(4),
        [
            "lights" | "groups" | "sensors" | "schedules" | "rules" | "resourcelinks",
            _,
            _,
            ..,
        ] => 2,
        ["config" | "capabilities", _, ..] => 1,
        _ => segments.len(),
    };
    let resource = format!("/{}", segments[..keep].join("/"));
    let leaf = segments[keep..].iter().map(|s| (*s).to_owned()).collect();
    (resource, leaf)
}

/// Walk `leaf` into `body`, following object keys and array indices.
fn project(body: Value, leaf: &[String]) -> Option<Value> {
    let mut node = body;
    for key in leaf {
        node = match node {
            Value::Object(mut map) => map.remove(key)?,
            Value::Array(mut items) => {
                let index: usize = key.parse().ok()?;
                if index < items.len() {
                    items.swap_remove(index)
                } else {
                    return None;
                }
            }
            _ => return None,
        };
    }
    if node.is_null() { None } else { Some(node) }
}

fn require_absolute(path: &str) -> Result<(), Error> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("{path}: invalid resource path")))
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Raw HTTP client for one gateway's REST API.
///
/// All verbs funnel through [`request`](Self::request). Writes via
/// [`put`](Self::put) pass a shared [`WriteGate`] first so the radio
/// network is never flooded.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: RwLock<Option<SecretString>>,
    put_delay: Duration,
    group_put_delay: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    gate: WriteGate,
    sockets: Semaphore,
    events: broadcast::Sender<ClientEvent>,
    next_request_id: AtomicU64,
}

impl ApiClient {
    /// Create a new client from a `ClientConfig`.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Self::with_client(http, config)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Result<Self, Error> {
        let base = if config.host.contains("://") {
            config.host.clone()
        } else {
            format!("http://{}", config.host)
        };
        let base_url = Url::parse(&base)?;
        let (events, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url,
            api_key: RwLock::new(config.api_key),
            put_delay: config.put_delay,
            group_put_delay: config.group_put_delay,
            retry_delay: config.retry_delay,
            max_attempts: config.max_attempts.max(1),
            gate: WriteGate::new(),
            sockets: Semaphore::new(config.transport.max_sockets.max(1)),
            events,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Subscribe to request/response/error observations.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Whether an API key is currently configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.read().expect("api key lock poisoned").is_some()
    }

    pub(crate) fn api_key(&self) -> Option<SecretString> {
        self.api_key.read().expect("api key lock poisoned").clone()
    }

    pub(crate) fn set_api_key(&self, key: Option<SecretString>) {
        *self.api_key.write().expect("api key lock poisoned") = key;
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api[/{key}]{path}`.
    pub(crate) fn api_url(&self, path: &str, with_key: bool) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = if path == "/" { "" } else { path };
        let full = match self.api_key().filter(|_| with_key) {
            Some(key) => format!("{base}/api/{}{path}", key.expose_secret()),
            None => format!("{base}/api{path}"),
        };
        Ok(Url::parse(&full)?)
    }

    // ── Verbs ────────────────────────────────────────────────────────

    /// Fetch a resource, or a leaf attribute inside one.
    ///
    /// For a leaf path the smallest enclosing resource is fetched and the
    /// leaf is projected out of it.
    pub async fn get(&self, path: &str) -> Result<Value, Error> {
        require_absolute(path)?;
        let (resource, leaf) = split_get_path(path);
        let response = self.request(Method::GET, &resource, None).await?;
        if leaf.is_empty() {
            return Ok(response.body);
        }
        project(response.body, &leaf).ok_or_else(|| Error::NotFound {
            path: format!("/{}", leaf.join("/")),
        })
    }

    /// Mutating request, paced by the write gate.
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, Error> {
        self.put_with(path, move || body).await
    }

    /// Like [`put`](Self::put), but the body is built only once the write
    /// gate has opened. Lets callers coalesce changes that arrive while
    /// waiting into a single write.
    pub async fn put_with<F>(&self, path: &str, build: F) -> Result<ApiResponse, Error>
    where
        F: FnOnce() -> Value + Send,
    {
        require_absolute(path)?;
        let permit = self.gate.acquire().await;
        let body = build();
        let per_message = if throttle::is_group_path(path) {
            self.group_put_delay
        } else {
            self.put_delay
        };
        let window = throttle::window_for(&body, per_message);
        trace!(path, window_ms = ?window.as_millis(), "write gate acquired");
        permit.hold(window);
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, Error> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str, body: Option<Value>) -> Result<ApiResponse, Error> {
        self.request(Method::DELETE, path, body).await
    }

    // ── Request primitive ────────────────────────────────────────────

    /// Send an authenticated request, retrying transient failures.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, Error> {
        self.request_inner(method, path, body, true).await
    }

    pub(crate) async fn request_inner(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        with_key: bool,
    ) -> Result<ApiResponse, Error> {
        require_absolute(path)?;
        let url = self.api_url(path, with_key)?;
        let mut attempt = 1;

        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            let result = self.send_once(id, &method, &url, path, body.as_ref()).await;

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        path,
                        %method,
                        attempt,
                        error = %e,
                        "transient gateway failure, resending"
                    );
                    self.observe_error(id, path, &e, true, false);
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    self.observe_error(id, path, &e, false, true);
                    return Err(e);
                }
                Ok(response) => return Ok(response),
            }
        }
    }

    async fn send_once(
        &self,
        id: u64,
        method: &Method,
        url: &Url,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, Error> {
        let _slot = self
            .sockets
            .acquire()
            .await
            .map_err(|_| Error::InvalidArgument("client closed".into()))?;

        debug!(id, %method, path, "request");
        let _ = self.events.send(ClientEvent::Request {
            id,
            method: method.to_string(),
            path: path.to_owned(),
            body: body.cloned(),
        });

        let mut builder = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder.send().await.map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: format!(
                    "{e} (body preview: {:?})",
                    text.chars().take(200).collect::<String>()
                ),
                body: text.clone(),
            })?
        };

        trace!(id, status = status.as_u16(), "response");
        let _ = self.events.send(ClientEvent::Response {
            id,
            status: status.as_u16(),
            body: body.clone(),
        });

        let (success, errors) = decode_envelope(&body);

        if !status.is_success() {
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(Error::Http {
                    status: status.as_u16(),
                    message: "service unavailable".into(),
                });
            }
            return Err(match errors.into_iter().next() {
                Some(api) => Error::Api(api),
                None => Error::Http {
                    status: status.as_u16(),
                    message: text.chars().take(200).collect(),
                },
            });
        }

        // Every fragment is reported; the first critical one fails the request
        // and is reported by the caller along with it.
        let mut non_critical = Vec::new();
        let mut critical = None;
        for api in errors {
            if critical.is_none() && !api.is_non_critical() {
                critical = Some(api);
                continue;
            }
            warn!(id, path, error = %api, "gateway error");
            let _ = self.events.send(ClientEvent::Error {
                id,
                path: path.to_owned(),
                message: api.to_string(),
                api_type: Some(api.kind),
                retrying: false,
                fatal: false,
            });
            if api.is_non_critical() {
                non_critical.push(api);
            }
        }
        if let Some(api) = critical {
            return Err(Error::Api(api));
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
            success,
            errors: non_critical,
        })
    }

    fn observe_error(&self, id: u64, path: &str, err: &Error, retrying: bool, fatal: bool) {
        if fatal {
            debug!(id, path, error = %err, "request failed");
        }
        let _ = self.events.send(ClientEvent::Error {
            id,
            path: path.to_owned(),
            message: err.to_string(),
            api_type: err.api_error_type(),
            retrying,
            fatal,
        });
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_api_key", &self.has_api_key())
            .finish_non_exhaustive()
    }
}
