// ── Gateway synchronization engine ──
//
// Full lifecycle for one gateway: identify it, obtain a key, poll the
// full state on a heartbeat, fold push events in, and keep a device
// directory that only the poll cycle ever replaces.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use deconz_api::{ApiClient, ApiResponse, EventStream, GatewayInfo, StreamConfig, StreamEvent};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::CoreError;
use crate::model::{Device, Resource};
use crate::store::{
    Directory, DirectoryDiff, FullState, collection_from_value, diff, object_from_value,
};
use crate::write::{Joined, PendingWrites};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Shortest accepted poll interval.
const MIN_HEARTRATE: Duration = Duration::from_secs(1);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Identifying the gateway and obtaining an API key.
    Authenticating,
    /// A poll cycle is running.
    Polling,
    /// Idle between polls, taking push events.
    Listening,
}

// ── SyncEvent ────────────────────────────────────────────────────

/// Lifecycle notification for the presentation layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// An exposed device has no live instance yet.
    DeviceAdded(Arc<Device>),
    /// A live device is gone or no longer exposed.
    DeviceRemoved { device_id: String },
    /// A live device's resources changed; rebuild it from the directory.
    DeviceNeedsReExpose { device_id: String },
    /// Fresh state for a live device that can be updated in place.
    DevicePolled(Arc<Device>),
    /// A push update for a watched resource path.
    ResourceChanged { path: String, body: Value },
    /// A poll failed; the previous snapshot is still in place.
    PollFailed { error: CoreError },
    /// A new API key was created. Persisting it is the consumer's job.
    ApiKeyCreated { key: SecretString },
}

// ── Pass ─────────────────────────────────────────────────────────

/// The result of one successful poll cycle.
///
/// The snapshot and the directory built from it are published together,
/// so readers never see one without the other.
#[derive(Debug, Default)]
pub struct Pass {
    snapshot: Option<Arc<FullState>>,
    directory: Arc<Directory>,
    completed_at: Option<DateTime<Utc>>,
}

impl Pass {
    pub fn snapshot(&self) -> Option<&Arc<FullState>> {
        self.snapshot.as_ref()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

// ── Poll coalescing ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct PollState {
    running: bool,
    again: bool,
}

/// The right to run poll cycles, held by one caller at a time.
///
/// Dropping it without [`rerun`](Self::rerun) returning `false` (a
/// cancelled poll) releases it as well.
struct PollTurn<'a> {
    state: &'a std::sync::Mutex<PollState>,
    held: bool,
}

impl<'a> PollTurn<'a> {
    /// Claim the turn, or ask the current holder for one more cycle.
    fn claim(state: &'a std::sync::Mutex<PollState>) -> Option<Self> {
        let mut guard = lock_poll_state(state);
        if guard.running {
            guard.again = true;
            return None;
        }
        guard.running = true;
        Some(Self { state, held: true })
    }

    /// Whether a cycle was requested while the last one ran. Releases the
    /// turn when not.
    fn rerun(&mut self) -> bool {
        let mut guard = lock_poll_state(self.state);
        if std::mem::take(&mut guard.again) {
            return true;
        }
        guard.running = false;
        self.held = false;
        false
    }
}

impl Drop for PollTurn<'_> {
    fn drop(&mut self) {
        if self.held {
            *lock_poll_state(self.state) = PollState::default();
        }
    }
}

fn lock_poll_state(state: &std::sync::Mutex<PollState>) -> std::sync::MutexGuard<'_, PollState> {
    state.lock().expect("poll state lock poisoned")
}

// ── Gateway ──────────────────────────────────────────────────────

/// The synchronization engine for one gateway.
///
/// Cheaply cloneable via `Arc<GatewayInner>`.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    config: GatewayConfig,
    client: ApiClient,
    info: ArcSwapOption<GatewayInfo>,
    gateway_id: ArcSwapOption<String>,
    pass: ArcSwap<Pass>,
    /// Devices with a live instance in the presentation layer.
    live: std::sync::Mutex<BTreeSet<String>>,
    watched: DashSet<String>,
    pending: PendingWrites,
    stale: AtomicBool,
    poll_state: std::sync::Mutex<PollState>,
    wake: Notify,
    connection_state: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<SyncEvent>,
    stream: Mutex<Option<Arc<EventStream>>>,
    session: std::sync::Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Create a new engine. Does NOT connect -- call
    /// [`connect()`](Self::connect) to start synchronizing.
    pub fn new(config: GatewayConfig) -> Result<Self, CoreError> {
        let client = ApiClient::new(config.client_config())?;
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(GatewayInner {
                config,
                client,
                info: ArcSwapOption::empty(),
                gateway_id: ArcSwapOption::empty(),
                pass: ArcSwap::from_pointee(Pass::default()),
                live: std::sync::Mutex::new(BTreeSet::new()),
                watched: DashSet::new(),
                pending: PendingWrites::default(),
                stale: AtomicBool::new(true),
                poll_state: std::sync::Mutex::new(PollState::default()),
                wake: Notify::new(),
                connection_state,
                event_tx,
                stream: Mutex::new(None),
                session: std::sync::Mutex::new(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// The protocol client, for requests the engine does not wrap.
    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the gateway.
    ///
    /// Identifies the gateway, creates an API key if none is configured,
    /// runs the initial full poll, and spawns the background tasks
    /// (heartbeat poll, push stream).
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.set_state(ConnectionState::Authenticating);
        let result = self.establish().await;
        if let Err(ref e) = result {
            warn!(error = %e, "connect failed");
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    async fn establish(&self) -> Result<(), CoreError> {
        let info = self.inner.client.gateway_info().await?;
        let gateway_id = info.bridge_id.to_ascii_uppercase();
        if gateway_id.is_empty() {
            return Err(CoreError::Internal("gateway reported no bridgeid".into()));
        }
        info!(
            %gateway_id,
            name = info.name.as_deref().unwrap_or_default(),
            sw_version = info.sw_version.as_deref().unwrap_or_default(),
            "gateway identified"
        );
        self.inner.gateway_id.store(Some(Arc::new(gateway_id)));
        self.inner.info.store(Some(Arc::new(info)));

        if !self.inner.client.has_api_key() {
            self.obtain_api_key().await?;
        }

        let cancel = {
            let mut session = self.inner.session.lock().expect("session lock poisoned");
            *session = CancellationToken::new();
            session.clone()
        };

        self.inner.stale.store(true, Ordering::Release);
        self.poll().await?;

        let mut handles = self.inner.task_handles.lock().await;
        if self.inner.config.stream_enabled {
            match self.open_stream(cancel.clone()).await {
                Ok(handle) => handles.push(handle),
                // The heartbeat still runs without it.
                Err(e) => warn!(error = %e, "push stream unavailable"),
            }
        }
        handles.push(tokio::spawn(poll_task(self.clone(), cancel)));

        info!(devices = self.inner.pass.load().directory.len(), "gateway connected");
        Ok(())
    }

    /// Create an API key, retrying with backoff while the gateway is locked.
    async fn obtain_api_key(&self) -> Result<(), CoreError> {
        let config = &self.inner.config;
        let attempts = config.key_attempts.max(1);
        let mut delay = config.key_retry_delay;
        let mut attempt = 1;

        loop {
            match self.inner.client.create_api_key(&config.devicetype).await {
                Ok(key) => {
                    info!("API key created");
                    let _ = self.inner.event_tx.send(SyncEvent::ApiKeyCreated { key });
                    return Ok(());
                }
                Err(e) if e.is_gateway_locked() && attempt < attempts => {
                    warn!(
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        "gateway locked, unlock it to allow key creation"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn open_stream(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, CoreError> {
        let port = self
            .inner
            .config
            .websocket_port
            .or_else(|| {
                self.inner
                    .pass
                    .load()
                    .snapshot
                    .as_deref()
                    .and_then(FullState::websocket_port)
            })
            .ok_or_else(|| CoreError::Config {
                message: "gateway reported no websocket port".into(),
            })?;
        let host = self
            .inner
            .client
            .base_url()
            .host_str()
            .ok_or_else(|| CoreError::Config {
                message: "gateway URL has no host".into(),
            })?;
        let url = Url::parse(&format!("ws://{host}:{port}")).map_err(|e| CoreError::Config {
            message: format!("Invalid push URL: {e}"),
        })?;

        let stream = Arc::new(EventStream::new(StreamConfig {
            url,
            retry_time: self.inner.config.retry_time,
            raw: false,
        }));
        let rx = stream.subscribe();
        stream.listen().await;
        *self.inner.stream.lock().await = Some(stream);

        Ok(tokio::spawn(stream_task(self.clone(), rx, cancel)))
    }

    /// Disconnect from the gateway.
    ///
    /// Closes the push stream, stops the heartbeat (a poll already in
    /// flight is allowed to finish), and resets the connection state.
    pub async fn disconnect(&self) {
        self.inner
            .session
            .lock()
            .expect("session lock poisoned")
            .cancel();

        let stream = self.inner.stream.lock().await.take();
        if let Some(stream) = stream {
            stream.close().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    // ── Polling ──────────────────────────────────────────────────

    /// Run a poll cycle now.
    ///
    /// If a cycle is already running, this only asks it to run once more
    /// when it finishes and returns immediately.
    pub async fn poll(&self) -> Result<(), CoreError> {
        let Some(mut turn) = PollTurn::claim(&self.inner.poll_state) else {
            debug!("poll already running, coalesced");
            return Ok(());
        };
        loop {
            let result = self.poll_cycle().await;
            if !turn.rerun() {
                return result;
            }
            debug!("running coalesced poll");
        }
    }

    /// Ask the heartbeat task for a poll without waiting for the interval.
    pub fn poll_now(&self) {
        self.inner.wake.notify_one();
    }

    /// Flag the snapshot stale so the next poll refetches everything.
    pub fn mark_stale(&self) {
        self.inner.stale.store(true, Ordering::Release);
    }

    async fn poll_cycle(&self) -> Result<(), CoreError> {
        let gateway_id = self
            .inner
            .gateway_id
            .load_full()
            .ok_or(CoreError::Disconnected)?;
        self.set_state(ConnectionState::Polling);

        let previous = self.inner.pass.load_full();
        let full = self.inner.stale.swap(false, Ordering::AcqRel) || previous.snapshot.is_none();
        let fetched = match previous.snapshot.as_deref().filter(|_| !full) {
            Some(prev) => self.fetch_partial(prev).await,
            None => self.fetch_full().await,
        };

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if full {
                    self.mark_stale();
                }
                warn!(error = %e, full, "poll failed, keeping previous snapshot");
                let _ = self
                    .inner
                    .event_tx
                    .send(SyncEvent::PollFailed { error: e.clone() });
                self.set_state(ConnectionState::Listening);
                return Err(e);
            }
        };

        let (directory, rejected) = Directory::build(&gateway_id, &snapshot);
        for e in &rejected {
            warn!(error = %e, "resource rejected");
        }

        let changes = {
            let mut live = self.inner.live.lock().expect("live set lock poisoned");
            let changes = diff(&previous.directory, &directory, &live, |id| {
                self.inner.config.is_exposed(id)
            });
            changes.apply(&mut live);
            changes
        };

        let directory = Arc::new(directory);
        self.inner.pass.store(Arc::new(Pass {
            snapshot: Some(Arc::new(snapshot)),
            directory: Arc::clone(&directory),
            completed_at: Some(Utc::now()),
        }));

        debug!(
            full,
            devices = directory.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            re_expose = changes.re_expose.len(),
            "poll complete"
        );
        self.emit_changes(&directory, &changes);
        self.set_state(ConnectionState::Listening);
        Ok(())
    }

    async fn fetch_full(&self) -> Result<FullState, CoreError> {
        let client = &self.inner.client;
        let mut state = FullState::from_value(client.get("/").await?)?;
        if !state.is_authorized() {
            return Err(CoreError::AuthenticationFailed {
                message: "gateway withheld its full state".into(),
            });
        }

        // The "all lights" group is not part of the groups listing.
        match client.get("/groups/0").await {
            Ok(all) => {
                state.groups.insert("0".into(), all);
            }
            Err(e) if e.is_not_found() => debug!("gateway has no group 0"),
            Err(e) => return Err(e.into()),
        }
        Ok(state)
    }

    async fn fetch_partial(&self, prev: &FullState) -> Result<FullState, CoreError> {
        let client = &self.inner.client;
        let with_groups = self.inner.pass.load().directory.has_groups();

        let (config, lights, sensors) = tokio::try_join!(
            client.get("/config"),
            client.get("/lights"),
            client.get("/sensors"),
        )?;

        let mut next = prev.clone();
        next.config = object_from_value("/config", config)?;
        if !next.is_authorized() {
            return Err(CoreError::AuthenticationFailed {
                message: "gateway no longer accepts the API key".into(),
            });
        }
        next.lights = collection_from_value("/lights", lights)?;
        next.sensors = collection_from_value("/sensors", sensors)?;

        if with_groups {
            next.groups = collection_from_value("/groups", client.get("/groups").await?)?;
            if prev.groups.contains_key("0") && !next.groups.contains_key("0") {
                next.groups.insert("0".into(), client.get("/groups/0").await?);
            }
        }
        if prev.has_schedules() {
            next.schedules = collection_from_value("/schedules", client.get("/schedules").await?)?;
        }
        Ok(next)
    }

    fn emit_changes(&self, directory: &Directory, changes: &DirectoryDiff) {
        let tx = &self.inner.event_tx;
        for device_id in &changes.removed {
            info!(%device_id, "device removed");
            let _ = tx.send(SyncEvent::DeviceRemoved {
                device_id: device_id.clone(),
            });
        }
        for device in changes.added.iter().filter_map(|id| directory.device(id)) {
            info!(
                device_id = device.id(),
                name = device.name().unwrap_or_default(),
                "device added"
            );
            let _ = tx.send(SyncEvent::DeviceAdded(Arc::clone(device)));
        }
        for device_id in &changes.re_expose {
            info!(%device_id, "device changed shape, re-exposing");
            let _ = tx.send(SyncEvent::DeviceNeedsReExpose {
                device_id: device_id.clone(),
            });
        }
        for device in changes.polled.iter().filter_map(|id| directory.device(id)) {
            let _ = tx.send(SyncEvent::DevicePolled(Arc::clone(device)));
        }
    }

    // ── Push integration ─────────────────────────────────────────

    /// Fold one push event into the engine.
    ///
    /// Changes to watched paths are forwarded as
    /// [`SyncEvent::ResourceChanged`]. Added and deleted resources only
    /// flag the snapshot stale and request a poll; the directory itself
    /// is never touched here.
    pub fn apply_stream_event(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Changed { body, .. } => {
                if let Some(path) = event.resource_path() {
                    self.forward_if_watched(path, body.clone());
                }
            }
            StreamEvent::SceneRecall { path } => {
                self.forward_if_watched(path.clone(), Value::Null);
            }
            StreamEvent::Added { .. } | StreamEvent::Deleted { .. } => {
                info!(
                    resource = %event.resource_path().unwrap_or_default(),
                    "resource set changed, scheduling full poll"
                );
                self.mark_stale();
                self.poll_now();
            }
            StreamEvent::Listening { url } => info!(%url, "push stream listening"),
            StreamEvent::Closed { url, retry_in } if retry_in.is_zero() => {
                info!(%url, "push stream closed");
            }
            StreamEvent::Closed { url, retry_in } => {
                warn!(%url, retry_in_secs = retry_in.as_secs(), "push stream closed, reconnecting");
            }
            StreamEvent::Error { message } => warn!(error = %message, "push stream error"),
            StreamEvent::Notification(frame) => trace!(%frame, "push notification"),
        }
    }

    fn forward_if_watched(&self, path: String, body: Value) {
        if self.inner.watched.contains(&path) {
            trace!(%path, "forwarding push update");
            let _ = self
                .inner
                .event_tx
                .send(SyncEvent::ResourceChanged { path, body });
        }
    }

    /// Register interest in push updates for a path such as `/lights/1/state`.
    pub fn watch_resource(&self, path: impl Into<String>) {
        self.inner.watched.insert(path.into());
    }

    /// Returns `true` if the path was being watched.
    pub fn unwatch_resource(&self, path: &str) -> bool {
        self.inner.watched.remove(path).is_some()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Write to the gateway through the shared throttle.
    ///
    /// Object bodies for a path that already has a write waiting for the
    /// gate are merged into that write, and every caller gets its result.
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, CoreError> {
        let Value::Object(fields) = body else {
            return Ok(self.inner.client.put(path, body).await?);
        };

        let mut lead = match self.inner.pending.join(path, &fields) {
            Joined::Leader(lead) => lead,
            Joined::Folded(rx) => {
                debug!(path, "write folded into pending write");
                return rx
                    .await
                    .map_err(|_| CoreError::Internal("pending write dropped".into()))?;
            }
        };

        let mut waiters = Vec::new();
        let result = self
            .inner
            .client
            .put_with(path, || match lead.take() {
                Some((merged, folded)) => {
                    waiters = folded;
                    Value::Object(merged)
                }
                None => Value::Object(fields),
            })
            .await
            .map_err(CoreError::from);

        // Rejected before the gate: release anyone who joined meanwhile.
        if let Some((_, folded)) = lead.take() {
            waiters = folded;
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to lifecycle notifications.
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.connection_state.send_replace(state);
    }

    // ── Read accessors ───────────────────────────────────────────

    /// The last completed poll pass.
    pub fn pass(&self) -> Arc<Pass> {
        self.inner.pass.load_full()
    }

    /// The current directory. Always a complete pass, never a partial one.
    pub fn directory(&self) -> Arc<Directory> {
        Arc::clone(&self.inner.pass.load().directory)
    }

    /// The last successfully fetched snapshot.
    pub fn snapshot(&self) -> Option<Arc<FullState>> {
        self.inner.pass.load().snapshot.clone()
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.inner.pass.load().directory.device(id).cloned()
    }

    /// Resource a path points into, e.g. `/sensors/4/state`.
    pub fn resource(&self, path: &str) -> Option<Resource> {
        self.inner.pass.load().directory.resource(path).cloned()
    }

    /// When the last successful poll completed.
    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.inner.pass.load().completed_at
    }

    pub fn gateway_info(&self) -> Option<Arc<GatewayInfo>> {
        self.inner.info.load_full()
    }

    /// Uppercased `bridgeid`, once connected.
    pub fn gateway_id(&self) -> Option<String> {
        self.inner.gateway_id.load().as_deref().cloned()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("host", &self.inner.config.host)
            .field("state", &*self.inner.connection_state.borrow())
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Poll every `heartrate`, or sooner when woken.
async fn poll_task(gateway: Gateway, cancel: CancellationToken) {
    let heartrate = gateway.inner.config.heartrate.max(MIN_HEARTRATE);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = gateway.inner.wake.notified() => debug!("priority poll"),
            () = tokio::time::sleep(heartrate) => {}
        }
        // Failures are reported by the cycle itself.
        let _ = gateway.poll().await;
    }
}

/// Feed push events into the engine until cancelled.
async fn stream_task(
    gateway: Gateway,
    mut rx: broadcast::Receiver<Arc<StreamEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => gateway.apply_stream_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push events dropped, scheduling full poll");
                    gateway.mark_stale();
                    gateway.poll_now();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_during_a_cycle_collapse_into_one_rerun() {
        let state = std::sync::Mutex::new(PollState::default());
        let mut turn = PollTurn::claim(&state).expect("idle engine");

        assert!(PollTurn::claim(&state).is_none());
        assert!(PollTurn::claim(&state).is_none());
        assert!(turn.rerun());
        assert!(!turn.rerun());

        drop(turn);
        let next = PollTurn::claim(&state);
        assert!(next.is_some());
    }

    #[test]
    fn cancelled_poll_releases_the_turn() {
        let state = std::sync::Mutex::new(PollState::default());
        let turn = PollTurn::claim(&state).expect("idle engine");
        assert!(PollTurn::claim(&state).is_none());

        drop(turn);
        let mut next = PollTurn::claim(&state).expect("released on drop");
        assert!(!next.rerun());
    }

    #[test]
    fn released_turn_leaves_the_next_holder_alone() {
        let state = std::sync::Mutex::new(PollState::default());
        let mut first = PollTurn::claim(&state).expect("idle engine");
        assert!(!first.rerun());

        let _second = PollTurn::claim(&state).expect("first turn released");
        drop(first);
        assert!(PollTurn::claim(&state).is_none());
    }
}
