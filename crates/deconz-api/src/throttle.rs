// ── Write pacing ──
//
// Every PUT turns into one or more Zigbee messages. The gateway has a
// single radio, so writes on one connection share one gate: a write may
// only go out once the window opened by the previous write has closed.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Default spacing per message for a write to a single device.
pub const DEFAULT_PUT_DELAY: Duration = Duration::from_millis(50);

/// Default spacing per message for a write to a group (broadcast).
pub const DEFAULT_GROUP_PUT_DELAY: Duration = Duration::from_millis(1000);

const ON_KEYS: &[&str] = &["on"];
const BRIGHTNESS_KEYS: &[&str] = &["bri", "bri_inc"];
const COLOR_KEYS: &[&str] = &["xy", "ct", "hue", "sat", "effect"];

/// Estimate how many radio messages a write body produces.
///
/// Counts the attribute groups present in the body: on/off, brightness,
/// and color. A body with none of them still costs one message.
pub fn estimate_messages(body: &Value) -> u32 {
    let Some(obj) = body.as_object() else {
        return 1;
    };
    let count = [ON_KEYS, BRIGHTNESS_KEYS, COLOR_KEYS]
        .iter()
        .filter(|group| group.iter().any(|key| obj.contains_key(*key)))
        .count();
    u32::try_from(count).unwrap_or(1).max(1)
}

/// Returns `true` if the REST path addresses a group resource.
pub fn is_group_path(path: &str) -> bool {
    path.trim_start_matches('/').starts_with("groups")
}

/// Per-connection write gate.
///
/// Waiters are released strictly in arrival order (the underlying tokio
/// mutex is fair). The holder of a [`WritePermit`] decides how long the
/// gate stays closed after its own write.
#[derive(Debug, Default)]
pub struct WriteGate {
    open_at: Mutex<Option<Instant>>,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the current window has closed.
    ///
    /// The returned permit blocks all other writers until it is dropped.
    pub async fn acquire(&self) -> WritePermit<'_> {
        let guard = self.open_at.lock().await;
        if let Some(at) = *guard {
            if at > Instant::now() {
                tracing::trace!(
                    wait_ms = ?(at - Instant::now()).as_millis(),
                    "write gate closed, waiting"
                );
                tokio::time::sleep_until(at).await;
            }
        }
        WritePermit { guard }
    }
}

/// Exclusive right to send the next write.
#[derive(Debug)]
pub struct WritePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
}

impl WritePermit<'_> {
    /// Close the gate for `window`, starting now, and release it.
    pub fn hold(mut self, window: Duration) {
        *self.guard = Some(Instant::now() + window);
    }
}

/// Window a write body needs, given the per-message delay.
pub fn window_for(body: &Value, per_message: Duration) -> Duration {
    per_message * estimate_messages(body)
}
