// ── Pending writes ──
//
// Writes to one resource path that arrive while an earlier write to the
// same path is still waiting for the gate are folded into it: their
// attributes are merged (later values win) and all callers receive the
// result of the single request that goes out.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use deconz_api::ApiResponse;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::CoreError;

pub(crate) type WriteResult = Result<ApiResponse, CoreError>;
pub(crate) type Waiter = oneshot::Sender<WriteResult>;

struct PendingWrite {
    body: Map<String, Value>,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
pub(crate) struct PendingWrites {
    open: DashMap<String, PendingWrite>,
}

/// Outcome of [`PendingWrites::join`].
pub(crate) enum Joined<'a> {
    /// A write was already open; its result arrives here.
    Folded(oneshot::Receiver<WriteResult>),
    /// This caller opened the write and must send it.
    Leader(Lead<'a>),
}

impl PendingWrites {
    /// Fold `body` into the open write for `path`, or open one.
    pub(crate) fn join<'a>(&'a self, path: &'a str, body: &Map<String, Value>) -> Joined<'a> {
        match self.open.entry(path.to_owned()) {
            Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                for (key, value) in body {
                    pending.body.insert(key.clone(), value.clone());
                }
                let (tx, rx) = oneshot::channel();
                pending.waiters.push(tx);
                Joined::Folded(rx)
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingWrite {
                    body: body.clone(),
                    waiters: Vec::new(),
                });
                Joined::Leader(Lead {
                    pending: self,
                    path,
                    open: true,
                })
            }
        }
    }

    fn remove(&self, path: &str) -> Option<PendingWrite> {
        self.open.remove(path).map(|(_, pending)| pending)
    }
}

/// The caller responsible for sending an open write.
///
/// Dropping it before [`take`](Self::take) closes the write and fails
/// everyone folded into it, so the path accepts new writes again.
pub(crate) struct Lead<'a> {
    pending: &'a PendingWrites,
    path: &'a str,
    open: bool,
}

impl Lead<'_> {
    /// Close the write, returning the merged body and everyone waiting
    /// on it. `None` once closed.
    pub(crate) fn take(&mut self) -> Option<(Map<String, Value>, Vec<Waiter>)> {
        if !std::mem::replace(&mut self.open, false) {
            return None;
        }
        self.pending
            .remove(self.path)
            .map(|pending| (pending.body, pending.waiters))
    }
}

impl Drop for Lead<'_> {
    fn drop(&mut self) {
        let Some((_, waiters)) = self.take() else {
            return;
        };
        if !waiters.is_empty() {
            debug!(
                path = self.path,
                waiters = waiters.len(),
                "write abandoned before it was sent"
            );
        }
        for waiter in waiters {
            let _ = waiter.send(Err(CoreError::Internal(format!(
                "write to {} abandoned before it was sent",
                self.path
            ))));
        }
    }
}
