use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{CallError, CallResult};

/// Per-connection table of in-flight outbound calls.
///
/// Correlation ids are random and re-generated on collision, never
/// counter-derived, so they stay unguessable and unique among the calls
/// currently pending on this connection. An id becomes reusable the
/// moment its call completes.
#[derive(Default)]
pub struct PendingCalls {
    entries: Mutex<HashMap<String, Entry>>,
}

enum Entry {
    /// Id handed out by `reserve`, completion not registered yet.
    Reserved,
    /// Call sent; the sender resolves the caller's handle.
    Waiting(oneshot::Sender<CallResult>),
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a correlation id distinct from every currently-reserved id.
    pub fn reserve(&self) -> String {
        let mut entries = self.lock();
        loop {
            let id = Uuid::new_v4().to_string();
            if !entries.contains_key(&id) {
                entries.insert(id.clone(), Entry::Reserved);
                return id;
            }
        }
    }

    /// Attach the completion for a reserved id.
    pub fn register(&self, id: &str, completion: oneshot::Sender<CallResult>) {
        self.lock()
            .insert(id.to_string(), Entry::Waiting(completion));
    }

    /// Resolve the call waiting on `id`, removing its entry.
    ///
    /// Unknown ids return false and are otherwise ignored: a late reply
    /// for a call the caller already gave up on is not an error.
    pub fn resolve(&self, id: &str, outcome: CallResult) -> bool {
        let entry = self.lock().remove(id);
        match entry {
            Some(Entry::Waiting(completion)) => {
                // The caller may have dropped its handle; that's fine.
                let _ = completion.send(outcome);
                true
            }
            Some(Entry::Reserved) => {
                // A reply for a call that was never sent; put the
                // reservation back and drop the message.
                self.lock().insert(id.to_string(), Entry::Reserved);
                false
            }
            None => false,
        }
    }

    /// Release an id without resolving anything (send failed, caller gone).
    pub fn forget(&self, id: &str) {
        self.lock().remove(id);
    }

    /// Fail the call waiting on `id`, if still pending.
    pub fn fail(&self, id: &str, error: CallError) -> bool {
        self.resolve(id, Err(error))
    }

    /// Fail every pending call. Used at connection teardown.
    pub fn fail_all(&self, error: CallError) {
        let entries: Vec<Entry> = {
            let mut map = self.lock();
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            if let Entry::Waiting(completion) = entry {
                let _ = completion.send(Err(error.clone()));
            }
        }
    }

    /// Number of currently reserved or waiting calls.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCalls")
            .field("pending", &self.len())
            .finish()
    }
}

/// Handle satisfied when the matching reply arrives.
#[derive(Debug)]
pub struct CallHandle {
    id: String,
    completion: oneshot::Receiver<CallResult>,
}

impl CallHandle {
    pub(crate) fn new(id: String, completion: oneshot::Receiver<CallResult>) -> Self {
        Self { id, completion }
    }

    /// The call's correlation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the call's terminal outcome.
    ///
    /// A call without a deadline whose peer never replies resolves only
    /// when the connection closes.
    pub async fn wait(self) -> CallResult {
        self.completion.await.unwrap_or(Err(CallError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reserved_ids_are_pairwise_distinct() {
        let pending = PendingCalls::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(pending.reserve()), "collision among pending ids");
        }
        assert_eq!(pending.len(), 1000);
    }

    #[tokio::test]
    async fn resolve_completes_the_registered_call() {
        let pending = PendingCalls::new();
        let id = pending.reserve();
        let (tx, rx) = oneshot::channel();
        pending.register(&id, tx);

        assert!(pending.resolve(&id, Ok(json!({"ok": true}))));
        assert_eq!(rx.await.expect("completion sent"), Ok(json!({"ok": true})));
        assert!(pending.is_empty());
    }

    #[test]
    fn resolve_unknown_id_is_silently_dropped() {
        let pending = PendingCalls::new();
        assert!(!pending.resolve("nobody-waited-for-this", Ok(json!(null))));
    }

    #[test]
    fn resolve_reserved_id_keeps_the_reservation() {
        let pending = PendingCalls::new();
        let id = pending.reserve();
        assert!(!pending.resolve(&id, Ok(json!(null))));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn forget_releases_the_id_for_reuse() {
        let pending = PendingCalls::new();
        let id = pending.reserve();
        pending.forget(&id);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn fail_all_resolves_every_waiter_with_the_error() {
        let pending = PendingCalls::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = pending.reserve();
            let (tx, rx) = oneshot::channel();
            pending.register(&id, tx);
            receivers.push(rx);
        }

        pending.fail_all(CallError::Closed);

        for rx in receivers {
            assert_eq!(rx.await.expect("completion sent"), Err(CallError::Closed));
        }
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn dropped_table_resolves_handle_as_closed() {
        let (tx, rx) = oneshot::channel();
        let handle = CallHandle::new("x".to_string(), rx);
        drop(tx);
        assert_eq!(handle.wait().await, Err(CallError::Closed));
    }
}
