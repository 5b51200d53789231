//! Per-property subscription hub: the thing a [`super::DeviceTree`] stores
//! one of for every `device.property` it has ever seen defined.
//!
//! Grounded on `pyindi/client/tree_client.py`'s `PropertyControl`. Its
//! one-shot futures become [`tokio::sync::oneshot`] channels; its
//! `uuid4().hex`-keyed callback maps become [`uuid::Uuid`]-keyed maps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::property::{TypedValue, VectorKind, VectorProperty};

/// A callback invoked on every settled update, or with `None` when the
/// property is deleted. Persistent callbacks additionally run on `Busy`
/// updates; a `once` callback fires exactly one time total — on its next
/// update, or on deletion, whichever comes first — and is then dropped.
pub type Callback = Arc<dyn Fn(Option<&VectorProperty>) + Send + Sync>;

/// Subscription state for a single vector property.
pub struct PropertyControl {
    vec: Option<VectorProperty>,
    waiters: Vec<oneshot::Sender<Option<VectorProperty>>>,
    callbacks: HashMap<Uuid, Callback>,
    once: HashMap<Uuid, Callback>,
    last_update: DateTime<Utc>,
}

impl PropertyControl {
    /// A control with no vector seen yet.
    pub fn new() -> Self {
        Self {
            vec: None,
            waiters: Vec::new(),
            callbacks: HashMap::new(),
            once: HashMap::new(),
            last_update: Utc::now(),
        }
    }

    /// The most recently applied vector, if any definition has arrived.
    pub fn current(&self) -> Option<&VectorProperty> {
        self.vec.as_ref()
    }

    /// When this control last received a def/set update.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// A BLOB vector is "pending" (not yet settled) while any of its
    /// elements still carries the zero-size placeholder a driver sends
    /// mid-transfer; other kinds are pending exactly when `Busy`.
    fn is_pending(vec: &VectorProperty) -> bool {
        if vec.kind == VectorKind::Blob {
            return vec.is_blob_pending();
        }
        !vec.state.is_settled()
    }

    /// Apply a freshly decoded vector: update state, resolve any settled
    /// waiters, and run callbacks.
    pub fn new_vec(&mut self, vec: VectorProperty) {
        self.vec = Some(vec.clone());
        self.last_update = Utc::now();

        if !Self::is_pending(&vec) {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Some(vec.clone()));
            }
        }

        for cb in self.callbacks.values().chain(self.once.values()) {
            cb(Some(&vec));
        }
        self.once.clear();
    }

    /// A future resolving the next time this property settles. If the
    /// current vector is already settled, resolves immediately.
    pub fn get_future(&mut self) -> oneshot::Receiver<Option<VectorProperty>> {
        let (tx, rx) = oneshot::channel();
        match &self.vec {
            Some(vec) if !Self::is_pending(vec) => {
                let _ = tx.send(Some(vec.clone()));
            }
            _ => self.waiters.push(tx),
        }
        rx
    }

    /// Register a callback. `once = true` fires it exactly once on the
    /// next update (settled or not) and then drops it; otherwise it fires
    /// on every update for the property's lifetime.
    pub fn register_callback(&mut self, callback: Callback, once: bool) -> Uuid {
        let key = Uuid::new_v4();
        if once {
            self.once.insert(key, callback);
        } else {
            self.callbacks.insert(key, callback);
        }
        key
    }

    /// Remove a previously registered callback. Returns `false` if `key`
    /// was already gone — e.g. a `once` callback that already fired, or a
    /// concurrent unregister that won the race.
    pub fn unregister_callback(&mut self, key: Uuid) -> bool {
        self.callbacks.remove(&key).is_some() || self.once.remove(&key).is_some()
    }

    /// The property is gone (`delProperty`): cancel pending waiters and
    /// notify every callback — persistent and one-shot alike — with
    /// `None`. A `once` callback that never saw a real update still fires
    /// exactly once, on teardown.
    pub fn remove(&mut self) {
        self.waiters.clear();
        for cb in self.callbacks.values().chain(self.once.values()) {
            cb(None);
        }
        self.once.clear();
    }

    /// Current element value, if a vector has been seen.
    pub fn item(&self, name: &str) -> Option<&TypedValue> {
        self.vec.as_ref().and_then(|v| v.items.get(name))
    }

    /// Optimistically mark the current vector `Busy` right after sending
    /// a `new*Vector`, before the driver's own acknowledgement arrives.
    /// Pure bookkeeping: does not notify callbacks or waiters, since
    /// nothing actually changed on the wire yet.
    pub fn mark_busy(&mut self) {
        if let Some(vec) = &mut self.vec {
            vec.state = crate::property::PropertyState::Busy;
        }
    }
}

impl Default for PropertyControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ItemMap, PropertyPerm, PropertyState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn idle_vec(state: PropertyState) -> VectorProperty {
        VectorProperty {
            device: "CCD Simulator".into(),
            name: "CCD_EXPOSURE".into(),
            label: None,
            group: None,
            state,
            perm: PropertyPerm::Rw,
            timeout: None,
            timestamp: None,
            message: None,
            kind: VectorKind::Number,
            rule: None,
            items: ItemMap::new(),
        }
    }

    #[tokio::test]
    async fn future_resolves_immediately_when_already_settled() {
        let mut ctl = PropertyControl::new();
        ctl.new_vec(idle_vec(PropertyState::Ok));
        let rx = ctl.get_future();
        let resolved = rx.await.unwrap();
        assert!(resolved.is_some());
    }

    #[tokio::test]
    async fn future_waits_through_busy_then_resolves() {
        let mut ctl = PropertyControl::new();
        ctl.new_vec(idle_vec(PropertyState::Busy));
        let mut rx = ctl.get_future();
        ctl.new_vec(idle_vec(PropertyState::Busy));
        assert!(rx.try_recv().is_err());
        ctl.new_vec(idle_vec(PropertyState::Ok));
        assert!(rx.await.unwrap().is_some());
    }

    #[test]
    fn persistent_callback_survives_once_callback_firing() {
        let mut ctl = PropertyControl::new();
        let persistent_hits = Arc::new(AtomicUsize::new(0));
        let once_hits = Arc::new(AtomicUsize::new(0));

        let p = persistent_hits.clone();
        ctl.register_callback(Arc::new(move |_| { p.fetch_add(1, Ordering::SeqCst); }), false);
        let o = once_hits.clone();
        ctl.register_callback(Arc::new(move |_| { o.fetch_add(1, Ordering::SeqCst); }), true);

        ctl.new_vec(idle_vec(PropertyState::Ok));
        ctl.new_vec(idle_vec(PropertyState::Ok));

        assert_eq!(persistent_hits.load(Ordering::SeqCst), 2);
        assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_is_idempotent_and_reports_the_race() {
        let mut ctl = PropertyControl::new();
        let key = ctl.register_callback(Arc::new(|_| {}), false);
        assert!(ctl.unregister_callback(key));
        assert!(!ctl.unregister_callback(key));
    }

    #[test]
    fn removal_notifies_persistent_callbacks_with_none() {
        let mut ctl = PropertyControl::new();
        let seen_none = Arc::new(AtomicUsize::new(0));
        let s = seen_none.clone();
        ctl.register_callback(
            Arc::new(move |v| {
                if v.is_none() {
                    s.fetch_add(1, Ordering::SeqCst);
                }
            }),
            false,
        );
        ctl.new_vec(idle_vec(PropertyState::Ok));
        ctl.remove();
        assert_eq!(seen_none.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_callback_fires_on_deletion_if_never_updated() {
        let mut ctl = PropertyControl::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        ctl.register_callback(
            Arc::new(move |v| {
                if v.is_none() {
                    h.fetch_add(1, Ordering::SeqCst);
                }
            }),
            true,
        );
        ctl.remove();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        ctl.remove();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
