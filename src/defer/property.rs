use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use crate::tree::DeviceTree;

use super::{Defer, DeferResult};

type TriggerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Explicit progress states for awaiting a property settle, optionally
/// gated behind a trigger. Modeled as a state machine rather than
/// nested futures so `check()` can report exactly which stage is stuck.
enum State {
    /// Waiting on an arbitrary trigger future (e.g. "the write finished
    /// sending") before subscribing to the property at all.
    AwaitTrigger(TriggerFuture),
    /// Subscribed; waiting for the next settled update.
    AwaitSubscription(oneshot::Receiver<Option<crate::property::VectorProperty>>),
    /// Done.
    Settled(DeferResult),
}

/// Waits for `device.property` to settle (reach a non-`Busy` state, or
/// — for BLOBs — a fully-sized element), optionally not subscribing
/// until a trigger future completes first.
///
/// Grounded on `pyindi/core/defer.py`'s `DeferProperty`.
pub struct DeferProperty {
    tree: DeviceTree,
    device: String,
    property: String,
    state: Mutex<State>,
}

impl DeferProperty {
    /// Subscribe immediately.
    pub fn new(tree: DeviceTree, device: impl Into<String>, property: impl Into<String>) -> Self {
        let device = device.into();
        let property = property.into();
        Self {
            tree,
            device,
            property,
            state: Mutex::new(State::AwaitTrigger(Box::pin(async {}))),
        }
    }

    /// Don't subscribe until `trigger` completes — e.g. wait for a
    /// `newNumberVector` write to finish sending before watching for the
    /// driver's reply.
    pub fn with_trigger<F>(
        tree: DeviceTree,
        device: impl Into<String>,
        property: impl Into<String>,
        trigger: F,
    ) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            tree,
            device: device.into(),
            property: property.into(),
            state: Mutex::new(State::AwaitTrigger(Box::pin(trigger))),
        }
    }
}

#[async_trait]
impl Defer for DeferProperty {
    async fn wait(&self) -> DeferResult {
        let mut guard = self.state.lock().await;

        if let State::AwaitTrigger(trigger) = &mut *guard {
            trigger.as_mut().await;
            let rx = self
                .tree
                .with_property(&self.device, &self.property, |control| control.get_future())
                .await;
            *guard = match rx {
                Some(rx) => State::AwaitSubscription(rx),
                None => State::Settled(DeferResult::alert(format!(
                    "{}.{} has not been defined yet",
                    self.device, self.property
                ))),
            };
        }

        if matches!(&*guard, State::AwaitSubscription(_)) {
            let rx = match std::mem::replace(&mut *guard, State::Settled(DeferResult::busy("transitioning")))
            {
                State::AwaitSubscription(rx) => rx,
                other => {
                    *guard = other;
                    unreachable!("just matched AwaitSubscription above")
                }
            };
            let result = match rx.await {
                Ok(Some(vec)) => DeferResult {
                    state: vec.state,
                    message: "data ready".to_string(),
                    data: Some(vec),
                },
                Ok(None) => DeferResult::alert("property was removed while waiting"),
                Err(_) => DeferResult::alert("future cancelled, maybe device has crashed"),
            };
            *guard = State::Settled(result.clone());
            return result;
        }

        match &*guard {
            State::Settled(result) => result.clone(),
            _ => unreachable!("all non-Settled states are handled above"),
        }
    }

    fn check(&self) -> DeferResult {
        match self.state.try_lock() {
            Ok(guard) => match &*guard {
                State::AwaitTrigger(_) => DeferResult::busy("waiting for triggering event to complete"),
                State::AwaitSubscription(_) => DeferResult::busy("waiting for property to settle"),
                State::Settled(result) => result.clone(),
            },
            Err(_) => DeferResult::busy("wait() is in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ItemMap, PropertyPerm, PropertyState, VectorKind, VectorProperty};

    fn vec_with_state(state: PropertyState) -> VectorProperty {
        VectorProperty {
            device: "Focuser".into(),
            name: "FOCUS_ABS_POS".into(),
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
    async fn resolves_once_the_property_settles() {
        let tree = DeviceTree::new();
        tree.apply_vector(vec_with_state(PropertyState::Busy)).await;

        let defer = DeferProperty::new(tree.clone(), "Focuser", "FOCUS_ABS_POS");
        assert_eq!(defer.check().state, PropertyState::Busy);

        let wait_handle = tokio::spawn(async move { defer.wait().await });
        tokio::task::yield_now().await;
        tree.apply_vector(vec_with_state(PropertyState::Ok)).await;

        let result = wait_handle.await.unwrap();
        assert_eq!(result.state, PropertyState::Ok);
    }

    #[tokio::test]
    async fn missing_property_settles_as_alert() {
        let tree = DeviceTree::new();
        let defer = DeferProperty::new(tree, "Ghost", "NOPE");
        let result = defer.wait().await;
        assert_eq!(result.state, PropertyState::Alert);
    }
}
