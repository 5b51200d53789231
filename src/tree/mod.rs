//! The device/property tree: every `device.property` the client has ever
//! seen defined, each behind a [`PropertyControl`] subscription hub.
//!
//! Grounded on `pyindi/client/tree_client.py`'s `TreeClient` (the
//! `self.tree` nested dict and `_def_property`/`_set_property`/
//! `_del_property`/`check_devices` methods).

mod property_control;

pub use property_control::{Callback, PropertyControl};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

use crate::property::{DriverInterface, SwitchState, TypedValue, VectorProperty};

const LIVENESS_STARTUP_GRACE: Duration = Duration::from_secs(10);
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Resends `getProperties` for a device suspected of going stale.
/// Implemented by the gateway, which owns the connection the tree
/// itself has no access to.
pub trait Repoller: Send + Sync {
    fn repoll(&self, device: &str);
}

impl<F: Fn(&str) + Send + Sync> Repoller for F {
    fn repoll(&self, device: &str) {
        self(device)
    }
}

/// The full set of devices and properties learned from the wire so far.
#[derive(Clone, Default)]
pub struct DeviceTree {
    devices: Arc<Mutex<HashMap<String, HashMap<String, PropertyControl>>>>,
}

impl DeviceTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `def*Vector`/`set*Vector` decode, creating the device and
    /// property entries on first sight. Returns the vector that was
    /// applied for convenience.
    pub async fn apply_vector(&self, vec: VectorProperty) -> VectorProperty {
        let mut devices = self.devices.lock().await;
        let device = devices.entry(vec.device.clone()).or_default();
        let control = device.entry(vec.name.clone()).or_default();
        control.new_vec(vec.clone());
        vec
    }

    /// Apply a `delProperty`: drop one property, or (when `name` is
    /// `None`) the whole device.
    pub async fn apply_del(&self, device: &str, name: Option<&str>) {
        let mut devices = self.devices.lock().await;
        let Some(props) = devices.get_mut(device) else {
            return;
        };
        match name {
            Some(name) => {
                if let Some(mut control) = props.remove(name) {
                    control.remove();
                }
            }
            None => {
                for (_, mut control) in props.drain() {
                    control.remove();
                }
                devices.remove(device);
            }
        }
    }

    /// Run `f` against the named property's control, if it exists.
    pub async fn with_property<R>(
        &self,
        device: &str,
        name: &str,
        f: impl FnOnce(&mut PropertyControl) -> R,
    ) -> Option<R> {
        let mut devices = self.devices.lock().await;
        devices.get_mut(device)?.get_mut(name).map(f)
    }

    /// A snapshot of the named property's current vector, if known.
    pub async fn get_vector(&self, device: &str, name: &str) -> Option<VectorProperty> {
        let devices = self.devices.lock().await;
        devices.get(device)?.get(name)?.current().cloned()
    }

    /// A snapshot of every device's every known vector, for inspection
    /// tools — not meant for the hot path.
    pub async fn snapshot(&self) -> HashMap<String, HashMap<String, VectorProperty>> {
        let devices = self.devices.lock().await;
        devices
            .iter()
            .map(|(device, props)| {
                let props = props
                    .iter()
                    .filter_map(|(name, control)| control.current().map(|v| (name.clone(), v.clone())))
                    .collect();
                (device.clone(), props)
            })
            .collect()
    }

    /// All device names that have defined a `DRIVER_INFO.DRIVER_INTERFACE`
    /// numeric element overlapping `mask`.
    pub async fn devices_by_interface(&self, mask: u32) -> Vec<String> {
        let devices = self.devices.lock().await;
        devices
            .iter()
            .filter(|(_, props)| {
                props
                    .get("DRIVER_INFO")
                    .and_then(|c| c.item("DRIVER_INTERFACE"))
                    .is_some_and(|v| match v {
                        TypedValue::Number(n) => DriverInterface(*n as u32).implements(mask),
                        _ => false,
                    })
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Spawn the background liveness supervisor: after an initial grace
    /// period, wake up on `LIVENESS_POLL_INTERVAL` and, for every device
    /// that is `CONNECTION.CONNECT = On` and advertises a
    /// `POLLING_PERIOD.PERIOD_MS`, compare every property's last-update
    /// time against that period.
    ///
    /// A device with nothing updated in `10x` its polling period is
    /// logged as a zombie but deliberately left in the tree — there is no
    /// pruning path here, mirroring the original implementation's
    /// `check_devices`, which computes `zombie_devs` but never acts on
    /// it. A device stale past `5x` its period gets a re-poll via
    /// `repoller`.
    pub fn spawn_liveness_supervisor(&self, repoller: Arc<dyn Repoller>) {
        let tree = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(LIVENESS_STARTUP_GRACE).await;
            loop {
                tree.check_devices(repoller.as_ref()).await;
                tokio::time::sleep(LIVENESS_POLL_INTERVAL).await;
            }
        });
    }

    async fn check_devices(&self, repoller: &dyn Repoller) {
        let now = chrono::Utc::now();
        let devices = self.devices.lock().await;

        for (device, props) in devices.iter() {
            let Some(conn) = props.get("CONNECTION") else {
                continue;
            };
            let Some(poll) = props.get("POLLING_PERIOD") else {
                continue;
            };
            if !matches!(conn.item("CONNECT"), Some(TypedValue::Switch(SwitchState::On))) {
                continue;
            }
            let Some(TypedValue::Number(period_ms)) = poll.item("PERIOD_MS") else {
                continue;
            };

            let deadline = now - chrono::Duration::milliseconds((*period_ms * 10.0) as i64);
            let zombie_line = now - chrono::Duration::milliseconds((*period_ms * 5.0) as i64);

            let freshest = props.values().map(PropertyControl::last_update).max();
            let Some(freshest) = freshest else { continue };

            if freshest <= deadline {
                error!(device, "device has not reported in over 10x its polling period");
                continue;
            }
            if freshest <= zombie_line {
                warn!(device, "device is late on its polling period, re-requesting properties");
                repoller.repoll(device);
            }
        }
    }
}

/// An opaque handle returned by [`PropertyControl::register_callback`],
/// re-exported so callers outside this module never need to name
/// [`uuid::Uuid`] directly.
pub type CallbackHandle = Uuid;
