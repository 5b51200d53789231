//! The client façade: wires the [`Connection`], [`XmlFramer`], and
//! [`DeviceTree`] together, decodes incoming frames into the tree, and
//! exposes the send/lookup primitives the [`crate::defer`] layer is built
//! on.
//!
//! Grounded on `pyindi/client/gateway.py`'s `Gateway`. Its domain device
//! wrappers (`Focuser`, `FilterWheel`, `Telescope`, `CCD`) are explicitly
//! out of scope here; what survives is the device-lookup-by-interface and
//! send machinery they were all built on top of.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionConfig};
use crate::defer::{DeferProperty, DeferResult};
use crate::error::{Error, Result};
use crate::property::{DriverInterface, TypedValue, VectorAction, VectorProperty};
use crate::tree::{Callback, DeviceTree};
use crate::xml::Frame;
use crate::PROTOCOL_VERSION;

/// A `message` frame, broadcast to every [`Gateway::subscribe_messages`]
/// caller as it arrives.
#[derive(Debug, Clone)]
pub struct MessageFrame {
    pub device: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
}

/// The client entry point: one connection, one device tree, and the
/// primitives to read and write through them.
#[derive(Clone)]
pub struct Gateway {
    tree: DeviceTree,
    connection: Connection,
    messages: broadcast::Sender<MessageFrame>,
}

impl Gateway {
    /// Dial `config.server_addr` in the background, start decoding
    /// frames into the device tree, and start the liveness supervisor.
    /// Returns immediately — use [`Gateway::connection`] to wait for the
    /// link to come up.
    pub fn start(config: ConnectionConfig) -> Self {
        let (frame_tx, mut frame_rx) = mpsc::channel(256);
        let connection = Connection::start(config, frame_tx);
        let tree = DeviceTree::new();
        let (messages_tx, _) = broadcast::channel(64);

        let dispatch_tree = tree.clone();
        let dispatch_messages = messages_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                Self::dispatch(&dispatch_tree, &dispatch_messages, frame).await;
            }
        });

        let repoll_connection = connection.clone();
        tree.spawn_liveness_supervisor(Arc::new(move |device: &str| {
            let conn = repoll_connection.clone();
            let xml = format!(
                r#"<getProperties version="{PROTOCOL_VERSION}" device="{}"/>"#,
                escape(device)
            );
            tokio::spawn(async move {
                let _ = conn.send(xml.into_bytes()).await;
            });
        }));

        Self {
            tree,
            connection,
            messages: messages_tx,
        }
    }

    async fn dispatch(tree: &DeviceTree, messages: &broadcast::Sender<MessageFrame>, frame: Frame) {
        match frame {
            Frame::Def { tag, xml } | Frame::Set { tag, xml } => {
                match VectorProperty::decode(&tag, &xml) {
                    Ok(vec) => {
                        tree.apply_vector(vec).await;
                    }
                    Err(e) => warn!(error = %e, tag, "failed to decode vector frame"),
                }
            }
            Frame::New { .. } => {
                // A client-originated request; a well-behaved server
                // never echoes this back, nothing to apply.
            }
            Frame::Del { device, name } => {
                tree.apply_del(&device, name.as_deref()).await;
            }
            Frame::Message {
                device,
                message,
                timestamp,
            } => {
                let _ = messages.send(MessageFrame {
                    device,
                    message,
                    timestamp,
                });
            }
        }
    }

    /// Subscribe to `message` frames as they arrive.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<MessageFrame> {
        self.messages.subscribe()
    }

    /// Wait for the connection to come up, or until `timeout` elapses.
    /// `None` waits indefinitely.
    pub async fn connection(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.connection.is_connected() {
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::TransportError(
                        "timed out waiting for connection".to_string(),
                    ));
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Send `getProperties`, optionally scoped to one device.
    pub async fn get_properties(&self, device: Option<&str>) -> Result<()> {
        let xml = match device {
            Some(device) => format!(
                r#"<getProperties version="{PROTOCOL_VERSION}" device="{}"/>"#,
                escape(device)
            ),
            None => format!(r#"<getProperties version="{PROTOCOL_VERSION}"/>"#),
        };
        self.connection.send(xml.into_bytes()).await
    }

    /// Wait for the connection, then request every device's properties.
    pub async fn begin_stream(&self, timeout: Option<Duration>) -> Result<()> {
        self.connection(timeout).await?;
        self.get_properties(None).await
    }

    /// A snapshot of `device.name`'s current vector, if known.
    pub async fn get_vector(&self, device: &str, name: &str) -> Option<VectorProperty> {
        self.tree.get_vector(device, name).await
    }

    /// A snapshot of every device's every known vector, for inspection
    /// tools such as `indi-info`.
    pub async fn snapshot(&self) -> std::collections::HashMap<String, std::collections::HashMap<String, VectorProperty>> {
        self.tree.snapshot().await
    }

    /// A [`DeferProperty`] awaiting `device.name`'s next settle.
    pub fn defer_property(&self, device: impl Into<String>, name: impl Into<String>) -> DeferProperty {
        DeferProperty::new(self.tree.clone(), device, name)
    }

    /// Send a fully-formed vector as a `new*Vector` write request.
    /// Optimistically marks the local copy `Busy` before the driver's
    /// own acknowledgement arrives.
    pub async fn send_vector(&self, vec: VectorProperty) -> DeferResult {
        self.tree
            .with_property(&vec.device, &vec.name, |pc| pc.mark_busy())
            .await;

        let xml = match vec.encode(VectorAction::New) {
            Ok(xml) => xml,
            Err(e) => return DeferResult::alert(format!("failed to encode vector: {e}")),
        };

        match self.connection.send(xml.into_bytes()).await {
            Ok(()) => DeferResult::ok("vector sent", Some(vec)),
            Err(e) => DeferResult::alert(format!("failed to send vector: {e}")),
        }
    }

    /// Fetch the current vector for `device.name`, optionally reset every
    /// existing item to `fill`, overlay `items` onto it, and send the
    /// result as a `new*Vector` write. `fill` is useful for e.g. zeroing
    /// every switch in a vector before turning exactly one `On`.
    pub async fn set_send_vector(
        &self,
        device: &str,
        name: &str,
        fill: Option<TypedValue>,
        items: HashMap<String, TypedValue>,
    ) -> DeferResult {
        let Some(mut vec) = self.tree.get_vector(device, name).await else {
            return DeferResult::alert(format!("cannot find '{device}.{name}'"));
        };
        if let Some(fill) = fill {
            let keys: Vec<String> = vec.items.keys().map(str::to_string).collect();
            for key in keys {
                vec.items.insert(key, fill.clone());
            }
        }
        for (key, value) in items {
            vec.items.insert(key, value);
        }
        self.send_vector(vec).await
    }

    /// Register a callback on `device.name`. Returns `None` if the
    /// property has never been defined.
    pub async fn register_callback(
        &self,
        device: &str,
        name: &str,
        callback: Callback,
        once: bool,
    ) -> Option<Uuid> {
        self.tree
            .with_property(device, name, |pc| pc.register_callback(callback, once))
            .await
    }

    /// Unregister a previously registered callback.
    pub async fn unregister_callback(&self, device: &str, name: &str, key: Uuid) -> bool {
        self.tree
            .with_property(device, name, |pc| pc.unregister_callback(key))
            .await
            .unwrap_or(false)
    }

    /// `device`'s `DRIVER_INFO.DRIVER_INTERFACE` bitmask, or `0` if
    /// unknown.
    pub async fn device_interface(&self, device: &str) -> u32 {
        match self.tree.get_vector(device, "DRIVER_INFO").await {
            Some(vec) => match vec.items.get("DRIVER_INTERFACE") {
                Some(TypedValue::Number(n)) => *n as u32,
                _ => 0,
            },
            None => 0,
        }
    }

    /// Find a device implementing `mask`. If `preferred` is given, it is
    /// checked and returned as-is (or an error) rather than searched.
    pub async fn device_by_interface(&self, mask: u32, preferred: Option<&str>) -> Result<String> {
        if let Some(device) = preferred {
            let iface = self.device_interface(device).await;
            return if DriverInterface(iface).implements(mask) {
                Ok(device.to_string())
            } else {
                Err(Error::DeviceMissing)
            };
        }
        self.tree
            .devices_by_interface(mask)
            .await
            .into_iter()
            .next()
            .ok_or(Error::DeviceMissing)
    }

    /// Ask the driver to start including BLOB element bodies for
    /// `device`. Remembered and replayed on every future reconnect.
    pub async fn enable_blob(&self, device: &str) -> Result<()> {
        let xml = format!(r#"<enableBLOB device="{}">Also</enableBLOB>"#, escape(device));
        self.connection.remember_for_replay(xml.clone().into_bytes()).await;
        self.connection.send(xml.into_bytes()).await
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn decodes_inbound_defines_into_the_tree() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut discard = [0u8; 256];
            let _ = socket.read(&mut discard).await;
            socket
                .write_all(br#"<defNumberVector device="CCD Simulator" name="CCD_EXPOSURE" state="Idle" perm="rw"><defNumber name="CCD_EXPOSURE_VALUE">1</defNumber></defNumberVector>"#)
                .await
                .unwrap();
        });

        let gateway = Gateway::start(ConnectionConfig {
            server_addr: addr,
            ..Default::default()
        });
        gateway.connection(Some(Duration::from_secs(2))).await.unwrap();
        gateway.get_properties(None).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if gateway.get_vector("CCD Simulator", "CCD_EXPOSURE").await.is_some() {
                break;
            }
            assert!(Instant::now() < deadline, "vector never arrived");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn device_by_interface_rejects_a_device_lacking_the_bit() {
        let gateway = Gateway::start(ConnectionConfig {
            server_addr: "127.0.0.1:1".parse().unwrap(),
            max_reconnect_attempts: 1,
            ..Default::default()
        });
        let result = gateway
            .device_by_interface(DriverInterface::FOCUSER, Some("anything"))
            .await;
        assert!(matches!(result, Err(Error::DeviceMissing)));
    }
}
