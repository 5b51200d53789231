#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! Client-side protocol core for INDI (Instrument Neutral Distributed
//! Interface), the wire protocol astronomy instruments use to expose
//! their controls to client software.
//!
//! This crate does not speak to a socket on its own behalf beyond what
//! [`Gateway`] needs to stay connected; it is the plumbing a full INDI
//! client is built from:
//!
//! - [`xml`]: an incremental framer that reconstructs complete top-level
//!   elements from a streamed, rootless byte sequence.
//! - [`property`]: the typed vector-property model (`Number`/`Switch`/
//!   `Text`/`Light`/`BLOB`) and its XML encode/decode.
//! - [`tree`]: the device/property tree, with per-property subscription
//!   (futures and callbacks) and a background liveness supervisor.
//! - [`defer`]: a small combinator layer for composing multi-step device
//!   workflows out of awaitable steps.
//! - [`connection`]: the managed, auto-reconnecting TCP transport.
//! - [`gateway`]: the façade wiring all of the above together.

/// Connection management: transport, reconnect, and config.
pub mod connection;
/// The deferred-action combinator layer.
pub mod defer;
/// Error types and handling.
pub mod error;
/// The client façade.
pub mod gateway;
/// The typed vector-property data model.
pub mod property;
/// INDI wire timestamps.
pub mod timestamp;
/// The device/property tree and its subscription hub.
pub mod tree;
/// Incremental XML framing.
pub mod xml;

pub use gateway::Gateway;

/// Common types and traits.
pub mod prelude {
    pub use crate::connection::{Connection, ConnectionConfig};
    pub use crate::defer::{Defer, DeferAction, DeferChain, DeferProperty, DeferResult, Just};
    pub use crate::error::Error;
    pub use crate::gateway::Gateway;
    pub use crate::property::{
        DriverInterface, ItemMap, PropertyPerm, PropertyState, SwitchRule, SwitchState,
        TypedValue, VectorAction, VectorKind, VectorProperty,
    };
    pub use crate::tree::DeviceTree;
    pub use crate::xml::{Frame, XmlFramer};
}

/// Result type for INDI operations.
pub type Result<T> = std::result::Result<T, error::Error>;

/// Version of the INDI protocol implemented by this library.
pub const PROTOCOL_VERSION: &str = "1.7";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        assert_eq!(PROTOCOL_VERSION, "1.7");
    }
}
