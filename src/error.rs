//! Error types for the INDI client protocol core

use quick_xml::events::attributes::AttrError;
use std::io;
use thiserror::Error;

/// Result type for the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for INDI protocol operations.
///
/// Most runtime failures a caller can recover from (a property not being
/// ready yet, a device going away mid-wait) are surfaced as an `Alert`
/// [`crate::defer::DeferResult`] rather than this type — see §7 of the
/// protocol spec. `Error` is reserved for setup and decode failures that
/// have no sensible `DeferResult` to carry.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Message error
    #[error("Message error: {0}")]
    Message(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Property error
    #[error("Property error: {0}")]
    Property(String),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid switch state
    #[error("Invalid switch state: {0}")]
    InvalidSwitchState(String),

    /// UTF-8 conversion error
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// XML attribute error
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] AttrError),

    /// Format error
    #[error("Format error: {0}")]
    Format(String),

    /// `get_vector`/`get_property` was called before any `def` arrived for it.
    #[error("not connected: no definition received yet for {0}.{1}")]
    NotConnected(String, String),

    /// No device implements the requested interface bitmask.
    #[error("no device implements the requested interface")]
    DeviceMissing,

    /// A property was deleted while an awaiter was still pending on it.
    #[error("property gone: {0}.{1} was deleted")]
    PropertyGone(String, String),

    /// Malformed inbound XML the framer could not turn into a vector.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// The socket closed or could not be written to.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A chain link observed a non-Ok predecessor and short-circuited.
    #[error("chain short-circuited on prior failure")]
    ChainShortCircuit,
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Error::Format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_mentions_device_and_property() {
        let err = Error::NotConnected("Foo".into(), "N".into());
        assert!(err.to_string().contains("Foo"));
        assert!(err.to_string().contains('N'));
    }
}
