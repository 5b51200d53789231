//! The streaming frame reconstructor sitting between the raw socket and
//! the typed vector-property decoder.

mod framer;

pub use framer::{Frame, XmlFramer};
