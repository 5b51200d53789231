use std::net::SocketAddr;
use std::time::Duration;

/// Default INDI server port.
pub const DEFAULT_PORT: u16 = 7624;

/// Connection-level configuration: where to dial, and how hard to retry.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub server_addr: SocketAddr,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before giving up and surfacing an error.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
        }
    }
}
