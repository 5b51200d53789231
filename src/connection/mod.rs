//! The transport layer: one socket, fed through the framer, with a
//! single serialized writer.
//!
//! Grounded on `client.rs`'s `connection_task` (dial, split into
//! read/write halves, drive both with `tokio::select!`), generalized with
//! the bounded async reconnect loop spec'd for this crate (the original
//! implementation's reconnect used a blocking `time.sleep` inside an
//! async method; that bug has no async-Rust analogue, so this reconnects
//! with `tokio::time::sleep` instead).

mod config;

pub use config::{ConnectionConfig, DEFAULT_PORT};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::xml::{Frame, XmlFramer};

/// A managed TCP connection to an INDI server: dials, reconnects with
/// bounded backoff, and exposes a channel-backed `send`/receive split so
/// callers never touch the socket directly.
#[derive(Debug, Clone)]
pub struct Connection {
    outbound: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    /// Messages replayed on every fresh connection (`enableBLOB` requests
    /// the gateway needs the driver to remember across reconnects).
    replay: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Connection {
    /// Dial `config.server_addr` in the background and stream decoded
    /// frames to `frame_tx`. Returns immediately; the connection is
    /// established, and reconnected, by the spawned task.
    pub fn start(config: ConnectionConfig, frame_tx: mpsc::Sender<Frame>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(128);
        let connected = Arc::new(AtomicBool::new(false));
        let replay = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(Self::run(
            config,
            outbound_rx,
            frame_tx,
            connected.clone(),
            replay.clone(),
        ));

        Self {
            outbound: outbound_tx,
            connected,
            replay,
        }
    }

    /// `true` while a TCP connection to the server is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Queue `bytes` for the writer half. Buffered and flushed once
    /// (re)connected if the link is currently down.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.outbound
            .send(bytes)
            .await
            .map_err(|_| Error::TransportError("connection task has shut down".to_string()))
    }

    /// Remember `bytes` so it is resent at the start of every future
    /// connection (used for `enableBLOB`, which a driver otherwise
    /// forgets across a reconnect).
    pub async fn remember_for_replay(&self, bytes: Vec<u8>) {
        self.replay.lock().await.push(bytes);
    }

    async fn run(
        config: ConnectionConfig,
        mut outbound_rx: mpsc::Receiver<Vec<u8>>,
        frame_tx: mpsc::Sender<Frame>,
        connected: Arc<AtomicBool>,
        replay: Arc<Mutex<Vec<Vec<u8>>>>,
    ) {
        let mut attempts = 0u32;

        loop {
            match TcpStream::connect(config.server_addr).await {
                Ok(stream) => {
                    attempts = 0;
                    connected.store(true, Ordering::Relaxed);
                    info!(addr = %config.server_addr, "connected to INDI server");

                    let (mut read_half, mut write_half) = stream.into_split();
                    for msg in replay.lock().await.iter() {
                        if let Err(e) = write_half.write_all(msg).await {
                            warn!(error = %e, "failed to replay buffered message after reconnect");
                        }
                    }

                    let mut framer = XmlFramer::new();
                    let mut buf = [0u8; 4096];

                    'session: loop {
                        tokio::select! {
                            read_result = read_half.read(&mut buf) => {
                                match read_result {
                                    Ok(0) => {
                                        info!("server closed the connection");
                                        break 'session;
                                    }
                                    Ok(n) => match framer.feed(&buf[..n]) {
                                        Ok(frames) => {
                                            for frame in frames {
                                                if frame_tx.send(frame).await.is_err() {
                                                    debug!("frame receiver dropped, stopping connection task");
                                                    return;
                                                }
                                            }
                                        }
                                        Err(e) => error!(error = %e, "malformed frame from server"),
                                    },
                                    Err(e) => {
                                        warn!(error = %e, "read error, reconnecting");
                                        break 'session;
                                    }
                                }
                            }
                            maybe_bytes = outbound_rx.recv() => {
                                match maybe_bytes {
                                    Some(bytes) => {
                                        if let Err(e) = write_half.write_all(&bytes).await {
                                            warn!(error = %e, "write error, reconnecting");
                                            break 'session;
                                        }
                                    }
                                    None => {
                                        debug!("no more senders, stopping connection task");
                                        return;
                                    }
                                }
                            }
                        }
                    }

                    connected.store(false, Ordering::Relaxed);
                }
                Err(e) => {
                    attempts += 1;
                    warn!(attempt = attempts, error = %e, "failed to connect to INDI server");
                    if attempts >= config.max_reconnect_attempts {
                        error!("giving up after {attempts} connection attempts");
                        return;
                    }
                }
            }

            tokio::time::sleep(config.reconnect_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn delivers_a_frame_from_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(br#"<defTextVector device="CCD" name="T"><defText name="A">hi</defText></defTextVector>"#)
                .await
                .unwrap();
        });

        let (frame_tx, mut frame_rx) = mpsc::channel(8);
        let config = ConnectionConfig {
            server_addr: addr,
            ..Default::default()
        };
        let _conn = Connection::start(config, frame_tx);

        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), frame_rx.recv())
            .await
            .expect("frame arrived before timeout")
            .expect("channel open");
        assert!(matches!(frame, Frame::Def { tag, .. } if tag == "defTextVector"));
    }
}
