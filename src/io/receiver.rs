//! TCP listener for inbound frames and reconfiguration events.
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Client connects to the source port (default 5560)
//! 2. Listener spawns a named reader thread for the connection
//! 3. Reader decodes framed messages and dispatches them to shared state
//! 4. On disconnect or shutdown the thread exits
//! ```
//!
//! # Messages
//!
//! | `type` | Payload | Effect |
//! |--------|---------|--------|
//! | `frame` | `points: [{x, y, z, r, g, b}]` | Replaces the current frame |
//! | `reconfigure` | grid parameters | Replaces all parameters |
//!
//! Reads use a 500ms timeout so every thread notices the running flag
//! clearing within half a second.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::wire::{FrameReader, decode};
use crate::config::GridParams;
use crate::core::types::PointCloudFrame;
use crate::error::Result;
use crate::state::{ConfigStore, FrameSink};

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Frame(PointCloudFrame),
    Reconfigure(GridParams),
}

/// Route one message to shared state.
pub fn dispatch(msg: InboundMessage, sink: &FrameSink, store: &ConfigStore) {
    match msg {
        InboundMessage::Frame(frame) => sink.on_frame(frame),
        InboundMessage::Reconfigure(params) => {
            if let Err(e) = store.apply(params) {
                log::debug!("Reconfiguration from source ignored: {}", e);
            }
        }
    }
}

/// Background TCP listener feeding [`FrameSink`] and [`ConfigStore`].
pub struct FrameReceiver {
    local_addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl FrameReceiver {
    /// Bind `bind_address` and start accepting connections.
    ///
    /// The listener and all connection threads exit once `running` clears.
    pub fn spawn(
        bind_address: &str,
        sink: FrameSink,
        store: ConfigStore,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        log::info!("Frame receiver listening on {}", local_addr);

        let handle = thread::Builder::new()
            .name("bhumi-listener".to_string())
            .spawn(move || accept_loop(listener, sink, store, running))?;

        Ok(Self {
            local_addr,
            handle: Some(handle),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the listener thread to exit.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Frame receiver thread panicked");
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    sink: FrameSink,
    store: ConfigStore,
    running: Arc<AtomicBool>,
) {
    let mut next_id = 0usize;
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                let id = next_id;
                next_id += 1;
                let (sink, store, running) = (sink.clone(), store.clone(), Arc::clone(&running));
                let spawned = thread::Builder::new()
                    .name(format!("bhumi-conn-{}", id))
                    .spawn(move || serve_connection(stream, addr, sink, store, running));
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(e) => log::error!("Failed to spawn reader for {}: {}", addr, e),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log::error!("Error accepting source connection: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
        connections.retain(|h| !h.is_finished());
    }

    for handle in connections {
        let _ = handle.join();
    }
    log::info!("Frame receiver stopped");
}

fn serve_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    sink: FrameSink,
    store: ConfigStore,
    running: Arc<AtomicBool>,
) {
    log::info!("Source connected: {}", addr);
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(READ_TIMEOUT)))
    {
        log::warn!("Failed to set read timeout for {}: {}", addr, e);
    }

    let mut reader = FrameReader::new();
    while running.load(Ordering::Relaxed) {
        match reader.poll(&mut stream) {
            Ok(Some(payload)) => match decode::<InboundMessage>(&payload) {
                Ok(msg) => dispatch(msg, &sink, &store),
                Err(e) => log::warn!("Skipping malformed message from {}: {}", addr, e),
            },
            Ok(None) => {}
            Err(e) => {
                log::info!("Source {} disconnected: {}", addr, e);
                break;
            }
        }
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
