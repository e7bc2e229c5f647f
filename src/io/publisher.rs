//! Grid publishers.
//!
//! The scheduler hands every synthesized grid to a [`GridPublisher`]. Two
//! transports are provided:
//! - [`TcpGridPublisher`]: length-prefixed JSON to every connected client
//! - [`ChannelPublisher`]: a crossbeam channel for in-process consumers

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::wire;
use crate::error::{BhumiError, Result};
use crate::grid::GridMessage;

/// Write timeout per client; a stalled subscriber is dropped rather than
/// holding up the scheduler.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Sink for synthesized grids.
pub trait GridPublisher: Send {
    /// Transmit one grid.
    ///
    /// Errors are reported to the caller, which decides whether to retry on
    /// the next cycle.
    fn publish(&mut self, msg: &GridMessage) -> Result<()>;
}

/// Broadcasts grids to TCP subscribers.
///
/// New connections are accepted lazily at each publish. A grid published
/// with no subscribers is simply dropped.
pub struct TcpGridPublisher {
    listener: TcpListener,
    clients: Vec<TcpStream>,
    published: u64,
}

impl TcpGridPublisher {
    /// Bind the listener (e.g. "0.0.0.0:5561"; port 0 picks a free port).
    pub fn bind(bind_address: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        log::info!("Grid publisher listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            clients: Vec::new(),
            published: 0,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Currently connected subscribers.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = Self::configure_client(&stream) {
                        log::warn!("Failed to configure subscriber {}: {}", addr, e);
                        continue;
                    }
                    log::info!("Grid subscriber connected: {}", addr);
                    self.clients.push(stream);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("Error accepting subscriber: {}", e);
                    break;
                }
            }
        }
    }

    fn configure_client(stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;
        stream.set_nodelay(true)
    }
}

impl GridPublisher for TcpGridPublisher {
    fn publish(&mut self, msg: &GridMessage) -> Result<()> {
        self.accept_pending();
        if self.clients.is_empty() {
            return Ok(());
        }

        let buf = wire::encode(msg)?;
        self.clients.retain_mut(|client| match client.write_all(&buf) {
            Ok(()) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    log::info!("Grid subscriber {} disconnected: {}", addr, e);
                } else {
                    log::info!("Grid subscriber disconnected: {}", e);
                }
                false
            }
        });

        self.published += 1;
        if self.published % 100 == 0 {
            log::debug!(
                "Published {} grids ({} subscribers)",
                self.published,
                self.clients.len()
            );
        }
        Ok(())
    }
}

/// Publishes into a crossbeam channel.
///
/// Never blocks: a full channel is a [`BhumiError::Publish`] and a dropped
/// receiver is a [`BhumiError::TransportDisconnected`].
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: Sender<GridMessage>,
}

impl ChannelPublisher {
    /// Publisher backed by a bounded channel of `capacity` grids.
    pub fn bounded(capacity: usize) -> (Self, Receiver<GridMessage>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    /// Publisher backed by an unbounded channel.
    pub fn unbounded() -> (Self, Receiver<GridMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl GridPublisher for ChannelPublisher {
    fn publish(&mut self, msg: &GridMessage) -> Result<()> {
        self.tx.try_send(msg.clone()).map_err(|e| match e {
            TrySendError::Full(_) => BhumiError::Publish("grid channel full".to_string()),
            TrySendError::Disconnected(_) => {
                BhumiError::TransportDisconnected("grid channel receiver dropped".to_string())
            }
        })
    }
}
