//! In-process network for deterministic testing.
//!
//! [`MemoryChannel::pair`] returns two connected endpoints backed by tokio
//! channels.  Delivery is in order and lossless; loss and corruption are the
//! job of each endpoint's [`crate::fault::FaultInjector`], exactly as on a
//! real socket.  Every datagram an endpoint sends is also appended to its
//! transcript so tests can assert on what went over the wire, including
//! retransmissions.
//!
//! Paired with `#[tokio::test(start_paused = true)]`, receive timeouts fire
//! only once every task is idle, which makes timeout-driven recovery fully
//! reproducible.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::socket::{ChannelError, ChannelFuture, Datagram, DatagramChannel, Incoming};

/// One end of an in-memory datagram link.
#[derive(Debug)]
pub struct MemoryChannel {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Datagram>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    transcript: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryChannel {
    /// Two connected endpoints at `127.0.0.1:1` and `127.0.0.1:2`.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let a = SocketAddr::from((Ipv4Addr::LOCALHOST, 1));
        let b = SocketAddr::from((Ipv4Addr::LOCALHOST, 2));
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            MemoryChannel::new(a, b, a_tx, a_rx),
            MemoryChannel::new(b, a, b_tx, b_rx),
        )
    }

    fn new(
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<Datagram>,
        inbound: mpsc::UnboundedReceiver<Datagram>,
    ) -> Self {
        Self {
            local_addr,
            peer_addr,
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Every datagram sent from this endpoint so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DatagramChannel for MemoryChannel {
    fn send_to<'a>(&'a self, bytes: &'a [u8], dest: SocketAddr) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            self.transcript
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(bytes.to_vec());

            if dest != self.peer_addr {
                log::trace!("[sim] {dest} unreachable from {}", self.local_addr);
                return Ok(());
            }
            let datagram = Datagram {
                bytes: bytes.to_vec(),
                from: self.local_addr,
            };
            // A vanished peer swallows datagrams, as a real network would.
            if self.outbound.send(datagram).is_err() {
                log::trace!("[sim] peer {dest} gone, datagram dropped");
            }
            Ok(())
        })
    }

    fn recv_timeout(&self, timeout: Option<Duration>) -> ChannelFuture<'_, Incoming> {
        Box::pin(async move {
            let mut inbound = self.inbound.lock().await;
            let next = match timeout {
                Some(limit) => match tokio::time::timeout(limit, inbound.recv()).await {
                    Ok(next) => next,
                    Err(_elapsed) => return Ok(Incoming::TimedOut),
                },
                None => inbound.recv().await,
            };
            next.map(Incoming::Datagram).ok_or(ChannelError::Closed)
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
