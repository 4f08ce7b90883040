//! Shared harness for the in-memory transfer tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gbn_transfer::{
    config::{Config, FaultConfig},
    fault::FaultInjector,
    frame::{self, ChecksumFlag, FrameKind},
    receiver::{ReceiverEndpoint, ReceiverStats},
    session::{SenderSession, SessionError, TransferSummary},
    simulator::MemoryChannel,
    socket::{ChannelError, ChannelFuture, DatagramChannel, Incoming},
};

/// A fault-free configuration with the given window and payload size.
pub fn quiet_config(window_size: usize, max_payload: usize) -> Config {
    Config {
        window_size,
        max_payload,
        timeout: Duration::from_millis(3000),
        sender: FaultConfig::NONE,
        receiver: FaultConfig::NONE,
        ..Config::default()
    }
}

/// Fault injectors for the three tasks of a transfer.
pub struct Faults {
    pub send: FaultInjector,
    pub ack: FaultInjector,
    pub receive: FaultInjector,
}

impl Faults {
    pub fn none() -> Self {
        Self {
            send: FaultInjector::reliable(),
            ack: FaultInjector::reliable(),
            receive: FaultInjector::reliable(),
        }
    }

    /// Seeded random draws, as a real session would use.
    pub fn seeded(seed: u64) -> Self {
        Self {
            send: FaultInjector::from_seed(Some(seed), 0),
            ack: FaultInjector::from_seed(Some(seed), 1),
            receive: FaultInjector::from_seed(Some(seed), 2),
        }
    }
}

/// Everything observable after a transfer.
pub struct Outcome {
    pub result: Result<TransferSummary, SessionError>,
    pub sink: Vec<u8>,
    pub next_expected: u32,
    pub stats: ReceiverStats,
    /// Sequence numbers of every data frame put on the wire, in order.
    pub data_seqs: Vec<u32>,
    /// Ack numbers of every ack frame put on the wire, in order.
    pub acks: Vec<u32>,
}

/// Flips every outbound datagram's checksum flag to BAD, simulating a link
/// that corrupts everything in transit.
struct CorruptingLink {
    inner: Arc<MemoryChannel>,
}

impl DatagramChannel for CorruptingLink {
    fn send_to<'a>(&'a self, bytes: &'a [u8], dest: SocketAddr) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            let mut damaged = bytes.to_vec();
            frame::set_checksum(&mut damaged, ChecksumFlag::Bad);
            self.inner.send_to(&damaged, dest).await
        })
    }

    fn recv_timeout(&self, timeout: Option<Duration>) -> ChannelFuture<'_, Incoming> {
        self.inner.recv_timeout(timeout)
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

/// Fails the first `send_to` with an I/O error; later sends go through.
struct FlakyLink {
    inner: Arc<MemoryChannel>,
    failed: AtomicBool,
}

impl DatagramChannel for FlakyLink {
    fn send_to<'a>(&'a self, bytes: &'a [u8], dest: SocketAddr) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(ChannelError::Io(io::Error::other("network unreachable")));
            }
            self.inner.send_to(bytes, dest).await
        })
    }

    fn recv_timeout(&self, timeout: Option<Duration>) -> ChannelFuture<'_, Incoming> {
        self.inner.recv_timeout(timeout)
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}

/// How the sender's outbound datagrams are treated on the way out.
#[derive(Clone, Copy)]
enum Link {
    Clean,
    Corrupting,
    FailFirstSend,
}

/// Run a whole transfer of `data` over an in-memory link.
pub async fn transfer(config: &Config, data: &'static [u8], faults: Faults) -> Outcome {
    run(config, data, faults, Link::Clean).await
}

/// Like [`transfer`], but every data frame arrives with a BAD checksum.
pub async fn transfer_over_corrupting_link(
    config: &Config,
    data: &'static [u8],
    faults: Faults,
) -> Outcome {
    run(config, data, faults, Link::Corrupting).await
}

/// Like [`transfer`], but the sender's very first datagram never leaves.
pub async fn transfer_with_failed_first_send(
    config: &Config,
    data: &'static [u8],
    faults: Faults,
) -> Outcome {
    run(config, data, faults, Link::FailFirstSend).await
}

async fn run(config: &Config, data: &'static [u8], faults: Faults, link: Link) -> Outcome {
    let (a, b) = MemoryChannel::pair();
    let a = Arc::new(a);
    let sender_channel: Arc<dyn DatagramChannel> = match link {
        Link::Clean => a.clone(),
        Link::Corrupting => Arc::new(CorruptingLink { inner: a.clone() }),
        Link::FailFirstSend => Arc::new(FlakyLink {
            inner: a.clone(),
            failed: AtomicBool::new(false),
        }),
    };

    let session = SenderSession::start_with(
        config,
        data,
        sender_channel,
        b.local_addr(),
        faults.send,
        faults.ack,
    )
    .expect("valid config");
    let mut endpoint = ReceiverEndpoint::new(config, Vec::new(), faults.receive);

    // The receiver has no end of its own; it stops with the sender.
    let result = tokio::select! {
        result = session.finish() => result,
        stopped = endpoint.run(&b) => panic!("receiver stopped early: {stopped:?}"),
    };

    Outcome {
        result,
        next_expected: endpoint.next_expected(),
        stats: endpoint.stats(),
        sink: endpoint.into_sink(),
        data_seqs: a
            .sent()
            .iter()
            .filter_map(|d| frame::decode_header(d, FrameKind::Data).seq)
            .collect(),
        acks: b
            .sent()
            .iter()
            .map(|d| frame::decode_header(d, FrameKind::Ack).ack)
            .collect(),
    }
}
