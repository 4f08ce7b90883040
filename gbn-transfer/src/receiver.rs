//! Receiving endpoint.
//!
//! The receiver accepts only the next expected sequence number; there is no
//! reorder buffer.  Each inbound datagram is first classified (simulated
//! loss, checksum flag, sequence check) without side effects on the sink,
//! then the verdict is applied: payload written, ack sent, counters bumped.
//!
//! | Verdict     | Sink write | Ack sent          | `next_expected` |
//! |-------------|------------|-------------------|-----------------|
//! | Accepted    | yes        | `ack = seq`       | `+1`            |
//! | Duplicate   | no         | `ack = seq`       | unchanged       |
//! | OutOfOrder  | no         | none              | unchanged       |
//! | Corrupt     | no         | none              | unchanged       |
//! | Lost / Runt | no         | none              | unchanged       |

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::fault::FaultInjector;
use crate::frame::{self, ChecksumFlag, FrameKind};
use crate::socket::{ChannelError, Datagram, DatagramChannel, Incoming};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("cannot write payload of seq={seq} to sink: {source}")]
    Sink { seq: u32, source: io::Error },
    #[error("receive channel closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Classification of one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted(u32),
    Duplicate(u32),
    OutOfOrder(u32),
    Corrupt,
    Lost,
    /// Shorter than a data header, or a length field that disagrees with
    /// the datagram.
    Runt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub accepted: u64,
    pub duplicate: u64,
    pub out_of_order: u64,
    pub corrupt: u64,
    pub lost: u64,
    pub runt: u64,
}

impl ReceiverStats {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Accepted(_) => self.accepted += 1,
            Verdict::Duplicate(_) => self.duplicate += 1,
            Verdict::OutOfOrder(_) => self.out_of_order += 1,
            Verdict::Corrupt => self.corrupt += 1,
            Verdict::Lost => self.lost += 1,
            Verdict::Runt => self.runt += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

pub struct ReceiverEndpoint<W> {
    next_expected: u32,
    sink: W,
    faults: FaultInjector,
    loss_percent: u8,
    corrupt_percent: u8,
    stats: ReceiverStats,
}

impl<W: AsyncWrite + Unpin> ReceiverEndpoint<W> {
    pub fn new(config: &Config, sink: W, faults: FaultInjector) -> Self {
        Self {
            next_expected: 1,
            sink,
            faults,
            loss_percent: config.receiver.loss_percent,
            corrupt_percent: config.receiver.corrupt_percent,
            stats: ReceiverStats::default(),
        }
    }

    /// Sequence number the next accepted frame must carry.
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Decide what to do with `bytes` without touching the sink.
    pub fn classify(&mut self, bytes: &[u8]) -> Verdict {
        if bytes.len() < FrameKind::Data.header_len() || frame::data_payload(bytes).is_none() {
            return Verdict::Runt;
        }
        if !self.faults.should_deliver(self.loss_percent) {
            return Verdict::Lost;
        }
        let header = frame::decode_header(bytes, FrameKind::Data);
        if !header.checksum.is_good() {
            return Verdict::Corrupt;
        }
        // `decode_header` always yields a sequence number for data frames.
        let seq = header.seq.unwrap_or_default();
        if seq == self.next_expected {
            Verdict::Accepted(seq)
        } else if seq < self.next_expected {
            Verdict::Duplicate(seq)
        } else {
            Verdict::OutOfOrder(seq)
        }
    }

    /// Classify one datagram and carry out the verdict.
    pub async fn handle_datagram(
        &mut self,
        channel: &dyn DatagramChannel,
        datagram: &Datagram,
    ) -> Result<Verdict, ReceiverError> {
        let verdict = self.classify(&datagram.bytes);
        self.stats.record(verdict);

        match verdict {
            Verdict::Accepted(seq) => {
                let payload = frame::data_payload(&datagram.bytes).unwrap_or_default();
                if let Err(source) = write_payload(&mut self.sink, payload).await {
                    log::error!("[recv] sink write failed for seq={seq}: {source}");
                    return Err(ReceiverError::Sink { seq, source });
                }
                self.next_expected = self.next_expected.wrapping_add(1);
                log::debug!("[recv] ← DATA seq={seq} accepted ({} byte(s))", payload.len());
                self.send_ack(channel, seq, datagram.from).await;
            }
            Verdict::Duplicate(seq) => {
                log::debug!(
                    "[recv] ← DATA seq={seq} already accepted (expecting {}), re-acking",
                    self.next_expected
                );
                self.send_ack(channel, seq, datagram.from).await;
            }
            Verdict::OutOfOrder(seq) => log::warn!(
                "[recv] ← DATA seq={seq} out of order (expecting {}), discarded",
                self.next_expected
            ),
            Verdict::Corrupt => log::warn!("[recv] bad checksum, frame discarded"),
            Verdict::Lost => log::warn!("[recv] simulated loss of data frame"),
            Verdict::Runt => log::warn!(
                "[recv] malformed datagram of {} byte(s) from {} discarded",
                datagram.bytes.len(),
                datagram.from
            ),
        }
        Ok(verdict)
    }

    async fn send_ack(&mut self, channel: &dyn DatagramChannel, ack: u32, dest: SocketAddr) {
        let corrupt = self.faults.should_corrupt(self.corrupt_percent);
        if corrupt {
            log::warn!("[recv] simulating bad checksum on ack={ack}");
        }
        let bytes = frame::encode_ack_frame(ChecksumFlag::corrupted_if(corrupt), ack);
        match channel.send_to(&bytes, dest).await {
            Ok(()) => log::debug!("[recv] → ACK ack={ack} to {dest}"),
            Err(e) => log::warn!("[recv] ack={ack} could not be sent, treating as lost: {e}"),
        }
    }

    /// Serve `channel` until it closes or the sink fails.
    pub async fn run(&mut self, channel: &dyn DatagramChannel) -> Result<(), ReceiverError> {
        log::info!("[recv] listening on {}", channel.local_addr());
        loop {
            match channel.recv_timeout(None).await {
                Ok(Incoming::Datagram(datagram)) => {
                    self.handle_datagram(channel, &datagram).await?;
                }
                Ok(Incoming::TimedOut) => {}
                Err(ChannelError::Closed) => {
                    log::info!("[recv] channel closed, {:?}", self.stats);
                    return Err(ReceiverError::Closed);
                }
                Err(e) => log::warn!("[recv] receive failed: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sink helpers
// ---------------------------------------------------------------------------

async fn write_payload<W: AsyncWrite + Unpin>(sink: &mut W, payload: &[u8]) -> io::Result<()> {
    sink.write_all(payload).await?;
    sink.flush().await
}
