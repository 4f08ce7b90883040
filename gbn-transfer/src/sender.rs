//! Sender task: turns the source stream into an unbroken run of data frames.
//!
//! # Loop contract
//!
//! 1. Read up to `max_payload` bytes from the source; an empty read means
//!    the source is exhausted.
//! 2. Wait until the window can admit another frame.  The wait parks on the
//!    window's room notification instead of polling.
//! 3. Build a data frame with `seq = newest_sent + 1` and
//!    `ack = oldest_unacked + 1`, its checksum flag decided by the fault
//!    injector, and record it in the window (cursor advance and slot write
//!    in one critical section).
//! 4. Transmit it.
//!
//! Once the source is exhausted the task marks the window's done flag and
//! returns.  It never retransmits; a frame whose transmission fails is still
//! recorded and left to the acknowledgment task's timeout.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::Config;
use crate::fault::FaultInjector;
use crate::frame::{self, ChecksumFlag};
use crate::socket::DatagramChannel;
use crate::window::SharedWindow;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("cannot read source: {0}")]
    Source(#[from] io::Error),
}

/// What the sender task put on the wire for the first time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Payload bytes read from the source and framed.
    pub bytes: u64,
    /// Data frames sent (first transmissions only).
    pub frames: u32,
}

/// The sending half of a transfer's framing loop.
pub struct SenderTask<R> {
    window: SharedWindow,
    source: R,
    channel: Arc<dyn DatagramChannel>,
    dest: SocketAddr,
    faults: FaultInjector,
    max_payload: usize,
    corrupt_percent: u8,
    send_delay: Duration,
    window_full_pause: Duration,
}

impl<R: AsyncRead + Unpin> SenderTask<R> {
    pub fn new(
        config: &Config,
        window: SharedWindow,
        source: R,
        channel: Arc<dyn DatagramChannel>,
        dest: SocketAddr,
        faults: FaultInjector,
    ) -> Self {
        Self {
            window,
            source,
            channel,
            dest,
            faults,
            max_payload: config.max_payload,
            corrupt_percent: config.sender.corrupt_percent,
            send_delay: config.send_delay,
            window_full_pause: config.window_full_pause,
        }
    }

    /// Frame and send the whole source, then mark the end of the transfer.
    pub async fn run(mut self) -> Result<SendReport, SenderError> {
        let mut report = SendReport::default();

        loop {
            let payload = read_chunk(&mut self.source, self.max_payload).await?;
            if payload.is_empty() {
                break;
            }

            self.window.wait_for_room(self.window_full_pause).await;
            self.send_frame(&payload).await;

            report.bytes += payload.len() as u64;
            report.frames += 1;

            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
        }

        self.window.mark_done_reading();
        log::info!(
            "[send] source exhausted after {} frame(s), {} byte(s)",
            report.frames,
            report.bytes
        );
        Ok(report)
    }

    /// Build, record, and transmit one new data frame.
    async fn send_frame(&mut self, payload: &[u8]) {
        let flag = ChecksumFlag::corrupted_if(self.faults.should_corrupt(self.corrupt_percent));

        // The frame is in the window before it hits the wire, so an ack can
        // never name a sequence number the window has not seen.
        let (seq, ack, bytes) = {
            let mut w = self.window.lock();
            let seq = w.next_seq();
            let ack = w.awaited_ack();
            let bytes = frame::encode_data_frame(flag, ack, seq, payload);
            w.record_sent(bytes.clone());
            log::debug!(
                "[send] stored seq={seq} in slot {} (in flight {}/{})",
                w.slot_for(seq),
                w.in_flight(),
                w.capacity()
            );
            (seq, ack, bytes)
        };

        if !flag.is_good() {
            log::warn!("[send] simulating bad checksum on seq={seq}");
        }
        match self.channel.send_to(&bytes, self.dest).await {
            Ok(()) => log::debug!(
                "[send] → DATA seq={seq} ack={ack} len={} to {}",
                bytes.len(),
                self.dest
            ),
            Err(e) => log::warn!("[send] transmit of seq={seq} failed, treating as lost: {e}"),
        }
    }
}

/// Read until `max` bytes are buffered or the source ends.
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R, max: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
