//! Acknowledgment task: slides the window and drives Go-Back-N recovery.
//!
//! ```text
//!            ack frame / nothing to do
//!               ┌──────────┐
//!               ▼          │
//!  start ──▶ Waiting ──────┘
//!               │  timeout, nothing outstanding, source exhausted
//!               ▼
//!             Done
//! ```
//!
//! In `Waiting` the task blocks on a timed receive.  An inbound frame goes
//! through the loss decision, then its own checksum flag, then the ack
//! number check.  A timeout with frames outstanding resends the whole
//! outstanding range, oldest first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::fault::FaultInjector;
use crate::frame::{self, FrameKind};
use crate::socket::{ChannelError, DatagramChannel, Incoming};
use crate::window::SharedWindow;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AckError {
    #[error("acknowledgment channel closed")]
    Closed,
    #[error("gave up after {0} consecutive timeouts without progress")]
    RetriesExhausted(u32),
}

// ---------------------------------------------------------------------------
// State and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Waiting,
    Done,
}

/// What became of one inbound acknowledgment datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Dropped by simulated loss.
    Lost,
    /// Too short to hold an ack header.
    Runt,
    /// Checksum flag was BAD.
    Corrupt,
    /// The window slid from `from` to `to`.
    Advanced { from: u32, to: u32 },
    /// Stale, out of range, or beyond the awaited value without cumulative
    /// mode.
    Unexpected(u32),
}

/// Reaction to a receive timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Resend these `(seq, bytes)` pairs in order.
    Retransmit(Vec<(u32, Vec<u8>)>),
    /// Everything is acknowledged and the source is exhausted.
    Done,
    /// Nothing outstanding yet; keep waiting.
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckReport {
    /// Frames resent because of timeouts.
    pub retransmitted: u32,
    /// Timeouts that found frames outstanding.
    pub timeouts: u32,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

pub struct AckTask {
    window: SharedWindow,
    channel: Arc<dyn DatagramChannel>,
    dest: SocketAddr,
    faults: FaultInjector,
    loss_percent: u8,
    cumulative: bool,
    timeout: Duration,
    max_consecutive_timeouts: Option<u32>,
    consecutive_timeouts: u32,
    state: AckState,
    report: AckReport,
}

impl AckTask {
    pub fn new(
        config: &Config,
        window: SharedWindow,
        channel: Arc<dyn DatagramChannel>,
        dest: SocketAddr,
        faults: FaultInjector,
    ) -> Self {
        Self {
            window,
            channel,
            dest,
            faults,
            loss_percent: config.sender.loss_percent,
            cumulative: config.cumulative_acks,
            timeout: config.timeout,
            max_consecutive_timeouts: config.max_consecutive_timeouts,
            consecutive_timeouts: 0,
            state: AckState::Waiting,
            report: AckReport::default(),
        }
    }

    pub fn state(&self) -> AckState {
        self.state
    }

    /// Apply one inbound datagram to the window.
    pub fn on_ack_datagram(&mut self, bytes: &[u8]) -> AckOutcome {
        if bytes.len() < FrameKind::Ack.header_len() {
            log::warn!("[ack] runt datagram of {} byte(s) discarded", bytes.len());
            return AckOutcome::Runt;
        }
        if !self.faults.should_deliver(self.loss_percent) {
            log::warn!("[ack] simulated loss of acknowledgment");
            return AckOutcome::Lost;
        }
        let header = frame::decode_header(bytes, FrameKind::Ack);
        if !header.checksum.is_good() {
            log::warn!("[ack] bad checksum on ack={}, discarded", header.ack);
            return AckOutcome::Corrupt;
        }

        let ack = header.ack;
        let mut w = self.window.lock();
        let from = w.oldest_unacked();
        let in_range = ack <= w.newest_sent();

        let advanced = if in_range && ack == w.awaited_ack() {
            w.advance_ack(ack)
        } else if in_range && self.cumulative && ack > from {
            w.advance_ack(ack)
        } else {
            false
        };
        if !advanced {
            log::warn!(
                "[ack] unexpected ack={ack} (awaiting {}, newest sent {})",
                w.awaited_ack(),
                w.newest_sent()
            );
            return AckOutcome::Unexpected(ack);
        }

        log::debug!("[ack] ← ACK ack={ack}, window {from} → {ack}");
        drop(w);
        self.consecutive_timeouts = 0;
        self.window.notify_room();
        AckOutcome::Advanced { from, to: ack }
    }

    /// Decide what a receive timeout means for the window.
    pub fn on_timeout(&mut self) -> Result<TimeoutAction, AckError> {
        // Read the flag before the window: once it is set, every frame the
        // sender will ever record is already in the window.
        let done_reading = self.window.done_reading();
        let mut w = self.window.lock();

        if w.has_unacked() {
            self.consecutive_timeouts += 1;
            self.report.timeouts += 1;
            if let Some(limit) = self.max_consecutive_timeouts {
                if self.consecutive_timeouts > limit {
                    log::error!(
                        "[ack] {limit} retransmission round(s) went unanswered, giving up with {} frame(s) outstanding",
                        w.in_flight()
                    );
                    return Err(AckError::RetriesExhausted(limit));
                }
            }
            let frames = w.prepare_retransmission();
            log::debug!(
                "[ack] timeout, going back to seq={} ({} frame(s))",
                w.awaited_ack(),
                frames.len()
            );
            return Ok(TimeoutAction::Retransmit(frames));
        }

        self.consecutive_timeouts = 0;
        if done_reading {
            log::info!("[ack] all {} frame(s) acknowledged", w.newest_sent());
            self.state = AckState::Done;
            Ok(TimeoutAction::Done)
        } else {
            log::debug!("[ack] timeout, nothing to resend");
            Ok(TimeoutAction::Idle)
        }
    }

    async fn retransmit(&mut self, frames: Vec<(u32, Vec<u8>)>) {
        for (seq, bytes) in frames {
            match self.channel.send_to(&bytes, self.dest).await {
                Ok(()) => log::debug!("[ack] ↻ DATA seq={seq} to {}", self.dest),
                Err(e) => log::warn!("[ack] resend of seq={seq} failed: {e}"),
            }
            self.report.retransmitted += 1;
        }
    }

    /// Run until every frame is acknowledged and the source is exhausted.
    pub async fn run(mut self) -> Result<AckReport, AckError> {
        log::info!("[ack] waiting for acknowledgments (timeout {:?})", self.timeout);

        while self.state == AckState::Waiting {
            match self.channel.recv_timeout(Some(self.timeout)).await {
                Ok(Incoming::Datagram(datagram)) => {
                    self.on_ack_datagram(&datagram.bytes);
                }
                Ok(Incoming::TimedOut) => match self.on_timeout()? {
                    TimeoutAction::Retransmit(frames) => self.retransmit(frames).await,
                    TimeoutAction::Done | TimeoutAction::Idle => {}
                },
                Err(ChannelError::Closed) => return Err(AckError::Closed),
                Err(e) => log::warn!("[ack] receive failed, treating as lost: {e}"),
            }
        }
        Ok(self.report)
    }
}
