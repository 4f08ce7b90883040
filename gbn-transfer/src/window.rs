//! Go-Back-N send window.
//!
//! [`SendWindow`] is the bounded, indexed store of in-flight frames plus the
//! two cursors that delimit them.  [`SharedWindow`] wraps one window for the
//! two sender-side tasks: every read or write of the cursors and slots goes
//! through a single mutex, and the acknowledgment task wakes the sender task
//! whenever room opens up.
//!
//! # Sequence-number layout
//!
//! ```text
//!  oldest_unacked        newest_sent
//!        │                    │
//!  ──────┼────────────────────┼──────────────────▶ seq space
//!   acked│ <──── in flight ──▶│ <── sendable (while in flight < W)
//! ```
//!
//! Sequence numbers start at 1; both cursors start at 0.  Frame `s` lives in
//! slot `s % W`.  Slots of acknowledged frames are left as they are until a
//! later frame reuses them.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

use crate::frame::{self, ChecksumFlag};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("slot {index} outside window of capacity {capacity}")]
    SlotOutOfRange { index: usize, capacity: usize },
}

// ---------------------------------------------------------------------------
// Send window
// ---------------------------------------------------------------------------

/// Sliding-window state owned by the sending endpoint.
#[derive(Debug)]
pub struct SendWindow {
    /// Highest sequence number whose acknowledgment has been accepted (LAR).
    oldest_unacked: u32,

    /// Highest sequence number transmitted so far (LFS).
    newest_sent: u32,

    /// Raw bytes of the most recent frame stored in each slot.
    slots: Vec<Option<Vec<u8>>>,
}

impl SendWindow {
    /// Create an empty window of `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            oldest_unacked: 0,
            newest_sent: 0,
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn oldest_unacked(&self) -> u32 {
        self.oldest_unacked
    }

    pub fn newest_sent(&self) -> u32 {
        self.newest_sent
    }

    /// Number of frames sent but not yet acknowledged.
    pub fn in_flight(&self) -> u32 {
        self.newest_sent.wrapping_sub(self.oldest_unacked)
    }

    /// `true` while another frame may be admitted.
    pub fn has_capacity(&self) -> bool {
        (self.in_flight() as usize) < self.capacity()
    }

    /// `true` when at least one frame awaits acknowledgment.
    pub fn has_unacked(&self) -> bool {
        self.oldest_unacked < self.newest_sent
    }

    /// Sequence number the next new frame will carry.
    pub fn next_seq(&self) -> u32 {
        self.newest_sent.wrapping_add(1)
    }

    /// The acknowledgment currently awaited; also the `ackNumber` placed in
    /// outgoing data frames.
    pub fn awaited_ack(&self) -> u32 {
        self.oldest_unacked.wrapping_add(1)
    }

    /// Outstanding sequence numbers, oldest first.
    pub fn outstanding(&self) -> RangeInclusive<u32> {
        self.awaited_ack()..=self.newest_sent
    }

    /// Slot that holds frame `seq`.
    pub fn slot_for(&self, seq: u32) -> usize {
        seq as usize % self.capacity()
    }

    /// Unconditionally overwrite slot `index`.
    pub fn store(&mut self, index: usize, frame: Vec<u8>) -> Result<(), WindowError> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(WindowError::SlotOutOfRange { index, capacity })?;
        *slot = Some(frame);
        Ok(())
    }

    /// Bytes last stored in slot `index`, if any.
    pub fn retrieve(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index)?.as_deref()
    }

    /// Move `oldest_unacked` forward to `new_ack`.
    ///
    /// Values at or below the current cursor are ignored.  Returns whether the
    /// cursor moved.
    pub fn advance_ack(&mut self, new_ack: u32) -> bool {
        if new_ack > self.oldest_unacked {
            self.oldest_unacked = new_ack;
            true
        } else {
            false
        }
    }

    /// Admit a just-transmitted frame: advance `newest_sent` and store the
    /// bytes in its slot.  Returns the frame's sequence number.
    pub fn record_sent(&mut self, frame: Vec<u8>) -> u32 {
        debug_assert!(
            self.has_capacity(),
            "record_sent called on a full window ({} / {})",
            self.in_flight(),
            self.capacity()
        );
        self.newest_sent = self.newest_sent.wrapping_add(1);
        let index = self.slot_for(self.newest_sent);
        self.slots[index] = Some(frame);
        self.newest_sent
    }

    /// Prepare every outstanding frame for a Go-Back-N resend, oldest first.
    ///
    /// Each stored frame is rewritten in place with a good checksum flag and
    /// the currently awaited acknowledgment, then copied out for sending.
    pub fn prepare_retransmission(&mut self) -> Vec<(u32, Vec<u8>)> {
        let awaited = self.awaited_ack();
        let mut frames = Vec::with_capacity(self.in_flight() as usize);
        for seq in self.outstanding() {
            let index = self.slot_for(seq);
            match self.slots[index].as_mut() {
                Some(bytes) => {
                    frame::set_checksum(bytes, ChecksumFlag::Good);
                    frame::set_ack_number(bytes, awaited);
                    frames.push((seq, bytes.clone()));
                }
                None => log::warn!("[window] slot {index} empty for outstanding seq={seq}"),
            }
        }
        frames
    }
}

// ---------------------------------------------------------------------------
// Shared window
// ---------------------------------------------------------------------------

/// One [`SendWindow`] shared by the sender task and the acknowledgment task.
///
/// Cloning is cheap; all clones refer to the same window.
#[derive(Debug, Clone)]
pub struct SharedWindow {
    inner: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    window: Mutex<SendWindow>,
    room: Notify,
    done_reading: AtomicBool,
}

impl SharedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                window: Mutex::new(SendWindow::new(capacity)),
                room: Notify::new(),
                done_reading: AtomicBool::new(false),
            }),
        }
    }

    /// Enter the critical section.
    ///
    /// Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, SendWindow> {
        // Every critical section leaves the window consistent, so a panic in
        // another holder does not invalidate it.
        self.inner
            .window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the sender task after the window slid forward.
    pub fn notify_room(&self) {
        self.inner.room.notify_one();
    }

    /// Resolve once the window can admit another frame.
    ///
    /// Blocks on the room notification; a non-zero `recheck` bounds each
    /// wait before the capacity is looked at again.
    pub async fn wait_for_room(&self, recheck: Duration) {
        loop {
            if self.lock().has_capacity() {
                return;
            }
            let notified = self.inner.room.notified();
            if recheck.is_zero() {
                notified.await;
            } else {
                let _ = tokio::time::timeout(recheck, notified).await;
            }
        }
    }

    /// Record that the source is exhausted.
    pub fn mark_done_reading(&self) {
        self.inner.done_reading.store(true, Ordering::Release);
    }

    pub fn done_reading(&self) -> bool {
        self.inner.done_reading.load(Ordering::Acquire)
    }
}
