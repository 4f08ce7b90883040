//! `gbn-transfer`: reliable one-way file transfer over UDP using Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!   source ──▶ SenderTask ──── data frames ────▶ ReceiverEndpoint ──▶ sink
//!                  │                                   │
//!             SharedWindow                             │
//!                  │                                   │
//!               AckTask ◀──────── ack frames ──────────┘
//!         (timeout: resend window)
//!
//!  both ends: FaultInjector (simulated loss / corruption)
//!             DatagramChannel (UDP socket or in-memory pair)
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]     wire format (encode / decode, header rewrites)
//! - [`fault`]     loss and corruption decisions
//! - [`window`]    send window and its shared, synchronised wrapper
//! - [`sender`]    reads the source and sends new frames
//! - [`ack`]       consumes acks, retransmits on timeout
//! - [`receiver`]  in-order acceptance and acknowledgment
//! - [`session`]   spawns and joins the tasks of one endpoint
//! - [`socket`]    datagram channel abstraction over tokio UDP
//! - [`simulator`] in-memory channel pair for deterministic tests
//! - [`config`]    transfer parameters and config-file loading

pub mod ack;
pub mod config;
pub mod fault;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod window;

pub use config::Config;
pub use session::{run_receiver_session, run_sender_session, SenderSession, SessionError, TransferSummary};
