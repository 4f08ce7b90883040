//! Whole-transfer entry points.
//!
//! A sending endpoint is two tasks sharing one [`SharedWindow`]: the
//! [`SenderTask`] frames the source, the [`AckTask`] consumes
//! acknowledgments and retransmits.  Both use the same channel.  A receiving
//! endpoint is a single [`ReceiverEndpoint`] loop.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::ack::{AckError, AckReport, AckTask};
use crate::config::{Config, ConfigError};
use crate::fault::FaultInjector;
use crate::receiver::{ReceiverEndpoint, ReceiverError};
use crate::sender::{SendReport, SenderError, SenderTask};
use crate::socket::DatagramChannel;
use crate::window::SharedWindow;

/// Fault streams, one per task, so seeded runs stay reproducible.
const SEND_STREAM: u64 = 0;
const ACK_STREAM: u64 = 1;
const RECEIVE_STREAM: u64 = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("sender task failed: {0}")]
    Sender(#[from] SenderError),
    #[error("acknowledgment task failed: {0}")]
    Ack(#[from] AckError),
    #[error("receiver failed: {0}")]
    Receiver(#[from] ReceiverError),
    #[error("task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a completed sender session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub bytes: u64,
    pub frames: u32,
    pub retransmitted: u32,
}

/// A running sender session.
pub struct SenderSession {
    window: SharedWindow,
    sender: JoinHandle<Result<SendReport, SenderError>>,
    ack: JoinHandle<Result<AckReport, AckError>>,
}

impl SenderSession {
    /// Spawn both sender-side tasks with fault injectors derived from
    /// `config.seed`.
    pub fn start<R>(
        config: &Config,
        source: R,
        channel: Arc<dyn DatagramChannel>,
        dest: SocketAddr,
    ) -> Result<Self, SessionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::start_with(
            config,
            source,
            channel,
            dest,
            FaultInjector::from_seed(config.seed, SEND_STREAM),
            FaultInjector::from_seed(config.seed, ACK_STREAM),
        )
    }

    /// Like [`SenderSession::start`] with explicit fault injectors for the
    /// sender task and the acknowledgment task.
    pub fn start_with<R>(
        config: &Config,
        source: R,
        channel: Arc<dyn DatagramChannel>,
        dest: SocketAddr,
        send_faults: FaultInjector,
        ack_faults: FaultInjector,
    ) -> Result<Self, SessionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        config.validate()?;
        log::info!(
            "[send] session to {dest}: window {}, payload {}, timeout {:?}, cumulative acks {}",
            config.window_size,
            config.max_payload,
            config.timeout,
            config.cumulative_acks
        );

        let window = SharedWindow::new(config.window_size);
        let sender = SenderTask::new(config, window.clone(), source, channel.clone(), dest, send_faults);
        let ack = AckTask::new(config, window.clone(), channel, dest, ack_faults);

        Ok(Self {
            window,
            sender: tokio::spawn(sender.run()),
            ack: tokio::spawn(ack.run()),
        })
    }

    pub fn window(&self) -> &SharedWindow {
        &self.window
    }

    /// Wait for both tasks.  The first failure aborts the other task.
    pub async fn finish(self) -> Result<TransferSummary, SessionError> {
        let sender_abort = self.sender.abort_handle();
        let ack_abort = self.ack.abort_handle();

        match tokio::try_join!(flatten(self.sender), flatten(self.ack)) {
            Ok((sent, acked)) => {
                let summary = TransferSummary {
                    bytes: sent.bytes,
                    frames: sent.frames,
                    retransmitted: acked.retransmitted,
                };
                log::info!(
                    "[send] transfer complete: {} byte(s) in {} frame(s), {} retransmitted",
                    summary.bytes,
                    summary.frames,
                    summary.retransmitted
                );
                Ok(summary)
            }
            Err(e) => {
                sender_abort.abort();
                ack_abort.abort();
                log::error!("[send] session failed: {e}");
                Err(e)
            }
        }
    }
}

async fn flatten<T, E>(handle: JoinHandle<Result<T, E>>) -> Result<T, SessionError>
where
    SessionError: From<E>,
{
    Ok(handle.await??)
}

/// Send all of `source` to `dest`, returning the number of payload bytes
/// transferred.
pub async fn run_sender_session<R>(
    config: &Config,
    source: R,
    channel: Arc<dyn DatagramChannel>,
    dest: SocketAddr,
) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let summary = SenderSession::start(config, source, channel, dest)?.finish().await?;
    Ok(summary.bytes)
}

/// Receive into `sink` until the channel closes or the sink fails.
///
/// Stopping the endpoint otherwise is up to the caller, by dropping this
/// future.
pub async fn run_receiver_session<W>(
    config: &Config,
    sink: W,
    channel: &dyn DatagramChannel,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    config.validate()?;
    let mut endpoint = ReceiverEndpoint::new(
        config,
        sink,
        FaultInjector::from_seed(config.seed, RECEIVE_STREAM),
    );
    endpoint.run(channel).await?;
    Ok(())
}
