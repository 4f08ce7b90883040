//! Unreliable datagram channel.
//!
//! The protocol engine talks to the network only through
//! [`DatagramChannel`]: send a datagram to an address, or wait (optionally
//! bounded by a timeout) for the next inbound one.  [`UdpChannel`] is the
//! production implementation, a thin wrapper around `tokio::net::UdpSocket`;
//! [`crate::simulator::MemoryChannel`] is the in-process one used by tests.
//!
//! The trait returns boxed futures so it stays object safe and every task
//! can hold an `Arc<dyn DatagramChannel>`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::frame::DEFAULT_BUFFER_SIZE;

/// Errors that can arise from channel operations.
///
/// A receive timeout is not an error; see [`Incoming::TimedOut`].
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("channel closed by peer")]
    Closed,
}

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

/// Outcome of a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Datagram(Datagram),
    TimedOut,
}

pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// A datagram transport that may lose, delay, or reorder units.
pub trait DatagramChannel: Send + Sync {
    /// Send `bytes` as one datagram to `dest`.
    fn send_to<'a>(&'a self, bytes: &'a [u8], dest: SocketAddr) -> ChannelFuture<'a, ()>;

    /// Wait for the next datagram.
    ///
    /// `None` blocks indefinitely; `Some(d)` yields [`Incoming::TimedOut`]
    /// when nothing arrives within `d`.
    fn recv_timeout(&self, timeout: Option<Duration>) -> ChannelFuture<'_, Incoming>;

    /// Address this endpoint is reachable at.
    fn local_addr(&self) -> SocketAddr;
}

/// A UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct UdpChannel {
    inner: UdpSocket,
    local_addr: SocketAddr,
    buffer_size: usize,
}

impl UdpChannel {
    /// Bind a new socket to `local_addr` with the default receive buffer.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, ChannelError> {
        Self::bind_with_buffer(local_addr, DEFAULT_BUFFER_SIZE).await
    }

    /// Bind with a receive buffer of `buffer_size` bytes.  Longer datagrams
    /// are truncated.
    pub async fn bind_with_buffer(
        local_addr: SocketAddr,
        buffer_size: usize,
    ) -> Result<Self, ChannelError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            inner,
            local_addr,
            buffer_size,
        })
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to<'a>(&'a self, bytes: &'a [u8], dest: SocketAddr) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            self.inner.send_to(bytes, dest).await?;
            Ok(())
        })
    }

    fn recv_timeout(&self, timeout: Option<Duration>) -> ChannelFuture<'_, Incoming> {
        Box::pin(async move {
            let mut buf = vec![0u8; self.buffer_size];
            let received = match timeout {
                Some(limit) => match tokio::time::timeout(limit, self.inner.recv_from(&mut buf)).await {
                    Ok(result) => result?,
                    Err(_elapsed) => return Ok(Incoming::TimedOut),
                },
                None => self.inner.recv_from(&mut buf).await?,
            };
            let (n, from) = received;
            buf.truncate(n);
            Ok(Incoming::Datagram(Datagram { bytes: buf, from }))
        })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback() -> UdpChannel {
        UdpChannel::bind("127.0.0.1:0".parse().unwrap())
            .await
            .expect("bind failed")
    }

    #[tokio::test]
    async fn send_and_receive_one_datagram() {
        let a = loopback().await;
        let b = loopback().await;

        a.send_to(b"frame", b.local_addr()).await.unwrap();
        let got = b.recv_timeout(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(
            got,
            Incoming::Datagram(Datagram {
                bytes: b"frame".to_vec(),
                from: a.local_addr(),
            })
        );
    }

    #[tokio::test]
    async fn silence_times_out() {
        let a = loopback().await;
        let got = a.recv_timeout(Some(Duration::from_millis(20))).await.unwrap();
        assert_eq!(got, Incoming::TimedOut);
    }

    #[tokio::test]
    async fn oversized_datagram_is_truncated() {
        let a = loopback().await;
        let b = UdpChannel::bind_with_buffer("127.0.0.1:0".parse().unwrap(), 4)
            .await
            .unwrap();

        a.send_to(b"abcdefgh", b.local_addr()).await.unwrap();
        match b.recv_timeout(Some(Duration::from_secs(5))).await.unwrap() {
            Incoming::Datagram(d) => assert_eq!(d.bytes, b"abcd"),
            Incoming::TimedOut => panic!("datagram never arrived"),
        }
    }
}
