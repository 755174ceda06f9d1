//! Where a viewer's packets come from

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::error::{RelayError, Result};
use crate::frame::FrameLayout;

/// What one receive attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One packet's worth of bytes, or fewer if the stream ended mid-packet
    Data(Bytes),
    /// Nothing complete arrived within the receive timeout
    TimedOut,
    /// The peer closed the stream
    Closed,
}

/// Something a viewer can pull packets from, one per tick
pub trait PacketSource: Send {
    fn receive(&mut self) -> impl Future<Output = Delivery> + Send;
}

/// Reads fixed-size frames from a byte stream with a bounded wait
///
/// Bytes that arrive before a timeout are kept for the next call, so a slow
/// packet never shifts the framing of the ones after it.
pub struct StreamPacketSource<R> {
    reader: R,
    pending: BytesMut,
    frame_len: usize,
    timeout: Duration,
    closed: bool,
}

/// Packet source backed by a TCP connection
pub type TcpPacketSource = StreamPacketSource<TcpStream>;

impl<R> StreamPacketSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, layout: FrameLayout, timeout: Duration) -> Self {
        Self {
            reader,
            pending: BytesMut::with_capacity(layout.frame_len() * 2),
            frame_len: layout.frame_len(),
            timeout,
            closed: false,
        }
    }

    /// Bytes held from an unfinished frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn fill_frame(&mut self) -> io::Result<bool> {
        while self.pending.len() < self.frame_len {
            self.pending.reserve(self.frame_len - self.pending.len());
            if self.reader.read_buf(&mut self.pending).await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl StreamPacketSource<TcpStream> {
    /// Connect to a broadcaster
    pub async fn connect(addr: &str, layout: FrameLayout, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RelayError::Connect {
                addr: addr.to_string(),
                message: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        tracing::info!("Connected to {}", addr);
        Ok(Self::new(stream, layout, timeout))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.reader.peer_addr().ok()
    }
}

impl<R> PacketSource for StreamPacketSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn receive(&mut self) -> Delivery {
        if self.closed {
            return Delivery::Closed;
        }

        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.fill_frame()).await {
            Err(_) => Delivery::TimedOut,
            Ok(Ok(true)) => Delivery::Data(self.pending.split_to(self.frame_len).freeze()),
            Ok(Ok(false)) => {
                self.closed = true;
                if self.pending.is_empty() {
                    Delivery::Closed
                } else {
                    // Hand over the torn tail so it surfaces as a decode failure
                    Delivery::Data(self.pending.split().freeze())
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Stream read failed: {}", e);
                self.closed = true;
                Delivery::Closed
            }
        }
    }
}

/// Replays a fixed list of deliveries, then reports the stream closed
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Delivery>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = Delivery>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl PacketSource for ScriptedSource {
    async fn receive(&mut self) -> Delivery {
        self.script.pop_front().unwrap_or(Delivery::Closed)
    }
}
