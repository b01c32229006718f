// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Buffered socket transport with an input servicing point.
//!
//! The session runs on a single logical thread. Whenever a read has to wait
//! for the server, the transport waits on local input as well, so keyboard and
//! pointer events keep flowing while a large update trickles in. Input is
//! handled through an [`IdleHook`], which only queues outbound bytes; the
//! transport writes them out itself. A hook therefore never re-enters a read.

use crate::error::{Result, VncError};
use crate::events::InputEvent;
use crate::protocol::ClientMessage;
use bytes::{Buf, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the internal read buffer. Reads at least this large bypass it.
pub const READ_BUFFER_SIZE: usize = 8192;

/// Services local input while the transport waits for server data.
#[allow(async_fn_in_trait)]
pub trait IdleHook {
    /// Waits for the next local input event.
    ///
    /// Must be cancel-safe: the transport drops this future whenever server
    /// data arrives first. Once the input source is exhausted the future
    /// should stay pending forever.
    async fn next_event(&mut self) -> InputEvent;

    /// Handles one input event, appending any client messages to `outbound`.
    fn service(&mut self, event: InputEvent, outbound: &mut BytesMut);
}

/// An [`IdleHook`] with no input source, used before the session is ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl IdleHook for Quiet {
    async fn next_event(&mut self) -> InputEvent {
        std::future::pending().await
    }

    fn service(&mut self, _event: InputEvent, _outbound: &mut BytesMut) {}
}

/// Outcome of one wait on the socket.
enum Step {
    Read(usize),
    Input(InputEvent),
}

/// Buffered reader and writer over a byte stream.
pub struct Transport<S> {
    stream: S,
    buf: BytesMut,
    outbound: BytesMut,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            outbound: BytesMut::new(),
        }
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Number of bytes read from the stream but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Unwraps the transport, discarding any buffered input.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Fills `out` completely from the connection.
    ///
    /// Buffered bytes are consumed first. While the socket has nothing to
    /// offer, local input from `idle` is serviced and flushed.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::ConnectionClosed`] if the server closes the stream
    /// before `out` is full, or [`VncError::Io`] on a socket error.
    pub async fn read_exact<H: IdleHook>(&mut self, out: &mut [u8], idle: &mut H) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if !self.buf.is_empty() {
                let n = self.buf.len().min(out.len() - filled);
                out[filled..filled + n].copy_from_slice(&self.buf[..n]);
                self.buf.advance(n);
                filled += n;
                continue;
            }

            let direct = out.len() - filled >= READ_BUFFER_SIZE;
            let step = if direct {
                let dst = &mut out[filled..];
                tokio::select! {
                    biased;
                    res = self.stream.read(dst) => Step::Read(res?),
                    ev = idle.next_event() => Step::Input(ev),
                }
            } else {
                self.buf.reserve(READ_BUFFER_SIZE);
                tokio::select! {
                    biased;
                    res = self.stream.read_buf(&mut self.buf) => Step::Read(res?),
                    ev = idle.next_event() => Step::Input(ev),
                }
            };

            match step {
                Step::Read(0) => {
                    debug!("Server closed the connection ({filled}/{} bytes read)", out.len());
                    return Err(VncError::ConnectionClosed);
                }
                Step::Read(n) => {
                    if direct {
                        filled += n;
                    }
                }
                Step::Input(event) => {
                    trace!("Servicing input while waiting for data: {event:?}");
                    idle.service(event, &mut self.outbound);
                    self.flush_outbound().await?;
                }
            }
        }

        #[cfg(feature = "debug-logging")]
        trace!("read {} bytes: {}", out.len(), hex_prefix(out));

        Ok(())
    }

    /// Reads exactly `len` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn read_vec<H: IdleHook>(&mut self, len: usize, idle: &mut H) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_exact(&mut out, idle).await?;
        Ok(out)
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn read_u8<H: IdleHook>(&mut self, idle: &mut H) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b, idle).await?;
        Ok(b[0])
    }

    /// Reads a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn read_u16<H: IdleHook>(&mut self, idle: &mut H) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b, idle).await?;
        Ok(u16::from_be_bytes(b))
    }

    /// Reads a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn read_u32<H: IdleHook>(&mut self, idle: &mut H) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b, idle).await?;
        Ok(u32::from_be_bytes(b))
    }

    /// Reads a big-endian `i32`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::read_exact`].
    pub async fn read_i32<H: IdleHook>(&mut self, idle: &mut H) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b, idle).await?;
        Ok(i32::from_be_bytes(b))
    }

    /// Writes all of `data`, retrying partial writes until done.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        #[cfg(feature = "debug-logging")]
        trace!("write {} bytes: {}", data.len(), hex_prefix(data));

        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Serializes and sends one client message.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let mut buf = BytesMut::new();
        msg.write_to(&mut buf);
        self.write_all(&buf).await
    }

    /// Lets `idle` queue messages directly, then flushes them.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Io`] if the socket fails.
    pub async fn service<H: IdleHook>(&mut self, idle: &mut H, event: InputEvent) -> Result<()> {
        idle.service(event, &mut self.outbound);
        self.flush_outbound().await
    }

    async fn flush_outbound(&mut self) -> Result<()> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let pending = self.outbound.split();
        self.write_all(&pending).await
    }
}

/// Formats up to the first 32 bytes of `data` as hex for trace output.
#[cfg(feature = "debug-logging")]
pub(crate) fn hex_prefix(data: &[u8]) -> String {
    let mut s: String = data
        .iter()
        .take(32)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<String>>()
        .join(" ");
    if data.len() > 32 {
        s.push_str(" ...");
    }
    s
}
