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

//! VNC Zlib encoding implementation.
//!
//! Raw pixel data in the client's pixel format, deflated on a single stream
//! that persists across rectangles for the whole session (RFC 6143).

use super::common::{inflate_into, ZLIB_BUFFER_SIZE};
use super::{Decoder, UpdateContext};
use crate::error::{Result, VncError};
use crate::protocol::Rectangle;
use crate::surface::Surface;
use flate2::Decompress;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite};

/// Decodes the VNC "Zlib" encoding.
///
/// Format: \[length(u32)\]\[zlib data\], inflating to exactly
/// `width * height * bytes_per_pixel` bytes.
#[derive(Default)]
pub struct ZlibDecoder {
    stream: Option<Decompress>,
}

impl ZlibDecoder {
    /// Creates a decoder whose stream opens on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the inflate stream has been opened.
    #[must_use]
    pub fn is_stream_active(&self) -> bool {
        self.stream.is_some()
    }
}

impl Decoder for ZlibDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let len = ctx.read_u32().await? as usize;
        let expected = rect.area() * ctx.bytes_per_pixel();
        trace!("Zlib {}x{}: {len} compressed bytes", rect.width, rect.height);

        let stream = self.stream.get_or_insert_with(|| {
            debug!("Opening Zlib stream");
            Decompress::new(true)
        });

        // One spare byte so that overlong data is caught rather than dropped.
        let mut out = vec![0u8; expected + 1];
        let mut produced = 0;
        let mut chunk = [0u8; ZLIB_BUFFER_SIZE];
        let mut remaining = len;

        while remaining > 0 {
            let n = remaining.min(ZLIB_BUFFER_SIZE);
            ctx.read_exact(&mut chunk[..n]).await?;
            remaining -= n;

            let mut input = &chunk[..n];
            loop {
                let (used, made) = inflate_into(stream, input, &mut out[produced..])?;
                input = &input[used..];
                produced += made;
                if produced > expected {
                    return Err(VncError::protocol(format!(
                        "Zlib data inflates past {expected} bytes"
                    )));
                }
                if used == 0 && made == 0 {
                    break;
                }
            }
        }

        if produced != expected {
            return Err(VncError::protocol(format!(
                "Zlib data inflated to {produced} of {expected} bytes"
            )));
        }
        ctx.display()
            .write_rect(rect.x, rect.y, rect.width, rect.height, &out[..expected]);
        Ok(())
    }
}
