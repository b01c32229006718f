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

//! VNC rectangle decoders.
//!
//! Each supported encoding has a [`Decoder`] that reads exactly the bytes its
//! rectangle occupies on the wire and draws the result through the session's
//! [`Display`]. [`Decoders`] owns the per-session state (the Tight and Zlib
//! inflate streams) and dispatches on the rectangle's encoding.

use crate::display::Display;
use crate::error::{Result, VncError};
use crate::protocol::{
    Rectangle, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE, ENCODING_RAW,
    ENCODING_RICH_CURSOR, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZLIB,
};
use crate::surface::Surface;
use crate::transport::Transport;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod common;
pub mod copyrect;
pub mod corre;
pub mod cursor;
pub mod hextile;
pub mod raw;
pub mod rre;
pub mod tight;
pub mod zlib;

// Re-export decoder implementations
pub use copyrect::CopyRectDecoder;
pub use corre::CoRreDecoder;
pub use cursor::RichCursorDecoder;
pub use hextile::HextileDecoder;
pub use raw::RawDecoder;
pub use rre::RreDecoder;
pub use tight::TightDecoder;
pub use zlib::ZlibDecoder;

/// What a decoder reads from and draws to.
pub struct UpdateContext<'a, S, O> {
    transport: &'a mut Transport<S>,
    display: &'a mut Display<O>,
}

impl<'a, S, O> UpdateContext<'a, S, O>
where
    S: AsyncRead + AsyncWrite + Unpin,
    O: Surface,
{
    /// Bundles the transport and display for one rectangle.
    pub fn new(transport: &'a mut Transport<S>, display: &'a mut Display<O>) -> Self {
        Self { transport, display }
    }

    /// The display to draw on.
    pub fn display(&mut self) -> &mut Display<O> {
        self.display
    }

    /// Bytes per pixel of the client format.
    pub fn bytes_per_pixel(&self) -> usize {
        self.display.codec().bytes_per_pixel()
    }

    /// Fills `out` from the connection, servicing input while waiting.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        self.transport.read_exact(out, &mut *self.display).await
    }

    /// Reads `len` bytes into a new vector.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        self.transport.read_vec(len, &mut *self.display).await
    }

    /// Reads one pixel in the client format.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_pixel(&mut self) -> Result<Vec<u8>> {
        let bpp = self.bytes_per_pixel();
        self.read_vec(bpp).await
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_u8(&mut self) -> Result<u8> {
        self.transport.read_u8(&mut *self.display).await
    }

    /// Reads a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_u16(&mut self) -> Result<u16> {
        self.transport.read_u16(&mut *self.display).await
    }

    /// Reads a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns an error on disconnect or socket failure.
    pub async fn read_u32(&mut self) -> Result<u32> {
        self.transport.read_u32(&mut *self.display).await
    }
}

/// Trait implemented by every rectangle decoder.
#[allow(async_fn_in_trait)]
pub trait Decoder {
    /// Consumes one rectangle's payload and draws it.
    ///
    /// # Arguments
    ///
    /// * `rect` - The rectangle header, already read
    /// * `ctx` - Connection and display for this update
    ///
    /// # Errors
    ///
    /// Fails on short reads and on payloads that violate the encoding.
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface;
}

/// All decoders of a session, with their persistent state.
#[derive(Default)]
pub struct Decoders {
    tight: TightDecoder,
    zlib: ZlibDecoder,
}

impl Decoders {
    /// Creates decoders with no inflate streams open yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The Tight decoder and its stream state.
    #[must_use]
    pub fn tight(&self) -> &TightDecoder {
        &self.tight
    }

    /// Decodes one rectangle with the decoder matching its encoding.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::Protocol`] for encodings the client does not
    /// handle, otherwise whatever the decoder reports.
    pub async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        match rect.encoding {
            ENCODING_RAW => RawDecoder.decode(rect, ctx).await,
            ENCODING_COPYRECT => CopyRectDecoder.decode(rect, ctx).await,
            ENCODING_RRE => RreDecoder.decode(rect, ctx).await,
            ENCODING_CORRE => CoRreDecoder.decode(rect, ctx).await,
            ENCODING_HEXTILE => HextileDecoder.decode(rect, ctx).await,
            ENCODING_ZLIB => self.zlib.decode(rect, ctx).await,
            ENCODING_TIGHT => self.tight.decode(rect, ctx).await,
            ENCODING_RICH_CURSOR => RichCursorDecoder.decode(rect, ctx).await,
            other => Err(VncError::protocol(format!(
                "unknown rectangle encoding {other}"
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Runs a decoder against scripted wire bytes.

    use super::*;
    use crate::protocol::PixelFormat;
    use crate::surface::recording::RecordingSurface;
    use tokio_test::io::Builder;

    /// Decodes `rect` from `wire` onto a fresh `size` surface in RGB565.
    pub async fn decode_with<D: Decoder>(
        decoder: &mut D,
        rect: Rectangle,
        wire: &[u8],
        size: (u16, u16),
    ) -> Result<RecordingSurface> {
        let surface = RecordingSurface::new(size.0, size.1, PixelFormat::rgb565());
        let mut display = Display::new(surface, PixelFormat::rgb565(), size);
        let mut builder = Builder::new();
        if !wire.is_empty() {
            builder.read(wire);
        }
        let mut transport = Transport::new(builder.build());
        let mut ctx = UpdateContext::new(&mut transport, &mut display);
        decoder.decode(&rect, &mut ctx).await?;
        assert_eq!(transport.buffered(), 0, "decoder left bytes unread");
        Ok(display.into_surface())
    }

    /// A rectangle header for tests.
    pub fn rect(x: u16, y: u16, width: u16, height: u16, encoding: i32) -> Rectangle {
        Rectangle {
            x,
            y,
            width,
            height,
            encoding,
        }
    }

    /// One RGB565 little-endian pixel.
    pub fn px(value: u16) -> [u8; 2] {
        value.to_le_bytes()
    }

    #[tokio::test]
    async fn test_unknown_encoding_rejected() {
        let mut decoders = Decoders::new();
        let surface = RecordingSurface::new(4, 4, PixelFormat::rgb565());
        let mut display = Display::new(surface, PixelFormat::rgb565(), (4, 4));
        let mut transport = Transport::new(Builder::new().build());
        let mut ctx = UpdateContext::new(&mut transport, &mut display);
        let err = decoders
            .decode(&rect(0, 0, 1, 1, 16), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }
}
