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


//! Common helper functions shared across multiple VNC decoders.

use super::UpdateContext;
use crate::error::{Result, VncError};
use crate::surface::Surface;
use flate2::{Decompress, FlushDecompress};
use tokio::io::{AsyncRead, AsyncWrite};

/// Compressed bytes read from the socket per inflate step.
pub const ZLIB_BUFFER_SIZE: usize = 512;

/// Reads a Tight compact length: 1 to 3 bytes, 7 bits each with the high
/// bit flagging continuation, the third byte contributing a full 8 bits.
///
/// # Errors
///
/// Returns an error on a short read.
pub async fn read_compact_length<S, O>(ctx: &mut UpdateContext<'_, S, O>) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
    O: Surface,
{
    let b = ctx.read_u8().await?;
    let mut len = usize::from(b & 0x7F);
    if b & 0x80 != 0 {
        let b = ctx.read_u8().await?;
        len |= usize::from(b & 0x7F) << 7;
        if b & 0x80 != 0 {
            let b = ctx.read_u8().await?;
            len |= usize::from(b) << 14;
        }
    }
    Ok(len)
}

/// Expands a 1-bit-per-pixel bitmap to one byte (0 or 1) per pixel.
///
/// Bits are read MSB first and every row starts on a byte boundary.
#[must_use]
pub fn expand_bitmap(bits: &[u8], width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width.div_ceil(8);
    let mut out = Vec::with_capacity(width * height);
    for row in bits.chunks(row_bytes).take(height) {
        for x in 0..width {
            let byte = row.get(x / 8).copied().unwrap_or(0);
            out.push((byte >> (7 - (x % 8))) & 1);
        }
    }
    out
}

/// Inflates as much of `input` as fits into `out`.
///
/// Returns `(consumed, produced)`. Stops when the input is used up, the
/// output is full, or the stream makes no further progress.
///
/// # Errors
///
/// Returns [`VncError::Encoding`] if the compressed data is corrupt.
#[allow(clippy::cast_possible_truncation)] // Per-call deltas are bounded by the slice lengths
pub fn inflate_into(stream: &mut Decompress, input: &[u8], out: &mut [u8]) -> Result<(usize, usize)> {
    let mut consumed = 0;
    let mut produced = 0;
    loop {
        let before_in = stream.total_in();
        let before_out = stream.total_out();
        stream
            .decompress(&input[consumed..], &mut out[produced..], FlushDecompress::Sync)
            .map_err(|e| VncError::Encoding(format!("inflate failed: {e}")))?;
        let used = (stream.total_in() - before_in) as usize;
        let made = (stream.total_out() - before_out) as usize;
        consumed += used;
        produced += made;
        if (used == 0 && made == 0) || consumed == input.len() || produced == out.len() {
            return Ok((consumed, produced));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compress, Compression, FlushCompress};

    #[test]
    fn test_expand_bitmap_msb_first() {
        assert_eq!(expand_bitmap(&[0b1011_0000], 8, 1), vec![1, 0, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_expand_bitmap_padded_rows() {
        // 3 pixels wide: each row uses the top 3 bits of its own byte.
        let bits = [0b1010_0000, 0b0110_0000];
        assert_eq!(expand_bitmap(&bits, 3, 2), vec![1, 0, 1, 0, 1, 1]);
    }

    #[test]
    fn test_inflate_into_sync_flushed_chunks() {
        let mut compressor = Compress::new(Compression::default(), true);
        let mut wire = vec![0u8; 256];
        compressor
            .compress(b"hello hello hello", &mut wire, FlushCompress::Sync)
            .unwrap();
        wire.truncate(compressor.total_out() as usize);

        let mut stream = Decompress::new(true);
        let mut out = [0u8; 64];
        let (consumed, produced) = inflate_into(&mut stream, &wire, &mut out).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(&out[..produced], b"hello hello hello");
    }

    #[test]
    fn test_inflate_into_rejects_garbage() {
        let mut stream = Decompress::new(true);
        let mut out = [0u8; 16];
        assert!(inflate_into(&mut stream, &[0xFF, 0xFF, 0xFF, 0xFF], &mut out).is_err());
    }
}
