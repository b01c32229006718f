//! VNC Tight encoding implementation.
//!
//! Tight rectangles come in three flavours:
//! - Solid fill (one pixel for the whole rectangle)
//! - JPEG (a baseline JPEG image, decoded to RGB and repacked)
//! - Basic: optionally filtered pixel data, zlib-compressed on one of four
//!   persistent streams unless the payload is tiny
//!
//! Filters for basic rectangles are copy, palette (1-bit bitmap for two
//! colours, byte indices otherwise) and gradient prediction.

use super::common::{expand_bitmap, inflate_into, read_compact_length, ZLIB_BUFFER_SIZE};
use super::{Decoder, UpdateContext};
use crate::display::Display;
use crate::error::{Result, VncError};
use crate::jpeg;
use crate::protocol::Rectangle;
use crate::surface::Surface;
use crate::translate::PixelCodec;
use flate2::Decompress;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite};

// Tight encoding protocol constants (from libvncserver rfbproto.h)
const TIGHT_EXPLICIT_FILTER: u8 = 0x04;
const TIGHT_FILL: u8 = 0x08;
const TIGHT_JPEG: u8 = 0x09;
const TIGHT_MAX_SUBENCODING: u8 = 0x09;

// Filter types
const TIGHT_FILTER_COPY: u8 = 0x00;
const TIGHT_FILTER_PALETTE: u8 = 0x01;
const TIGHT_FILTER_GRADIENT: u8 = 0x02;

/// Number of independent zlib streams.
pub const TIGHT_STREAMS: usize = 4;

/// Payloads smaller than this are sent uncompressed.
pub const TIGHT_MIN_TO_COMPRESS: usize = 12;

/// Inflated bytes held before complete rows are drawn.
const TIGHT_BUFFER_SIZE: usize = 8192;

/// How the pixel data of a basic rectangle was transformed by the server.
enum TightFilter {
    Copy,
    Palette { count: usize, entries: Vec<u8> },
    Gradient { prev_row: Vec<u16> },
}

impl TightFilter {
    /// Bits each pixel occupies in the (inflated) data stream.
    fn bits_per_pixel(&self, bpp: usize) -> usize {
        match self {
            Self::Palette { count: 2, .. } => 1,
            Self::Palette { .. } => 8,
            Self::Copy | Self::Gradient { .. } => bpp * 8,
        }
    }

    /// Turns `rows` rows of filtered data into packed client pixels.
    fn apply(
        &mut self,
        codec: &PixelCodec,
        data: &[u8],
        width: usize,
        rows: usize,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let bpp = codec.bytes_per_pixel();
        out.clear();
        match self {
            Self::Copy => out.extend_from_slice(&data[..width * rows * bpp]),
            Self::Palette { count, entries } => {
                let indices = if *count == 2 {
                    expand_bitmap(data, width, rows)
                } else {
                    data[..width * rows].to_vec()
                };
                for idx in indices {
                    let idx = usize::from(idx);
                    if idx >= *count {
                        return Err(VncError::protocol(format!(
                            "Tight palette index {idx} out of {count} colours"
                        )));
                    }
                    out.extend_from_slice(&entries[idx * bpp..(idx + 1) * bpp]);
                }
            }
            Self::Gradient { prev_row } => {
                gradient_rows(codec, prev_row, &data[..width * rows * bpp], width, out);
            }
        }
        Ok(())
    }
}

/// Undoes gradient prediction for whole rows.
///
/// Each channel is predicted from the pixels left, above and above-left
/// (clamped to the channel range) and the wire value is added modulo the
/// channel size. `prev_row` holds the previous row's channels, three per
/// pixel, and is updated as rows complete.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)] // Clamped to 0..=max
fn gradient_rows(codec: &PixelCodec, prev_row: &mut [u16], data: &[u8], width: usize, out: &mut Vec<u8>) {
    let bpp = codec.bytes_per_pixel();
    let maxes = codec.format().maxes();
    let shifts = codec.format().shifts();
    let mut this_row = vec![0u16; width * 3];
    let mut pixel = vec![0u8; bpp];

    for row in data.chunks(width * bpp) {
        let mut pix = [0u16; 3];
        for x in 0..width {
            let raw = codec.read_raw(&row[x * bpp..(x + 1) * bpp]);
            for c in 0..3 {
                let max = i32::from(maxes[c]);
                let delta = ((raw >> shifts[c]) as i32) & max;
                let est = if x == 0 {
                    i32::from(prev_row[c])
                } else {
                    (i32::from(prev_row[x * 3 + c]) + i32::from(pix[c])
                        - i32::from(prev_row[(x - 1) * 3 + c]))
                    .clamp(0, max)
                };
                pix[c] = ((delta + est) & max) as u16;
                this_row[x * 3 + c] = pix[c];
            }
            let value = (u32::from(pix[0]) << shifts[0])
                | (u32::from(pix[1]) << shifts[1])
                | (u32::from(pix[2]) << shifts[2]);
            codec.write_raw(value, &mut pixel);
            out.extend_from_slice(&pixel);
        }
        prev_row.copy_from_slice(&this_row);
    }
}

/// Decodes the VNC "Tight" encoding.
///
/// Holds the four zlib streams, which live for the whole session unless the
/// server resets them through the control byte.
#[derive(Default)]
pub struct TightDecoder {
    streams: [Option<Decompress>; TIGHT_STREAMS],
}

impl TightDecoder {
    /// Creates a decoder with all streams closed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether stream `id` has been opened and not reset since.
    #[must_use]
    pub fn is_stream_active(&self, id: usize) -> bool {
        self.streams.get(id).is_some_and(Option::is_some)
    }

    async fn decode_jpeg<S, O>(rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let len = read_compact_length(ctx).await?;
        if len == 0 {
            return Err(VncError::protocol("Tight JPEG rectangle with zero length"));
        }
        let data = ctx.read_vec(len).await?;
        let image = jpeg::decode_rgb(&data)?;
        if image.width != u32::from(rect.width) || image.height != u32::from(rect.height) {
            return Err(VncError::protocol(format!(
                "Tight JPEG is {}x{}, rectangle is {}x{}",
                image.width, image.height, rect.width, rect.height
            )));
        }
        trace!("Tight JPEG {}x{} ({len} bytes)", rect.width, rect.height);

        let display = ctx.display();
        let bpp = display.codec().bytes_per_pixel();
        let mut row = vec![0u8; usize::from(rect.width) * bpp];
        for (dy, rgb_row) in (0..rect.height).zip(image.data.chunks(usize::from(rect.width) * 3)) {
            for (rgb, out) in rgb_row.chunks(3).zip(row.chunks_mut(bpp)) {
                display.codec().encode_into(rgb[0], rgb[1], rgb[2], out);
            }
            display.write_rect(rect.x, rect.y.saturating_add(dy), rect.width, 1, &row);
        }
        Ok(())
    }
}

/// Draws `rows` rows of filtered data starting `row` rows into `rect`.
fn draw_rows<O: Surface>(
    display: &mut Display<O>,
    filter: &mut TightFilter,
    rect: &Rectangle,
    row: usize,
    rows: usize,
    data: &[u8],
    scratch: &mut Vec<u8>,
) -> Result<()> {
    filter.apply(display.codec(), data, usize::from(rect.width), rows, scratch)?;
    #[allow(clippy::cast_possible_truncation)] // Row counts never exceed the u16 height
    let (row, rows) = (row as u16, rows as u16);
    display.write_rect(rect.x, rect.y.saturating_add(row), rect.width, rows, scratch);
    Ok(())
}

impl Decoder for TightDecoder {
    #[allow(clippy::too_many_lines)]
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let ctl = ctx.read_u8().await?;
        for (id, stream) in self.streams.iter_mut().enumerate() {
            if ctl & (1 << id) != 0 && stream.take().is_some() {
                debug!("Tight stream {id} reset by server");
            }
        }

        let comp = ctl >> 4;
        if comp == TIGHT_FILL {
            let pixel = ctx.read_pixel().await?;
            return ctx
                .display()
                .fill_rect(rect.x, rect.y, rect.width, rect.height, &pixel);
        }
        if comp == TIGHT_JPEG {
            return Self::decode_jpeg(rect, ctx).await;
        }
        if comp > TIGHT_MAX_SUBENCODING {
            return Err(VncError::protocol(format!("bad Tight subencoding {comp}")));
        }

        let bpp = ctx.bytes_per_pixel();
        let filter_id = if comp & TIGHT_EXPLICIT_FILTER != 0 {
            ctx.read_u8().await?
        } else {
            TIGHT_FILTER_COPY
        };
        let mut filter = match filter_id {
            TIGHT_FILTER_COPY => TightFilter::Copy,
            TIGHT_FILTER_PALETTE => {
                let count = usize::from(ctx.read_u8().await?) + 1;
                let entries = ctx.read_vec(count * bpp).await?;
                TightFilter::Palette { count, entries }
            }
            TIGHT_FILTER_GRADIENT => {
                if !ctx.display().codec().format().is_true_colour() {
                    return Err(VncError::protocol("Tight gradient filter needs true colour"));
                }
                TightFilter::Gradient {
                    prev_row: vec![0; usize::from(rect.width) * 3],
                }
            }
            other => return Err(VncError::protocol(format!("unknown Tight filter {other}"))),
        };

        let width = usize::from(rect.width);
        let height = usize::from(rect.height);
        let row_size = (width * filter.bits_per_pixel(bpp)).div_ceil(8);
        let mut scratch = Vec::new();

        if row_size * height < TIGHT_MIN_TO_COMPRESS {
            let data = ctx.read_vec(row_size * height).await?;
            if height > 0 {
                draw_rows(ctx.display(), &mut filter, rect, 0, height, &data, &mut scratch)?;
            }
            return Ok(());
        }

        let len = read_compact_length(ctx).await?;
        if len == 0 {
            return Err(VncError::protocol("Tight compressed data with zero length"));
        }
        let stream_id = usize::from(comp & 0x03);
        let stream = self.streams[stream_id].get_or_insert_with(|| {
            debug!("Opening Tight stream {stream_id}");
            Decompress::new(true)
        });
        trace!(
            "Tight {}x{} stream {stream_id} filter {filter_id}: {len} compressed bytes",
            rect.width,
            rect.height
        );

        let mut chunk = [0u8; ZLIB_BUFFER_SIZE];
        let mut out = vec![0u8; TIGHT_BUFFER_SIZE.max(row_size)];
        let mut out_len = 0;
        let mut rows_done = 0;
        let mut remaining = len;

        while remaining > 0 {
            let n = remaining.min(ZLIB_BUFFER_SIZE);
            ctx.read_exact(&mut chunk[..n]).await?;
            remaining -= n;

            let mut input = &chunk[..n];
            loop {
                let (used, made) = inflate_into(stream, input, &mut out[out_len..])?;
                input = &input[used..];
                out_len += made;

                let rows = (out_len / row_size).min(height - rows_done);
                if rows > 0 {
                    draw_rows(
                        ctx.display(),
                        &mut filter,
                        rect,
                        rows_done,
                        rows,
                        &out[..rows * row_size],
                        &mut scratch,
                    )?;
                    rows_done += rows;
                    out.copy_within(rows * row_size..out_len, 0);
                    out_len -= rows * row_size;
                }
                if rows_done == height && out_len > 0 {
                    return Err(VncError::protocol("Tight data overflows the rectangle"));
                }
                if used == 0 && made == 0 {
                    break;
                }
            }
        }

        if rows_done != height || out_len != 0 {
            return Err(VncError::protocol(format!(
                "Tight data ended after {rows_done} of {height} rows"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::testing::{decode_with, px, rect};
    use crate::protocol::ENCODING_TIGHT;
    use crate::surface::recording::Op;
    use flate2::{Compress, Compression, FlushCompress};

    fn deflate(stream: &mut Compress, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; data.len() + 64];
        let before = stream.total_out();
        stream.compress(data, &mut out, FlushCompress::Sync).unwrap();
        out.truncate((stream.total_out() - before) as usize);
        out
    }

    fn pixels(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| px(*v)).collect()
    }

    #[tokio::test]
    async fn test_fill() {
        let mut wire = vec![TIGHT_FILL << 4];
        wire.extend_from_slice(&px(0xF800));
        let surface = decode_with(&mut TightDecoder::new(), rect(1, 1, 3, 2, ENCODING_TIGHT), &wire, (8, 8))
            .await
            .unwrap();
        assert_eq!(
            surface.draws(),
            vec![&Op::Fill { x: 1, y: 1, w: 3, h: 2, rgb: (248, 0, 0) }]
        );
    }

    #[tokio::test]
    async fn test_two_colour_palette_uncompressed() {
        // 4x2 mono bitmap: 1 byte per row, below the compression threshold.
        let mut wire = vec![TIGHT_EXPLICIT_FILTER << 4, TIGHT_FILTER_PALETTE, 1];
        wire.extend_from_slice(&pixels(&[0x0000, 0xFFFF]));
        wire.extend_from_slice(&[0b1010_0000, 0b0101_0000]);
        let surface = decode_with(&mut TightDecoder::new(), rect(0, 0, 4, 2, ENCODING_TIGHT), &wire, (4, 2))
            .await
            .unwrap();
        let white = Some((248, 252, 248));
        let black = Some((0, 0, 0));
        assert_eq!(surface.fb.rgb_at(0, 0), white);
        assert_eq!(surface.fb.rgb_at(1, 0), black);
        assert_eq!(surface.fb.rgb_at(2, 0), white);
        assert_eq!(surface.fb.rgb_at(0, 1), black);
        assert_eq!(surface.fb.rgb_at(3, 1), white);
    }

    #[tokio::test]
    async fn test_single_colour_palette() {
        let mut wire = vec![TIGHT_EXPLICIT_FILTER << 4, TIGHT_FILTER_PALETTE, 0];
        wire.extend_from_slice(&px(0x001F));
        wire.extend_from_slice(&[0, 0]);
        let surface = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 1, ENCODING_TIGHT), &wire, (2, 1))
            .await
            .unwrap();
        assert_eq!(surface.fb.rgb_at(1, 0), Some((0, 0, 248)));
    }

    #[tokio::test]
    async fn test_palette_index_out_of_range() {
        let mut wire = vec![TIGHT_EXPLICIT_FILTER << 4, TIGHT_FILTER_PALETTE, 2];
        wire.extend_from_slice(&pixels(&[0x0000, 0x001F, 0xF800]));
        wire.extend_from_slice(&[0, 3]);
        let err = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 1, ENCODING_TIGHT), &wire, (2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_gradient_prediction() {
        // First pixel is taken as is (the row above is zero); the second is
        // predicted from its left neighbour, so its channels double.
        let mut wire = vec![TIGHT_EXPLICIT_FILTER << 4, TIGHT_FILTER_GRADIENT];
        wire.extend_from_slice(&pixels(&[0x0841, 0x0841]));
        let surface = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 1, ENCODING_TIGHT), &wire, (2, 1))
            .await
            .unwrap();
        assert_eq!(surface.fb.pixel(0, 0), Some(&px(0x0841)[..]));
        assert_eq!(surface.fb.pixel(1, 0), Some(&px(0x1082)[..]));
    }

    #[tokio::test]
    async fn test_gradient_rows_clamp_estimate() {
        // 2x2: the second row's first pixel is predicted from above only,
        // the last from above + left - above-left, which clamps at the
        // channel maximum before the delta wraps it to black.
        let mut wire = vec![TIGHT_EXPLICIT_FILTER << 4, TIGHT_FILTER_GRADIENT];
        wire.extend_from_slice(&pixels(&[0x0000, 0xFFFF, 0xFFFF, 0x0821]));
        let surface = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 2, ENCODING_TIGHT), &wire, (2, 2))
            .await
            .unwrap();
        assert_eq!(surface.fb.pixel(0, 0), Some(&px(0x0000)[..]));
        assert_eq!(surface.fb.pixel(1, 0), Some(&px(0xFFFF)[..]));
        assert_eq!(surface.fb.pixel(0, 1), Some(&px(0xFFFF)[..]));
        assert_eq!(surface.fb.pixel(1, 1), Some(&px(0x0000)[..]));
    }

    #[tokio::test]
    async fn test_compressed_four_colour_palette() {
        let colours = [0x0000u16, 0xF800, 0x07E0, 0x001F];
        let indices: Vec<u8> = (0..16u8).map(|i| (i % 4 + i / 4) % 4).collect();
        let mut compressor = Compress::new(Compression::default(), true);
        let compressed = deflate(&mut compressor, &indices);
        assert!(compressed.len() < 128);

        // Stream 2, explicit palette filter, 4 entries, one byte per index.
        let mut wire = vec![(TIGHT_EXPLICIT_FILTER | 0x02) << 4, TIGHT_FILTER_PALETTE, 3];
        wire.extend_from_slice(&pixels(&colours));
        wire.push(compressed.len() as u8);
        wire.extend_from_slice(&compressed);
        let mut decoder = TightDecoder::new();
        let surface = decode_with(&mut decoder, rect(0, 0, 4, 4, ENCODING_TIGHT), &wire, (4, 4))
            .await
            .unwrap();
        assert!(decoder.is_stream_active(2));
        for y in 0..4u16 {
            for x in 0..4u16 {
                let expected = colours[usize::from((x + y) % 4)];
                assert_eq!(surface.fb.pixel(x, y), Some(&px(expected)[..]), "pixel ({x},{y})");
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_filter_rejected() {
        let wire = [TIGHT_EXPLICIT_FILTER << 4, 7];
        let err = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 1, ENCODING_TIGHT), &wire, (2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_bad_subencoding_rejected() {
        let err = decode_with(&mut TightDecoder::new(), rect(0, 0, 2, 1, ENCODING_TIGHT), &[0xA0], (2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_compressed_copy_and_stream_reset() {
        let raw: Vec<u16> = (0..8).map(|i| 0x0800 * i).collect();
        let mut compressor = Compress::new(Compression::default(), true);
        let compressed = deflate(&mut compressor, &pixels(&raw));
        assert!(compressed.len() < 128);

        let mut wire = vec![0x00, compressed.len() as u8];
        wire.extend_from_slice(&compressed);
        let mut decoder = TightDecoder::new();
        let surface = decode_with(&mut decoder, rect(0, 0, 4, 2, ENCODING_TIGHT), &wire, (4, 2))
            .await
            .unwrap();
        assert!(decoder.is_stream_active(0));
        assert!(!decoder.is_stream_active(1));
        assert_eq!(surface.fb.pixel(3, 1), Some(&px(0x3800)[..]));

        // Resetting an idle stream is a no-op; resetting stream 0 closes it.
        let mut wire = vec![(TIGHT_FILL << 4) | 0x03];
        wire.extend_from_slice(&px(0));
        decode_with(&mut decoder, rect(0, 0, 1, 1, ENCODING_TIGHT), &wire, (1, 1))
            .await
            .unwrap();
        assert!(!decoder.is_stream_active(0));

        // The server restarts its side too: a fresh zlib stream, header and all.
        let mut compressor = Compress::new(Compression::default(), true);
        let compressed = deflate(&mut compressor, &pixels(&[0x07E0; 8]));
        let mut wire = vec![0x00, compressed.len() as u8];
        wire.extend_from_slice(&compressed);
        let surface = decode_with(&mut decoder, rect(0, 0, 4, 2, ENCODING_TIGHT), &wire, (4, 2))
            .await
            .unwrap();
        assert!(decoder.is_stream_active(0));
        assert_eq!(surface.fb.pixel(0, 0), Some(&px(0x07E0)[..]));
        assert_eq!(surface.fb.pixel(3, 1), Some(&px(0x07E0)[..]));
    }

    #[tokio::test]
    async fn test_stream_persists_across_rectangles() {
        let mut compressor = Compress::new(Compression::default(), true);
        let mut decoder = TightDecoder::new();
        for value in [0x1111u16, 0x2222] {
            let compressed = deflate(&mut compressor, &pixels(&[value; 8]));
            let mut wire = vec![0x10, compressed.len() as u8];
            wire.extend_from_slice(&compressed);
            let surface = decode_with(&mut decoder, rect(0, 0, 8, 1, ENCODING_TIGHT), &wire, (8, 1))
                .await
                .unwrap();
            assert_eq!(surface.fb.pixel(7, 0), Some(&px(value)[..]));
        }
        assert!(decoder.is_stream_active(1));
    }

    #[tokio::test]
    async fn test_short_compressed_data_rejected() {
        let mut compressor = Compress::new(Compression::default(), true);
        let compressed = deflate(&mut compressor, &pixels(&[0x1234; 4]));
        let mut wire = vec![0x00, compressed.len() as u8];
        wire.extend_from_slice(&compressed);
        let err = decode_with(&mut TightDecoder::new(), rect(0, 0, 4, 2, ENCODING_TIGHT), &wire, (4, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_jpeg_size_mismatch() {
        use image::codecs::jpeg::JpegEncoder;
        let mut jpeg_data = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg_data, 90)
            .encode(&[255u8; 2 * 2 * 3], 2, 2, image::ExtendedColorType::Rgb8)
            .unwrap();
        assert!(jpeg_data.len() < 16384);
        let len = jpeg_data.len();
        let mut wire = vec![TIGHT_JPEG << 4, (len & 0x7F) as u8 | 0x80, (len >> 7) as u8];
        wire.extend_from_slice(&jpeg_data);
        let err = decode_with(&mut TightDecoder::new(), rect(0, 0, 4, 4, ENCODING_TIGHT), &wire, (4, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_jpeg_rows_repacked() {
        use image::codecs::jpeg::JpegEncoder;
        let red: Vec<u8> = [255u8, 0, 0].repeat(8 * 8);
        let mut jpeg_data = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg_data, 95)
            .encode(&red, 8, 8, image::ExtendedColorType::Rgb8)
            .unwrap();
        assert!(jpeg_data.len() < 16384);
        let len = jpeg_data.len();
        let mut wire = vec![TIGHT_JPEG << 4, (len & 0x7F) as u8 | 0x80, (len >> 7) as u8];
        wire.extend_from_slice(&jpeg_data);
        let surface = decode_with(&mut TightDecoder::new(), rect(0, 0, 8, 8, ENCODING_TIGHT), &wire, (8, 8))
            .await
            .unwrap();
        assert_eq!(surface.draws().len(), 8);
        let (r, g, b) = surface.fb.rgb_at(4, 4).unwrap();
        assert!(r > 200 && g < 40 && b < 40, "got {r},{g},{b}");
    }
}
