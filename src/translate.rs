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


//! Pixel conversion between wire samples and 8-bit RGB.
//!
//! After format negotiation the server sends every pixel in the client's
//! format, and the output surface stores that same format. Conversion is
//! therefore only needed at the edges: drawing a cursor (wire pixel to RGB),
//! placing JPEG output (RGB to wire pixel), and the Tight gradient filter
//! (raw sample arithmetic per channel).
//!
//! # Supported Formats
//!
//! - **16bpp**: full decode and encode (RGB565, RGB555 and their big-endian forms)
//! - **8bpp / 32bpp**: raw sample access and encode only; [`PixelCodec::decode`]
//!   reports them as not implemented

use crate::error::{Result, VncError};
use crate::protocol::PixelFormat;

/// Converts between raw pixels in one [`PixelFormat`] and 8-bit RGB.
#[derive(Debug, Clone)]
pub struct PixelCodec {
    format: PixelFormat,
}

impl PixelCodec {
    /// Creates a codec for the given pixel format.
    #[must_use]
    pub fn new(format: PixelFormat) -> Self {
        Self { format }
    }

    /// The format this codec converts.
    #[must_use]
    pub fn format(&self) -> &PixelFormat {
        &self.format
    }

    /// Bytes per pixel of the format.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    /// Reads one raw sample honouring the format's width and endianness.
    ///
    /// `pixel` must hold at least [`Self::bytes_per_pixel`] bytes.
    #[must_use]
    pub fn read_raw(&self, pixel: &[u8]) -> u32 {
        let big = self.format.is_big_endian();
        match self.format.bits_per_pixel {
            8 => u32::from(pixel[0]),
            16 => {
                if big {
                    u32::from(u16::from_be_bytes([pixel[0], pixel[1]]))
                } else {
                    u32::from(u16::from_le_bytes([pixel[0], pixel[1]]))
                }
            }
            24 => {
                if big {
                    u32::from(pixel[0]) << 16 | u32::from(pixel[1]) << 8 | u32::from(pixel[2])
                } else {
                    u32::from(pixel[2]) << 16 | u32::from(pixel[1]) << 8 | u32::from(pixel[0])
                }
            }
            _ => {
                if big {
                    u32::from_be_bytes([pixel[0], pixel[1], pixel[2], pixel[3]])
                } else {
                    u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]])
                }
            }
        }
    }

    /// Writes one raw sample into `out` in the format's width and endianness.
    ///
    /// `out` must hold at least [`Self::bytes_per_pixel`] bytes.
    #[allow(clippy::cast_possible_truncation)] // Samples are truncated to the pixel width on purpose
    pub fn write_raw(&self, value: u32, out: &mut [u8]) {
        let big = self.format.is_big_endian();
        match self.format.bits_per_pixel {
            8 => out[0] = value as u8,
            16 => {
                let bytes = if big {
                    (value as u16).to_be_bytes()
                } else {
                    (value as u16).to_le_bytes()
                };
                out[..2].copy_from_slice(&bytes);
            }
            24 => {
                let bytes = if big {
                    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
                } else {
                    [value as u8, (value >> 8) as u8, (value >> 16) as u8]
                };
                out[..3].copy_from_slice(&bytes);
            }
            _ => {
                let bytes = if big {
                    value.to_be_bytes()
                } else {
                    value.to_le_bytes()
                };
                out[..4].copy_from_slice(&bytes);
            }
        }
    }

    /// Decodes a wire pixel into 8-bit RGB.
    ///
    /// Each channel is `((raw >> shift) & max)` scaled up by shifting left
    /// until its top bit lands on bit 7.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::NotImplemented`] for any depth other than 16 bits
    /// per pixel.
    pub fn decode(&self, pixel: &[u8]) -> Result<(u8, u8, u8)> {
        if self.format.bits_per_pixel != 16 {
            return Err(VncError::NotImplemented(format!(
                "pixel decoding at {} bpp",
                self.format.bits_per_pixel
            )));
        }
        let raw = self.read_raw(pixel);
        let [rs, gs, bs] = self.format.shifts();
        let [rm, gm, bm] = self.format.maxes();
        Ok((
            expand_channel(raw, rs, rm),
            expand_channel(raw, gs, gm),
            expand_channel(raw, bs, bm),
        ))
    }

    /// Packs 8-bit RGB into a raw pixel value of this format.
    ///
    /// Each channel is scaled to `0..=max` with rounding and shifted into place.
    #[must_use]
    pub fn encode(&self, r: u8, g: u8, b: u8) -> u32 {
        let [rs, gs, bs] = self.format.shifts();
        let [rm, gm, bm] = self.format.maxes();
        (downscale_component(r, rm) << rs)
            | (downscale_component(g, gm) << gs)
            | (downscale_component(b, bm) << bs)
    }

    /// Packs 8-bit RGB and writes the resulting pixel into `out`.
    pub fn encode_into(&self, r: u8, g: u8, b: u8, out: &mut [u8]) {
        self.write_raw(self.encode(r, g, b), out);
    }

    /// Packs 8-bit RGB by truncating each channel to its top bits.
    ///
    /// This is the exact inverse of [`Self::decode`]: a pixel decoded and
    /// packed again comes back bit for bit. Surfaces use it for solid fills
    /// so filled pixels match the same pixel sent through Raw.
    #[must_use]
    pub fn pack_exact(&self, r: u8, g: u8, b: u8) -> u32 {
        let [rs, gs, bs] = self.format.shifts();
        let [rm, gm, bm] = self.format.maxes();
        (truncate_channel(r, rm) << rs) | (truncate_channel(g, gm) << gs) | (truncate_channel(b, bm) << bs)
    }

    /// Writes the [`Self::pack_exact`] pixel into `out`.
    pub fn pack_exact_into(&self, r: u8, g: u8, b: u8, out: &mut [u8]) {
        self.write_raw(self.pack_exact(r, g, b), out);
    }
}

/// Number of significant bits in a channel maximum.
#[inline]
#[must_use]
pub fn channel_bits(max: u16) -> u32 {
    16 - max.leading_zeros()
}

/// Extracts one channel and scales it to 8 bits by left-aligning it.
#[inline]
#[allow(clippy::cast_possible_truncation)] // Result is masked to 8 significant bits
fn expand_channel(raw: u32, shift: u8, max: u16) -> u8 {
    let value = (raw >> shift) & u32::from(max);
    let bits = channel_bits(max);
    if bits <= 8 {
        (value << (8 - bits)) as u8
    } else {
        (value >> (bits - 8)) as u8
    }
}

/// Inverse of [`expand_channel`]: keeps the channel's top bits.
#[inline]
fn truncate_channel(value: u8, max: u16) -> u32 {
    let bits = channel_bits(max);
    let value = u32::from(value);
    if bits <= 8 {
        (value >> (8 - bits)) & u32::from(max)
    } else {
        (value << (bits - 8)) & u32::from(max)
    }
}

/// Downscales a color component from 8-bit (0-255) to the format-specific range.
///
/// # Arguments
///
/// * `value` - The component value in 0-255 range
/// * `max` - The maximum value for this component in the destination format
///
/// # Returns
///
/// The downscaled value in 0..=max range, rounded to nearest.
#[inline]
fn downscale_component(value: u8, max: u16) -> u32 {
    (u32::from(value) * u32::from(max) + 127) / 255
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rgb565_red() {
        let codec = PixelCodec::new(PixelFormat::rgb565());
        assert_eq!(codec.decode(&0xF800u16.to_le_bytes()).unwrap(), (248, 0, 0));
        assert_eq!(codec.decode(&0x07E0u16.to_le_bytes()).unwrap(), (0, 252, 0));
        assert_eq!(codec.decode(&0x001Fu16.to_le_bytes()).unwrap(), (0, 0, 248));
    }

    #[test]
    fn test_encode_rgb565() {
        let codec = PixelCodec::new(PixelFormat::rgb565());
        assert_eq!(codec.encode(255, 0, 0), 0xF800);
        assert_eq!(codec.encode(255, 255, 255), 0xFFFF);
        assert_eq!(codec.encode(0, 0, 0), 0);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let codec = PixelCodec::new(PixelFormat::rgb565());
        for raw in 0..=u16::MAX {
            let (r, g, b) = codec.decode(&raw.to_le_bytes()).unwrap();
            let back = codec.encode(r, g, b);
            for (shift, max) in [(11u32, 31u32), (5, 63), (0, 31)] {
                let orig = (u32::from(raw) >> shift) & max;
                let got = (back >> shift) & max;
                assert!(orig.abs_diff(got) <= 1, "raw {raw:#06x}: {orig} vs {got}");
            }
        }
    }

    #[test]
    fn test_pack_exact_inverts_decode() {
        let codec = PixelCodec::new(PixelFormat::rgb565());
        for raw in 0..=u16::MAX {
            let (r, g, b) = codec.decode(&raw.to_le_bytes()).unwrap();
            assert_eq!(codec.pack_exact(r, g, b), u32::from(raw), "raw {raw:#06x}");
        }
        // The rounding encoder does not: 31 -> 248 -> 30.
        assert_eq!(codec.encode(248, 252, 248), 0xF7DE);
    }

    #[test]
    fn test_big_endian_samples() {
        let mut format = PixelFormat::rgb565();
        format.big_endian_flag = 1;
        let codec = PixelCodec::new(format);
        assert_eq!(codec.read_raw(&[0xF8, 0x00]), 0xF800);
        let mut out = [0u8; 2];
        codec.encode_into(255, 0, 0, &mut out);
        assert_eq!(out, [0xF8, 0x00]);
    }

    #[test]
    fn test_decode_other_depths_not_implemented() {
        let codec = PixelCodec::new(PixelFormat::rgb888(24));
        assert!(matches!(
            codec.decode(&[0, 0, 0, 0]),
            Err(VncError::NotImplemented(_))
        ));
        // Raw access still works at 32 bpp.
        let mut out = [0u8; 4];
        codec.encode_into(255, 128, 0, &mut out);
        assert_eq!(codec.read_raw(&out), 0x00FF_8000);
    }

    #[test]
    fn test_channel_bits() {
        assert_eq!(channel_bits(31), 5);
        assert_eq!(channel_bits(63), 6);
        assert_eq!(channel_bits(255), 8);
        assert_eq!(channel_bits(0), 0);
    }
}
