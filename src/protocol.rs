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

//! VNC Remote Framebuffer (RFB) protocol constants and structures, client side.
//!
//! This module provides the wire-level building blocks a viewer needs: the
//! protocol version string, message type tags in both directions, encoding
//! identifiers, security constants for the 3.3 handshake, and the pixel format,
//! server init and rectangle header structures.
//!
//! # Protocol Overview
//!
//! An RFB 3.3 session proceeds through these phases:
//! 1. **Protocol Version** - Server announces its version, the client answers with 3.3
//! 2. **Security** - The server dictates a single 32-bit security type
//! 3. **Initialization** - `ClientInit` (shared flag) then `ServerInit`
//! 4. **Normal Operation** - Update requests and input events out, updates in

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// The RFB protocol version string sent by the client.
///
/// The client always answers with version 3.3, whatever the server offers. The
/// string is exactly 12 bytes including the trailing newline.
pub const PROTOCOL_VERSION: &str = "RFB 003.003\n";

/// Length of a protocol version string on the wire.
pub const PROTOCOL_VERSION_LEN: usize = 12;

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: Client specifies supported encodings, ordered by preference.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: Client requests a framebuffer update.
///
/// The client can request either an incremental update (changes only) or
/// a full refresh of a specified rectangular region.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: Client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: Client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

/// Message type: Client sends cut text (clipboard data).
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data representing screen changes.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: Server sets colour map entries.
///
/// The client only runs in true-colour mode, so the entries are drained and
/// otherwise ignored.
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;

/// Message type: Server sends a bell (beep) notification.
pub const SERVER_MSG_BELL: u8 = 2;

/// Message type: Server sends cut text (clipboard data).
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding Types

/// Encoding type: Raw pixel data.
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Copy Rectangle.
///
/// Instructs the client to copy a rectangular region from one location
/// to another on the screen.
pub const ENCODING_COPYRECT: i32 = 1;

/// Encoding type: Rise-and-Run-length Encoding.
pub const ENCODING_RRE: i32 = 2;

/// Encoding type: Compact RRE, with 8-bit subrectangle geometry.
pub const ENCODING_CORRE: i32 = 4;

/// Encoding type: Hextile.
///
/// Divides rectangles into 16x16 tiles.
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Zlib compressed raw pixels.
pub const ENCODING_ZLIB: i32 = 6;

/// Encoding type: Tight.
///
/// Filtered, zlib-compressed pixel data over four streams, solid fills and
/// embedded JPEG.
pub const ENCODING_TIGHT: i32 = 7;

/// Pseudo-encoding: Rich Cursor.
///
/// Carries the cursor shape; the rectangle position holds the hotspot.
pub const ENCODING_RICH_CURSOR: i32 = -239;

/// Pseudo-encoding: Last Rect.
///
/// Marks the end of a framebuffer update whose rectangle count was unknown
/// to the server when it started sending.
pub const ENCODING_LAST_RECT: i32 = -224;

/// Pseudo-encoding: JPEG Quality Level 0. Levels 1-9 follow consecutively.
pub const ENCODING_QUALITY_LEVEL_0: i32 = -32;

/// Pseudo-encoding: Compression Level 0. Levels 1-9 follow consecutively.
pub const ENCODING_COMPRESS_LEVEL_0: i32 = -256;

/// Maximum number of encodings the client advertises.
pub const MAX_ENCODINGS: usize = 10;

// Hextile subencoding flags

/// Hextile: Raw pixel data for this tile.
pub const HEXTILE_RAW: u8 = 1 << 0;

/// Hextile: Background color is specified.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;

/// Hextile: Foreground color is specified.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;

/// Hextile: Tile contains subrectangles.
pub const HEXTILE_ANY_SUBRECTS: u8 = 1 << 3;

/// Hextile: Subrectangles are colored (not monochrome).
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 1 << 4;

// Security Types (RFB 3.3: a single 32-bit value chosen by the server)

/// Security type: Connection failed, a reason string follows.
pub const SECURITY_TYPE_INVALID: u32 = 0;

/// Security type: None (no authentication).
pub const SECURITY_TYPE_NONE: u32 = 1;

/// Security type: VNC Authentication.
///
/// The server sends a 16-byte challenge, which the client encrypts with
/// the password and returns.
pub const SECURITY_TYPE_VNC_AUTH: u32 = 2;

// Security Results

/// Security result: Authentication successful.
pub const SECURITY_RESULT_OK: u32 = 0;

/// Security result: Authentication failed.
pub const SECURITY_RESULT_FAILED: u32 = 1;

/// Security result: Too many failed attempts.
pub const SECURITY_RESULT_TOO_MANY: u32 = 2;

/// Represents the pixel format of VNC pixel data.
///
/// This struct defines how pixel data is interpreted, including color depth,
/// endianness, and RGB component details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel.
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// Flag indicating if the pixel data is big-endian (1) or little-endian (0).
    pub big_endian_flag: u8,
    /// Flag indicating if the pixel format is true-colour (1) or colormapped (0).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Number of shifts to apply to get the red color component.
    pub red_shift: u8,
    /// Number of shifts to apply to get the green color component.
    pub green_shift: u8,
    /// Number of shifts to apply to get the blue color component.
    pub blue_shift: u8,
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::rgb565()
    }
}

impl PixelFormat {
    /// Creates a 16-bit RGB565 little-endian pixel format.
    ///
    /// RGB565 uses 5 bits for red, 6 bits for green, and 5 bits for blue.
    /// This is the client's default format.
    #[must_use]
    pub fn rgb565() -> Self {
        Self {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 31,   // 5 bits
            green_max: 63, // 6 bits
            blue_max: 31,  // 5 bits
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// Creates a 32-bit true-colour format with 8 bits per channel.
    ///
    /// Requested by clients running at depth 24 or 32. Pixel decoding for this
    /// layout is not implemented, so sessions reject it at configuration time.
    #[must_use]
    pub fn rgb888(depth: u8) -> Self {
        Self {
            bits_per_pixel: 32,
            depth,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Number of bytes one pixel occupies on the wire.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8)
    }

    /// Whether multi-byte samples are big-endian.
    #[must_use]
    pub fn is_big_endian(&self) -> bool {
        self.big_endian_flag != 0
    }

    /// Whether the format carries true colour rather than colour-map indices.
    #[must_use]
    pub fn is_true_colour(&self) -> bool {
        self.true_colour_flag != 0
    }

    /// Channel maxima in red, green, blue order.
    #[must_use]
    pub fn maxes(&self) -> [u16; 3] {
        [self.red_max, self.green_max, self.blue_max]
    }

    /// Channel shifts in red, green, blue order.
    #[must_use]
    pub fn shifts(&self) -> [u8; 3] {
        [self.red_shift, self.green_shift, self.blue_shift]
    }

    /// Writes the pixel format data into a `BytesMut` buffer.
    ///
    /// This function serializes the `PixelFormat` into the 16-byte RFB layout.
    ///
    /// # Arguments
    ///
    /// * `buf` - A mutable reference to the `BytesMut` buffer to write into.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Reads and deserializes a `PixelFormat` from a buffer.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to read from; 16 bytes are consumed.
    ///
    /// # Errors
    ///
    /// Returns `Err(io::Error)` if there are not enough bytes in the buffer
    /// to read a complete `PixelFormat`.
    pub fn from_bytes<B: Buf>(buf: &mut B) -> io::Result<Self> {
        if buf.remaining() < 16 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes for PixelFormat",
            ));
        }

        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian_flag: buf.get_u8(),
            true_colour_flag: buf.get_u8(),
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3);
        Ok(pf)
    }
}

/// Represents the `ServerInit` message received during VNC initialization.
///
/// It provides the client with framebuffer dimensions, the server's native
/// pixel format, and the desktop name.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// The width of the framebuffer in pixels.
    pub framebuffer_width: u16,
    /// The height of the framebuffer in pixels.
    pub framebuffer_height: u16,
    /// The pixel format the server uses natively.
    pub pixel_format: PixelFormat,
    /// The name of the desktop.
    pub name: String,
}

impl ServerInit {
    /// Size of the fixed part of `ServerInit`, up to and including the name length.
    pub const HEADER_LEN: usize = 24;

    /// Parses the fixed header, returning the message without its name and
    /// the name length that follows on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than [`Self::HEADER_LEN`] bytes are available.
    pub fn parse_header<B: Buf>(buf: &mut B) -> io::Result<(Self, u32)> {
        if buf.remaining() < Self::HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes for ServerInit",
            ));
        }
        let framebuffer_width = buf.get_u16();
        let framebuffer_height = buf.get_u16();
        let pixel_format = PixelFormat::from_bytes(buf)?;
        let name_len = buf.get_u32();
        Ok((
            Self {
                framebuffer_width,
                framebuffer_height,
                pixel_format,
                name: String::new(),
            },
            name_len,
        ))
    }
}

/// Messages a VNC client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Client requests a specific pixel format for framebuffer updates.
    SetPixelFormat(PixelFormat),

    /// Client specifies the list of encodings it supports.
    SetEncodings(Vec<i32>),

    /// Client requests a framebuffer update for a specific region.
    FramebufferUpdateRequest {
        /// If true, only send changes since the last update; if false, send full refresh.
        incremental: bool,
        /// X coordinate of the requested region.
        x: u16,
        /// Y coordinate of the requested region.
        y: u16,
        /// Width of the requested region.
        width: u16,
        /// Height of the requested region.
        height: u16,
    },

    /// Client sends a keyboard key event.
    KeyEvent {
        /// True if the key is pressed, false if released.
        down: bool,
        /// The X Window System keysym value of the key.
        key: u32,
    },

    /// Client sends a pointer (mouse) event.
    PointerEvent {
        /// Bitmask of currently pressed mouse buttons.
        button_mask: u8,
        /// X coordinate of the pointer.
        x: u16,
        /// Y coordinate of the pointer.
        y: u16,
    },

    /// Client sends clipboard (cut text) data, Latin-1 on the wire.
    ClientCutText(String),
}

impl ClientMessage {
    /// Serializes the message into its wire layout.
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to append the message to.
    #[allow(clippy::cast_possible_truncation)] // Counts are bounded by MAX_ENCODINGS and the u32 text length field
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Self::SetPixelFormat(pf) => {
                buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
                buf.put_bytes(0, 3);
                pf.write_to(buf);
            }
            Self::SetEncodings(encodings) => {
                buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
                buf.put_u8(0);
                buf.put_u16(encodings.len() as u16);
                for &encoding in encodings {
                    buf.put_i32(encoding);
                }
            }
            Self::FramebufferUpdateRequest {
                incremental,
                x,
                y,
                width,
                height,
            } => {
                buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
                buf.put_u8(u8::from(*incremental));
                buf.put_u16(*x);
                buf.put_u16(*y);
                buf.put_u16(*width);
                buf.put_u16(*height);
            }
            Self::KeyEvent { down, key } => {
                buf.put_u8(CLIENT_MSG_KEY_EVENT);
                buf.put_u8(u8::from(*down));
                buf.put_bytes(0, 2);
                buf.put_u32(*key);
            }
            Self::PointerEvent { button_mask, x, y } => {
                buf.put_u8(CLIENT_MSG_POINTER_EVENT);
                buf.put_u8(*button_mask);
                buf.put_u16(*x);
                buf.put_u16(*y);
            }
            Self::ClientCutText(text) => {
                // Characters outside Latin-1 have no wire representation.
                let latin1: Vec<u8> = text
                    .chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                    .collect();
                buf.put_u8(CLIENT_MSG_CLIENT_CUT_TEXT);
                buf.put_bytes(0, 3);
                buf.put_u32(latin1.len() as u32);
                buf.put_slice(&latin1);
            }
        }
    }
}

/// Represents a rectangle header in a framebuffer update message.
///
/// Each framebuffer update can contain multiple rectangles, each with its own
/// encoding type. The rectangle header specifies the position, dimensions,
/// and encoding of the pixel data that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl Rectangle {
    /// Size of a rectangle header on the wire.
    pub const HEADER_LEN: usize = 12;

    /// Parses a rectangle header.
    ///
    /// The header format is:
    /// - 2 bytes: x position
    /// - 2 bytes: y position
    /// - 2 bytes: width
    /// - 2 bytes: height
    /// - 4 bytes: encoding type (signed 32-bit integer)
    #[must_use]
    pub fn from_header(header: &[u8; Self::HEADER_LEN]) -> Self {
        let mut buf = &header[..];
        Self {
            x: buf.get_u16(),
            y: buf.get_u16(),
            width: buf.get_u16(),
            height: buf.get_u16(),
            encoding: buf.get_i32(),
        }
    }

    /// Number of pixels covered by the rectangle.
    #[must_use]
    pub fn area(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_wire_layout() {
        let mut buf = BytesMut::new();
        PixelFormat::rgb565().write_to(&mut buf);
        assert_eq!(
            &buf[..],
            &[16, 16, 0, 1, 0, 31, 0, 63, 0, 31, 11, 5, 0, 0, 0, 0]
        );
        let parsed = PixelFormat::from_bytes(&mut buf).unwrap();
        assert_eq!(parsed, PixelFormat::rgb565());
    }

    #[test]
    fn test_pixel_format_short_buffer() {
        let mut buf = &[16u8, 16, 0][..];
        assert!(PixelFormat::from_bytes(&mut buf).is_err());
    }

    #[test]
    fn test_set_pixel_format_is_20_bytes() {
        let mut buf = BytesMut::new();
        ClientMessage::SetPixelFormat(PixelFormat::rgb565()).write_to(&mut buf);
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_set_encodings_layout() {
        let mut buf = BytesMut::new();
        ClientMessage::SetEncodings(vec![ENCODING_TIGHT, ENCODING_RICH_CURSOR]).write_to(&mut buf);
        assert_eq!(
            &buf[..],
            &[2, 0, 0, 2, 0, 0, 0, 7, 0xFF, 0xFF, 0xFF, 0x11]
        );
    }

    #[test]
    fn test_update_request_key_and_pointer_layouts() {
        let mut buf = BytesMut::new();
        ClientMessage::FramebufferUpdateRequest {
            incremental: true,
            x: 1,
            y: 2,
            width: 640,
            height: 480,
        }
        .write_to(&mut buf);
        assert_eq!(&buf[..], &[3, 1, 0, 1, 0, 2, 0x02, 0x80, 0x01, 0xE0]);

        buf.clear();
        ClientMessage::KeyEvent { down: true, key: 0xFF0D }.write_to(&mut buf);
        assert_eq!(&buf[..], &[4, 1, 0, 0, 0, 0, 0xFF, 0x0D]);

        buf.clear();
        ClientMessage::PointerEvent { button_mask: 1, x: 300, y: 20 }.write_to(&mut buf);
        assert_eq!(&buf[..], &[5, 1, 0x01, 0x2C, 0, 20]);
    }

    #[test]
    fn test_client_cut_text_latin1() {
        let mut buf = BytesMut::new();
        ClientMessage::ClientCutText("h\u{e9}\u{2603}".into()).write_to(&mut buf);
        assert_eq!(&buf[..], &[6, 0, 0, 0, 0, 0, 0, 3, b'h', 0xE9, b'?']);
    }

    #[test]
    fn test_rectangle_header() {
        let header = [0, 10, 0, 20, 0, 4, 0, 4, 0xFF, 0xFF, 0xFF, 0x20];
        let rect = Rectangle::from_header(&header);
        assert_eq!(rect.x, 10);
        assert_eq!(rect.y, 20);
        assert_eq!(rect.area(), 16);
        assert_eq!(rect.encoding, ENCODING_LAST_RECT);
    }

    #[test]
    fn test_server_init_header() {
        let mut raw = BytesMut::new();
        raw.put_u16(1024);
        raw.put_u16(768);
        PixelFormat::rgb888(24).write_to(&mut raw);
        raw.put_u32(5);
        let (init, name_len) = ServerInit::parse_header(&mut raw).unwrap();
        assert_eq!(init.framebuffer_width, 1024);
        assert_eq!(init.framebuffer_height, 768);
        assert_eq!(init.pixel_format.bits_per_pixel, 32);
        assert_eq!(name_len, 5);
    }
}
