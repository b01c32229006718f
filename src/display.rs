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

//! Client-side display state.
//!
//! [`Display`] owns the output surface together with everything that draws on
//! it or reacts to local input: the pixel codec, the software cursor and the
//! pointer position. Decoders draw through it, and every draw call is clipped
//! to the area both the server framebuffer and the surface cover.
//!
//! The display is also the session's [`IdleHook`]: while the transport waits
//! on the network it turns keyboard and pointer input into client messages.

use crate::cursor::{CursorCompositor, Region};
use crate::error::Result;
use crate::events::InputEvent;
use crate::protocol::{ClientMessage, PixelFormat};
use crate::surface::Surface;
use crate::transport::IdleHook;
use crate::translate::PixelCodec;
use bytes::BytesMut;
use log::{debug, trace};
use tokio::sync::mpsc::UnboundedReceiver;

/// Local pointer position and button state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerState {
    /// Horizontal position in pixels.
    pub x: u16,
    /// Vertical position in pixels.
    pub y: u16,
    /// Pressed buttons (bit 0 = left, bit 1 = middle, bit 2 = right).
    pub buttons: u8,
}

/// The output surface plus cursor and pointer state.
pub struct Display<O> {
    surface: O,
    codec: PixelCodec,
    cursor: CursorCompositor,
    bounds: (u16, u16),
    origin: (u16, u16),
    pointer_extent: (u16, u16),
    pointer: PointerState,
    input: Option<UnboundedReceiver<InputEvent>>,
}

impl<O: Surface> Display<O> {
    /// Creates a display drawing `format` pixels onto `surface`.
    ///
    /// The desktop sits in the top-left corner and drawing is clipped to the
    /// overlap of the server framebuffer (`server_size`) and the surface.
    /// The pointer roams the whole surface, starting at its centre.
    pub fn new(surface: O, format: PixelFormat, server_size: (u16, u16)) -> Self {
        Self::build(surface, format, server_size, false)
    }

    /// Like [`Self::new`], but a desktop smaller than the surface is centred
    /// on it and the pointer stays on the desktop.
    pub fn centred(surface: O, format: PixelFormat, server_size: (u16, u16)) -> Self {
        Self::build(surface, format, server_size, true)
    }

    fn build(mut surface: O, format: PixelFormat, server_size: (u16, u16), centre: bool) -> Self {
        let (sw, sh) = surface.size();
        let origin = if centre {
            (sw.saturating_sub(server_size.0) / 2, sh.saturating_sub(server_size.1) / 2)
        } else {
            (0, 0)
        };
        let bounds = ((sw - origin.0).min(server_size.0), (sh - origin.1).min(server_size.1));
        let pointer_extent = if centre { bounds } else { (sw, sh) };
        let codec = PixelCodec::new(format);
        debug!(
            "Display {sw}x{sh}, server {}x{}, drawing {}x{} at ({}, {})",
            server_size.0, server_size.1, bounds.0, bounds.1, origin.0, origin.1
        );
        let pointer = PointerState {
            x: pointer_extent.0 / 2,
            y: pointer_extent.1 / 2,
            buttons: 0,
        };
        let mut cursor = CursorCompositor::new(codec.clone(), bounds).with_origin(origin);
        cursor.move_to(&mut surface, i32::from(pointer.x), i32::from(pointer.y));
        Self {
            surface,
            cursor,
            codec,
            bounds,
            origin,
            pointer_extent,
            pointer,
            input: None,
        }
    }

    /// Attaches the channel local input arrives on.
    pub fn set_input(&mut self, input: UnboundedReceiver<InputEvent>) {
        self.input = Some(input);
    }

    /// The output surface.
    pub fn surface(&self) -> &O {
        &self.surface
    }

    /// The output surface, mutably.
    pub fn surface_mut(&mut self) -> &mut O {
        &mut self.surface
    }

    /// Consumes the display, returning the surface.
    pub fn into_surface(self) -> O {
        self.surface
    }

    /// Codec for the client pixel format.
    pub fn codec(&self) -> &PixelCodec {
        &self.codec
    }

    /// The software cursor.
    pub fn cursor(&self) -> &CursorCompositor {
        &self.cursor
    }

    /// Width and height of the drawable area.
    pub fn bounds(&self) -> (u16, u16) {
        self.bounds
    }

    /// Surface position of the desktop's top-left corner.
    pub fn origin(&self) -> (u16, u16) {
        self.origin
    }

    /// Current pointer state.
    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    /// Clips a block to the drawable area. `None` if nothing remains.
    fn clip(&self, x: u16, y: u16, w: u16, h: u16) -> Option<(u16, u16)> {
        if x >= self.bounds.0 || y >= self.bounds.1 || w == 0 || h == 0 {
            return None;
        }
        Some((w.min(self.bounds.0 - x), h.min(self.bounds.1 - y)))
    }

    /// Draws packed pixels, `w * h` of them row by row.
    pub fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]) {
        let Some((cw, ch)) = self.clip(x, y, w, h) else {
            return;
        };
        let (sx, sy) = (x + self.origin.0, y + self.origin.1);
        if cw == w {
            let len = usize::from(w) * usize::from(ch) * self.codec.bytes_per_pixel();
            self.surface.write_rect(sx, sy, cw, ch, &data[..len.min(data.len())]);
            return;
        }
        // Narrower than the source: repack the visible part of each row.
        let bpp = self.codec.bytes_per_pixel();
        let src_stride = usize::from(w) * bpp;
        let row_len = usize::from(cw) * bpp;
        let mut packed = Vec::with_capacity(row_len * usize::from(ch));
        for row in data.chunks(src_stride).take(usize::from(ch)) {
            packed.extend_from_slice(&row[..row_len.min(row.len())]);
        }
        self.surface.write_rect(sx, sy, cw, ch, &packed);
    }

    /// Copies a block within the surface.
    pub fn copy_rect(&mut self, src_x: u16, src_y: u16, w: u16, h: u16, dst_x: u16, dst_y: u16) {
        let (Some((sw, sh)), Some((dw, dh))) =
            (self.clip(src_x, src_y, w, h), self.clip(dst_x, dst_y, w, h))
        else {
            return;
        };
        let (ox, oy) = self.origin;
        self.surface
            .copy_rect(src_x + ox, src_y + oy, sw.min(dw), sh.min(dh), dst_x + ox, dst_y + oy);
    }

    /// Fills a block with one wire-format pixel.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel cannot be decoded in the client format.
    pub fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, pixel: &[u8]) -> Result<()> {
        let (r, g, b) = self.codec.decode(pixel)?;
        if let Some((cw, ch)) = self.clip(x, y, w, h) {
            self.surface
                .fill_rect(x + self.origin.0, y + self.origin.1, cw, ch, r, g, b);
        }
        Ok(())
    }

    /// Locks an area against cursor drawing until [`Self::unlock`].
    pub fn lock_area(&mut self, x: u16, y: u16, w: u16, h: u16) {
        let area = Region::new(i32::from(x), i32::from(y), i32::from(w), i32::from(h));
        self.cursor.lock_area(&mut self.surface, area);
    }

    /// Releases cursor locks, redrawing the cursor if needed.
    pub fn unlock(&mut self) {
        self.cursor.unlock(&mut self.surface);
    }

    /// Installs a new cursor shape at the current pointer position.
    ///
    /// # Errors
    ///
    /// Returns an error if the source pixels cannot be decoded.
    pub fn set_cursor_shape(
        &mut self,
        hot_x: u16,
        hot_y: u16,
        width: u16,
        height: u16,
        source: &[u8],
        mask: Vec<u8>,
    ) -> Result<()> {
        self.cursor.set_shape(
            &mut self.surface,
            hot_x,
            hot_y,
            width,
            height,
            source,
            mask,
        )
    }

    /// Moves the pointer by a relative amount, clamped to its range.
    pub fn move_pointer(&mut self, dx: i32, dy: i32) {
        let (ew, eh) = self.pointer_extent;
        self.pointer.x = clamp_axis(self.pointer.x, dx, ew);
        self.pointer.y = clamp_axis(self.pointer.y, dy, eh);
        self.cursor.move_to(
            &mut self.surface,
            i32::from(self.pointer.x),
            i32::from(self.pointer.y),
        );
    }

    /// Pointer event describing the current pointer state.
    pub fn pointer_message(&self) -> ClientMessage {
        ClientMessage::PointerEvent {
            button_mask: self.pointer.buttons,
            x: self.pointer.x,
            y: self.pointer.y,
        }
    }
}

/// Applies a relative move on one axis, keeping the result on the surface.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped to 0..extent
fn clamp_axis(pos: u16, delta: i32, extent: u16) -> u16 {
    let max = i32::from(extent.saturating_sub(1));
    (i32::from(pos).saturating_add(delta)).clamp(0, max) as u16
}

impl<O: Surface> IdleHook for Display<O> {
    async fn next_event(&mut self) -> InputEvent {
        if let Some(rx) = self.input.as_mut() {
            if let Some(event) = rx.recv().await {
                return event;
            }
            debug!("Input channel closed");
            self.input = None;
        }
        std::future::pending().await
    }

    fn service(&mut self, event: InputEvent, outbound: &mut BytesMut) {
        let msg = match event {
            InputEvent::KeyPress(key) => ClientMessage::KeyEvent { down: true, key },
            InputEvent::KeyRelease(key) => ClientMessage::KeyEvent { down: false, key },
            InputEvent::PointerMove { dx, dy } => {
                self.move_pointer(dx, dy);
                self.pointer_message()
            }
            InputEvent::ButtonChange(mask) => {
                self.pointer.buttons = mask;
                self.move_pointer(0, 0);
                self.pointer_message()
            }
        };
        trace!("Input {event:?} -> {msg:?}");
        msg.write_to(outbound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::Framebuffer;

    fn display(server: (u16, u16)) -> Display<Framebuffer> {
        let fb = Framebuffer::new(16, 16, PixelFormat::rgb565());
        Display::new(fb, PixelFormat::rgb565(), server)
    }

    #[test]
    fn test_bounds_and_initial_pointer() {
        let d = display((10, 40));
        assert_eq!(d.bounds(), (10, 16));
        assert_eq!(d.pointer(), PointerState { x: 8, y: 8, buttons: 0 });
    }

    #[test]
    fn test_write_rect_repacks_clipped_rows() {
        let mut d = display((10, 10));
        // 4x2 block at x=8: only two columns are visible.
        let mut data = Vec::new();
        for px in [0x0001u16, 0x0002, 0x0003, 0x0004, 0x0005, 0x0006, 0x0007, 0x0008] {
            data.extend_from_slice(&px.to_le_bytes());
        }
        d.write_rect(8, 0, 4, 2, &data);
        let fb = d.surface();
        assert_eq!(fb.pixel(8, 0), Some(&[1, 0][..]));
        assert_eq!(fb.pixel(9, 0), Some(&[2, 0][..]));
        assert_eq!(fb.pixel(8, 1), Some(&[5, 0][..]));
        assert_eq!(fb.pixel(10, 0), Some(&[0, 0][..]));
    }

    #[test]
    fn test_draws_outside_bounds_are_dropped() {
        let mut d = display((10, 10));
        d.fill_rect(12, 12, 2, 2, &0xFFFFu16.to_le_bytes()).unwrap();
        assert_eq!(d.surface().rgb_at(12, 12), Some((0, 0, 0)));
    }

    #[test]
    fn test_fill_matches_raw_pixel() {
        let mut d = display((16, 16));
        d.fill_rect(0, 0, 1, 1, &0xFFFFu16.to_le_bytes()).unwrap();
        d.write_rect(1, 0, 1, 1, &0xFFFFu16.to_le_bytes());
        assert_eq!(d.surface().pixel(0, 0), Some(&[0xFF, 0xFF][..]));
        assert_eq!(d.surface().pixel(0, 0), d.surface().pixel(1, 0));
    }

    #[test]
    fn test_service_key_and_pointer() {
        let mut d = display((16, 16));
        let mut out = BytesMut::new();
        d.service(InputEvent::KeyPress(0x41), &mut out);
        d.service(InputEvent::PointerMove { dx: 100, dy: -100 }, &mut out);
        d.service(InputEvent::ButtonChange(1), &mut out);
        assert_eq!(
            &out[..],
            &[4, 1, 0, 0, 0, 0, 0, 0x41, 5, 0, 0, 15, 0, 0, 5, 1, 0, 15, 0, 0]
        );
    }

    #[test]
    fn test_cursor_follows_pointer() {
        let mut d = display((16, 16));
        d.set_cursor_shape(0, 0, 1, 1, &0xFFFFu16.to_le_bytes(), vec![1])
            .unwrap();
        assert_eq!(d.cursor().position(), (8, 8));
        assert_eq!(d.surface().rgb_at(8, 8), Some((248, 252, 248)));

        d.move_pointer(2, -3);
        assert_eq!(d.surface().rgb_at(8, 8), Some((0, 0, 0)));
        assert_eq!(d.surface().rgb_at(10, 5), Some((248, 252, 248)));
    }

    #[test]
    fn test_centred_desktop() {
        let fb = Framebuffer::new(16, 16, PixelFormat::rgb565());
        let mut d = Display::centred(fb, PixelFormat::rgb565(), (8, 4));
        assert_eq!(d.origin(), (4, 6));
        assert_eq!(d.bounds(), (8, 4));
        assert_eq!(d.pointer(), PointerState { x: 4, y: 2, buttons: 0 });

        d.fill_rect(0, 0, 1, 1, &0xFFFFu16.to_le_bytes()).unwrap();
        d.write_rect(7, 3, 2, 1, &[0x1F, 0, 0x1F, 0]);
        assert_eq!(d.surface().pixel(4, 6), Some(&[0xFF, 0xFF][..]));
        assert_eq!(d.surface().pixel(11, 9), Some(&[0x1F, 0][..]));
        assert_eq!(d.surface().pixel(12, 9), Some(&[0, 0][..]));
        assert_eq!(d.surface().pixel(0, 0), Some(&[0, 0][..]));

        // The pointer is clamped to the desktop, not the surface.
        let mut out = BytesMut::new();
        d.service(InputEvent::PointerMove { dx: 100, dy: 100 }, &mut out);
        assert_eq!(&out[..], &[5, 0, 0, 7, 0, 3]);
    }

    #[test]
    fn test_centred_larger_desktop_keeps_origin() {
        let fb = Framebuffer::new(16, 16, PixelFormat::rgb565());
        let d = Display::centred(fb, PixelFormat::rgb565(), (40, 10));
        assert_eq!(d.origin(), (0, 3));
        assert_eq!(d.bounds(), (16, 10));
    }

    #[tokio::test]
    async fn test_next_event_reads_channel() {
        let mut d = display((16, 16));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        d.set_input(rx);
        tx.send(InputEvent::KeyRelease(7)).unwrap();
        assert_eq!(d.next_event().await, InputEvent::KeyRelease(7));
    }
}
