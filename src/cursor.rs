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

//! Software cursor drawn into the framebuffer.
//!
//! When the server sends the cursor shape (RichCursor), the client draws the
//! cursor itself so pointer motion is shown without a round trip. The pixels
//! under the cursor are saved before drawing and put back before it moves.
//!
//! Screen updates and cursor drawing share the same pixels. Before a
//! rectangle is decoded its area is *locked*; if the cursor overlaps the
//! accumulated lock it is removed and stays hidden until [`CursorCompositor::unlock`].
//! Pointer moves that land inside the lock leave the cursor hidden too.

use crate::error::Result;
use crate::surface::{AreaId, Surface};
use crate::translate::PixelCodec;
use log::debug;

/// Saved-area slot used for the pixels under the cursor.
pub const CURSOR_AREA: AreaId = 1;

/// A rectangle in signed screen coordinates.
///
/// Cursor footprints can extend past the top-left edge, so coordinates may
/// be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub w: i32,
    /// Height in pixels.
    pub h: i32,
}

impl Region {
    /// Creates a region.
    #[must_use]
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Smallest region covering both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.w).max(other.x + other.w);
        let bottom = (self.y + self.h).max(other.y + other.h);
        Self::new(x, y, right - x, bottom - y)
    }

    /// Whether the two regions share at least one pixel.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x < other.x + other.w
            && self.y < other.y + other.h
            && self.x + self.w > other.x
            && self.y + self.h > other.y
    }
}

/// Cursor image as received from the server.
#[derive(Debug, Clone)]
struct CursorShape {
    width: u16,
    height: u16,
    hot_x: u16,
    hot_y: u16,
    /// Decoded colour per pixel, row-major.
    colours: Vec<(u8, u8, u8)>,
    /// One byte per pixel, non-zero where the cursor is opaque.
    mask: Vec<u8>,
}

/// Draws and hides the software cursor around screen updates.
#[derive(Debug)]
pub struct CursorCompositor {
    codec: PixelCodec,
    bounds: (u16, u16),
    origin: (u16, u16),
    shape: Option<CursorShape>,
    x: i32,
    y: i32,
    hidden: bool,
    lock: Option<Region>,
}

impl CursorCompositor {
    /// Creates a compositor with no cursor, clipping to `bounds`.
    ///
    /// `codec` must describe the pixel format of cursor source data.
    #[must_use]
    pub fn new(codec: PixelCodec, bounds: (u16, u16)) -> Self {
        Self {
            codec,
            bounds,
            origin: (0, 0),
            shape: None,
            x: 0,
            y: 0,
            hidden: false,
            lock: None,
        }
    }

    /// Places desktop `(0, 0)` at `origin` on the surface.
    ///
    /// Positions and locks stay in desktop coordinates; only the surface
    /// calls are shifted. `origin + bounds` must fit on the surface.
    #[must_use]
    pub fn with_origin(mut self, origin: (u16, u16)) -> Self {
        self.origin = origin;
        self
    }

    /// Whether a cursor shape is installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shape.is_some()
    }

    /// Whether an installed cursor is currently drawn.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.shape.is_some() && !self.hidden
    }

    /// The accumulated lock, if any.
    #[must_use]
    pub fn lock(&self) -> Option<Region> {
        self.lock
    }

    /// Current cursor position (the hotspot location).
    #[must_use]
    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Area covered by the cursor at its current position.
    fn footprint(&self) -> Option<Region> {
        self.shape.as_ref().map(|s| {
            Region::new(
                self.x - i32::from(s.hot_x),
                self.y - i32::from(s.hot_y),
                i32::from(s.width),
                i32::from(s.height),
            )
        })
    }

    fn in_locked_area(&self) -> bool {
        match (self.lock, self.footprint()) {
            (Some(lock), Some(cursor)) => lock.intersects(&cursor),
            _ => false,
        }
    }

    /// Marks an area as about to be redrawn by the server.
    ///
    /// Locks accumulate until [`Self::unlock`]. If the cursor is drawn over
    /// the accumulated lock it is removed first. Without a cursor shape this
    /// does nothing.
    pub fn lock_area<O: Surface>(&mut self, surface: &mut O, area: Region) {
        if self.shape.is_none() {
            return;
        }
        self.lock = Some(match self.lock {
            Some(lock) => lock.union(&area),
            None => area,
        });
        if !self.hidden && self.in_locked_area() {
            self.restore_under(surface);
            self.hidden = true;
        }
    }

    /// Releases all locks, redrawing the cursor if a lock had hidden it.
    pub fn unlock<O: Surface>(&mut self, surface: &mut O) {
        if self.shape.is_none() {
            return;
        }
        if self.hidden {
            self.save_under(surface);
            self.draw(surface);
            self.hidden = false;
        }
        self.lock = None;
    }

    /// Moves the cursor hotspot to `(x, y)`.
    ///
    /// The cursor is not redrawn while its new footprint lies in a locked area.
    pub fn move_to<O: Surface>(&mut self, surface: &mut O, x: i32, y: i32) {
        if self.shape.is_some() && !self.hidden {
            self.restore_under(surface);
            self.hidden = true;
        }
        self.x = x;
        self.y = y;
        if self.shape.is_some() && !self.in_locked_area() {
            self.save_under(surface);
            self.draw(surface);
            self.hidden = false;
        }
    }

    /// Replaces the cursor shape.
    ///
    /// The previous cursor, if drawn, is erased first. An empty shape
    /// (`width * height == 0`) just removes the cursor. A new shape is drawn
    /// at the current position immediately and any lock is cleared.
    ///
    /// `source` holds `width * height` pixels; `mask` holds one byte per pixel.
    ///
    /// # Errors
    ///
    /// Returns an error if the source pixels cannot be decoded in the
    /// codec's format.
    #[allow(clippy::too_many_arguments)]
    pub fn set_shape<O: Surface>(
        &mut self,
        surface: &mut O,
        hot_x: u16,
        hot_y: u16,
        width: u16,
        height: u16,
        source: &[u8],
        mask: Vec<u8>,
    ) -> Result<()> {
        self.remove(surface);

        if usize::from(width) * usize::from(height) == 0 {
            debug!("Cursor shape cleared");
            return Ok(());
        }

        let colours = source
            .chunks_exact(self.codec.bytes_per_pixel())
            .map(|p| self.codec.decode(p))
            .collect::<Result<Vec<_>>>()?;

        debug!("Cursor shape {width}x{height}, hotspot ({hot_x}, {hot_y})");
        self.shape = Some(CursorShape {
            width,
            height,
            hot_x,
            hot_y,
            colours,
            mask,
        });
        self.save_under(surface);
        self.draw(surface);
        self.hidden = false;
        self.lock = None;
        Ok(())
    }

    /// Erases and forgets the current cursor shape.
    pub fn remove<O: Surface>(&mut self, surface: &mut O) {
        if self.shape.is_some() && !self.hidden {
            self.restore_under(surface);
        }
        self.shape = None;
        self.hidden = false;
    }

    /// Footprint clipped to the bounds, in desktop coordinates.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clipped to u16 bounds
    fn clipped_footprint(&self) -> Option<(u16, u16, u16, u16)> {
        let area = self.footprint()?;
        let (bw, bh) = (i32::from(self.bounds.0), i32::from(self.bounds.1));
        let x0 = area.x.max(0);
        let y0 = area.y.max(0);
        let x1 = (area.x + area.w).min(bw);
        let y1 = (area.y + area.h).min(bh);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u16, y0 as u16, (x1 - x0) as u16, (y1 - y0) as u16))
    }

    fn save_under<O: Surface>(&self, surface: &mut O) {
        if let Some((x, y, w, h)) = self.clipped_footprint() {
            surface.save_area(CURSOR_AREA, x + self.origin.0, y + self.origin.1, w, h);
        }
    }

    fn restore_under<O: Surface>(&self, surface: &mut O) {
        if let Some((x, y, _, _)) = self.clipped_footprint() {
            surface.restore_area(CURSOR_AREA, x + self.origin.0, y + self.origin.1);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Checked against u16 bounds
    fn draw<O: Surface>(&self, surface: &mut O) {
        let (Some(shape), Some(area)) = (self.shape.as_ref(), self.footprint()) else {
            return;
        };
        let (bw, bh) = (i32::from(self.bounds.0), i32::from(self.bounds.1));
        let width = usize::from(shape.width);
        for row in 0..usize::from(shape.height) {
            let y0 = area.y + row as i32;
            if y0 < 0 || y0 >= bh {
                continue;
            }
            for col in 0..width {
                let x0 = area.x + col as i32;
                if x0 < 0 || x0 >= bw {
                    continue;
                }
                let offset = row * width + col;
                if shape.mask.get(offset).copied().unwrap_or(0) == 0 {
                    continue;
                }
                if let Some(&(r, g, b)) = shape.colours.get(offset) {
                    let (sx, sy) = (x0 as u16 + self.origin.0, y0 as u16 + self.origin.1);
                    surface.fill_rect(sx, sy, 1, 1, r, g, b);
                }
            }
        }
    }
}
