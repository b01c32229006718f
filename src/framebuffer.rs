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

//! In-memory framebuffer surface.
//!
//! [`Framebuffer`] stores pixels in the client pixel format, row-major with no
//! padding. It backs headless viewers and the test suite, and serves as the
//! reference behaviour for other [`Surface`] implementations.

use crate::protocol::PixelFormat;
use crate::surface::{AreaId, Surface};
use crate::translate::PixelCodec;
use std::collections::HashMap;

/// A block saved by [`Surface::save_area`].
#[derive(Debug, Clone)]
struct SavedArea {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

/// A [`Surface`] kept entirely in memory.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    codec: PixelCodec,
    data: Vec<u8>,
    saved: HashMap<AreaId, SavedArea>,
}

impl Framebuffer {
    /// Creates a black framebuffer of the given size and pixel format.
    #[must_use]
    pub fn new(width: u16, height: u16, format: PixelFormat) -> Self {
        let codec = PixelCodec::new(format);
        let len = usize::from(width) * usize::from(height) * codec.bytes_per_pixel();
        Self {
            width,
            height,
            codec,
            data: vec![0; len],
            saved: HashMap::new(),
        }
    }

    /// The pixel format of the stored data.
    #[must_use]
    pub fn pixel_format(&self) -> &PixelFormat {
        self.codec.format()
    }

    /// All pixel data, row-major.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes of the pixel at `(x, y)`, or `None` outside the surface.
    #[must_use]
    pub fn pixel(&self, x: u16, y: u16) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        Some(&self.data[offset..offset + self.codec.bytes_per_pixel()])
    }

    /// Colour of the pixel at `(x, y)` as 8-bit RGB.
    ///
    /// Returns `None` outside the surface or when the pixel format cannot be
    /// decoded.
    #[must_use]
    pub fn rgb_at(&self, x: u16, y: u16) -> Option<(u8, u8, u8)> {
        self.pixel(x, y).and_then(|p| self.codec.decode(p).ok())
    }

    fn stride(&self) -> usize {
        usize::from(self.width) * self.codec.bytes_per_pixel()
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        usize::from(y) * self.stride() + usize::from(x) * self.codec.bytes_per_pixel()
    }

    /// Clips a block to the surface, returning the visible width and height.
    fn clip(&self, x: u16, y: u16, w: u16, h: u16) -> (usize, usize) {
        let w = w.min(self.width.saturating_sub(x));
        let h = h.min(self.height.saturating_sub(y));
        (usize::from(w), usize::from(h))
    }
}

impl Surface for Framebuffer {
    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]) {
        let bpp = self.codec.bytes_per_pixel();
        let src_stride = usize::from(w) * bpp;
        let (cw, ch) = self.clip(x, y, w, h);
        let row_len = cw * bpp;
        for row in 0..ch {
            let src = row * src_stride;
            if src + row_len > data.len() {
                break;
            }
            #[allow(clippy::cast_possible_truncation)] // row < h, which is a u16
            let dst = self.offset(x, y + row as u16);
            self.data[dst..dst + row_len].copy_from_slice(&data[src..src + row_len]);
        }
    }

    fn copy_rect(&mut self, src_x: u16, src_y: u16, w: u16, h: u16, dst_x: u16, dst_y: u16) {
        let (sw, sh) = self.clip(src_x, src_y, w, h);
        let (dw, dh) = self.clip(dst_x, dst_y, w, h);
        let (cw, ch) = (sw.min(dw), sh.min(dh));
        if cw == 0 || ch == 0 {
            return;
        }
        let row_len = cw * self.codec.bytes_per_pixel();
        let stride = self.stride();
        let src_base = self.offset(src_x, src_y);
        let dst_base = self.offset(dst_x, dst_y);
        // Walk rows away from the overlap so no source row is overwritten first.
        let rows: Box<dyn Iterator<Item = usize>> = if dst_y > src_y {
            Box::new((0..ch).rev())
        } else {
            Box::new(0..ch)
        };
        for row in rows {
            let src = src_base + row * stride;
            let dst = dst_base + row * stride;
            self.data.copy_within(src..src + row_len, dst);
        }
    }

    fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, r: u8, g: u8, b: u8) {
        let bpp = self.codec.bytes_per_pixel();
        let mut pixel = [0u8; 4];
        self.codec.pack_exact_into(r, g, b, &mut pixel);
        let (cw, ch) = self.clip(x, y, w, h);
        for row in 0..ch {
            #[allow(clippy::cast_possible_truncation)] // row < h, which is a u16
            let start = self.offset(x, y + row as u16);
            for chunk in self.data[start..start + cw * bpp].chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&pixel[..bpp]);
            }
        }
    }

    fn save_area(&mut self, id: AreaId, x: u16, y: u16, w: u16, h: u16) {
        let bpp = self.codec.bytes_per_pixel();
        let (cw, ch) = self.clip(x, y, w, h);
        let mut pixels = Vec::with_capacity(cw * ch * bpp);
        for row in 0..ch {
            #[allow(clippy::cast_possible_truncation)] // row < h, which is a u16
            let start = self.offset(x, y + row as u16);
            pixels.extend_from_slice(&self.data[start..start + cw * bpp]);
        }
        #[allow(clippy::cast_possible_truncation)] // Clipped sizes never exceed the u16 inputs
        let area = SavedArea {
            width: cw as u16,
            height: ch as u16,
            pixels,
        };
        self.saved.insert(id, area);
    }

    fn restore_area(&mut self, id: AreaId, x: u16, y: u16) {
        if let Some(area) = self.saved.remove(&id) {
            self.write_rect(x, y, area.width, area.height, &area.pixels);
            self.saved.insert(id, area);
        }
    }
}
