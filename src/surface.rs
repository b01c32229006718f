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

//! The output surface the decoders draw on.
//!
//! A [`Surface`] is whatever ends up showing the remote desktop: a frame
//! buffer device, a window, or the in-memory [`Framebuffer`](crate::Framebuffer).
//! Pixels handed to it are always in the client pixel format negotiated with
//! the server. Every call arrives already clamped to the surface bounds, so
//! implementations never see out-of-range coordinates.

/// Identifier of a saved rectangle on a [`Surface`].
pub type AreaId = u32;

/// Drawing primitives needed by the VNC client.
pub trait Surface {
    /// Surface dimensions as `(width, height)` in pixels.
    fn size(&self) -> (u16, u16);

    /// Copies a block of packed pixels into the surface.
    ///
    /// `data` holds `w * h` pixels in the client pixel format, rows back to back.
    fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]);

    /// Copies a block within the surface. Source and destination may overlap.
    fn copy_rect(&mut self, src_x: u16, src_y: u16, w: u16, h: u16, dst_x: u16, dst_y: u16);

    /// Fills a block with a single colour.
    fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, r: u8, g: u8, b: u8);

    /// Saves a block under `id`, replacing anything saved there before.
    fn save_area(&mut self, id: AreaId, x: u16, y: u16, w: u16, h: u16);

    /// Restores the block saved under `id` to `(x, y)`. Does nothing if no
    /// block was saved.
    fn restore_area(&mut self, id: AreaId, x: u16, y: u16);
}

#[cfg(test)]
pub(crate) mod recording {
    //! A framebuffer that logs every call made to it.

    use super::{AreaId, Surface};
    use crate::framebuffer::Framebuffer;
    use crate::protocol::PixelFormat;

    /// One recorded surface call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Op {
        Write { x: u16, y: u16, w: u16, h: u16, len: usize },
        Copy { src_x: u16, src_y: u16, w: u16, h: u16, dst_x: u16, dst_y: u16 },
        Fill { x: u16, y: u16, w: u16, h: u16, rgb: (u8, u8, u8) },
        Save { x: u16, y: u16, w: u16, h: u16 },
        Restore { x: u16, y: u16 },
    }

    #[derive(Debug)]
    pub struct RecordingSurface {
        pub fb: Framebuffer,
        pub ops: Vec<Op>,
    }

    impl RecordingSurface {
        pub fn new(width: u16, height: u16, format: PixelFormat) -> Self {
            Self {
                fb: Framebuffer::new(width, height, format),
                ops: Vec::new(),
            }
        }

        /// Recorded writes and fills, ignoring cursor bookkeeping.
        pub fn draws(&self) -> Vec<&Op> {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Write { .. } | Op::Fill { .. } | Op::Copy { .. }))
                .collect()
        }
    }

    impl Surface for RecordingSurface {
        fn size(&self) -> (u16, u16) {
            self.fb.size()
        }

        fn write_rect(&mut self, x: u16, y: u16, w: u16, h: u16, data: &[u8]) {
            self.ops.push(Op::Write { x, y, w, h, len: data.len() });
            self.fb.write_rect(x, y, w, h, data);
        }

        fn copy_rect(&mut self, src_x: u16, src_y: u16, w: u16, h: u16, dst_x: u16, dst_y: u16) {
            self.ops.push(Op::Copy { src_x, src_y, w, h, dst_x, dst_y });
            self.fb.copy_rect(src_x, src_y, w, h, dst_x, dst_y);
        }

        fn fill_rect(&mut self, x: u16, y: u16, w: u16, h: u16, r: u8, g: u8, b: u8) {
            self.ops.push(Op::Fill { x, y, w, h, rgb: (r, g, b) });
            self.fb.fill_rect(x, y, w, h, r, g, b);
        }

        fn save_area(&mut self, id: AreaId, x: u16, y: u16, w: u16, h: u16) {
            self.ops.push(Op::Save { x, y, w, h });
            self.fb.save_area(id, x, y, w, h);
        }

        fn restore_area(&mut self, id: AreaId, x: u16, y: u16) {
            self.ops.push(Op::Restore { x, y });
            self.fb.restore_area(id, x, y);
        }
    }
}
