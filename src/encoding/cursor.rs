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

//! RichCursor pseudo-encoding.
//!
//! The rectangle carries a cursor shape instead of framebuffer pixels: its
//! position is the hotspot, its size the shape size. The payload is the
//! source image in the client pixel format followed by a 1-bit mask with
//! byte-padded rows.

use super::common::expand_bitmap;
use super::{Decoder, UpdateContext};
use crate::error::Result;
use crate::protocol::Rectangle;
use crate::surface::Surface;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decodes RichCursor shape updates into the display's cursor.
pub struct RichCursorDecoder;

impl Decoder for RichCursorDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let width = usize::from(rect.width);
        let height = usize::from(rect.height);
        let (source, mask) = if width * height == 0 {
            (Vec::new(), Vec::new())
        } else {
            let source = ctx.read_vec(width * height * ctx.bytes_per_pixel()).await?;
            let bits = ctx.read_vec(width.div_ceil(8) * height).await?;
            (source, expand_bitmap(&bits, width, height))
        };
        ctx.display()
            .set_cursor_shape(rect.x, rect.y, rect.width, rect.height, &source, mask)
    }
}
