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

//! VNC CopyRect encoding implementation.
//!
//! The payload is just the source position; the client copies the block from
//! its own framebuffer. The source area is locked as well so the software
//! cursor is not copied along with it.

use super::{Decoder, UpdateContext};
use crate::error::Result;
use crate::protocol::Rectangle;
use crate::surface::Surface;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decodes the VNC "CopyRect" encoding.
pub struct CopyRectDecoder;

impl Decoder for CopyRectDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let src_x = ctx.read_u16().await?;
        let src_y = ctx.read_u16().await?;
        let display = ctx.display();
        display.lock_area(src_x, src_y, rect.width, rect.height);
        display.copy_rect(src_x, src_y, rect.width, rect.height, rect.x, rect.y);
        Ok(())
    }
}
