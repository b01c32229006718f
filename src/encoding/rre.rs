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


//! VNC RRE (Rise-and-Run-length Encoding) implementation.
//!
//! RRE encodes a rectangle as a background color plus a list of solid
//! subrectangles.

use super::{Decoder, UpdateContext};
use crate::error::Result;
use crate::protocol::Rectangle;
use crate::surface::Surface;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decodes the VNC "RRE" encoding.
///
/// Format: \[nSubrects(u32)\]\[bgColor\]\[subrect1\]...\[subrectN\]
/// Each subrect: \[color\]\[x(u16)\]\[y(u16)\]\[w(u16)\]\[h(u16)\], relative to
/// the rectangle origin.
pub struct RreDecoder;

impl Decoder for RreDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let count = ctx.read_u32().await?;
        let bg = ctx.read_pixel().await?;
        ctx.display()
            .fill_rect(rect.x, rect.y, rect.width, rect.height, &bg)?;
        trace!("RRE {}x{}: {count} subrects", rect.width, rect.height);

        for _ in 0..count {
            let colour = ctx.read_pixel().await?;
            let sx = ctx.read_u16().await?;
            let sy = ctx.read_u16().await?;
            let sw = ctx.read_u16().await?;
            let sh = ctx.read_u16().await?;
            ctx.display().fill_rect(
                rect.x.saturating_add(sx),
                rect.y.saturating_add(sy),
                sw,
                sh,
                &colour,
            )?;
        }
        Ok(())
    }
}
