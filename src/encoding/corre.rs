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


//! VNC CoRRE (Compact RRE) encoding implementation.
//!
//! CoRRE is like RRE but uses compact subrectangles with u8 coordinates,
//! so rectangles are at most 255 pixels on a side.

use super::{Decoder, UpdateContext};
use crate::error::{Result, VncError};
use crate::protocol::Rectangle;
use crate::surface::Surface;
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite};

/// Largest rectangle side CoRRE can describe.
const CORRE_MAX_SIDE: u16 = 255;

/// Decodes the VNC "CoRRE" (Compact RRE) encoding.
///
/// Format: \[nSubrects(u32)\]\[bgColor\]\[subrect1\]...\[subrectN\]
/// Each subrect: \[color\]\[x(u8)\]\[y(u8)\]\[w(u8)\]\[h(u8)\]
pub struct CoRreDecoder;

impl Decoder for CoRreDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        if rect.width > CORRE_MAX_SIDE || rect.height > CORRE_MAX_SIDE {
            return Err(VncError::protocol(format!(
                "CoRRE rectangle {}x{} exceeds {CORRE_MAX_SIDE}",
                rect.width, rect.height
            )));
        }

        let count = ctx.read_u32().await?;
        let bg = ctx.read_pixel().await?;
        ctx.display()
            .fill_rect(rect.x, rect.y, rect.width, rect.height, &bg)?;
        trace!("CoRRE {}x{}: {count} subrects", rect.width, rect.height);

        let mut geometry = [0u8; 4];
        for _ in 0..count {
            let colour = ctx.read_pixel().await?;
            ctx.read_exact(&mut geometry).await?;
            let [sx, sy, sw, sh] = geometry.map(u16::from);
            if sx + sw > rect.width || sy + sh > rect.height {
                return Err(VncError::protocol(format!(
                    "CoRRE subrect ({sx},{sy} {sw}x{sh}) outside {}x{} rectangle",
                    rect.width, rect.height
                )));
            }
            ctx.display()
                .fill_rect(rect.x.saturating_add(sx), rect.y.saturating_add(sy), sw, sh, &colour)?;
        }
        Ok(())
    }
}
