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


//! VNC Raw encoding implementation.
//!
//! The simplest encoding: `width * height` pixels in the client format, row by
//! row, with no compression.

use super::{Decoder, UpdateContext};
use crate::error::Result;
use crate::protocol::Rectangle;
use crate::surface::Surface;
use tokio::io::{AsyncRead, AsyncWrite};

/// Decodes the VNC "Raw" encoding.
pub struct RawDecoder;

impl Decoder for RawDecoder {
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let len = rect.area() * ctx.bytes_per_pixel();
        let data = ctx.read_vec(len).await?;
        ctx.display()
            .write_rect(rect.x, rect.y, rect.width, rect.height, &data);
        Ok(())
    }
}
