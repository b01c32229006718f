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

//! VNC Hextile encoding implementation.
//!
//! Hextile divides the rectangle into 16x16 tiles, left to right and top to
//! bottom, with the last column and row of tiles cut short at the edges.
//! Each tile can be: raw, solid, monochrome with subrects, or colored with subrects.

use super::{Decoder, UpdateContext};
use crate::error::Result;
use crate::protocol::{
    Rectangle, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED, HEXTILE_FOREGROUND_SPECIFIED,
    HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use crate::surface::Surface;
use tokio::io::{AsyncRead, AsyncWrite};

/// Side of a full Hextile tile.
pub const TILE_SIZE: u16 = 16;

/// Iterates the tiles of a `width` x `height` rectangle as
/// `(x, y, w, h)` offsets relative to its origin.
pub fn tiles(width: u16, height: u16) -> impl Iterator<Item = (u16, u16, u16, u16)> {
    (0..height).step_by(usize::from(TILE_SIZE)).flat_map(move |ty| {
        (0..width).step_by(usize::from(TILE_SIZE)).map(move |tx| {
            (
                tx,
                ty,
                TILE_SIZE.min(width - tx),
                TILE_SIZE.min(height - ty),
            )
        })
    })
}

/// Decodes the VNC "Hextile" encoding.
///
/// Background and foreground colours start out black for each rectangle
/// and carry over from tile to tile until a tile specifies new ones. Raw
/// tiles leave them untouched.
pub struct HextileDecoder;

impl Decoder for HextileDecoder {
    #[allow(clippy::similar_names)] // bg and fg are standard VNC Hextile terminology
    async fn decode<S, O>(&mut self, rect: &Rectangle, ctx: &mut UpdateContext<'_, S, O>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        O: Surface,
    {
        let bpp = ctx.bytes_per_pixel();
        let mut bg = vec![0u8; bpp];
        let mut fg = vec![0u8; bpp];

        for (tx, ty, tw, th) in tiles(rect.width, rect.height) {
            let x = rect.x.saturating_add(tx);
            let y = rect.y.saturating_add(ty);
            let flags = ctx.read_u8().await?;

            if flags & HEXTILE_RAW != 0 {
                let data = ctx.read_vec(usize::from(tw) * usize::from(th) * bpp).await?;
                ctx.display().write_rect(x, y, tw, th, &data);
                continue;
            }

            if flags & HEXTILE_BACKGROUND_SPECIFIED != 0 {
                bg = ctx.read_pixel().await?;
            }
            if flags & HEXTILE_FOREGROUND_SPECIFIED != 0 {
                fg = ctx.read_pixel().await?;
            }
            ctx.display().fill_rect(x, y, tw, th, &bg)?;

            if flags & HEXTILE_ANY_SUBRECTS == 0 {
                continue;
            }
            let count = ctx.read_u8().await?;
            let coloured = flags & HEXTILE_SUBRECTS_COLOURED != 0;
            let mut geometry = [0u8; 2];
            for _ in 0..count {
                let colour = if coloured {
                    ctx.read_pixel().await?
                } else {
                    fg.clone()
                };
                ctx.read_exact(&mut geometry).await?;
                let sx = u16::from(geometry[0] >> 4);
                let sy = u16::from(geometry[0] & 0x0F);
                let sw = u16::from(geometry[1] >> 4) + 1;
                let sh = u16::from(geometry[1] & 0x0F) + 1;
                ctx.display()
                    .fill_rect(x.saturating_add(sx), y.saturating_add(sy), sw, sh, &colour)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::testing::{decode_with, px, rect};
    use crate::protocol::ENCODING_HEXTILE;
    use crate::surface::recording::Op;

    #[test]
    fn test_tiles_partition_with_short_edges() {
        let got: Vec<_> = tiles(20, 20).collect();
        assert_eq!(
            got,
            vec![(0, 0, 16, 16), (16, 0, 4, 16), (0, 16, 16, 4), (16, 16, 4, 4)]
        );
        assert_eq!(tiles(16, 16).count(), 1);
        assert_eq!(tiles(0, 5).count(), 0);
    }

    #[tokio::test]
    async fn test_background_carries_to_next_tile() {
        // Two tiles: the first sets a red background, the second reuses it.
        let mut wire = vec![HEXTILE_BACKGROUND_SPECIFIED];
        wire.extend_from_slice(&px(0xF800));
        wire.push(0);
        let surface = decode_with(&mut HextileDecoder, rect(0, 0, 20, 4, ENCODING_HEXTILE), &wire, (20, 4))
            .await
            .unwrap();
        assert_eq!(
            surface.draws(),
            vec![
                &Op::Fill { x: 0, y: 0, w: 16, h: 4, rgb: (248, 0, 0) },
                &Op::Fill { x: 16, y: 0, w: 4, h: 4, rgb: (248, 0, 0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_foreground_subrects() {
        let mut wire = vec![HEXTILE_FOREGROUND_SPECIFIED | HEXTILE_ANY_SUBRECTS];
        wire.extend_from_slice(&px(0x07E0));
        // One subrect at (1,2), 3x2.
        wire.extend_from_slice(&[1, 0x12, 0x21]);
        let surface = decode_with(&mut HextileDecoder, rect(0, 0, 8, 8, ENCODING_HEXTILE), &wire, (8, 8))
            .await
            .unwrap();
        assert_eq!(surface.fb.rgb_at(0, 0), Some((0, 0, 0)));
        assert_eq!(surface.fb.rgb_at(1, 2), Some((0, 252, 0)));
        assert_eq!(surface.fb.rgb_at(3, 3), Some((0, 252, 0)));
        assert_eq!(surface.fb.rgb_at(4, 3), Some((0, 0, 0)));
    }

    #[tokio::test]
    async fn test_coloured_subrect_and_raw_tile() {
        let mut wire = vec![HEXTILE_ANY_SUBRECTS | HEXTILE_SUBRECTS_COLOURED, 1];
        wire.extend_from_slice(&px(0x001F));
        wire.extend_from_slice(&[0x00, 0x00]);
        // Second tile is raw: 2x1 pixels.
        wire.push(HEXTILE_RAW);
        wire.extend_from_slice(&px(0xFFFF));
        wire.extend_from_slice(&px(0xFFFF));
        let surface = decode_with(&mut HextileDecoder, rect(0, 0, 18, 1, ENCODING_HEXTILE), &wire, (18, 1))
            .await
            .unwrap();
        assert_eq!(surface.fb.rgb_at(0, 0), Some((0, 0, 248)));
        assert_eq!(surface.fb.rgb_at(1, 0), Some((0, 0, 0)));
        assert_eq!(surface.fb.rgb_at(17, 0), Some((248, 252, 248)));
        assert!(surface.draws().contains(&&Op::Write { x: 16, y: 0, w: 2, h: 1, len: 4 }));
    }

    #[tokio::test]
    async fn test_tiles_near_coordinate_limit_do_not_wrap() {
        // Two empty tiles starting at x = 65530; the second would wrap in u16.
        let surface = decode_with(&mut HextileDecoder, rect(65530, 0, 20, 1, ENCODING_HEXTILE), &[0, 0], (8, 8))
            .await
            .unwrap();
        assert!(surface.draws().is_empty());
    }
}
