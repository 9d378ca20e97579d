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

//! Tile byte layout.
//!
//! Baseline (v2) tiles start with a 32-byte header of eight u32 LE sizes;
//! alternate-route tiles start with a `0xFFFF_FFFF` marker word (impossible
//! as a filter-ids size) followed by a one-byte route id.

use bytes::{BufMut, BytesMut};

/// Fixed v2 tile header size.
pub const TILE_HEADER_SIZE: usize = 32;

/// First word of an alternate-route tile.
pub const ROUTE_MARKER: u32 = 0xFFFF_FFFF;
/// Route id: screen-indexed tile.
pub const ROUTE_SCREEN: u8 = 1;
/// Route id: natural row-oriented tile.
pub const ROUTE_NATURAL: u8 = 2;

/// Parsed v2 tile header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)] // Fields are the eight wire-format size slots
pub struct TileHeader {
    pub filter_ids_size: u32,
    pub lo_stream_size: u32,
    pub hi_stream_size: u32,
    pub filter_pixel_count: u32,
    pub block_types_size: u32,
    pub palette_size: u32,
    pub copy_size: u32,
    pub tile4_size: u32,
}

impl TileHeader {
    /// Parse the 32-byte header from the front of a baseline tile.
    pub fn parse(data: &[u8]) -> Option<TileHeader> {
        if data.len() < TILE_HEADER_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]]);
        Some(TileHeader {
            filter_ids_size: word(0),
            lo_stream_size: word(1),
            hi_stream_size: word(2),
            filter_pixel_count: word(3),
            block_types_size: word(4),
            palette_size: word(5),
            copy_size: word(6),
            tile4_size: word(7),
        })
    }
}

/// Pack the baseline tile: header of sizes, then the payloads in order.
/// Absent streams have size 0 and contribute no bytes.
#[allow(clippy::too_many_arguments)] // The eight v2 header slots, in wire order
#[allow(clippy::cast_possible_truncation)] // Stream sizes are u32 by format
pub fn pack_tile_v2(
    filter_ids_packed: &[u8],
    lo_stream: &[u8],
    hi_stream: &[u8],
    filter_pixel_count: u32,
    block_types: &[u8],
    palette_data: &[u8],
    copy_data: &[u8],
    tile4_data: &[u8],
) -> Vec<u8> {
    let total = TILE_HEADER_SIZE
        + filter_ids_packed.len()
        + lo_stream.len()
        + hi_stream.len()
        + block_types.len()
        + palette_data.len()
        + copy_data.len()
        + tile4_data.len();
    let mut out = BytesMut::with_capacity(total);
    out.put_u32_le(filter_ids_packed.len() as u32);
    out.put_u32_le(lo_stream.len() as u32);
    out.put_u32_le(hi_stream.len() as u32);
    out.put_u32_le(filter_pixel_count);
    out.put_u32_le(block_types.len() as u32);
    out.put_u32_le(palette_data.len() as u32);
    out.put_u32_le(copy_data.len() as u32);
    out.put_u32_le(tile4_data.len() as u32);
    out.put_slice(filter_ids_packed);
    out.put_slice(lo_stream);
    out.put_slice(hi_stream);
    out.put_slice(block_types);
    out.put_slice(palette_data);
    out.put_slice(copy_data);
    out.put_slice(tile4_data);
    out.to_vec()
}

/// Route id of an alternate-route tile, `None` for baseline tiles.
pub fn route_id(tile: &[u8]) -> Option<u8> {
    if tile.len() >= 5 && u32::from_le_bytes([tile[0], tile[1], tile[2], tile[3]]) == ROUTE_MARKER {
        Some(tile[4])
    } else {
        None
    }
}
