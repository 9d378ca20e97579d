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

//! 8x8 block classification.
//!
//! Priority per block: PALETTE, then COPY, then TILE4, then FILTER. PALETTE
//! and COPY acceptance is gated by profile thresholds and by bit-cost
//! estimates against a SUB-left filter probe of the same block, so a block
//! the row filters would code cheaply is left on the filter path. TILE4 is
//! a reserved sub-block descriptor slot: its stream plumbing is carried but
//! the classifier does not currently emit it.

use std::collections::HashMap;

use crate::palette::{self, Palette};
use crate::profile::Profile;
use crate::telemetry::EncodeStats;

/// Classification of one 8x8 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    /// Row-filtered residual coding.
    Filter = 0,
    /// Per-block palette + indices.
    Palette = 1,
    /// Exact copy of earlier content.
    Copy = 2,
    /// Reserved 4x4 sub-block descriptor.
    Tile4 = 3,
}

impl BlockType {
    /// Parse from the block-types stream byte.
    pub fn from_u8(v: u8) -> Option<BlockType> {
        match v {
            0 => Some(BlockType::Filter),
            1 => Some(BlockType::Palette),
            2 => Some(BlockType::Copy),
            3 => Some(BlockType::Tile4),
            _ => None,
        }
    }
}

/// Source offset and run length of a copy block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyParams {
    /// Horizontal source offset in pixels (negative = left).
    pub dx: i16,
    /// Vertical source offset in pixels (negative = up).
    pub dy: i16,
    /// Pixels along the block scan order; 64 for a whole block.
    pub length: u16,
}

/// Opaque 2-byte descriptor of a 4x4 sub-block coding choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile4Result(#[allow(missing_docs)] pub [u8; 2]);

/// Classifier output; the per-type side-streams align 1:1 with the blocks
/// of that type in raster order.
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct ClassifyResult {
    pub block_types: Vec<BlockType>,
    pub palettes: Vec<Palette>,
    pub palette_indices: Vec<Vec<u8>>,
    pub copy_ops: Vec<CopyParams>,
    pub tile4_results: Vec<Tile4Result>,
}

/// Palette width the profile will accept per block.
pub fn max_palette_colors(profile: Profile) -> usize {
    match profile {
        Profile::Photo => 4,
        _ => 8,
    }
}

/// Approximate bits to code one residual of magnitude `abs_r`.
pub fn estimate_filter_symbol_bits2(abs_r: u32, profile: Profile) -> u32 {
    if abs_r == 0 {
        return 1;
    }
    let bit_len = 32 - abs_r.leading_zeros();
    match profile {
        // Photo content keeps large residuals cheaper: the CDF flattens.
        Profile::Photo => 2 + bit_len,
        _ => 1 + 2 * bit_len,
    }
}

/// Index bits per pixel for a palette of `size` colors.
pub fn estimate_palette_index_bits_per_pixel(size: usize) -> u32 {
    match size {
        0 | 1 => 0,
        2 => 1,
        3 | 4 => 2,
        _ => 3,
    }
}

/// Approximate bits to code a palette block (head + colors + indices).
pub fn estimate_palette_bits(p: &Palette, transitions: u32, profile: Profile) -> u32 {
    let size = usize::from(p.size);
    let mut bits = 8 + (size as u32) * 10 + 64 * estimate_palette_index_bits_per_pixel(size) + 4 * transitions;
    if profile == Profile::Photo {
        bits += 64;
    }
    bits
}

/// Approximate bits to code a copy reference.
pub fn estimate_copy_bits(profile: Profile) -> u32 {
    match profile {
        Profile::Photo => 64,
        _ => 48,
    }
}

/// SUB-left probe over one block: cheap stand-in for what the row filters
/// would spend.
pub fn estimate_filter_bits(padded: &[i16], pad_w: usize, bx: usize, by: usize, profile: Profile) -> u32 {
    let mut bits = 8u32;
    for dy in 0..8 {
        let y = by * 8 + dy;
        for dx in 0..8 {
            let x = bx * 8 + dx;
            let v = i32::from(padded[y * pad_w + x]);
            let left = if x > 0 { i32::from(padded[y * pad_w + x - 1]) } else { 0 };
            bits += estimate_filter_symbol_bits2((v - left).unsigned_abs(), profile);
        }
    }
    bits
}

fn extract_block(padded: &[i16], pad_w: usize, bx: usize, by: usize) -> [i16; 64] {
    let mut block = [0i16; 64];
    for dy in 0..8 {
        let src = (by * 8 + dy) * pad_w + bx * 8;
        block[dy * 8..dy * 8 + 8].copy_from_slice(&padded[src..src + 8]);
    }
    block
}

fn block_hash(block: &[i16; 64]) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for &v in block {
        h ^= v as u16 as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

fn blocks_equal(padded: &[i16], pad_w: usize, ax: usize, ay: usize, bx: usize, by: usize) -> bool {
    for dy in 0..8 {
        let a = (ay * 8 + dy) * pad_w + ax * 8;
        let b = (by * 8 + dy) * pad_w + bx * 8;
        if padded[a..a + 8] != padded[b..b + 8] {
            return false;
        }
    }
    true
}

fn index_transitions(idx: &[u8]) -> u32 {
    let mut transitions = 1u32;
    for w in idx.windows(2) {
        if w[0] != w[1] {
            transitions += 1;
        }
    }
    transitions
}

/// Classify every block of a padded plane.
///
/// Copy sources are limited to content strictly earlier in raster order: the
/// left/up/up-left/up-right block neighbors plus the most recent
/// content-identical block found through a hash of the whole block.
#[allow(clippy::cast_possible_truncation)] // Pixel offsets bounded by the padded plane size
pub fn classify_blocks(
    padded: &[i16],
    pad_w: usize,
    pad_h: usize,
    profile: Profile,
    stats: &mut EncodeStats,
) -> ClassifyResult {
    let nx = pad_w / 8;
    let ny = pad_h / 8;
    let mut result = ClassifyResult::default();
    result.block_types.reserve(nx * ny);

    let mut seen_blocks: HashMap<u64, (usize, usize)> = HashMap::new();
    let max_colors = max_palette_colors(profile);

    for by in 0..ny {
        for bx in 0..nx {
            let block = extract_block(padded, pad_w, bx, by);
            let filter_bits = estimate_filter_bits(padded, pad_w, bx, by, profile);

            // PALETTE: bounded color count and cheaper than the filter probe.
            let p = palette::extract(&block, max_colors);
            if p.size > 0 {
                let idx = palette::map_indices(&block, &p);
                let pal_bits = estimate_palette_bits(&p, index_transitions(&idx), profile);
                if pal_bits <= filter_bits {
                    result.block_types.push(BlockType::Palette);
                    result.palettes.push(p);
                    result.palette_indices.push(idx);
                    stats.blocks_palette += 1;
                    let h = block_hash(&block);
                    seen_blocks.insert(h, (bx, by));
                    continue;
                }
            }

            // COPY: exact repeat of earlier content.
            let copy_src = find_copy_source(padded, pad_w, bx, by, &block, &seen_blocks);
            if let Some((sx, sy)) = copy_src {
                if estimate_copy_bits(profile) <= filter_bits {
                    result.block_types.push(BlockType::Copy);
                    result.copy_ops.push(CopyParams {
                        dx: (sx as i64 * 8 - bx as i64 * 8) as i16,
                        dy: (sy as i64 * 8 - by as i64 * 8) as i16,
                        length: 64,
                    });
                    stats.blocks_copy += 1;
                    let h = block_hash(&block);
                    seen_blocks.insert(h, (bx, by));
                    continue;
                }
            }

            // TILE4 is reserved; fall through to FILTER.
            result.block_types.push(BlockType::Filter);
            stats.blocks_filter += 1;
            let h = block_hash(&block);
            seen_blocks.insert(h, (bx, by));
        }
    }
    result
}

fn find_copy_source(
    padded: &[i16],
    pad_w: usize,
    bx: usize,
    by: usize,
    block: &[i16; 64],
    seen_blocks: &HashMap<u64, (usize, usize)>,
) -> Option<(usize, usize)> {
    let nx = pad_w / 8;
    let mut candidates: [Option<(usize, usize)>; 5] = [None; 5];
    if bx > 0 {
        candidates[0] = Some((bx - 1, by));
    }
    if by > 0 {
        candidates[1] = Some((bx, by - 1));
        if bx > 0 {
            candidates[2] = Some((bx - 1, by - 1));
        }
        if bx + 1 < nx {
            candidates[3] = Some((bx + 1, by - 1));
        }
    }
    candidates[4] = seen_blocks.get(&block_hash(block)).copied();

    for cand in candidates.into_iter().flatten() {
        let (sx, sy) = cand;
        // Source must be strictly earlier in raster order.
        if (sy, sx) >= (by, bx) {
            continue;
        }
        if blocks_equal(padded, pad_w, sx, sy, bx, by) {
            return Some((sx, sy));
        }
    }
    None
}

/// Serialize block types, one byte per block in raster order.
pub fn encode_block_types(block_types: &[BlockType]) -> Vec<u8> {
    block_types.iter().map(|&t| t as u8).collect()
}

/// Serialize copy parameters, 6 bytes little-endian each.
pub fn encode_copy_stream(copy_ops: &[CopyParams]) -> Vec<u8> {
    let mut out = Vec::with_capacity(copy_ops.len() * 6);
    for op in copy_ops {
        out.extend_from_slice(&op.dx.to_le_bytes());
        out.extend_from_slice(&op.dy.to_le_bytes());
        out.extend_from_slice(&op.length.to_le_bytes());
    }
    out
}

/// Parse the copy stream back into parameters.
pub fn decode_copy_stream(data: &[u8]) -> Option<Vec<CopyParams>> {
    if data.len() % 6 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(6)
            .map(|c| CopyParams {
                dx: i16::from_le_bytes([c[0], c[1]]),
                dy: i16::from_le_bytes([c[2], c[3]]),
                length: u16::from_le_bytes([c[4], c[5]]),
            })
            .collect(),
    )
}

/// Serialize tile4 descriptors, 2 bytes each.
pub fn encode_tile4_stream(results: &[Tile4Result]) -> Vec<u8> {
    let mut out = Vec::with_capacity(results.len() * 2);
    for r in results {
        out.extend_from_slice(&r.0);
    }
    out
}
