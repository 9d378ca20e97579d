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

//! Per-block palette extraction and the palette+indices stream codec.
//!
//! # Stream layout
//!
//! ```text
//! [magic][flags]
//!   flags bit0: mask dictionary present  -> [count: u8][count x 8B masks LE]
//!   flags bit1: palette dictionary       -> [count: u8][size: u8, colors...]...
//! per block:
//!   [head][palette colors | dict ref][indices payload]
//!     head bit7 = same palette as previous block
//!     head bit6 = palette-dictionary reference (v3+, only when bit7 clear)
//!     head bits 2..0 = palette size - 1
//!   indices: size 1 -> omitted; size 2 -> 1B mask-dict id or 8B mask LE;
//!            size > 2 -> 64 indices bit-packed LSB-first
//! ```
//!
//! Magics: 0x40 = v2 (colors as u8, offset +128), 0x41 = v3 (v2 + palette
//! dictionary), 0x42 = v4 (colors as i16 LE, used whenever any color falls
//! outside -128..=127).

use std::collections::{BTreeMap, HashMap};

use crate::bitio::{BitReader, BitWriter};

/// v2 stream magic: unsigned 8-bit colors.
pub const STREAM_V2_MAGIC: u8 = 0x40;
/// v3 stream magic: v2 plus palette dictionary.
pub const STREAM_V3_MAGIC: u8 = 0x41;
/// v4 stream magic: signed 16-bit colors.
pub const STREAM_V4_MAGIC: u8 = 0x42;
/// Flags bit: mask dictionary for 2-color blocks.
pub const FLAG_MASK_DICT: u8 = 0x01;
/// Flags bit: palette dictionary for recurring palettes.
pub const FLAG_PALETTE_DICT: u8 = 0x02;

/// Up to eight distinct signed colors plus their count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Palette {
    /// Number of valid colors; 0 signals extraction failure.
    pub size: u8,
    /// Colors, most frequent first; only the first `size` are meaningful.
    pub colors: [i16; 8],
}

impl PartialEq for Palette {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.colors[..usize::from(self.size)] == other.colors[..usize::from(other.size)]
    }
}

impl Eq for Palette {}

impl Palette {
    fn key(&self) -> (u8, [i16; 8]) {
        let mut colors = [0i16; 8];
        colors[..usize::from(self.size)].copy_from_slice(&self.colors[..usize::from(self.size)]);
        (self.size, colors)
    }
}

/// Extract the palette of one 8x8 block, most frequent color first (ties by
/// ascending value). Returns size 0 when the block has more than
/// `max_colors` distinct values.
pub fn extract(block: &[i16], max_colors: usize) -> Palette {
    debug_assert_eq!(block.len(), 64);
    let mut counts: BTreeMap<i16, u32> = BTreeMap::new();
    for &v in block {
        *counts.entry(v).or_insert(0) += 1;
    }
    if counts.len() > max_colors {
        return Palette::default();
    }
    let mut sorted: Vec<(i16, u32)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut p = Palette {
        size: sorted.len() as u8,
        colors: [0; 8],
    };
    for (i, (color, _)) in sorted.iter().enumerate() {
        p.colors[i] = *color;
    }
    p
}

/// Map block samples to palette indices. Exact lookup; the palette is
/// guaranteed to cover the block by construction.
pub fn map_indices(block: &[i16], p: &Palette) -> Vec<u8> {
    debug_assert_eq!(block.len(), 64);
    block
        .iter()
        .map(|&v| {
            p.colors[..usize::from(p.size)]
                .iter()
                .position(|&c| c == v)
                .unwrap_or(0) as u8
        })
        .collect()
}

/// Byte-cost proxy for one palette+indices ordering: palette delta cost plus
/// an index-transition term approximating RLE/LZ difficulty.
pub fn estimate_local_cost(p: &Palette, idx: &[u8]) -> u32 {
    let mut delta_cost = 0u32;
    if p.size > 0 {
        delta_cost += p.colors[0].unsigned_abs() as u32;
        for i in 1..usize::from(p.size) {
            delta_cost += (i32::from(p.colors[i]) - i32::from(p.colors[i - 1])).unsigned_abs();
        }
    }
    let mut transitions = 0u32;
    if !idx.is_empty() {
        transitions += 1;
        for w in idx.windows(2) {
            if w[0] != w[1] {
                transitions += 1;
            }
        }
    }
    delta_cost + transitions * 4
}

/// Apply `new_order` (new index -> old index) to a palette and its indices.
fn reorder(p: &mut Palette, idx: &mut [u8], new_order: &[usize]) {
    if usize::from(p.size) != new_order.len() {
        return;
    }
    let mut new_p = *p;
    let mut map = [0u8; 8];
    for (new_i, &old_i) in new_order.iter().enumerate() {
        if old_i >= usize::from(p.size) {
            return;
        }
        new_p.colors[new_i] = p.colors[old_i];
        map[old_i] = new_i as u8;
    }
    for v in idx.iter_mut() {
        if usize::from(*v) < usize::from(p.size) {
            *v = map[usize::from(*v)];
        }
    }
    *p = new_p;
}

fn for_each_permutation(n: usize, mut f: impl FnMut(&[usize])) {
    // Heap's algorithm; n is at most 4 here.
    let mut order: Vec<usize> = (0..n).collect();
    let mut c = vec![0usize; n];
    f(&order);
    let mut i = 0;
    while i < n {
        if c[i] < i {
            if i % 2 == 0 {
                order.swap(0, i);
            } else {
                order.swap(c[i], i);
            }
            f(&order);
            c[i] += 1;
            i = 0;
        } else {
            c[i] = 0;
            i += 1;
        }
    }
}

/// Try alternative palette orderings and keep the cheapest.
///
/// Candidates: the incoming (frequency-sorted) order, value ascending, value
/// descending, and for sizes 3 and 4 every permutation. Remapping preserves
/// `colors[indices[i]]` for every pixel.
pub fn optimize_palette_order(p: &mut Palette, idx: &mut Vec<u8>, trials: &mut u64, adopted: &mut u64) {
    if p.size <= 1 {
        return;
    }
    *trials += 1;

    let mut best_cost = estimate_local_cost(p, idx);
    let mut best_p = *p;
    let mut best_idx = idx.clone();
    let mut changed = false;

    let size = usize::from(p.size);
    let mut consider = |order: &[usize], p0: &Palette, idx0: &[u8]| {
        let mut cand_p = *p0;
        let mut cand_idx = idx0.to_vec();
        reorder(&mut cand_p, &mut cand_idx, order);
        let cost = estimate_local_cost(&cand_p, &cand_idx);
        if cost < best_cost {
            best_cost = cost;
            best_p = cand_p;
            best_idx = cand_idx;
            changed = true;
        }
    };

    let mut asc: Vec<usize> = (0..size).collect();
    asc.sort_by_key(|&i| p.colors[i]);
    consider(&asc, p, idx);

    let mut desc: Vec<usize> = (0..size).collect();
    desc.sort_by_key(|&i| std::cmp::Reverse(p.colors[i]));
    consider(&desc, p, idx);

    if size == 3 || size == 4 {
        for_each_permutation(size, |order| consider(order, p, idx));
    }

    if changed {
        *p = best_p;
        *idx = best_idx;
        *adopted += 1;
    }
}

fn indices_to_mask64(idx: &[u8]) -> u64 {
    let mut mask = 0u64;
    for (i, &v) in idx.iter().take(64).enumerate() {
        if v & 1 != 0 {
            mask |= 1u64 << i;
        }
    }
    mask
}

fn mask64_to_indices(mask: u64) -> Vec<u8> {
    (0..64).map(|i| ((mask >> i) & 1) as u8).collect()
}

fn bits_for_palette_size(size: usize) -> u32 {
    match size {
        0 | 1 => 0,
        2 => 1,
        3 | 4 => 2,
        _ => 3,
    }
}

/// Encoded stream plus diagnostics.
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct PaletteStreamResult {
    pub bytes: Vec<u8>,
    pub reorder_trials: u64,
    pub reorder_adopted: u64,
    pub used_mask_dict: bool,
    pub used_palette_dict: bool,
    pub wide_colors: bool,
}

/// Serialize palettes and per-block indices, applying reorder optimization
/// and the mask/palette dictionaries when they pay for themselves.
#[allow(clippy::too_many_lines)] // One serializer; the format sections read top to bottom
#[allow(clippy::cast_possible_truncation)] // Dict sizes capped at 255 before narrowing
pub fn encode_palette_stream(
    mut palettes: Vec<Palette>,
    mut indices_list: Vec<Vec<u8>>,
    enable_palette_dict: bool,
) -> PaletteStreamResult {
    let mut result = PaletteStreamResult::default();

    for (p, idx) in palettes.iter_mut().zip(indices_list.iter_mut()) {
        optimize_palette_order(p, idx, &mut result.reorder_trials, &mut result.reorder_adopted);
    }

    if palettes.is_empty() {
        return result;
    }

    let mut flags = 0u8;
    let mut mask_dict: Vec<u64> = Vec::new();
    let mut mask_to_id: HashMap<u64, u8> = HashMap::new();

    let mut dict_overflow = false;
    let mut two_color_blocks = 0usize;
    for (p, idx) in palettes.iter().zip(indices_list.iter()) {
        if p.size != 2 {
            continue;
        }
        two_color_blocks += 1;
        let mask = indices_to_mask64(idx);
        if !mask_to_id.contains_key(&mask) {
            if mask_dict.len() < 255 {
                mask_to_id.insert(mask, mask_dict.len() as u8);
                mask_dict.push(mask);
            } else {
                dict_overflow = true;
            }
        }
    }

    // Dictionary must beat the raw 8 bytes per 2-color block and must be
    // able to represent every mask.
    if two_color_blocks > 0 && !mask_dict.is_empty() && !dict_overflow {
        let raw_size = two_color_blocks * 8;
        let dict_size = 1 + mask_dict.len() * 8 + two_color_blocks;
        if dict_size < raw_size {
            flags |= FLAG_MASK_DICT;
        }
    }

    let wide_colors = palettes
        .iter()
        .any(|p| p.colors[..usize::from(p.size)].iter().any(|&c| !(-128..=127).contains(&c)));

    // Palette dictionary for recurring non-consecutive palettes (v3).
    let mut palette_dict: Vec<Palette> = Vec::new();
    let mut pal_to_id: HashMap<(u8, [i16; 8]), u8> = HashMap::new();
    let mut use_v3 = false;
    if enable_palette_dict {
        let mut nonprev_counts: HashMap<(u8, [i16; 8]), u32> = HashMap::new();
        let mut key_palette: HashMap<(u8, [i16; 8]), Palette> = HashMap::new();

        let mut prev_for_stats = Palette::default();
        for p in &palettes {
            let use_prev = *p == prev_for_stats && p.size > 0;
            if !use_prev && p.size >= 2 {
                let key = p.key();
                *nonprev_counts.entry(key).or_insert(0) += 1;
                key_palette.insert(key, *p);
            }
            if !use_prev {
                prev_for_stats = *p;
            }
        }

        struct PalCand {
            key: (u8, [i16; 8]),
            p: Palette,
            gain: i64,
            count: u32,
        }
        let mut cands: Vec<PalCand> = Vec::with_capacity(nonprev_counts.len());
        for (key, m) in &nonprev_counts {
            let p = key_palette[key];
            if p.size < 2 {
                continue;
            }
            let color_bytes = if wide_colors { 2i64 } else { 1 };
            // Raw: size * color_bytes per occurrence. Dict: 1-byte ref per
            // occurrence plus one dictionary entry [size + colors].
            let entry = i64::from(p.size) * color_bytes;
            let gain = i64::from(*m) * entry - (i64::from(*m) + 1 + entry);
            if gain > 0 {
                cands.push(PalCand {
                    key: *key,
                    p,
                    gain,
                    count: *m,
                });
            }
        }
        cands.sort_by(|a, b| {
            b.gain
                .cmp(&a.gain)
                .then(b.count.cmp(&a.count))
                .then(b.p.size.cmp(&a.p.size))
                .then(a.key.1.cmp(&b.key.1))
        });

        for c in &cands {
            if palette_dict.len() >= 255 {
                break;
            }
            pal_to_id.insert(c.key, palette_dict.len() as u8);
            palette_dict.push(c.p);
        }
        if !palette_dict.is_empty() {
            flags |= FLAG_PALETTE_DICT;
            use_v3 = true;
        }
    }

    let mut out: Vec<u8> = Vec::new();
    let write_color = |out: &mut Vec<u8>, c: i16| {
        if wide_colors {
            out.extend_from_slice(&c.to_le_bytes());
        } else {
            out.push((i32::from(c) + 128) as u8);
        }
    };

    out.push(if wide_colors {
        STREAM_V4_MAGIC
    } else if use_v3 {
        STREAM_V3_MAGIC
    } else {
        STREAM_V2_MAGIC
    });
    out.push(flags);
    if flags & FLAG_MASK_DICT != 0 {
        out.push(mask_dict.len() as u8);
        for mask in &mask_dict {
            out.extend_from_slice(&mask.to_le_bytes());
        }
    }
    if flags & FLAG_PALETTE_DICT != 0 {
        out.push(palette_dict.len() as u8);
        for p in &palette_dict {
            out.push(p.size);
            for k in 0..usize::from(p.size) {
                write_color(&mut out, p.colors[k]);
            }
        }
    }

    let mut prev_pal = Palette::default();
    for (p, idx) in palettes.iter().zip(indices_list.iter()) {
        let use_prev = *p == prev_pal && p.size > 0;
        let mut use_dict_ref = false;
        let mut dict_ref = 0u8;
        if !use_prev && use_v3 && (flags & FLAG_PALETTE_DICT != 0) && p.size >= 2 {
            if let Some(&id) = pal_to_id.get(&p.key()) {
                use_dict_ref = true;
                dict_ref = id;
            }
        }

        let head = (if use_prev { 0x80 } else { 0 })
            | (if use_dict_ref { 0x40 } else { 0 })
            | (p.size.wrapping_sub(1) & 0x07);
        out.push(head);

        if !use_prev {
            if use_dict_ref {
                out.push(dict_ref);
            } else {
                for k in 0..usize::from(p.size) {
                    write_color(&mut out, p.colors[k]);
                }
            }
            prev_pal = *p;
        }

        if p.size <= 1 {
            // Solid block: indices are implicitly all zero.
            continue;
        }

        if p.size == 2 {
            let mask = indices_to_mask64(idx);
            if flags & FLAG_MASK_DICT != 0 {
                out.push(mask_to_id.get(&mask).copied().unwrap_or(0));
            } else {
                out.extend_from_slice(&mask.to_le_bytes());
            }
            continue;
        }

        let bits = bits_for_palette_size(usize::from(p.size));
        let mut bw = BitWriter::new();
        for &v in idx.iter() {
            bw.write(u32::from(v), bits);
        }
        out.extend_from_slice(&bw.finish());
    }

    result.bytes = out;
    result.used_mask_dict = flags & FLAG_MASK_DICT != 0;
    result.used_palette_dict = flags & FLAG_PALETTE_DICT != 0;
    result.wide_colors = wide_colors;
    result
}

/// Decode `num_blocks` palettes and index arrays. Returns `None` on a
/// malformed stream.
#[allow(clippy::too_many_lines)] // Mirror of the serializer
pub fn decode_palette_stream(data: &[u8], num_blocks: usize) -> Option<(Vec<Palette>, Vec<Vec<u8>>)> {
    let mut palettes = Vec::with_capacity(num_blocks);
    let mut indices_list = Vec::with_capacity(num_blocks);
    if data.is_empty() || num_blocks == 0 {
        return Some((palettes, indices_list));
    }

    let magic = data[0];
    if !(STREAM_V2_MAGIC..=STREAM_V4_MAGIC).contains(&magic) {
        return None;
    }
    let is_v3 = magic >= STREAM_V3_MAGIC;
    let is_v4 = magic == STREAM_V4_MAGIC;
    let mut pos = 1usize;
    let flags = *data.get(pos)?;
    pos += 1;

    let mut mask_dict: Vec<u64> = Vec::new();
    if flags & FLAG_MASK_DICT != 0 {
        let count = usize::from(*data.get(pos)?);
        pos += 1;
        for _ in 0..count {
            let bytes = data.get(pos..pos + 8)?;
            mask_dict.push(u64::from_le_bytes(bytes.try_into().ok()?));
            pos += 8;
        }
    }

    let read_color = |data: &[u8], pos: &mut usize| -> Option<i16> {
        if is_v4 {
            let bytes = data.get(*pos..*pos + 2)?;
            *pos += 2;
            Some(i16::from_le_bytes(bytes.try_into().ok()?))
        } else {
            let b = *data.get(*pos)?;
            *pos += 1;
            Some(i16::from(b) - 128)
        }
    };

    let mut palette_dict: Vec<Palette> = Vec::new();
    if is_v3 && flags & FLAG_PALETTE_DICT != 0 {
        let count = usize::from(*data.get(pos)?);
        pos += 1;
        for _ in 0..count {
            let size = *data.get(pos)?;
            pos += 1;
            if size == 0 || size > 8 {
                return None;
            }
            let mut p = Palette {
                size,
                colors: [0; 8],
            };
            for k in 0..usize::from(size) {
                p.colors[k] = read_color(data, &mut pos)?;
            }
            palette_dict.push(p);
        }
    }

    let mut prev_pal = Palette::default();
    for _ in 0..num_blocks {
        if pos >= data.len() {
            break;
        }
        let head = data[pos];
        pos += 1;
        let use_prev = head & 0x80 != 0;
        let use_dict = is_v3 && !use_prev && head & 0x40 != 0;
        let p_size = (head & 0x07) + 1;

        let p = if use_prev {
            prev_pal
        } else if use_dict {
            let dict_idx = usize::from(*data.get(pos)?);
            pos += 1;
            let p = *palette_dict.get(dict_idx)?;
            if p.size != p_size {
                return None;
            }
            prev_pal = p;
            p
        } else {
            let mut p = Palette {
                size: p_size,
                colors: [0; 8],
            };
            for k in 0..usize::from(p_size) {
                p.colors[k] = read_color(data, &mut pos)?;
            }
            prev_pal = p;
            p
        };
        palettes.push(p);

        if p.size <= 1 {
            indices_list.push(vec![0u8; 64]);
            continue;
        }

        if p.size == 2 {
            let mask = if flags & FLAG_MASK_DICT != 0 {
                let id = usize::from(*data.get(pos)?);
                pos += 1;
                mask_dict.get(id).copied().unwrap_or(0)
            } else {
                let bytes = data.get(pos..pos + 8)?;
                pos += 8;
                u64::from_le_bytes(bytes.try_into().ok()?)
            };
            indices_list.push(mask64_to_indices(mask));
            continue;
        }

        let bits = bits_for_palette_size(usize::from(p.size));
        let mut br = BitReader::new(&data[pos..]);
        #[allow(clippy::cast_possible_truncation)] // Index width <= 3 bits
        let idx: Vec<u8> = (0..64).map(|_| br.read(bits) as u8).collect();
        pos += br.bytes_consumed();
        indices_list.push(idx);
    }

    Some((palettes, indices_list))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_from_fn(f: impl Fn(usize) -> i16) -> Vec<i16> {
        (0..64).map(f).collect()
    }

    #[test]
    fn extract_orders_by_frequency_then_value() {
        // 48 copies of 9, 16 copies of 5.
        let block = block_from_fn(|i| if i % 4 == 0 { 5 } else { 9 });
        let p = extract(&block, 8);
        assert_eq!(p.size, 2);
        assert_eq!(p.colors[0], 9);
        assert_eq!(p.colors[1], 5);
    }

    #[test]
    fn extract_tie_breaks_by_ascending_value() {
        let block = block_from_fn(|i| if i % 2 == 0 { 100 } else { 3 });
        let p = extract(&block, 8);
        assert_eq!(p.colors[0], 3);
        assert_eq!(p.colors[1], 100);
    }

    #[test]
    fn extract_fails_above_max_colors() {
        let block = block_from_fn(|i| i as i16);
        assert_eq!(extract(&block, 8).size, 0);
        let four = block_from_fn(|i| (i % 4) as i16);
        assert_eq!(extract(&four, 4).size, 4);
        assert_eq!(extract(&block_from_fn(|i| (i % 5) as i16), 4).size, 0);
    }

    #[test]
    fn reorder_preserves_pixel_values() {
        let block = block_from_fn(|i| [7, -3, 120, 7][i % 4]);
        let mut p = extract(&block, 8);
        let mut idx = map_indices(&block, &p);
        let before: Vec<i16> = idx.iter().map(|&v| p.colors[usize::from(v)]).collect();

        let (mut trials, mut adopted) = (0u64, 0u64);
        optimize_palette_order(&mut p, &mut idx, &mut trials, &mut adopted);
        assert_eq!(trials, 1);

        let after: Vec<i16> = idx.iter().map(|&v| p.colors[usize::from(v)]).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn stream_roundtrip_narrow_colors() {
        let blocks: Vec<Vec<i16>> = vec![
            block_from_fn(|_| 42),
            block_from_fn(|i| if i % 2 == 0 { 10 } else { 100 }),
            block_from_fn(|i| (i % 4) as i16 * 5),
            block_from_fn(|i| if i % 2 == 0 { 10 } else { 100 }),
        ];
        let palettes: Vec<Palette> = blocks.iter().map(|b| extract(b, 8)).collect();
        let indices: Vec<Vec<u8>> = blocks.iter().zip(&palettes).map(|(b, p)| map_indices(b, p)).collect();

        let result = encode_palette_stream(palettes.clone(), indices.clone(), true);
        assert!(!result.wide_colors);

        let (dec_p, dec_idx) = decode_palette_stream(&result.bytes, blocks.len()).unwrap();
        assert_eq!(dec_p.len(), blocks.len());
        for (bi, block) in blocks.iter().enumerate() {
            for (i, &v) in block.iter().enumerate() {
                assert_eq!(dec_p[bi].colors[usize::from(dec_idx[bi][i])], v, "block {bi} pixel {i}");
            }
        }
    }

    #[test]
    fn stream_uses_v4_for_wide_colors() {
        let blocks: Vec<Vec<i16>> = vec![block_from_fn(|i| if i % 2 == 0 { -200 } else { 250 })];
        let palettes: Vec<Palette> = blocks.iter().map(|b| extract(b, 8)).collect();
        let indices: Vec<Vec<u8>> = blocks.iter().zip(&palettes).map(|(b, p)| map_indices(b, p)).collect();

        let result = encode_palette_stream(palettes, indices, true);
        assert!(result.wide_colors);
        assert_eq!(result.bytes[0], STREAM_V4_MAGIC);

        let (dec_p, dec_idx) = decode_palette_stream(&result.bytes, 1).unwrap();
        for (i, &v) in blocks[0].iter().enumerate() {
            assert_eq!(dec_p[0].colors[usize::from(dec_idx[0][i])], v);
        }
    }

    #[test]
    fn mask_dict_adopted_for_repeated_two_color_blocks() {
        // Two identical striped blocks: one dictionary entry, two 1-byte refs.
        let stripe = block_from_fn(|i| if i % 2 == 0 { 10 } else { 100 });
        let palettes: Vec<Palette> = vec![extract(&stripe, 8); 2];
        let indices: Vec<Vec<u8>> = palettes.iter().map(|p| map_indices(&stripe, p)).collect();

        let result = encode_palette_stream(palettes, indices, true);
        assert!(result.used_mask_dict);
        assert_eq!(result.bytes[1] & FLAG_MASK_DICT, FLAG_MASK_DICT);
        // [magic][flags][dict_count=1][mask 8B]...
        assert_eq!(result.bytes[2], 1);
        let mask = u64::from_le_bytes(result.bytes[3..11].try_into().unwrap());
        assert_eq!(mask, 0xAAAA_AAAA_AAAA_AAAA);

        let (dec_p, dec_idx) = decode_palette_stream(&result.bytes, 2).unwrap();
        for bi in 0..2 {
            for (i, &v) in stripe.iter().enumerate() {
                assert_eq!(dec_p[bi].colors[usize::from(dec_idx[bi][i])], v);
            }
        }
    }

    #[test]
    fn palette_dict_catches_recurring_nonconsecutive_palettes() {
        let a = block_from_fn(|i| (i % 3) as i16);
        let b = block_from_fn(|i| (i % 4) as i16 + 50);
        // a, b alternating: neither benefits from same-as-previous.
        let blocks = vec![a.clone(), b.clone(), a.clone(), b.clone(), a, b];
        let palettes: Vec<Palette> = blocks.iter().map(|blk| extract(blk, 8)).collect();
        let indices: Vec<Vec<u8>> = blocks.iter().zip(&palettes).map(|(blk, p)| map_indices(blk, p)).collect();

        let result = encode_palette_stream(palettes, indices, true);
        assert!(result.used_palette_dict);

        let (dec_p, dec_idx) = decode_palette_stream(&result.bytes, blocks.len()).unwrap();
        for (bi, blk) in blocks.iter().enumerate() {
            for (i, &v) in blk.iter().enumerate() {
                assert_eq!(dec_p[bi].colors[usize::from(dec_idx[bi][i])], v);
            }
        }
    }

    #[test]
    fn same_as_previous_chain() {
        let solid = block_from_fn(|_| 7);
        let palettes: Vec<Palette> = vec![extract(&solid, 8); 3];
        let indices: Vec<Vec<u8>> = palettes.iter().map(|p| map_indices(&solid, p)).collect();
        let result = encode_palette_stream(palettes, indices, true);
        // [magic][flags][head][color][head=prev][head=prev]
        assert_eq!(result.bytes.len(), 6);
        assert_eq!(result.bytes[4] & 0x80, 0x80);
        assert_eq!(result.bytes[5] & 0x80, 0x80);
    }
}
