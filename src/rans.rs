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

//! rANS byte-stream coder with a data-adaptive CDF.
//!
//! Frequencies are measured over the input, quantized to a 12-bit total and
//! serialized ahead of the payload, so every stream is self-contained.
//! 32-bit state, byte-at-a-time renormalization. Symbols are encoded in
//! reverse so the payload decodes forward.
//!
//! # Stream layout
//!
//! ```text
//! [src_len: u32 LE][freq table][state: u32 LE][payload bytes]
//! ```
//!
//! Freq table: mode byte 0 = sparse `[count: u16 LE]` then `(sym: u8,
//! freq: u16 LE)` pairs; mode byte 1 = dense 256 x u16 LE. The encoder picks
//! whichever serializes smaller. An empty input produces an empty stream.

use bytes::{BufMut, BytesMut};

const SCALE_BITS: u32 = 12;
const SCALE: u32 = 1 << SCALE_BITS;
const RANS_L: u32 = 1 << 23;

/// Quantize a histogram to sum exactly [`SCALE`], keeping every present
/// symbol at frequency >= 1.
fn quantize_freqs(counts: &[u64; 256], total: u64) -> [u32; 256] {
    let mut freqs = [0u32; 256];
    let mut sum: u64 = 0;
    for i in 0..256 {
        if counts[i] > 0 {
            let f = ((counts[i] * u64::from(SCALE)) / total).max(1);
            freqs[i] = f as u32;
            sum += f;
        }
    }
    // Settle rounding drift on the most frequent symbols; they can absorb it
    // without any symbol dropping to zero.
    while sum > u64::from(SCALE) {
        let mut best = usize::MAX;
        for i in 0..256 {
            if freqs[i] > 1 && (best == usize::MAX || freqs[i] > freqs[best]) {
                best = i;
            }
        }
        freqs[best] -= 1;
        sum -= 1;
    }
    while sum < u64::from(SCALE) {
        let mut best = usize::MAX;
        for i in 0..256 {
            if freqs[i] > 0 && (best == usize::MAX || freqs[i] > freqs[best]) {
                best = i;
            }
        }
        freqs[best] += 1;
        sum += 1;
    }
    freqs
}

#[allow(clippy::cast_possible_truncation)] // present <= 256, freqs <= 4096
fn serialize_freq_table(out: &mut BytesMut, freqs: &[u32; 256]) {
    let present = freqs.iter().filter(|&&f| f > 0).count();
    if 3 + present * 3 < 1 + 512 {
        out.put_u8(0);
        out.put_u16_le(present as u16);
        for (sym, &f) in freqs.iter().enumerate() {
            if f > 0 {
                out.put_u8(sym as u8);
                out.put_u16_le(f as u16);
            }
        }
    } else {
        out.put_u8(1);
        for &f in freqs.iter() {
            out.put_u16_le(f as u16);
        }
    }
}

/// Parse the freq table; returns (freqs, bytes consumed) or None if truncated.
fn parse_freq_table(data: &[u8]) -> Option<([u32; 256], usize)> {
    let mode = *data.first()?;
    let mut freqs = [0u32; 256];
    match mode {
        0 => {
            if data.len() < 3 {
                return None;
            }
            let count = usize::from(u16::from_le_bytes([data[1], data[2]]));
            let end = 3 + count * 3;
            if data.len() < end {
                return None;
            }
            for i in 0..count {
                let off = 3 + i * 3;
                let sym = usize::from(data[off]);
                freqs[sym] = u32::from(u16::from_le_bytes([data[off + 1], data[off + 2]]));
            }
            Some((freqs, end))
        }
        1 => {
            if data.len() < 1 + 512 {
                return None;
            }
            for (sym, f) in freqs.iter_mut().enumerate() {
                let off = 1 + sym * 2;
                *f = u32::from(u16::from_le_bytes([data[off], data[off + 1]]));
            }
            Some((freqs, 1 + 512))
        }
        _ => None,
    }
}

/// Range-code `src` with a CDF measured from `src` itself.
///
/// Pure: no global state is touched. Empty input yields empty output.
#[allow(clippy::cast_possible_truncation)] // Renorm emits the low byte of the state
pub fn encode_byte_stream(src: &[u8]) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }

    let mut counts = [0u64; 256];
    for &b in src {
        counts[usize::from(b)] += 1;
    }
    let freqs = quantize_freqs(&counts, src.len() as u64);
    let mut cum = [0u32; 257];
    for i in 0..256 {
        cum[i + 1] = cum[i] + freqs[i];
    }

    // Encode back to front so the payload decodes front to back.
    let mut rev = Vec::with_capacity(src.len());
    let mut x: u32 = RANS_L;
    for &b in src.iter().rev() {
        let s = usize::from(b);
        let f = freqs[s];
        let x_max = ((RANS_L >> SCALE_BITS) << 8) * f;
        while x >= x_max {
            rev.push(x as u8);
            x >>= 8;
        }
        x = ((x / f) << SCALE_BITS) + (x % f) + cum[s];
    }

    let mut out = BytesMut::with_capacity(rev.len() + 16);
    out.put_u32_le(src.len() as u32);
    serialize_freq_table(&mut out, &freqs);
    out.put_u32_le(x);
    for &b in rev.iter().rev() {
        out.put_u8(b);
    }
    out.to_vec()
}

/// Decode a stream produced by [`encode_byte_stream`].
///
/// Returns `None` on a malformed stream.
pub fn decode_byte_stream(data: &[u8]) -> Option<Vec<u8>> {
    if data.is_empty() {
        return Some(Vec::new());
    }
    if data.len() < 4 {
        return None;
    }
    let n = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let (freqs, table_len) = parse_freq_table(&data[4..])?;
    let mut pos = 4 + table_len;
    if data.len() < pos + 4 {
        return None;
    }
    let mut x = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
    pos += 4;

    let mut cum = [0u32; 257];
    for i in 0..256 {
        cum[i + 1] = cum[i] + freqs[i];
    }
    if cum[256] != SCALE {
        return None;
    }
    // Slot -> symbol lookup.
    let mut lookup = [0u8; SCALE as usize];
    for s in 0..256u16 {
        let si = usize::from(s);
        for slot in cum[si]..cum[si + 1] {
            lookup[slot as usize] = s as u8;
        }
    }

    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let slot = x & (SCALE - 1);
        let s = lookup[slot as usize];
        out.push(s);
        let si = usize::from(s);
        x = freqs[si] * (x >> SCALE_BITS) + slot - cum[si];
        while x < RANS_L {
            if pos >= data.len() {
                return None;
            }
            x = (x << 8) | u32::from(data[pos]);
            pos += 1;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(src: &[u8]) {
        let encoded = encode_byte_stream(src);
        let decoded = decode_byte_stream(&encoded).expect("decodable");
        assert_eq!(decoded, src);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(encode_byte_stream(&[]).is_empty());
        assert_eq!(decode_byte_stream(&[]), Some(Vec::new()));
    }

    #[test]
    fn roundtrip_single_symbol() {
        roundtrip(&[42u8; 1000]);
    }

    #[test]
    fn roundtrip_two_symbols() {
        let src: Vec<u8> = (0..997).map(|i| if i % 3 == 0 { 7 } else { 200 }).collect();
        roundtrip(&src);
    }

    #[test]
    fn roundtrip_all_byte_values() {
        let src: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        roundtrip(&src);
    }

    #[test]
    fn roundtrip_short_inputs() {
        for n in 1..16 {
            let src: Vec<u8> = (0..n).map(|i| (i * 37) as u8).collect();
            roundtrip(&src);
        }
    }

    #[test]
    fn skewed_data_compresses() {
        let mut src = vec![0u8; 8192];
        for (i, b) in src.iter_mut().enumerate() {
            if i % 61 == 0 {
                *b = 1;
            }
        }
        let encoded = encode_byte_stream(&src);
        assert!(encoded.len() < src.len() / 4, "got {} bytes", encoded.len());
        assert_eq!(decode_byte_stream(&encoded).unwrap(), src);
    }

    #[test]
    fn quantized_freqs_sum_to_scale() {
        let mut counts = [0u64; 256];
        counts[0] = 1;
        counts[1] = 1_000_000;
        counts[200] = 3;
        let freqs = quantize_freqs(&counts, 1_000_004);
        assert_eq!(freqs.iter().sum::<u32>(), SCALE);
        assert!(freqs[0] >= 1 && freqs[200] >= 1);
    }
}
