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

//! Sub-stream envelopes.
//!
//! Every secondary stream (filter ids, block types, palette, copy, tile4,
//! filter-lo) is wrapped in the smallest of: raw, rANS-coded, or
//! LZ-then-rANS, identified by a one-byte magic. Selection is deterministic:
//! all candidate sizes are computed, the smallest wins, ties break in the
//! preferred order raw, rANS, LZ+rANS. An empty stream stays empty.
//!
//! The filter-hi stream gets its own sparse-or-dense envelope: residual high
//! bytes are almost always zero, so a non-zero bitmap plus the surviving
//! values usually beats coding the full byte plane.

use crate::config::config;
use crate::entropy::{self, ByteStreamCodec};
use crate::rans;
use crate::telemetry;

/// Wrapper magic: payload is the raw stream.
pub const WRAP_RAW: u8 = 0x00;
/// Wrapper magic: payload is rANS-coded.
pub const WRAP_RANS: u8 = 0x01;
/// Wrapper magic: payload is chain-LZ tokens, rANS-coded.
pub const WRAP_LZ_RANS: u8 = 0x02;

/// Sparse-or-dense magic: rANS of the full byte plane.
pub const HI_DENSE: u8 = 0x00;
/// Sparse-or-dense magic: rANS of `[bitmap][non-zero values]`.
pub const HI_SPARSE: u8 = 0x01;
/// Sparse-or-dense magic: raw byte plane.
pub const HI_RAW: u8 = 0x02;

fn note_mode(mode: u8) {
    telemetry::with_stats(|s| match mode {
        WRAP_RAW => s.wrapper_raw_count += 1,
        WRAP_RANS => s.wrapper_rans_count += 1,
        _ => s.wrapper_lz_rans_count += 1,
    });
}

/// Wrap an auxiliary sub-stream in its smallest envelope.
pub fn wrap_stream(src: &[u8], codec: &dyn ByteStreamCodec) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let rans_payload = codec.encode(src);
    let lz_payload = codec.encode_shared_lz(src);

    let mut best_mode = WRAP_RAW;
    let mut best: &[u8] = src;
    if rans_payload.len() < best.len() {
        best_mode = WRAP_RANS;
        best = &rans_payload;
    }
    if lz_payload.len() < best.len() {
        best_mode = WRAP_LZ_RANS;
        best = &lz_payload;
    }

    note_mode(best_mode);
    log::trace!(
        "wrap_stream: {} bytes -> mode 0x{best_mode:02x}, {} bytes",
        src.len(),
        best.len() + 1
    );

    let mut out = Vec::with_capacity(1 + best.len());
    out.push(best_mode);
    out.extend_from_slice(best);
    out
}

/// Invert [`wrap_stream`]. `None` on unknown magic or a payload that does
/// not decode.
pub fn unwrap_stream(data: &[u8]) -> Option<Vec<u8>> {
    if data.is_empty() {
        return Some(Vec::new());
    }
    let payload = &data[1..];
    match data[0] {
        WRAP_RAW => Some(payload.to_vec()),
        WRAP_RANS => rans::decode_byte_stream(payload),
        WRAP_LZ_RANS => entropy::decode_shared_lz(payload),
        _ => None,
    }
}

/// Wrap the residual low-byte stream.
///
/// Raw and rANS are always candidates; the LZ+rANS probe joins only when the
/// preset enables it, and is adopted only when it clears the configured
/// permille bias over the incumbent.
pub fn encode_filter_lo_stream(src: &[u8], codec: &dyn ByteStreamCodec, lz_probe_enable: bool) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let rans_payload = codec.encode(src);

    let mut best_mode = WRAP_RAW;
    let mut best = src.to_vec();
    if rans_payload.len() < best.len() {
        best_mode = WRAP_RANS;
        best = rans_payload;
    }

    if lz_probe_enable {
        let probe = codec.encode_shared_lz(src);
        let bias = u64::from(config().lz_bias_permille);
        if (probe.len() as u64) * 1000 <= (best.len() as u64) * bias {
            best_mode = WRAP_LZ_RANS;
            best = probe;
            telemetry::with_stats(|s| s.filter_lo_probe_adopted += 1);
        }
    }

    note_mode(best_mode);

    let mut out = Vec::with_capacity(1 + best.len());
    out.push(best_mode);
    out.extend_from_slice(&best);
    out
}

/// Wrap the residual high-byte stream: dense, sparse, or raw, whichever is
/// smallest (ties prefer raw, then dense, then sparse).
pub fn encode_filter_hi_stream(src: &[u8]) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let dense = rans::encode_byte_stream(src);

    let mut sparse_input = vec![0u8; src.len().div_ceil(8)];
    let mut values = Vec::new();
    for (i, &b) in src.iter().enumerate() {
        if b != 0 {
            sparse_input[i / 8] |= 1 << (i % 8);
            values.push(b);
        }
    }
    sparse_input.extend_from_slice(&values);
    let sparse = rans::encode_byte_stream(&sparse_input);

    let mut best_mode = HI_RAW;
    let mut best: &[u8] = src;
    if dense.len() < best.len() {
        best_mode = HI_DENSE;
        best = &dense;
    }
    if sparse.len() < best.len() {
        best_mode = HI_SPARSE;
        best = &sparse;
    }

    telemetry::with_stats(|s| {
        if best_mode == HI_SPARSE {
            s.filter_hi_sparse_count += 1;
        } else {
            s.filter_hi_dense_count += 1;
        }
    });

    let mut out = Vec::with_capacity(1 + best.len());
    out.push(best_mode);
    out.extend_from_slice(best);
    out
}

/// Invert [`encode_filter_hi_stream`]; `expected_len` is the residual count
/// from the tile header.
pub fn decode_filter_hi_stream(data: &[u8], expected_len: usize) -> Option<Vec<u8>> {
    if data.is_empty() {
        return if expected_len == 0 { Some(Vec::new()) } else { None };
    }
    let payload = &data[1..];
    match data[0] {
        HI_RAW => Some(payload.to_vec()),
        HI_DENSE => rans::decode_byte_stream(payload),
        HI_SPARSE => {
            let decoded = rans::decode_byte_stream(payload)?;
            let bitmap_len = expected_len.div_ceil(8);
            if decoded.len() < bitmap_len {
                return None;
            }
            let (bitmap, values) = decoded.split_at(bitmap_len);
            let mut out = Vec::with_capacity(expected_len);
            let mut vi = 0usize;
            for i in 0..expected_len {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    out.push(*values.get(vi)?);
                    vi += 1;
                } else {
                    out.push(0);
                }
            }
            Some(out)
        }
        _ => None,
    }
}
