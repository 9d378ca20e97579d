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

//! Row-level predictive filtering.
//!
//! Each padded row gets one predictor id chosen over the profile's
//! candidate set, then signed residuals for every pixel that is not covered
//! by an already-encoded anchor block (PALETTE/COPY/TILE4). Prediction
//! context always reads the actual padded samples - anchors reproduce
//! exactly, so their pixels are valid context even though they emit no
//! residuals. Out-of-plane neighbors read as 0.

use crate::classify::{estimate_filter_symbol_bits2, BlockType};
use crate::profile::Profile;

// Predictor ids. The id stored per row is profile-independent; profiles
// only bound how many candidates are tried.

/// Zero predictor.
pub const FILTER_NONE: u8 = 0;
/// Left neighbor.
pub const FILTER_SUB: u8 = 1;
/// Upper neighbor.
pub const FILTER_UP: u8 = 2;
/// Floor average of left and upper neighbors.
pub const FILTER_AVG: u8 = 3;
/// Paeth predictor.
pub const FILTER_PAETH: u8 = 4;
/// Clamped gradient (LOCO-I median).
pub const FILTER_GRAD: u8 = 5;
/// Upper-left neighbor.
pub const FILTER_UPLEFT: u8 = 6;

/// Number of predictor candidates tried for a profile.
pub fn lossless_filter_candidates(profile: Profile) -> u8 {
    match profile {
        Profile::Ui => 5,
        Profile::Anime => 6,
        Profile::Photo => 7,
    }
}

/// Cost model for per-row predictor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterCostModel {
    /// Sum of absolute residuals.
    Sad,
    /// Log-domain symbol cost approximation.
    Entropy,
}

/// Predict one sample from its causal neighbors.
#[inline]
pub fn predict(filter_id: u8, left: i32, up: i32, upleft: i32) -> i32 {
    match filter_id {
        FILTER_NONE => 0,
        FILTER_SUB => left,
        FILTER_UP => up,
        FILTER_AVG => (left + up) >> 1,
        FILTER_PAETH => {
            let p = left + up - upleft;
            let pa = (p - left).abs();
            let pb = (p - up).abs();
            let pc = (p - upleft).abs();
            if pa <= pb && pa <= pc {
                left
            } else if pb <= pc {
                up
            } else {
                upleft
            }
        }
        FILTER_GRAD => {
            // LOCO-I median: gradient clamped to the left/up interval.
            let lo = left.min(up);
            let hi = left.max(up);
            (left + up - upleft).clamp(lo, hi)
        }
        FILTER_UPLEFT => upleft,
        _ => 0,
    }
}

/// Map a signed residual to its interleaved unsigned form.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Interleave is a 16-bit bijection
pub fn zigzag_encode(v: i16) -> u16 {
    ((i32::from(v) << 1) ^ (i32::from(v) >> 15)) as u16
}

/// Inverse of [`zigzag_encode`].
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // Interleave is a 16-bit bijection
pub fn zigzag_decode(z: u16) -> i16 {
    ((z >> 1) as i16) ^ -((z & 1) as i16)
}

/// Per-plane filtering output: one id per padded row, residuals for every
/// non-anchor pixel in raster order.
#[derive(Debug, Default)]
pub struct FilterRows {
    /// Chosen predictor id per padded row.
    pub filter_ids: Vec<u8>,
    /// Signed residuals of non-anchor pixels, raster order.
    pub residuals: Vec<i16>,
}

#[inline]
fn neighbors(padded: &[i16], pad_w: usize, x: usize, y: usize) -> (i32, i32, i32) {
    let left = if x > 0 { i32::from(padded[y * pad_w + x - 1]) } else { 0 };
    let up = if y > 0 { i32::from(padded[(y - 1) * pad_w + x]) } else { 0 };
    let upleft = if x > 0 && y > 0 {
        i32::from(padded[(y - 1) * pad_w + x - 1])
    } else {
        0
    };
    (left, up, upleft)
}

/// Select a predictor per row and emit residuals.
///
/// `block_types` may be empty (no anchors), as in the natural route where
/// the whole plane is filtered.
#[allow(clippy::cast_possible_truncation)] // Residuals of 16-bit samples fit i16
pub fn build_filter_rows(
    padded: &[i16],
    pad_w: usize,
    pad_h: usize,
    nx: usize,
    block_types: &[BlockType],
    profile: Profile,
    cost_model: FilterCostModel,
) -> FilterRows {
    let candidates = lossless_filter_candidates(profile);
    let mut out = FilterRows {
        filter_ids: Vec::with_capacity(pad_h),
        residuals: Vec::new(),
    };

    let is_anchor = |x: usize, y: usize| -> bool {
        if block_types.is_empty() {
            return false;
        }
        let bi = (y / 8) * nx + x / 8;
        block_types[bi] != BlockType::Filter
    };

    for y in 0..pad_h {
        let mut best_id = 0u8;
        let mut best_cost = u64::MAX;
        for f in 0..candidates {
            let mut cost = 0u64;
            for x in 0..pad_w {
                if is_anchor(x, y) {
                    continue;
                }
                let (left, up, upleft) = neighbors(padded, pad_w, x, y);
                let r = i32::from(padded[y * pad_w + x]) - predict(f, left, up, upleft);
                cost += match cost_model {
                    FilterCostModel::Sad => u64::from(r.unsigned_abs()),
                    FilterCostModel::Entropy => u64::from(estimate_filter_symbol_bits2(r.unsigned_abs(), profile)),
                };
                if cost >= best_cost {
                    break;
                }
            }
            if cost < best_cost {
                best_cost = cost;
                best_id = f;
            }
        }

        out.filter_ids.push(best_id);
        for x in 0..pad_w {
            if is_anchor(x, y) {
                continue;
            }
            let (left, up, upleft) = neighbors(padded, pad_w, x, y);
            let r = i32::from(padded[y * pad_w + x]) - predict(best_id, left, up, upleft);
            out.residuals.push(r as i16);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_is_a_bijection_on_edges() {
        for v in [-32768i16, -32767, -2, -1, 0, 1, 2, 255, -255, 32767] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
    }

    #[test]
    fn ramp_rows_pick_sub_then_up() {
        // 8x1 ramp padded to 8x8 by row replication: the first row has no
        // useful up-context and picks SUB with unit residuals; the replicas
        // are predicted exactly by UP.
        let mut padded = vec![0i16; 64];
        for y in 0..8 {
            for x in 0..8 {
                padded[y * 8 + x] = x as i16;
            }
        }
        let rows = build_filter_rows(&padded, 8, 8, 1, &[], Profile::Ui, FilterCostModel::Sad);
        assert_eq!(rows.filter_ids[0], FILTER_SUB);
        assert_eq!(&rows.residuals[..8], &[0, 1, 1, 1, 1, 1, 1, 1]);
        for y in 1..8 {
            assert_eq!(rows.filter_ids[y], FILTER_UP, "row {y}");
            assert!(rows.residuals[y * 8..y * 8 + 8].iter().all(|&r| r == 0));
        }
    }

    #[test]
    fn anchored_pixels_emit_no_residuals() {
        // Two blocks wide; left block is an anchor.
        let mut padded = vec![0i16; 16 * 8];
        for y in 0..8 {
            for x in 0..16 {
                padded[y * 16 + x] = (x * 3) as i16;
            }
        }
        let block_types = [BlockType::Palette, BlockType::Filter];
        let rows = build_filter_rows(&padded, 16, 8, 2, &block_types, Profile::Ui, FilterCostModel::Sad);
        assert_eq!(rows.filter_ids.len(), 8);
        // 8 rows x 8 non-anchor pixels.
        assert_eq!(rows.residuals.len(), 64);
        // Anchor content is still context: x=8 predicts from x=7.
        assert_eq!(rows.filter_ids[0], FILTER_SUB);
        assert_eq!(&rows.residuals[..8], &[3, 3, 3, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn fully_anchored_row_defaults_to_filter_zero() {
        let padded = vec![9i16; 64];
        let rows = build_filter_rows(&padded, 8, 8, 1, &[BlockType::Palette], Profile::Ui, FilterCostModel::Sad);
        assert!(rows.residuals.is_empty());
        assert!(rows.filter_ids.iter().all(|&f| f == FILTER_NONE));
    }

    #[test]
    fn entropy_model_still_reconstructs() {
        let padded: Vec<i16> = (0..64).map(|i| ((i * 7) % 90) as i16).collect();
        let rows = build_filter_rows(&padded, 8, 8, 1, &[], Profile::Photo, FilterCostModel::Entropy);
        // Reconstruct using the recorded ids and residuals.
        let mut recon = vec![0i16; 64];
        let mut ri = 0;
        for y in 0..8 {
            let f = rows.filter_ids[y];
            for x in 0..8 {
                let left = if x > 0 { i32::from(recon[y * 8 + x - 1]) } else { 0 };
                let up = if y > 0 { i32::from(recon[(y - 1) * 8 + x]) } else { 0 };
                let upleft = if x > 0 && y > 0 {
                    i32::from(recon[(y - 1) * 8 + x - 1])
                } else {
                    0
                };
                recon[y * 8 + x] = (predict(f, left, up, upleft) + i32::from(rows.residuals[ri])) as i16;
                ri += 1;
            }
        }
        assert_eq!(recon, padded);
    }

    #[test]
    fn grad_predictor_clamps_to_neighbor_interval() {
        // left=10, up=20, upleft=0 -> raw gradient 30, clamped to 20.
        assert_eq!(predict(FILTER_GRAD, 10, 20, 0), 20);
        // left=10, up=20, upleft=30 -> raw gradient 0, clamped to 10.
        assert_eq!(predict(FILTER_GRAD, 10, 20, 30), 10);
        // In-range gradient passes through.
        assert_eq!(predict(FILTER_GRAD, 10, 20, 15), 15);
    }
}
