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

//! Alternate encoding routes and route competition.
//!
//! The baseline block-classified tile always exists. When competition is
//! enabled, preflight statistics decide which alternates are worth building:
//! the screen route for globally-indexable planes, the natural route for
//! value-rich textures. The shortest tile wins; ties keep the incumbent, so
//! preference runs baseline, then natural, then screen. A route that fails
//! to build is skipped silently and only counted.

use bytes::{BufMut, BytesMut};

use crate::config::config;
use crate::entropy::ByteStreamCodec;
use crate::filters::{self, FilterCostModel};
use crate::profile::{is_natural_like, PreflightMetrics, Profile};
use crate::telemetry;
use crate::tile::{ROUTE_MARKER, ROUTE_NATURAL, ROUTE_SCREEN};
use crate::wrappers;

/// User-facing effort preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Cheapest settings; route competition off unless configured on.
    Fast,
    /// Default trade-off; competition on luma.
    Balanced,
    /// Best compression; competition everywhere, entropy cost model.
    Max,
}

/// Concrete encoder parameterization for one (preset, profile) pair.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Field names match the preset table in the crate docs
pub struct PresetPlan {
    pub route_compete_luma: bool,
    pub route_compete_chroma: bool,
    pub conservative_chroma_route_policy: bool,
    pub natural_nice_length_override: Option<u8>,
    pub natural_match_strategy_override: Option<u8>,
    pub filter_row_cost_model: FilterCostModel,
    pub filter_lo_lz_probe_enable: bool,
}

/// Map a preset and content profile to a plan, honoring the configuration
/// overrides.
pub fn build_preset_plan(preset: Preset, profile: Profile) -> PresetPlan {
    let c = config();
    match preset {
        Preset::Fast => {
            let luma = c.fast_route_compete;
            let chroma = luma && c.fast_route_compete_chroma;
            PresetPlan {
                route_compete_luma: luma,
                route_compete_chroma: chroma,
                conservative_chroma_route_policy: chroma && c.fast_route_compete_chroma_conservative,
                natural_nice_length_override: luma.then_some(c.fast_lz_nice_length),
                natural_match_strategy_override: luma.then_some(c.fast_lz_match_strategy),
                filter_row_cost_model: FilterCostModel::Sad,
                filter_lo_lz_probe_enable: c.fast_filter_lo_lz_probe,
            }
        }
        Preset::Balanced => {
            let mut chroma = c.route_compete_chroma;
            if profile == Profile::Photo && !c.route_compete_photo_chroma {
                chroma = false;
            }
            PresetPlan {
                route_compete_luma: true,
                route_compete_chroma: chroma,
                conservative_chroma_route_policy: c.route_compete_chroma_conservative,
                natural_nice_length_override: None,
                natural_match_strategy_override: None,
                filter_row_cost_model: FilterCostModel::Sad,
                filter_lo_lz_probe_enable: c.balanced_filter_lo_lz_probe,
            }
        }
        Preset::Max => PresetPlan {
            // Max favors compression: competition on every plane.
            route_compete_luma: true,
            route_compete_chroma: true,
            conservative_chroma_route_policy: false,
            natural_nice_length_override: None,
            natural_match_strategy_override: Some(c.max_lz_match_strategy),
            filter_row_cost_model: FilterCostModel::Entropy,
            filter_lo_lz_probe_enable: c.max_filter_lo_lz_probe,
        },
    }
}

/// Why the screen route declined to produce a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenBuildFail {
    /// More than 256 distinct samples.
    PaletteOverflow,
    /// The coded index stream is no smaller than the raw index plane.
    IndexOverhead,
}

/// Build the screen-indexed tile: global palette header plus a range-coded
/// index plane.
#[allow(clippy::cast_possible_truncation)] // Palette count bounded at 256
pub fn encode_screen_indexed_tile_padded(
    padded: &[i16],
    pad_w: usize,
    pad_h: usize,
    codec: &dyn ByteStreamCodec,
) -> Result<Vec<u8>, ScreenBuildFail> {
    let mut colors: Vec<i16> = padded.to_vec();
    colors.sort_unstable();
    colors.dedup();
    if colors.len() > 256 {
        return Err(ScreenBuildFail::PaletteOverflow);
    }

    let indices: Vec<u8> = padded
        .iter()
        .map(|v| colors.binary_search(v).unwrap_or(0) as u8)
        .collect();
    let index_stream = codec.encode(&indices);
    if index_stream.len() >= pad_w * pad_h {
        return Err(ScreenBuildFail::IndexOverhead);
    }

    let mut out = BytesMut::with_capacity(5 + 2 + colors.len() * 2 + index_stream.len());
    out.put_u32_le(ROUTE_MARKER);
    out.put_u8(ROUTE_SCREEN);
    out.put_u16_le(colors.len() as u16);
    for &c in &colors {
        out.put_i16_le(c);
    }
    out.put_slice(&index_stream);
    Ok(out.to_vec())
}

/// Build the natural row-oriented tile: whole-plane row filtering, zig-zag
/// lo/hi split, shared-LZ low stream, sparse-or-dense high stream.
#[allow(clippy::cast_possible_truncation)] // Stream sizes are u32 by format
pub fn encode_natural_row_tile_padded(
    padded: &[i16],
    pad_w: usize,
    pad_h: usize,
    profile: Profile,
    lo_codec: &dyn ByteStreamCodec,
    aux_codec: &dyn ByteStreamCodec,
) -> Vec<u8> {
    let rows = filters::build_filter_rows(padded, pad_w, pad_h, pad_w / 8, &[], profile, FilterCostModel::Sad);

    let mut lo_bytes = Vec::with_capacity(rows.residuals.len());
    let mut hi_bytes = Vec::with_capacity(rows.residuals.len());
    for &r in &rows.residuals {
        let zz = filters::zigzag_encode(r);
        lo_bytes.push((zz & 0xFF) as u8);
        hi_bytes.push((zz >> 8) as u8);
    }

    let fid = wrappers::wrap_stream(&rows.filter_ids, aux_codec);
    let lo = lo_codec.encode_shared_lz(&lo_bytes);
    let hi = wrappers::encode_filter_hi_stream(&hi_bytes);

    let mut out = BytesMut::with_capacity(5 + 12 + fid.len() + lo.len() + hi.len());
    out.put_u32_le(ROUTE_MARKER);
    out.put_u8(ROUTE_NATURAL);
    out.put_u32_le(fid.len() as u32);
    out.put_u32_le(lo.len() as u32);
    out.put_u32_le(hi.len() as u32);
    out.put_slice(&fid);
    out.put_slice(&lo);
    out.put_slice(&hi);
    out.to_vec()
}

/// Run the applicable alternates and keep the shortest tile.
///
/// Both builders are called on demand only; the baseline is never
/// eliminated, and a failed route leaves the incumbent untouched.
pub fn choose_best_tile(
    baseline: Vec<u8>,
    padded: &[i16],
    pad_w: usize,
    pad_h: usize,
    profile: Profile,
    metrics: &PreflightMetrics,
    lo_codec: &dyn ByteStreamCodec,
    aux_codec: &dyn ByteStreamCodec,
) -> Vec<u8> {
    let mut best = baseline;
    let mut winner = "baseline";

    if is_natural_like(metrics) {
        let natural = encode_natural_row_tile_padded(padded, pad_w, pad_h, profile, lo_codec, aux_codec);
        if !natural.is_empty() && natural.len() < best.len() {
            best = natural;
            winner = "natural";
        }
    }

    if metrics.likely_screen {
        match encode_screen_indexed_tile_padded(padded, pad_w, pad_h, aux_codec) {
            Ok(screen) => {
                if screen.len() < best.len() {
                    best = screen;
                    winner = "screen";
                }
            }
            Err(reason) => {
                telemetry::with_stats(|s| match reason {
                    ScreenBuildFail::PaletteOverflow => s.route_screen_fail_palette_overflow += 1,
                    ScreenBuildFail::IndexOverhead => s.route_screen_fail_index_overhead += 1,
                });
            }
        }
    }

    telemetry::with_stats(|s| match winner {
        "screen" => s.route_screen_wins += 1,
        "natural" => s.route_natural_wins += 1,
        _ => s.route_baseline_wins += 1,
    });
    log::debug!("route competition: {winner} tile, {} bytes", best.len());
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::RansByteStreams;
    use crate::profile::analyze_preflight;

    #[test]
    fn preset_plan_matrix() {
        // Defaults: FAST competition is off, BALANCED photo-chroma is off.
        let fast = build_preset_plan(Preset::Fast, Profile::Ui);
        assert!(!fast.route_compete_luma);
        assert_eq!(fast.filter_row_cost_model, FilterCostModel::Sad);
        assert!(fast.filter_lo_lz_probe_enable);
        assert_eq!(fast.natural_nice_length_override, None);

        let balanced = build_preset_plan(Preset::Balanced, Profile::Anime);
        assert!(balanced.route_compete_luma);
        assert!(balanced.route_compete_chroma);
        assert_eq!(balanced.natural_match_strategy_override, None);

        let balanced_photo = build_preset_plan(Preset::Balanced, Profile::Photo);
        assert!(!balanced_photo.route_compete_chroma);

        let max = build_preset_plan(Preset::Max, Profile::Photo);
        assert!(max.route_compete_luma && max.route_compete_chroma);
        assert_eq!(max.filter_row_cost_model, FilterCostModel::Entropy);
        assert_eq!(max.natural_match_strategy_override, Some(1));
    }

    #[test]
    fn screen_route_rejects_wide_palettes() {
        let padded: Vec<i16> = (0..512).map(|i| i as i16).collect();
        let codec = RansByteStreams::new();
        assert_eq!(
            encode_screen_indexed_tile_padded(&padded, 8, 64, &codec),
            Err(ScreenBuildFail::PaletteOverflow)
        );
    }

    #[test]
    fn screen_route_builds_for_few_colors() {
        let padded: Vec<i16> = (0..64 * 64).map(|i| [0i16, 80, 160, 240][(i / 7) % 4]).collect();
        let codec = RansByteStreams::new();
        let tile = encode_screen_indexed_tile_padded(&padded, 64, 64, &codec).unwrap();
        assert_eq!(crate::tile::route_id(&tile), Some(ROUTE_SCREEN));
        // [marker][route][count] then 4 colors.
        assert_eq!(u16::from_le_bytes([tile[5], tile[6]]), 4);
        assert!(tile.len() < 64 * 64);
    }

    #[test]
    fn natural_tile_has_three_streams() {
        let padded: Vec<i16> = (0..64 * 64)
            .map(|i| i16::from((i as u32).wrapping_mul(2_654_435_761u32).to_le_bytes()[2]))
            .collect();
        let codec = RansByteStreams::new();
        let tile = encode_natural_row_tile_padded(&padded, 64, 64, Profile::Photo, &codec, &codec);
        assert_eq!(crate::tile::route_id(&tile), Some(ROUTE_NATURAL));
        let fid_len = u32::from_le_bytes(tile[5..9].try_into().unwrap()) as usize;
        let lo_len = u32::from_le_bytes(tile[9..13].try_into().unwrap()) as usize;
        let hi_len = u32::from_le_bytes(tile[13..17].try_into().unwrap()) as usize;
        assert_eq!(tile.len(), 17 + fid_len + lo_len + hi_len);
    }

    #[test]
    fn competition_never_loses_to_baseline() {
        let padded: Vec<i16> = (0..64 * 64).map(|i| ((i * 37) % 256) as i16).collect();
        let metrics = analyze_preflight(&padded, 64, 64);
        let codec = RansByteStreams::new();
        let baseline = vec![0u8; 100];
        let chosen = choose_best_tile(
            baseline.clone(),
            &padded,
            64,
            64,
            Profile::Anime,
            &metrics,
            &codec,
            &codec,
        );
        assert!(chosen.len() <= baseline.len());
    }
}
