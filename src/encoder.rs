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

//! Plane driver and the public encoding API.
//!
//! A plane encode is a fixed pass order: pad, classify, filter rows,
//! residual entropy, auxiliary stream wrapping, tile packing, then optional
//! route competition. The driver never fails; the baseline tile is always
//! buildable. Color encodes fan the three YCoCg-R planes across the thread
//! token budget and merge telemetry at join.

use std::time::Instant;

use crate::classify;
use crate::color::rgb_to_ycocg_r;
use crate::config::config;
use crate::container::{
    assemble_file, FileHeader, COLORSPACE_GRAYSCALE, COLORSPACE_YCOCG_R, FLAG_LOSSLESS,
};
use crate::entropy::RansByteStreams;
use crate::error::{CodecError, Result};
use crate::filters::{self, FilterCostModel};
use crate::lz::ChainLzParams;
use crate::palette;
use crate::profile::{analyze_preflight, classify_profile, Profile};
use crate::routes::{self, Preset, PresetPlan};
use crate::telemetry::{self, EncodeStats};
use crate::threading::{ParallelRegionGuard, ThreadTokens};
use crate::tile;
use crate::wrappers;

/// Per-plane encoding options, normally derived from a [`PresetPlan`].
#[derive(Debug, Clone)]
pub struct PlaneOptions {
    /// Evaluate alternate routes after building the baseline tile.
    pub route_compete: bool,
    /// Chroma-plane policy: gate alternates on the preflight statistics.
    pub conservative_chroma: bool,
    /// Natural-route LZ `nice_length` override.
    pub natural_nice_length_override: Option<u8>,
    /// Natural-route LZ match strategy override.
    pub natural_match_strategy_override: Option<u8>,
    /// Row predictor selection cost model.
    pub cost_model: FilterCostModel,
    /// Include the LZ candidate when wrapping the residual low stream.
    pub filter_lo_lz_probe: bool,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            route_compete: true,
            conservative_chroma: false,
            natural_nice_length_override: None,
            natural_match_strategy_override: None,
            cost_model: FilterCostModel::Sad,
            filter_lo_lz_probe: false,
        }
    }
}

impl PlaneOptions {
    /// Options for the luma (or grayscale) plane of a plan.
    pub fn luma(plan: &PresetPlan) -> Self {
        Self {
            route_compete: plan.route_compete_luma,
            conservative_chroma: false,
            natural_nice_length_override: plan.natural_nice_length_override,
            natural_match_strategy_override: plan.natural_match_strategy_override,
            cost_model: plan.filter_row_cost_model,
            filter_lo_lz_probe: plan.filter_lo_lz_probe_enable,
        }
    }

    /// Options for a chroma plane of a plan.
    pub fn chroma(plan: &PresetPlan) -> Self {
        Self {
            route_compete: plan.route_compete_chroma,
            conservative_chroma: plan.conservative_chroma_route_policy,
            ..Self::luma(plan)
        }
    }
}

/// Replicate-pad a plane so both dimensions are multiples of 8.
///
/// An input already padded comes back byte-identical.
pub fn pad_plane(plane: &[i16], width: u32, height: u32) -> (Vec<i16>, usize, usize) {
    let w = width as usize;
    let h = height as usize;
    let pad_w = w.div_ceil(8) * 8;
    let pad_h = h.div_ceil(8) * 8;
    let mut padded = vec![0i16; pad_w * pad_h];
    for y in 0..pad_h {
        let sy = y.min(h - 1);
        let src_row = &plane[sy * w..sy * w + w];
        let dst_row = &mut padded[y * pad_w..(y + 1) * pad_w];
        dst_row[..w].copy_from_slice(src_row);
        let last = src_row[w - 1];
        for v in dst_row[w..].iter_mut() {
            *v = last;
        }
    }
    (padded, pad_w, pad_h)
}

fn elapsed_ns(t: Instant) -> u64 {
    u64::try_from(t.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Encode one plane into its tile. Infallible: soft failures degrade and
/// the baseline tile is always produced.
#[allow(clippy::cast_possible_truncation)] // Residual counts bounded by the padded plane size
pub fn encode_plane_lossless(
    plane: &[i16],
    width: u32,
    height: u32,
    profile: Profile,
    opts: &PlaneOptions,
) -> Vec<u8> {
    let t_total = Instant::now();
    telemetry::with_stats(|s| {
        s.perf_plane_calls += 1;
        match profile {
            Profile::Ui => s.profile_ui_tiles += 1,
            Profile::Anime => s.profile_anime_tiles += 1,
            Profile::Photo => s.profile_photo_tiles += 1,
        }
    });

    let t = Instant::now();
    let (padded, pad_w, pad_h) = pad_plane(plane, width, height);
    let nx = pad_w / 8;
    telemetry::with_stats(|s| s.perf_plane_pad_ns += elapsed_ns(t));

    // Step 1: block classification.
    let t = Instant::now();
    let cls = telemetry::with_stats(|s| classify::classify_blocks(&padded, pad_w, pad_h, profile, s));
    telemetry::with_stats(|s| s.perf_plane_block_classify_ns += elapsed_ns(t));

    // Step 2: block-type-aware row filtering over the full plane.
    let t = Instant::now();
    let rows = filters::build_filter_rows(&padded, pad_w, pad_h, nx, &cls.block_types, profile, opts.cost_model);
    telemetry::with_stats(|s| s.perf_plane_filter_rows_ns += elapsed_ns(t));

    // Step 3: zig-zag residuals, split lo/hi, entropy-code both halves.
    let aux_codec = RansByteStreams::new();
    let filter_pixel_count = rows.residuals.len() as u32;
    let mut lo_stream = Vec::new();
    let mut hi_stream = Vec::new();
    if !rows.residuals.is_empty() {
        let mut lo_bytes = Vec::with_capacity(rows.residuals.len());
        let mut hi_bytes = Vec::with_capacity(rows.residuals.len());
        for &r in &rows.residuals {
            let zz = filters::zigzag_encode(r);
            lo_bytes.push((zz & 0xFF) as u8);
            hi_bytes.push((zz >> 8) as u8);
        }
        let t = Instant::now();
        lo_stream = wrappers::encode_filter_lo_stream(&lo_bytes, &aux_codec, opts.filter_lo_lz_probe);
        telemetry::with_stats(|s| s.perf_plane_lo_stream_ns += elapsed_ns(t));

        let t = Instant::now();
        hi_stream = wrappers::encode_filter_hi_stream(&hi_bytes);
        telemetry::with_stats(|s| s.perf_plane_hi_stream_ns += elapsed_ns(t));
    }

    // Step 4: auxiliary streams (block types, palette, copy, tile4).
    let t = Instant::now();
    let bt_data = wrappers::wrap_stream(&classify::encode_block_types(&cls.block_types), &aux_codec);

    let pal_result = palette::encode_palette_stream(cls.palettes, cls.palette_indices, true);
    telemetry::with_stats(|s| {
        s.palette_reorder_trials += pal_result.reorder_trials;
        s.palette_reorder_adopted += pal_result.reorder_adopted;
        if pal_result.used_mask_dict {
            s.palette_mask_dict_streams += 1;
        }
        if pal_result.used_palette_dict {
            s.palette_dict_streams += 1;
        }
        if pal_result.wide_colors {
            s.palette_wide_color_streams += 1;
        }
    });
    let pal_data = wrappers::wrap_stream(&pal_result.bytes, &aux_codec);

    let cpy_data = wrappers::wrap_stream(&classify::encode_copy_stream(&cls.copy_ops), &aux_codec);
    let tile4_data = wrappers::wrap_stream(&classify::encode_tile4_stream(&cls.tile4_results), &aux_codec);
    telemetry::with_stats(|s| s.perf_plane_stream_wrap_ns += elapsed_ns(t));

    // Step 5: filter ids.
    let t = Instant::now();
    let filter_ids_packed = wrappers::wrap_stream(&rows.filter_ids, &aux_codec);
    telemetry::with_stats(|s| s.perf_plane_filter_ids_ns += elapsed_ns(t));

    // Step 6: baseline tile.
    let t = Instant::now();
    let tile_data = tile::pack_tile_v2(
        &filter_ids_packed,
        &lo_stream,
        &hi_stream,
        filter_pixel_count,
        &bt_data,
        &pal_data,
        &cpy_data,
        &tile4_data,
    );
    telemetry::with_stats(|s| s.perf_plane_pack_ns += elapsed_ns(t));

    if !opts.route_compete {
        telemetry::with_stats(|s| {
            s.route_compete_policy_skip_count += 1;
            s.perf_plane_total_ns += elapsed_ns(t_total);
        });
        return tile_data;
    }

    let metrics = analyze_preflight(plane, width, height);
    if opts.conservative_chroma {
        let c = config();
        let allow = metrics.mean_abs_diff_x100 <= u32::from(c.route_chroma_mad_max_x100)
            && metrics.avg_run_x100 >= u32::from(c.route_chroma_avg_run_min_x100);
        if !allow {
            telemetry::with_stats(|s| {
                s.route_compete_policy_skip_count += 1;
                s.perf_plane_total_ns += elapsed_ns(t_total);
            });
            return tile_data;
        }
    }

    let t = Instant::now();
    let mut lz_params = ChainLzParams::from_config();
    if let Some(nice) = opts.natural_nice_length_override {
        lz_params.nice_length = usize::from(nice);
    }
    if let Some(strategy) = opts.natural_match_strategy_override {
        lz_params.match_strategy = strategy;
    }
    let lo_codec = RansByteStreams::with_lz_params(lz_params);

    let best = routes::choose_best_tile(tile_data, &padded, pad_w, pad_h, profile, &metrics, &lo_codec, &aux_codec);
    telemetry::with_stats(|s| {
        s.perf_plane_route_compete_ns += elapsed_ns(t);
        s.perf_plane_total_ns += elapsed_ns(t_total);
    });
    best
}

struct PlaneTaskResult {
    tile: Vec<u8>,
    stats: EncodeStats,
    elapsed_ns: u64,
}

/// Run one plane encode with isolated telemetry, restoring whatever stats
/// the calling thread had accumulated (the task may run inline).
fn run_plane_task(plane: &[i16], width: u32, height: u32, profile: Profile, opts: &PlaneOptions) -> PlaneTaskResult {
    let saved = telemetry::take_stats();
    let t0 = Instant::now();
    let tile = encode_plane_lossless(plane, width, height, profile, opts);
    let stats = telemetry::take_stats();
    telemetry::with_stats(|s| s.accumulate_from(&saved));
    PlaneTaskResult {
        tile,
        stats,
        elapsed_ns: elapsed_ns(t0),
    }
}

fn check_dimensions(len: usize, width: u32, height: u32, samples_per_pixel: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CodecError::InvalidDimensions { width, height });
    }
    let expected = width as usize * height as usize * samples_per_pixel;
    if len < expected {
        return Err(CodecError::BufferSize {
            got: len,
            expected,
            width,
            height,
        });
    }
    Ok(())
}

/// Encode an 8-bit grayscale image losslessly into a single-tile container.
pub fn encode_lossless(pixels: &[u8], width: u32, height: u32, preset: Preset) -> Result<Vec<u8>> {
    check_dimensions(pixels.len(), width, height, 1)?;
    telemetry::reset_stats();
    let t_total = Instant::now();

    let plane: Vec<i16> = pixels[..width as usize * height as usize]
        .iter()
        .map(|&p| i16::from(p))
        .collect();

    let t = Instant::now();
    let profile = classify_profile(&plane, width, height);
    telemetry::with_stats(|s| s.perf_profile_classify_ns += elapsed_ns(t));

    let plan = routes::build_preset_plan(preset, profile);
    let tile_data = encode_plane_lossless(&plane, width, height, profile, &PlaneOptions::luma(&plan));

    let t = Instant::now();
    let header = FileHeader {
        width,
        height,
        bit_depth: 8,
        num_channels: 1,
        colorspace: COLORSPACE_GRAYSCALE,
        subsampling: 0,
        tile_cols: 1,
        tile_rows: 1,
        quality: 0,
        flags: FLAG_LOSSLESS,
        pindex_density: 0,
    };
    let output = assemble_file(&header, &[(b"TIL0", &tile_data)]);
    telemetry::with_stats(|s| {
        s.perf_container_pack_ns += elapsed_ns(t);
        s.perf_total_ns += elapsed_ns(t_total);
    });
    log::debug!(
        "encode_lossless: {width}x{height} {profile:?} {preset:?} -> {} bytes",
        output.len()
    );
    Ok(output)
}

/// Encode an 8-bit RGB image losslessly via YCoCg-R, one tile per plane.
///
/// Plane encodes fan out over the thread token budget: three tokens run
/// Y/Co/Cg in parallel, two run Y/Co in parallel with Cg inline, otherwise
/// everything is sequential. The output bytes are identical either way.
pub fn encode_color_lossless(rgb: &[u8], width: u32, height: u32, preset: Preset) -> Result<Vec<u8>> {
    check_dimensions(rgb.len(), width, height, 3)?;
    telemetry::reset_stats();
    let t_total = Instant::now();

    let n = width as usize * height as usize;
    let mut y_plane = vec![0i16; n];
    let mut co_plane = vec![0i16; n];
    let mut cg_plane = vec![0i16; n];

    let t = Instant::now();
    for i in 0..n {
        let (y, co, cg) = rgb_to_ycocg_r(rgb[i * 3], rgb[i * 3 + 1], rgb[i * 3 + 2]);
        y_plane[i] = y;
        co_plane[i] = co;
        cg_plane[i] = cg;
    }
    telemetry::with_stats(|s| s.perf_rgb_to_ycocg_ns += elapsed_ns(t));

    let t = Instant::now();
    let profile = classify_profile(&y_plane, width, height);
    telemetry::with_stats(|s| s.perf_profile_classify_ns += elapsed_ns(t));

    let plan = routes::build_preset_plan(preset, profile);
    let luma_opts = PlaneOptions::luma(&plan);
    let chroma_opts = PlaneOptions::chroma(&plan);

    let tokens = ThreadTokens::try_acquire_up_to(3, 2);
    telemetry::with_stats(|s| match &tokens {
        Some(t) if t.count() >= 3 => {
            s.plane_parallel_3way_count += 1;
            s.plane_parallel_tokens_sum += t.count() as u64;
        }
        Some(t) => {
            s.plane_parallel_2way_count += 1;
            s.plane_parallel_tokens_sum += t.count() as u64;
        }
        None => s.plane_parallel_seq_count += 1,
    });

    let (y_res, co_res, cg_res) = if let Some(tokens) = &tokens {
        let three_way = tokens.count() >= 3;
        let (y_join, co_join, cg_join) = std::thread::scope(|scope| {
            let y_handle = scope.spawn(|| {
                let _region = ParallelRegionGuard::enter();
                run_plane_task(&y_plane, width, height, profile, &luma_opts)
            });
            let co_handle = scope.spawn(|| {
                let _region = ParallelRegionGuard::enter();
                run_plane_task(&co_plane, width, height, profile, &chroma_opts)
            });
            if three_way {
                let cg_handle = scope.spawn(|| {
                    let _region = ParallelRegionGuard::enter();
                    run_plane_task(&cg_plane, width, height, profile, &chroma_opts)
                });
                (y_handle.join(), co_handle.join(), cg_handle.join())
            } else {
                let cg = run_plane_task(&cg_plane, width, height, profile, &chroma_opts);
                (y_handle.join(), co_handle.join(), Ok(cg))
            }
        });
        // Every task has completed; now resurface the first panic, if any.
        let y_res = y_join.unwrap_or_else(|e| std::panic::resume_unwind(e));
        let co_res = co_join.unwrap_or_else(|e| std::panic::resume_unwind(e));
        let cg_res = cg_join.unwrap_or_else(|e| std::panic::resume_unwind(e));
        (y_res, co_res, cg_res)
    } else {
        let y_res = run_plane_task(&y_plane, width, height, profile, &luma_opts);
        let co_res = run_plane_task(&co_plane, width, height, profile, &chroma_opts);
        let cg_res = run_plane_task(&cg_plane, width, height, profile, &chroma_opts);
        (y_res, co_res, cg_res)
    };
    drop(tokens);

    telemetry::with_stats(|s| {
        s.accumulate_from(&y_res.stats);
        s.accumulate_from(&co_res.stats);
        s.accumulate_from(&cg_res.stats);
    });
    log::debug!(
        "encode_color_lossless: planes took {} / {} / {} us",
        y_res.elapsed_ns / 1000,
        co_res.elapsed_ns / 1000,
        cg_res.elapsed_ns / 1000
    );

    let t = Instant::now();
    let header = FileHeader {
        width,
        height,
        bit_depth: 8,
        num_channels: 3,
        colorspace: COLORSPACE_YCOCG_R,
        subsampling: 0, // 4:4:4, lossless never subsamples
        tile_cols: 1,
        tile_rows: 1,
        quality: 0,
        flags: FLAG_LOSSLESS,
        pindex_density: 0,
    };
    let output = assemble_file(
        &header,
        &[
            (b"TIL0", &y_res.tile),
            (b"TIL1", &co_res.tile),
            (b"TIL2", &cg_res.tile),
        ],
    );
    telemetry::with_stats(|s| {
        s.perf_container_pack_ns += elapsed_ns(t);
        s.perf_total_ns += elapsed_ns(t_total);
    });
    Ok(output)
}
