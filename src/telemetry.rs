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

//! Per-thread encoder telemetry.
//!
//! Counters and pass timings live in a thread-local block so that parallel
//! plane encodes never contend. Each plane task returns its stats by value
//! and the caller merges them with [`EncodeStats::accumulate_from`].

use std::cell::RefCell;

use crate::lz::ChainLzCounters;

/// Additive counters and wall-clock timings for one encoder thread.
#[derive(Debug, Default, Clone)]
#[allow(missing_docs)] // Counter names are the documentation
pub struct EncodeStats {
    // Pass timings, nanoseconds.
    pub perf_plane_calls: u64,
    pub perf_plane_pad_ns: u64,
    pub perf_plane_block_classify_ns: u64,
    pub perf_plane_filter_rows_ns: u64,
    pub perf_plane_lo_stream_ns: u64,
    pub perf_plane_hi_stream_ns: u64,
    pub perf_plane_stream_wrap_ns: u64,
    pub perf_plane_filter_ids_ns: u64,
    pub perf_plane_pack_ns: u64,
    pub perf_plane_route_compete_ns: u64,
    pub perf_plane_total_ns: u64,
    pub perf_profile_classify_ns: u64,
    pub perf_rgb_to_ycocg_ns: u64,
    pub perf_container_pack_ns: u64,
    pub perf_total_ns: u64,

    // Parallel plane scheduling.
    pub plane_parallel_3way_count: u64,
    pub plane_parallel_2way_count: u64,
    pub plane_parallel_seq_count: u64,
    pub plane_parallel_tokens_sum: u64,

    // Content profile distribution.
    pub profile_ui_tiles: u64,
    pub profile_anime_tiles: u64,
    pub profile_photo_tiles: u64,

    // Block classification outcomes.
    pub blocks_palette: u64,
    pub blocks_copy: u64,
    pub blocks_tile4: u64,
    pub blocks_filter: u64,

    // Palette codec diagnostics.
    pub palette_reorder_trials: u64,
    pub palette_reorder_adopted: u64,
    pub palette_mask_dict_streams: u64,
    pub palette_dict_streams: u64,
    pub palette_wide_color_streams: u64,

    // Stream wrapper mode distribution.
    pub wrapper_raw_count: u64,
    pub wrapper_rans_count: u64,
    pub wrapper_lz_rans_count: u64,
    pub filter_lo_probe_adopted: u64,
    pub filter_hi_sparse_count: u64,
    pub filter_hi_dense_count: u64,

    // Route competition.
    pub route_compete_policy_skip_count: u64,
    pub route_baseline_wins: u64,
    pub route_screen_wins: u64,
    pub route_natural_wins: u64,
    pub route_screen_fail_palette_overflow: u64,
    pub route_screen_fail_index_overhead: u64,

    /// Chained LZ back-end counters.
    pub lz: ChainLzCounters,
}

impl EncodeStats {
    /// Fold another stats block into this one. All fields are additive.
    pub fn accumulate_from(&mut self, other: &EncodeStats) {
        self.perf_plane_calls += other.perf_plane_calls;
        self.perf_plane_pad_ns += other.perf_plane_pad_ns;
        self.perf_plane_block_classify_ns += other.perf_plane_block_classify_ns;
        self.perf_plane_filter_rows_ns += other.perf_plane_filter_rows_ns;
        self.perf_plane_lo_stream_ns += other.perf_plane_lo_stream_ns;
        self.perf_plane_hi_stream_ns += other.perf_plane_hi_stream_ns;
        self.perf_plane_stream_wrap_ns += other.perf_plane_stream_wrap_ns;
        self.perf_plane_filter_ids_ns += other.perf_plane_filter_ids_ns;
        self.perf_plane_pack_ns += other.perf_plane_pack_ns;
        self.perf_plane_route_compete_ns += other.perf_plane_route_compete_ns;
        self.perf_plane_total_ns += other.perf_plane_total_ns;
        self.perf_profile_classify_ns += other.perf_profile_classify_ns;
        self.perf_rgb_to_ycocg_ns += other.perf_rgb_to_ycocg_ns;
        self.perf_container_pack_ns += other.perf_container_pack_ns;
        self.perf_total_ns += other.perf_total_ns;
        self.plane_parallel_3way_count += other.plane_parallel_3way_count;
        self.plane_parallel_2way_count += other.plane_parallel_2way_count;
        self.plane_parallel_seq_count += other.plane_parallel_seq_count;
        self.plane_parallel_tokens_sum += other.plane_parallel_tokens_sum;
        self.profile_ui_tiles += other.profile_ui_tiles;
        self.profile_anime_tiles += other.profile_anime_tiles;
        self.profile_photo_tiles += other.profile_photo_tiles;
        self.blocks_palette += other.blocks_palette;
        self.blocks_copy += other.blocks_copy;
        self.blocks_tile4 += other.blocks_tile4;
        self.blocks_filter += other.blocks_filter;
        self.palette_reorder_trials += other.palette_reorder_trials;
        self.palette_reorder_adopted += other.palette_reorder_adopted;
        self.palette_mask_dict_streams += other.palette_mask_dict_streams;
        self.palette_dict_streams += other.palette_dict_streams;
        self.palette_wide_color_streams += other.palette_wide_color_streams;
        self.wrapper_raw_count += other.wrapper_raw_count;
        self.wrapper_rans_count += other.wrapper_rans_count;
        self.wrapper_lz_rans_count += other.wrapper_lz_rans_count;
        self.filter_lo_probe_adopted += other.filter_lo_probe_adopted;
        self.filter_hi_sparse_count += other.filter_hi_sparse_count;
        self.filter_hi_dense_count += other.filter_hi_dense_count;
        self.route_compete_policy_skip_count += other.route_compete_policy_skip_count;
        self.route_baseline_wins += other.route_baseline_wins;
        self.route_screen_wins += other.route_screen_wins;
        self.route_natural_wins += other.route_natural_wins;
        self.route_screen_fail_palette_overflow += other.route_screen_fail_palette_overflow;
        self.route_screen_fail_index_overhead += other.route_screen_fail_index_overhead;
        self.lz.accumulate_from(&other.lz);
    }
}

thread_local! {
    static STATS: RefCell<EncodeStats> = RefCell::new(EncodeStats::default());
}

/// Run `f` with mutable access to this thread's stats block.
pub fn with_stats<R>(f: impl FnOnce(&mut EncodeStats) -> R) -> R {
    STATS.with(|s| f(&mut s.borrow_mut()))
}

/// Snapshot this thread's stats.
pub fn stats() -> EncodeStats {
    STATS.with(|s| s.borrow().clone())
}

/// Reset this thread's stats to zero.
pub fn reset_stats() {
    STATS.with(|s| *s.borrow_mut() = EncodeStats::default());
}

/// Take this thread's stats, leaving zeroes behind.
pub fn take_stats() -> EncodeStats {
    STATS.with(|s| std::mem::take(&mut *s.borrow_mut()))
}
