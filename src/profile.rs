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

//! Content profiling: cheap plane statistics and the UI/ANIME/PHOTO
//! classification that drives filter candidate sets, route eligibility and
//! classifier thresholds.

use crate::config::config;

/// Content profile of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Screen content: few values, long flat runs.
    Ui,
    /// Flat-shaded art: moderate value count, clean edges.
    Anime,
    /// Natural imagery: dense value distribution, high activity.
    Photo,
}

/// Statistics from one linear pass over a plane. Fixed-point x100 fields
/// avoid float drift across platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreflightMetrics {
    /// Number of distinct sample values.
    pub unique_sample: u32,
    /// Average horizontal run length, x100.
    pub avg_run_x100: u32,
    /// Mean absolute horizontal difference, x100.
    pub mean_abs_diff_x100: u32,
    /// Shannon entropy of the sample histogram (low byte), bits x100.
    pub entropy_hint_x100: u32,
    /// Plane looks indexable by a small global palette.
    pub likely_screen: bool,
}

/// Scan a plane and derive the preflight statistics.
///
/// Runs and differences are measured within rows only, so the metrics are
/// insensitive to plane height and cheap to compute.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Fixed-point ratios bounded by construction
pub fn analyze_preflight(plane: &[i16], width: u32, height: u32) -> PreflightMetrics {
    let w = width as usize;
    let h = height as usize;
    let mut m = PreflightMetrics::default();
    if w == 0 || h == 0 {
        return m;
    }

    // Distinct values over the full i16 range, one bit each.
    let mut seen = vec![0u64; 1024];
    let mut unique = 0u32;
    let mut runs = 0u64;
    let mut abs_diff_sum = 0u64;
    let mut hist = [0u64; 256];

    for row in plane.chunks_exact(w).take(h) {
        let mut prev = row[0];
        runs += 1;
        for &v in row {
            let bits = v as u16;
            let word = usize::from(bits >> 6);
            let bit = 1u64 << (bits & 63);
            if seen[word] & bit == 0 {
                seen[word] |= bit;
                unique += 1;
            }
            hist[usize::from(bits & 0xFF)] += 1;
        }
        for &v in &row[1..] {
            if v != prev {
                runs += 1;
                abs_diff_sum += (i32::from(v) - i32::from(prev)).unsigned_abs() as u64;
            }
            prev = v;
        }
    }

    let total_px = (w * h) as u64;
    let pairs = ((w - 1) * h) as u64;
    m.unique_sample = unique;
    m.avg_run_x100 = ((total_px * 100) / runs.max(1)) as u32;
    m.mean_abs_diff_x100 = if pairs > 0 {
        ((abs_diff_sum * 100) / pairs) as u32
    } else {
        0
    };
    m.entropy_hint_x100 = histogram_entropy_x100(&hist, total_px);
    m.likely_screen = unique <= 64;
    m
}

/// Shannon entropy of a histogram in centibits, via an integer log2
/// approximation (5-bit mantissa), good to a few percent.
fn histogram_entropy_x100(hist: &[u64; 256], total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let mut sum_x100 = 0u64;
    for &count in hist {
        if count == 0 || count == total {
            continue;
        }
        // -log2(count/total) = log2(total) - log2(count)
        let log_ratio_x100 = log2_x100(total) - log2_x100(count);
        sum_x100 += count * log_ratio_x100 / total;
    }
    sum_x100 as u32
}

fn log2_x100(v: u64) -> u64 {
    debug_assert!(v > 0);
    let floor = 63 - u64::from(v.leading_zeros());
    // Linear interpolation on the top mantissa bits.
    let frac = if floor >= 5 { (v >> (floor - 5)) & 31 } else { (v << (5 - floor)) & 31 };
    floor * 100 + frac * 100 / 32
}

/// Classify a plane into a content profile from its preflight statistics.
pub fn classify_profile(plane: &[i16], width: u32, height: u32) -> Profile {
    let m = analyze_preflight(plane, width, height);
    profile_from_metrics(&m)
}

/// Profile decision on already-computed metrics.
pub fn profile_from_metrics(m: &PreflightMetrics) -> Profile {
    if m.unique_sample <= 64 && m.avg_run_x100 >= 300 {
        Profile::Ui
    } else if m.mean_abs_diff_x100 >= 600 || (m.unique_sample >= 200 && m.avg_run_x100 < 150) {
        Profile::Photo
    } else {
        Profile::Anime
    }
}

/// Natural-texture gate: value-rich, short-run, edge-heavy planes that are
/// not screen-indexable.
pub fn is_natural_like(m: &PreflightMetrics) -> bool {
    let c = config();
    !m.likely_screen
        && m.unique_sample >= u32::from(c.natural_unique_min)
        && m.avg_run_x100 <= u32::from(c.natural_avg_run_max_x100)
        && m.mean_abs_diff_x100 >= u32::from(c.natural_mad_min_x100)
        && m.entropy_hint_x100 >= u32::from(c.natural_entropy_min_x100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_plane_is_screen_like_ui() {
        let plane = vec![42i16; 64 * 64];
        let m = analyze_preflight(&plane, 64, 64);
        assert_eq!(m.unique_sample, 1);
        assert!(m.likely_screen);
        assert_eq!(m.mean_abs_diff_x100, 0);
        assert!(m.avg_run_x100 >= 6000);
        assert_eq!(profile_from_metrics(&m), Profile::Ui);
        assert!(!is_natural_like(&m));
    }

    #[test]
    fn noisy_plane_classifies_photo_and_natural() {
        // Deterministic pseudo-noise over the full byte range.
        let plane: Vec<i16> = (0..128 * 128u32)
            .map(|i| i16::from((i.wrapping_mul(2_654_435_761) >> 19) as u8))
            .collect();
        let m = analyze_preflight(&plane, 128, 128);
        assert!(m.unique_sample > 200);
        assert!(!m.likely_screen);
        assert!(m.avg_run_x100 < 150);
        assert_eq!(profile_from_metrics(&m), Profile::Photo);
        assert!(is_natural_like(&m));
    }

    #[test]
    fn striped_two_color_plane_is_ui() {
        let plane: Vec<i16> = (0..64 * 64)
            .map(|i| if (i / 16) % 2 == 0 { 0 } else { 100 })
            .collect();
        let m = analyze_preflight(&plane, 64, 64);
        assert_eq!(m.unique_sample, 2);
        assert!(m.avg_run_x100 >= 1000);
        assert_eq!(profile_from_metrics(&m), Profile::Ui);
    }

    #[test]
    fn negative_chroma_values_counted_distinct() {
        let plane: Vec<i16> = vec![-3, -2, -1, 0, 1, 2, 3, -3];
        let m = analyze_preflight(&plane, 8, 1);
        assert_eq!(m.unique_sample, 7);
    }

    #[test]
    fn entropy_hint_orders_flat_vs_noise() {
        let flat = vec![7i16; 4096];
        let noisy: Vec<i16> = (0..4096u32).map(|i| i16::from((i.wrapping_mul(97) >> 3) as u8)).collect();
        let e_flat = analyze_preflight(&flat, 64, 64).entropy_hint_x100;
        let e_noisy = analyze_preflight(&noisy, 64, 64).entropy_hint_x100;
        assert!(e_flat < e_noisy);
        assert!(e_noisy > 400, "noise should be several bits, got {e_noisy}");
    }
}
