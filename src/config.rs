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

//! Process-scoped tuning options.
//!
//! All options are read from `TILECODEC_*` environment variables exactly
//! once, on first access, into an immutable snapshot. Every reader in the
//! process observes the same snapshot, so encoder output is a deterministic
//! function of the input and that snapshot. Invalid or out-of-range values
//! silently fall back to the built-in default.

use std::sync::OnceLock;

/// Frozen configuration snapshot. Obtain via [`config()`].
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Field names mirror the TILECODEC_* option names
pub struct Config {
    // Route competition policy.
    pub route_compete_chroma: bool,
    pub route_compete_photo_chroma: bool,
    pub route_compete_chroma_conservative: bool,
    pub fast_route_compete: bool,
    pub fast_route_compete_chroma: bool,
    pub fast_route_compete_chroma_conservative: bool,

    // Preset-level LZ overrides.
    pub fast_lz_nice_length: u8,
    pub fast_lz_match_strategy: u8,
    pub max_lz_match_strategy: u8,

    // filter-lo LZ probe toggles per preset.
    pub fast_filter_lo_lz_probe: bool,
    pub balanced_filter_lo_lz_probe: bool,
    pub max_filter_lo_lz_probe: bool,

    // Chroma preflight gates (x100 fixed point).
    pub route_chroma_mad_max_x100: u16,
    pub route_chroma_avg_run_min_x100: u16,

    // Natural-like texture thresholds (x100 fixed point where noted).
    pub natural_unique_min: u16,
    pub natural_avg_run_max_x100: u16,
    pub natural_mad_min_x100: u16,
    pub natural_entropy_min_x100: u16,

    // Chained LZ back-end tuning.
    pub lz_window_size: u16,
    pub lz_chain_depth: u8,
    pub lz_min_dist_len3: u16,
    pub lz_bias_permille: u16,
    pub lz_nice_length: u8,
    pub lz_match_strategy: u8,
    pub lz_opt_max_matches: u8,
    pub lz_opt_lit_max: u8,
    pub lz_opt_memcap_mb: u32,
    pub lz_opt_probe_src_max_bytes: u32,
    pub lz_opt_probe_ratio_min_x1000: u16,
    pub lz_opt_probe_ratio_max_x1000: u16,
    pub lz_opt_min_gain_bytes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            route_compete_chroma: true,
            route_compete_photo_chroma: false,
            route_compete_chroma_conservative: false,
            fast_route_compete: false,
            fast_route_compete_chroma: false,
            fast_route_compete_chroma_conservative: true,
            fast_lz_nice_length: 64,
            fast_lz_match_strategy: 0,
            max_lz_match_strategy: 1,
            fast_filter_lo_lz_probe: true,
            balanced_filter_lo_lz_probe: false,
            max_filter_lo_lz_probe: true,
            route_chroma_mad_max_x100: 80,
            route_chroma_avg_run_min_x100: 320,
            natural_unique_min: 64,
            natural_avg_run_max_x100: 460,
            natural_mad_min_x100: 20,
            natural_entropy_min_x100: 5,
            lz_window_size: 65535,
            lz_chain_depth: 32,
            lz_min_dist_len3: 128,
            lz_bias_permille: 990,
            lz_nice_length: 255,
            lz_match_strategy: 0,
            lz_opt_max_matches: 4,
            lz_opt_lit_max: 128,
            lz_opt_memcap_mb: 64,
            lz_opt_probe_src_max_bytes: 2 * 1024 * 1024,
            lz_opt_probe_ratio_min_x1000: 20,
            lz_opt_probe_ratio_max_x1000: 80,
            lz_opt_min_gain_bytes: 512,
        }
    }
}

/// Parse an integer option, rejecting malformed or out-of-range values.
fn parse_int_env(key: &str, fallback: i64, min_v: i64, max_v: i64) -> i64 {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => match raw.trim().parse::<i64>() {
            Ok(v) if v >= min_v && v <= max_v => v,
            _ => fallback,
        },
        _ => fallback,
    }
}

/// Parse a boolean option. Accepts 1/true/TRUE/on/ON and 0/false/FALSE/off/OFF.
fn parse_bool_env(key: &str, fallback: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.as_str() {
            "1" | "true" | "TRUE" | "on" | "ON" => true,
            "0" | "false" | "FALSE" | "off" | "OFF" => false,
            _ => fallback,
        },
        _ => fallback,
    }
}

fn load() -> Config {
    let d = Config::default();
    Config {
        route_compete_chroma: parse_bool_env("TILECODEC_ROUTE_COMPETE_CHROMA", d.route_compete_chroma),
        route_compete_photo_chroma: parse_bool_env(
            "TILECODEC_ROUTE_COMPETE_PHOTO_CHROMA",
            d.route_compete_photo_chroma,
        ),
        route_compete_chroma_conservative: parse_bool_env(
            "TILECODEC_ROUTE_COMPETE_CHROMA_CONSERVATIVE",
            d.route_compete_chroma_conservative,
        ),
        fast_route_compete: parse_bool_env("TILECODEC_FAST_ROUTE_COMPETE", d.fast_route_compete),
        fast_route_compete_chroma: parse_bool_env(
            "TILECODEC_FAST_ROUTE_COMPETE_CHROMA",
            d.fast_route_compete_chroma,
        ),
        fast_route_compete_chroma_conservative: parse_bool_env(
            "TILECODEC_FAST_ROUTE_COMPETE_CHROMA_CONSERVATIVE",
            d.fast_route_compete_chroma_conservative,
        ),
        fast_lz_nice_length: parse_int_env("TILECODEC_FAST_LZ_NICE_LENGTH", i64::from(d.fast_lz_nice_length), 4, 255)
            as u8,
        fast_lz_match_strategy: parse_int_env(
            "TILECODEC_FAST_LZ_MATCH_STRATEGY",
            i64::from(d.fast_lz_match_strategy),
            0,
            1,
        ) as u8,
        max_lz_match_strategy: parse_int_env(
            "TILECODEC_MAX_LZ_MATCH_STRATEGY",
            i64::from(d.max_lz_match_strategy),
            0,
            2,
        ) as u8,
        fast_filter_lo_lz_probe: parse_bool_env("TILECODEC_FAST_FILTER_LO_LZ_PROBE", d.fast_filter_lo_lz_probe),
        balanced_filter_lo_lz_probe: parse_bool_env(
            "TILECODEC_BALANCED_FILTER_LO_LZ_PROBE",
            d.balanced_filter_lo_lz_probe,
        ),
        max_filter_lo_lz_probe: parse_bool_env("TILECODEC_MAX_FILTER_LO_LZ_PROBE", d.max_filter_lo_lz_probe),
        route_chroma_mad_max_x100: parse_int_env(
            "TILECODEC_ROUTE_CHROMA_MAD_MAX",
            i64::from(d.route_chroma_mad_max_x100),
            0,
            65535,
        ) as u16,
        route_chroma_avg_run_min_x100: parse_int_env(
            "TILECODEC_ROUTE_CHROMA_AVG_RUN_MIN",
            i64::from(d.route_chroma_avg_run_min_x100),
            0,
            65535,
        ) as u16,
        natural_unique_min: parse_int_env("TILECODEC_NATURAL_UNIQUE_MIN", i64::from(d.natural_unique_min), 0, 65535)
            as u16,
        natural_avg_run_max_x100: parse_int_env(
            "TILECODEC_NATURAL_AVG_RUN_MAX",
            i64::from(d.natural_avg_run_max_x100),
            0,
            65535,
        ) as u16,
        natural_mad_min_x100: parse_int_env(
            "TILECODEC_NATURAL_MAD_MIN",
            i64::from(d.natural_mad_min_x100),
            0,
            65535,
        ) as u16,
        natural_entropy_min_x100: parse_int_env(
            "TILECODEC_NATURAL_ENTROPY_MIN",
            i64::from(d.natural_entropy_min_x100),
            0,
            65535,
        ) as u16,
        lz_window_size: parse_int_env("TILECODEC_LZ_WINDOW_SIZE", i64::from(d.lz_window_size), 1024, 65535) as u16,
        lz_chain_depth: parse_int_env("TILECODEC_LZ_CHAIN_DEPTH", i64::from(d.lz_chain_depth), 1, 128) as u8,
        lz_min_dist_len3: parse_int_env("TILECODEC_LZ_MIN_DIST_LEN3", i64::from(d.lz_min_dist_len3), 0, 65535) as u16,
        lz_bias_permille: parse_int_env("TILECODEC_LZ_BIAS_PERMILLE", i64::from(d.lz_bias_permille), 900, 1100) as u16,
        lz_nice_length: parse_int_env("TILECODEC_LZ_NICE_LENGTH", i64::from(d.lz_nice_length), 4, 255) as u8,
        lz_match_strategy: parse_int_env("TILECODEC_LZ_MATCH_STRATEGY", i64::from(d.lz_match_strategy), 0, 2) as u8,
        lz_opt_max_matches: parse_int_env("TILECODEC_LZ_OPTPARSE_MAX_MATCHES", i64::from(d.lz_opt_max_matches), 1, 32)
            as u8,
        lz_opt_lit_max: parse_int_env("TILECODEC_LZ_OPTPARSE_LIT_MAX", i64::from(d.lz_opt_lit_max), 1, 255) as u8,
        lz_opt_memcap_mb: parse_int_env("TILECODEC_LZ_OPTPARSE_MEMCAP_MB", i64::from(d.lz_opt_memcap_mb), 4, 1024)
            as u32,
        lz_opt_probe_src_max_bytes: parse_int_env(
            "TILECODEC_LZ_OPTPARSE_PROBE_SRC_MAX",
            i64::from(d.lz_opt_probe_src_max_bytes),
            65536,
            64 * 1024 * 1024,
        ) as u32,
        lz_opt_probe_ratio_min_x1000: parse_int_env(
            "TILECODEC_LZ_OPTPARSE_PROBE_RATIO_MIN",
            i64::from(d.lz_opt_probe_ratio_min_x1000),
            0,
            1000,
        ) as u16,
        lz_opt_probe_ratio_max_x1000: parse_int_env(
            "TILECODEC_LZ_OPTPARSE_PROBE_RATIO_MAX",
            i64::from(d.lz_opt_probe_ratio_max_x1000),
            0,
            1000,
        ) as u16,
        lz_opt_min_gain_bytes: parse_int_env(
            "TILECODEC_LZ_OPTPARSE_MIN_GAIN_BYTES",
            i64::from(d.lz_opt_min_gain_bytes),
            0,
            1 << 20,
        ) as u32,
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// The process-wide configuration snapshot, parsed on first access.
pub fn config() -> &'static Config {
    CONFIG.get_or_init(load)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let d = Config::default();
        assert_eq!(d.lz_window_size, 65535);
        assert_eq!(d.lz_chain_depth, 32);
        assert_eq!(d.lz_min_dist_len3, 128);
        assert_eq!(d.lz_nice_length, 255);
        assert_eq!(d.fast_lz_nice_length, 64);
        assert_eq!(d.natural_avg_run_max_x100, 460);
    }

    #[test]
    fn malformed_int_falls_back() {
        // Not set in the environment, so the fallback is returned.
        assert_eq!(parse_int_env("TILECODEC_TEST_UNSET_OPTION", 7, 0, 10), 7);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool_env("TILECODEC_TEST_UNSET_FLAG", true));
        assert!(!parse_bool_env("TILECODEC_TEST_UNSET_FLAG", false));
    }
}
