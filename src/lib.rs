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

//! # tilecodec
//!
//! A content-adaptive lossless image codec. 8-bit grayscale or RGB input is
//! compressed into a tiled container; each plane is encoded by a pipeline
//! that classifies 8x8 blocks (palette / copy / filter), selects per-row
//! predictors, and range-codes the residuals, then competes that baseline
//! tile against two alternate whole-plane routes:
//!
//! - **screen route** - a small global palette plus a range-coded index
//!   plane, for UI-like content;
//! - **natural route** - row-oriented residuals with a shared LZ dictionary,
//!   for textured content.
//!
//! The shortest tile wins. Every route is exactly invertible, so the output
//! is lossless by construction.
//!
//! ## Quick start
//!
//! ```
//! use tilecodec::{encode_lossless, Preset};
//!
//! let pixels = vec![128u8; 64 * 64];
//! let file = encode_lossless(&pixels, 64, 64, Preset::Balanced).unwrap();
//! assert_eq!(&file[..4], b"TLC1");
//! ```
//!
//! ## Presets
//!
//! [`Preset::Fast`] keeps route competition off by default and uses cheap
//! match finding; [`Preset::Balanced`] competes routes on luma;
//! [`Preset::Max`] competes everywhere, selects predictors by an entropy
//! cost model, and lets the LZ back-end try an optimal token parse.
//! Fine-grained tuning is available through `TILECODEC_*` environment
//! variables, parsed once per process (see [`config::Config`]).
//!
//! ## Concurrency
//!
//! Color encodes fan the Y/Co/Cg planes across a process-wide thread token
//! budget. Output bytes never depend on the scheduling that was chosen.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitio;
pub mod classify;
pub mod color;
pub mod config;
pub mod container;
pub mod encoder;
pub mod entropy;
pub mod error;
pub mod filters;
pub mod lz;
pub mod palette;
pub mod profile;
pub mod rans;
pub mod routes;
pub mod telemetry;
pub mod threading;
pub mod tile;
pub mod wrappers;

// Re-exports
pub use encoder::{encode_color_lossless, encode_lossless, encode_plane_lossless, PlaneOptions};
pub use error::{CodecError, Result};
pub use profile::{analyze_preflight, classify_profile, Profile};
pub use routes::{build_preset_plan, Preset, PresetPlan};
