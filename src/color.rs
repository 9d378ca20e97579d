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

//! Reversible RGB <-> YCoCg-R color transform.
//!
//! Integer lifting form: exactly invertible, so the lossless guarantee
//! survives the color path. Y stays in 0..=255, Co/Cg in -255..=255.

/// Forward transform of one pixel.
#[inline]
pub fn rgb_to_ycocg_r(r: u8, g: u8, b: u8) -> (i16, i16, i16) {
    let (r, g, b) = (i16::from(r), i16::from(g), i16::from(b));
    let co = r - b;
    let t = b + (co >> 1);
    let cg = g - t;
    let y = t + (cg >> 1);
    (y, co, cg)
}

/// Inverse transform of one pixel.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Lifting inverse lands back in 0..=255 for valid input
pub fn ycocg_r_to_rgb(y: i16, co: i16, cg: i16) -> (u8, u8, u8) {
    let t = y - (cg >> 1);
    let g = cg + t;
    let b = t - (co >> 1);
    let r = b + co;
    (r as u8, g as u8, b as u8)
}
