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

//! Error types for the codec library.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur at the public encoding API.
///
/// The plane encoder itself is infallible: soft failures (route build
/// failures, optimal-parse fallbacks) are absorbed internally and recorded
/// as telemetry counters. Only invalid caller input is surfaced here.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Width or height is zero.
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Input buffer does not match the declared geometry.
    #[error("input buffer size mismatch: got {got} bytes, expected {expected} bytes for {width}x{height} image")]
    BufferSize {
        /// Actual buffer length.
        got: usize,
        /// Required buffer length.
        expected: usize,
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },
}
