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

//! Byte-stream encoder interface used throughout the pipeline.
//!
//! The pipeline never calls a concrete coder directly; it is handed a
//! [`ByteStreamCodec`] so the two entropy paths (plain rANS, LZ-prefixed
//! rANS) stay swappable behind one seam.

use crate::lz::{self, ChainLzParams};
use crate::rans;
use crate::telemetry;

/// Encoder over opaque byte buffers.
///
/// Both operations are pure with respect to the output: the only side
/// effects are telemetry counters.
pub trait ByteStreamCodec {
    /// Range-code `src` with a data-adaptive CDF.
    fn encode(&self, src: &[u8]) -> Vec<u8>;

    /// LZ77-prefix `src` before range coding, letting one dictionary span
    /// the whole stream so repeats across sub-streams amortize.
    fn encode_shared_lz(&self, src: &[u8]) -> Vec<u8>;
}

/// Default implementation over the in-crate rANS and chained-LZ back-ends.
pub struct RansByteStreams {
    lz_params: ChainLzParams,
}

impl RansByteStreams {
    /// Codec with LZ parameters from the config snapshot.
    pub fn new() -> Self {
        Self {
            lz_params: ChainLzParams::from_config(),
        }
    }

    /// Codec with explicit LZ parameters (route-level overrides).
    pub fn with_lz_params(lz_params: ChainLzParams) -> Self {
        Self { lz_params }
    }
}

impl Default for RansByteStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStreamCodec for RansByteStreams {
    fn encode(&self, src: &[u8]) -> Vec<u8> {
        rans::encode_byte_stream(src)
    }

    fn encode_shared_lz(&self, src: &[u8]) -> Vec<u8> {
        let tokens = telemetry::with_stats(|s| lz::compress(src, &self.lz_params, &mut s.lz));
        rans::encode_byte_stream(&tokens)
    }
}

/// Invert [`ByteStreamCodec::encode_shared_lz`].
pub fn decode_shared_lz(data: &[u8]) -> Option<Vec<u8>> {
    let tokens = rans::decode_byte_stream(data)?;
    lz::decompress(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_lz_roundtrip() {
        let codec = RansByteStreams::new();
        let mut src = Vec::new();
        for i in 0u32..500 {
            src.extend_from_slice(b"tile-row-payload");
            src.push((i % 13) as u8);
        }
        let encoded = codec.encode_shared_lz(&src);
        assert_eq!(decode_shared_lz(&encoded).unwrap(), src);
        // Repetitive input should shrink substantially.
        assert!(encoded.len() < src.len() / 4);
    }

    #[test]
    fn plain_encode_roundtrip() {
        let codec = RansByteStreams::new();
        let src: Vec<u8> = (0..1000u32).map(|i| (i % 5) as u8).collect();
        let encoded = codec.encode(&src);
        assert_eq!(rans::decode_byte_stream(&encoded).unwrap(), src);
    }

    #[test]
    fn empty_streams_stay_empty() {
        let codec = RansByteStreams::new();
        assert!(codec.encode(&[]).is_empty());
        assert!(codec.encode_shared_lz(&[]).is_empty());
    }
}
