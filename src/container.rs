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

//! Output container: 48-byte file header plus a chunk directory of tiles.
//!
//! All multi-byte fields are little-endian. Tile payloads follow the
//! directory in declaration order; the directory carries absolute file
//! offsets.

use bytes::{BufMut, BytesMut};

/// File magic, first four header bytes.
pub const FILE_MAGIC: [u8; 4] = *b"TLC1";
/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 48;

/// Colorspace tag: YCoCg-R (3 planes).
pub const COLORSPACE_YCOCG_R: u8 = 1;
/// Colorspace tag: single grayscale plane. Kept at 2 for container
/// compatibility even though the label reads oddly next to YCoCg-R = 1.
pub const COLORSPACE_GRAYSCALE: u8 = 2;

/// Lossless flag, header `flags` bit 0.
pub const FLAG_LOSSLESS: u8 = 0x01;

/// Fixed-size container header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)] // Fields are the wire format, in order
pub struct FileHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub num_channels: u8,
    pub colorspace: u8,
    pub subsampling: u8,
    pub tile_cols: u16,
    pub tile_rows: u16,
    pub quality: u8,
    pub flags: u8,
    pub pindex_density: u8,
}

impl FileHeader {
    /// Serialize into exactly [`HEADER_SIZE`] bytes.
    pub fn write(&self, out: &mut BytesMut) {
        let start = out.len();
        out.put_slice(&FILE_MAGIC);
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u8(self.bit_depth);
        out.put_u8(self.num_channels);
        out.put_u8(self.colorspace);
        out.put_u8(self.subsampling);
        out.put_u16_le(self.tile_cols);
        out.put_u16_le(self.tile_rows);
        out.put_u8(self.quality);
        out.put_u8(self.flags);
        out.put_u8(self.pindex_density);
        while out.len() - start < HEADER_SIZE {
            out.put_u8(0);
        }
    }

    /// Parse a header from the front of `data`. `None` if short or the
    /// magic does not match.
    pub fn read(data: &[u8]) -> Option<FileHeader> {
        if data.len() < HEADER_SIZE || data[0..4] != FILE_MAGIC {
            return None;
        }
        Some(FileHeader {
            width: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            height: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            bit_depth: data[12],
            num_channels: data[13],
            colorspace: data[14],
            subsampling: data[15],
            tile_cols: u16::from_le_bytes([data[16], data[17]]),
            tile_rows: u16::from_le_bytes([data[18], data[19]]),
            quality: data[20],
            flags: data[21],
            pindex_density: data[22],
        })
    }
}

/// One directory entry: tile tag, absolute offset, payload length.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ChunkEntry {
    pub tag: [u8; 4],
    pub offset: u32,
    pub length: u32,
}

/// Directory of tile chunks following the header.
#[derive(Debug, Clone, Default)]
pub struct ChunkDirectory {
    /// Entries in declaration order.
    pub entries: Vec<ChunkEntry>,
}

impl ChunkDirectory {
    /// Append an entry.
    pub fn add(&mut self, tag: &[u8; 4], offset: u32, length: u32) {
        self.entries.push(ChunkEntry {
            tag: *tag,
            offset,
            length,
        });
    }

    /// Serialized size for `n` entries; needed to pre-compute tile offsets.
    pub fn serialized_size(n: usize) -> usize {
        4 + n * 12
    }

    /// Serialize: `[count: u32][tag 4B][offset: u32][length: u32]...`.
    #[allow(clippy::cast_possible_truncation)] // Entry count bounded by plane count
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(Self::serialized_size(self.entries.len()));
        out.put_u32_le(self.entries.len() as u32);
        for e in &self.entries {
            out.put_slice(&e.tag);
            out.put_u32_le(e.offset);
            out.put_u32_le(e.length);
        }
        out.to_vec()
    }

    /// Parse a directory from the front of `data`.
    pub fn parse(data: &[u8]) -> Option<ChunkDirectory> {
        if data.len() < 4 {
            return None;
        }
        let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let off = 4 + i * 12;
            if data.len() < off + 12 {
                return None;
            }
            entries.push(ChunkEntry {
                tag: [data[off], data[off + 1], data[off + 2], data[off + 3]],
                offset: u32::from_le_bytes([data[off + 4], data[off + 5], data[off + 6], data[off + 7]]),
                length: u32::from_le_bytes([data[off + 8], data[off + 9], data[off + 10], data[off + 11]]),
            });
        }
        Some(ChunkDirectory { entries })
    }
}

/// Assemble a complete file from a header and tile payloads in tag order.
#[allow(clippy::cast_possible_truncation)] // Container offsets are u32 by format
pub fn assemble_file(header: &FileHeader, tiles: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let mut dir = ChunkDirectory::default();
    let dir_size = ChunkDirectory::serialized_size(tiles.len());
    let mut offset = (HEADER_SIZE + dir_size) as u32;
    for (tag, data) in tiles {
        dir.add(tag, offset, data.len() as u32);
        offset += data.len() as u32;
    }
    let dir_data = dir.serialize();

    let mut out = BytesMut::with_capacity(HEADER_SIZE + dir_data.len() + tiles.iter().map(|(_, d)| d.len()).sum::<usize>());
    header.write(&mut out);
    out.put_slice(&dir_data);
    for (_, data) in tiles {
        out.put_slice(data);
    }
    out.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_is_48_bytes() {
        let header = FileHeader {
            width: 1920,
            height: 1080,
            bit_depth: 8,
            num_channels: 3,
            colorspace: COLORSPACE_YCOCG_R,
            subsampling: 0,
            tile_cols: 1,
            tile_rows: 1,
            quality: 0,
            flags: FLAG_LOSSLESS,
            pindex_density: 0,
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(FileHeader::read(&buf).unwrap(), header);
    }

    #[test]
    fn directory_offsets_line_up() {
        let header = FileHeader {
            width: 8,
            height: 8,
            bit_depth: 8,
            num_channels: 3,
            colorspace: COLORSPACE_YCOCG_R,
            flags: FLAG_LOSSLESS,
            ..FileHeader::default()
        };
        let t0 = vec![1u8; 10];
        let t1 = vec![2u8; 20];
        let t2 = vec![3u8; 5];
        let file = assemble_file(&header, &[(b"TIL0", &t0), (b"TIL1", &t1), (b"TIL2", &t2)]);

        let dir = ChunkDirectory::parse(&file[HEADER_SIZE..]).unwrap();
        assert_eq!(dir.entries.len(), 3);
        for (entry, expected) in dir.entries.iter().zip([&t0, &t1, &t2]) {
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            assert_eq!(&file[start..end], expected.as_slice());
        }
        assert_eq!(&dir.entries[0].tag, b"TIL0");
        assert_eq!(&dir.entries[2].tag, b"TIL2");
    }

    #[test]
    fn bad_magic_rejected() {
        let mut buf = BytesMut::new();
        FileHeader::default().write(&mut buf);
        let mut bytes = buf.to_vec();
        bytes[0] = b'X';
        assert!(FileHeader::read(&bytes).is_none());
    }
}
