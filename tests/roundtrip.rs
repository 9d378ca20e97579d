//! End-to-end properties of the encoder: losslessness across routes and
//! presets, determinism, route competition bounds, and the pinned behavior
//! of a few literal inputs.


use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tilecodec::classify::BlockType;
use tilecodec::container::{ChunkDirectory, FileHeader, FLAG_LOSSLESS, HEADER_SIZE};
use tilecodec::encoder::{encode_plane_lossless, PlaneOptions};
use tilecodec::filters::{FILTER_SUB, FILTER_UP};
use tilecodec::palette::{decode_palette_stream, FLAG_MASK_DICT};
use tilecodec::profile::classify_profile;
use tilecodec::tile::{route_id, TileHeader, ROUTE_SCREEN, TILE_HEADER_SIZE};
use tilecodec::wrappers::unwrap_stream;
use tilecodec::{encode_color_lossless, encode_lossless, Preset};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gray_roundtrip(pixels: &[u8], w: u32, h: u32, preset: Preset) {
    let file = encode_lossless(pixels, w, h, preset).unwrap();
    let (header, planes) = decoders::decode_file(&file);
    assert_eq!(header.flags & FLAG_LOSSLESS, FLAG_LOSSLESS);
    let expected: Vec<i16> = pixels.iter().map(|&p| i16::from(p)).collect();
    assert_eq!(planes[0], expected, "{w}x{h} {preset:?}");
}

/// Extract the single tile payload of a grayscale file.
fn single_tile(file: &[u8]) -> Vec<u8> {
    let dir = ChunkDirectory::parse(&file[HEADER_SIZE..]).unwrap();
    let e = &dir.entries[0];
    file[e.offset as usize..(e.offset + e.length) as usize].to_vec()
}

/// Split a baseline tile into its eight named streams.
fn tile_streams(tile: &[u8]) -> (TileHeader, Vec<Vec<u8>>) {
    let header = TileHeader::parse(tile).unwrap();
    let sizes = [
        header.filter_ids_size,
        header.lo_stream_size,
        header.hi_stream_size,
        header.block_types_size,
        header.palette_size,
        header.copy_size,
        header.tile4_size,
    ];
    let mut streams = Vec::new();
    let mut pos = TILE_HEADER_SIZE;
    for s in sizes {
        streams.push(tile[pos..pos + s as usize].to_vec());
        pos += s as usize;
    }
    (header, streams)
}

// ---------------------------------------------------------------------------
// Property 1: round-trip across shapes, content and presets
// ---------------------------------------------------------------------------

#[test]
fn roundtrip_odd_shapes() {
    for &(w, h) in &[(1u32, 1u32), (5, 3), (8, 8), (17, 9), (9, 17), (31, 2)] {
        let pixels: Vec<u8> = (0..w * h).map(|i| (i.wrapping_mul(73) % 256) as u8).collect();
        gray_roundtrip(&pixels, w, h, Preset::Balanced);
    }
}

#[test]
fn roundtrip_all_presets() {
    init_logs();
    let mut rng = StdRng::seed_from_u64(7);
    let mut pixels = vec![0u8; 64 * 64];
    // Half smooth gradient, half noise: exercises both block paths.
    for y in 0..64 {
        for x in 0..64 {
            pixels[y * 64 + x] = if y < 32 {
                ((x + y) * 2) as u8
            } else {
                rng.gen()
            };
        }
    }
    for preset in [Preset::Fast, Preset::Balanced, Preset::Max] {
        gray_roundtrip(&pixels, 64, 64, preset);
    }
}

#[test]
fn roundtrip_color_image() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut rgb = vec![0u8; 48 * 32 * 3];
    for px in rgb.chunks_exact_mut(3) {
        let base: u8 = rng.gen();
        px[0] = base;
        px[1] = base.wrapping_add(rng.gen_range(0..30));
        px[2] = base.wrapping_sub(rng.gen_range(0..30));
    }
    let file = encode_color_lossless(&rgb, 48, 32, Preset::Balanced).unwrap();
    assert_eq!(decoders::decode_color_file(&file), rgb);
}

#[test]
fn roundtrip_color_flat_ui_image() {
    // Saturated flat colors produce wide Co/Cg palettes (v4 color path).
    let mut rgb = vec![0u8; 64 * 64 * 3];
    let swatches: [[u8; 3]; 4] = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
    for y in 0..64 {
        for x in 0..64 {
            let c = swatches[(x / 16 + y / 16) % 4];
            rgb[(y * 64 + x) * 3..(y * 64 + x) * 3 + 3].copy_from_slice(&c);
        }
    }
    for preset in [Preset::Fast, Preset::Balanced] {
        let file = encode_color_lossless(&rgb, 64, 64, preset).unwrap();
        assert_eq!(decoders::decode_color_file(&file), rgb, "{preset:?}");
    }
}

// ---------------------------------------------------------------------------
// Property 2: determinism
// ---------------------------------------------------------------------------

#[test]
fn color_encode_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(23);
    let rgb: Vec<u8> = (0..32 * 24 * 3).map(|_| rng.gen()).collect();
    let a = encode_color_lossless(&rgb, 32, 24, Preset::Balanced).unwrap();
    let b = encode_color_lossless(&rgb, 32, 24, Preset::Balanced).unwrap();
    assert_eq!(a, b);
}

// ---------------------------------------------------------------------------
// Property 7 + scenarios d/e: route competition
// ---------------------------------------------------------------------------

#[test]
fn competition_never_exceeds_baseline() {
    let mut rng = StdRng::seed_from_u64(31);
    for content in 0..3 {
        let plane: Vec<i16> = (0..128 * 128)
            .map(|i| match content {
                0 => i16::from(rng.gen::<u8>()),                   // noise
                1 => [0i16, 60, 130, 200][rng.gen_range(0..4)],    // 4-color
                _ => ((i / 128) % 256) as i16,                     // row gradient
            })
            .collect();
        let profile = classify_profile(&plane, 128, 128);
        let baseline = encode_plane_lossless(
            &plane,
            128,
            128,
            profile,
            &PlaneOptions {
                route_compete: false,
                ..PlaneOptions::default()
            },
        );
        let competed = encode_plane_lossless(&plane, 128, 128, profile, &PlaneOptions::default());
        assert!(
            competed.len() <= baseline.len(),
            "content {content}: {} > {}",
            competed.len(),
            baseline.len()
        );
    }
}

#[test]
fn uniform_noise_keeps_baseline_route() {
    let mut rng = StdRng::seed_from_u64(42);
    let pixels: Vec<u8> = (0..1024 * 1024).map(|_| rng.gen()).collect();
    let file = encode_lossless(&pixels, 1024, 1024, Preset::Balanced).unwrap();
    let tile = single_tile(&file);
    assert_eq!(route_id(&tile), None, "noise must stay on the baseline route");
    let (_, planes) = decoders::decode_file(&file);
    let expected: Vec<i16> = pixels.iter().map(|&p| i16::from(p)).collect();
    assert_eq!(planes[0], expected);
}

#[test]
fn four_color_noise_switches_to_screen_route() {
    init_logs();
    let mut rng = StdRng::seed_from_u64(5);
    let colors = [30u8, 60, 90, 120];
    let pixels: Vec<u8> = (0..512 * 512).map(|_| colors[rng.gen_range(0..4)]).collect();

    let file = encode_lossless(&pixels, 512, 512, Preset::Balanced).unwrap();
    let tile = single_tile(&file);
    assert_eq!(route_id(&tile), Some(ROUTE_SCREEN));

    // The screen tile must actually beat the baseline pipeline.
    let plane: Vec<i16> = pixels.iter().map(|&p| i16::from(p)).collect();
    let profile = classify_profile(&plane, 512, 512);
    let baseline = encode_plane_lossless(
        &plane,
        512,
        512,
        profile,
        &PlaneOptions {
            route_compete: false,
            ..PlaneOptions::default()
        },
    );
    assert!(tile.len() < baseline.len());

    let (_, planes) = decoders::decode_file(&file);
    assert_eq!(planes[0], plane);
}

// ---------------------------------------------------------------------------
// Scenario a: solid 8x8 plane
// ---------------------------------------------------------------------------

#[test]
fn solid_block_pins_palette_stream() {
    // FAST leaves competition off, so the baseline pipeline is observable.
    let pixels = vec![42u8; 64];
    let file = encode_lossless(&pixels, 8, 8, Preset::Fast).unwrap();
    let tile = single_tile(&file);
    assert_eq!(route_id(&tile), None);

    let (header, streams) = tile_streams(&tile);
    assert_eq!(header.filter_pixel_count, 0);
    assert_eq!(header.lo_stream_size, 0);
    assert_eq!(header.hi_stream_size, 0);

    let block_types = unwrap_stream(&streams[3]).unwrap();
    assert_eq!(block_types, vec![BlockType::Palette as u8]);

    let pal_raw = unwrap_stream(&streams[4]).unwrap();
    let (palettes, indices) = decode_palette_stream(&pal_raw, 1).unwrap();
    assert_eq!(palettes[0].size, 1);
    assert_eq!(palettes[0].colors[0], 42);
    assert!(indices[0].iter().all(|&i| i == 0));
}

// ---------------------------------------------------------------------------
// Scenario b: repeated two-color stripes use the mask dictionary
// ---------------------------------------------------------------------------

#[test]
fn striped_blocks_pin_mask_dictionary() {
    // Two 8x8 blocks of 1-px vertical stripes: one dictionary entry holding
    // the alternating mask, referenced by both blocks.
    let pixels: Vec<u8> = (0..16 * 8).map(|i| if i % 2 == 0 { 10 } else { 100 }).collect();
    let file = encode_lossless(&pixels, 16, 8, Preset::Fast).unwrap();
    let tile = single_tile(&file);
    let (_, streams) = tile_streams(&tile);

    let pal_raw = unwrap_stream(&streams[4]).unwrap();
    assert_eq!(pal_raw[1] & FLAG_MASK_DICT, FLAG_MASK_DICT);
    assert_eq!(pal_raw[2], 1, "one mask dictionary entry");
    let mask = u64::from_le_bytes(pal_raw[3..11].try_into().unwrap());
    assert_eq!(mask, 0xAAAA_AAAA_AAAA_AAAA);

    let (palettes, indices) = decode_palette_stream(&pal_raw, 2).unwrap();
    assert_eq!(palettes.len(), 2);
    assert_eq!(palettes[0], palettes[1]);
    for idx in &indices {
        for (i, &v) in idx.iter().enumerate() {
            assert_eq!(palettes[0].colors[usize::from(v)], if i % 2 == 0 { 10 } else { 100 });
        }
    }

    let (_, planes) = decoders::decode_file(&file);
    let expected: Vec<i16> = pixels.iter().map(|&p| i16::from(p)).collect();
    assert_eq!(planes[0], expected);
}

// ---------------------------------------------------------------------------
// Scenario c: horizontal ramp after row-replicating padding
// ---------------------------------------------------------------------------

#[test]
fn ramp_row_pins_sub_filter_and_unit_residuals() {
    let pixels: Vec<u8> = (0..8).collect();
    let file = encode_lossless(&pixels, 8, 1, Preset::Fast).unwrap();
    let tile = single_tile(&file);
    let (header, streams) = tile_streams(&tile);

    // The padded 8x8 block stays on the filter path.
    let block_types = unwrap_stream(&streams[3]).unwrap();
    assert_eq!(block_types, vec![BlockType::Filter as u8]);
    assert_eq!(header.filter_pixel_count, 64);

    let filter_ids = unwrap_stream(&streams[0]).unwrap();
    assert_eq!(filter_ids[0], FILTER_SUB);
    // Replicated rows are predicted exactly by UP.
    assert!(filter_ids[1..].iter().all(|&f| f == FILTER_UP));

    let lo = unwrap_stream(&streams[1]).unwrap();
    // Row 0: zig-zag of [0, 1 x7]; replicated rows are all zero.
    assert_eq!(&lo[..8], &[0, 2, 2, 2, 2, 2, 2, 2]);
    assert!(lo[8..].iter().all(|&b| b == 0));

    let (_, planes) = decoders::decode_file(&file);
    let expected: Vec<i16> = (0..8).collect();
    assert_eq!(planes[0], expected);
}

// ---------------------------------------------------------------------------
// Padding (property 3) through the public API
// ---------------------------------------------------------------------------

#[test]
fn padding_replication_is_invisible_after_crop() {
    // An input needing both row and column padding survives the pad/crop
    // cycle untouched, and an 8-aligned input encodes without any padding
    // artifacts at the edges.
    let mut crop = vec![0u8; 9 * 9];
    for y in 0..9 {
        for x in 0..9 {
            crop[y * 9 + x] = (x * 13 + y * 31) as u8;
        }
    }
    gray_roundtrip(&crop, 9, 9, Preset::Balanced);

    let aligned: Vec<u8> = (0..16 * 16u32).map(|i| (i * 7 % 256) as u8).collect();
    gray_roundtrip(&aligned, 16, 16, Preset::Balanced);
}

// ---------------------------------------------------------------------------
// Header plumbing
// ---------------------------------------------------------------------------

#[test]
fn color_file_has_three_tile_chunks() {
    let rgb = vec![200u8; 8 * 8 * 3];
    let file = encode_color_lossless(&rgb, 8, 8, Preset::Balanced).unwrap();
    let header = FileHeader::read(&file).unwrap();
    assert_eq!(header.num_channels, 3);
    assert_eq!(header.colorspace, 1); // YCoCg-R
    let dir = ChunkDirectory::parse(&file[HEADER_SIZE..]).unwrap();
    let tags: Vec<&[u8; 4]> = dir.entries.iter().map(|e| &e.tag).collect();
    assert_eq!(tags, vec![b"TIL0", b"TIL1", b"TIL2"]);
}
