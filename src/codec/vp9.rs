// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VP9 frame-level codec types shared by the pipeline controller and its
//! collaborators: picture parameters as supplied by the caller, the derived
//! per-frame [`FrameInfo`], partition location and tile geometry helpers.

pub mod context;
pub mod probs;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use enumn::N;

use crate::decoder::DecodeError;
use crate::Resolution;

pub const REFS_PER_FRAME: usize = 3;
pub const MAX_REF_FRAMES: usize = 4;

pub const MAX_SEGMENTS: usize = 8;
pub const SEG_TREE_PROBS: usize = MAX_SEGMENTS - 1;
pub const PREDICTION_PROBS: usize = 3;

pub const FRAME_CONTEXTS_LOG2: usize = 2;
pub const FRAME_CONTEXTS: usize = 1 << FRAME_CONTEXTS_LOG2;

/// 8x8 luma blocks are the granularity of the row-context and segment-id
/// buffers.
pub const LOG2_B8_SIZE: usize = 3;
/// Superblocks are 64x64, i.e. 8 B8 units.
pub const B64_SIZE_IN_B8: usize = 8;

pub const MAX_TILE_COLS_LOG2: u8 = 6;

/// Every tile in the tile-data partition except the last is prefixed with
/// its size as a 32-bit big-endian integer.
pub const TILE_SIZE_BYTES: usize = 4;

/// The uncompressed header must at least hold the 2-byte marker required to
/// start the compressed header partition.
pub const MIN_UNCOMPRESSED_HEADER_LEN: usize = 2;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, N)]
pub enum FrameType {
    #[default]
    KeyFrame = 0,
    InterFrame = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
pub enum ReferenceFrameType {
    Intra = 0,
    Last = 1,
    Golden = 2,
    AltRef = 3,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, N)]
pub enum InterpolationFilter {
    #[default]
    EightTap = 0,
    EightTapSmooth = 1,
    EightTapSharp = 2,
    Bilinear = 3,
    Switchable = 4,
}

/// A sub-range of the input bitstream buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: usize,
    pub size: usize,
}

impl ByteRange {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Resolves this range against the buffer it was located in.
    pub fn slice_of<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.end()]
    }
}

/// The two entropy-coded partitions of a VP9 frame: the compressed header
/// partition and the tile-data partition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Partitions {
    pub header: ByteRange,
    pub tiles: ByteRange,
}

impl Partitions {
    /// Computes the header and tile-data partitions from the lengths declared
    /// in the uncompressed header. Pure arithmetic, no allocation.
    ///
    /// Fails when the declared uncompressed header cannot hold the minimum
    /// marker, or when the declared sizes overrun the input buffer.
    pub fn locate(
        uncompressed_header_len: usize,
        first_partition_size: usize,
        bitstream_len: usize,
    ) -> Result<Partitions, DecodeError> {
        if uncompressed_header_len < MIN_UNCOMPRESSED_HEADER_LEN {
            return Err(DecodeError::MalformedInput(format!(
                "uncompressed header too short: {} bytes",
                uncompressed_header_len
            )));
        }

        let header = ByteRange {
            offset: uncompressed_header_len,
            size: first_partition_size,
        };

        if header.end() > bitstream_len {
            return Err(DecodeError::MalformedInput(format!(
                "header partition of {} bytes at offset {} overruns {}-byte input",
                header.size, header.offset, bitstream_len
            )));
        }

        let tiles = ByteRange {
            offset: header.end(),
            size: bitstream_len - header.end(),
        };

        Ok(Partitions { header, tiles })
    }
}

/// Scans the tile-size prefixes of the tile-data partition and returns the
/// byte range of every tile, row-major.
///
/// Each tile but the very last is prefixed with its size as a 32-bit
/// big-endian integer; the last tile extends to the end of the partition.
pub fn scan_tile_ranges(
    data: &[u8],
    tile_rows: usize,
    tile_cols: usize,
) -> Result<Vec<ByteRange>, DecodeError> {
    let num_tiles = tile_rows * tile_cols;
    let mut ranges = Vec::with_capacity(num_tiles);
    let mut offset = 0;

    for tile in 0..num_tiles {
        let is_last = tile == num_tiles - 1;

        let size = if is_last {
            data.len().checked_sub(offset).ok_or_else(|| {
                DecodeError::MalformedInput("tile partition exhausted before last tile".into())
            })?
        } else {
            if offset + TILE_SIZE_BYTES > data.len() {
                return Err(DecodeError::MalformedInput(format!(
                    "truncated tile size prefix for tile {}",
                    tile
                )));
            }
            let size = BigEndian::read_u32(&data[offset..]) as usize;
            offset += TILE_SIZE_BYTES;
            size
        };

        if offset + size > data.len() {
            return Err(DecodeError::MalformedInput(format!(
                "tile {} of {} bytes at offset {} overruns {}-byte partition",
                tile,
                size,
                offset,
                data.len()
            )));
        }

        ranges.push(ByteRange { offset, size });
        offset += size;
    }

    Ok(ranges)
}

/// Returns the B8-column ranges covered by each tile column.
///
/// Tile boundaries are superblock-granular: tile `i` starts at
/// `(i * sb64_cols >> log2) << 3` B8 columns, clipped to the picture width.
pub fn tile_column_bounds(
    tile_cols: usize,
    tile_cols_log2: u8,
    sb64_cols: usize,
    b8_cols: usize,
) -> Vec<std::ops::Range<usize>> {
    let offset = |i: usize| (((i * sb64_cols) >> tile_cols_log2) << LOG2_B8_SIZE).min(b8_cols);

    (0..tile_cols).map(|i| offset(i)..offset(i + 1)).collect()
}

/// Quantizer scales for one plane of one segment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantPair {
    pub dc: u16,
    pub ac: u16,
}

/// Per-segment quantizer values, one pair per plane class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentQuant {
    pub y: QuantPair,
    pub uv: QuantPair,
}

/// Per-segment decode parameters supplied by the caller alongside the
/// picture parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentParameters {
    pub quant: [SegmentQuant; MAX_SEGMENTS],
}

/// Per-frame picture parameters as decoded from the uncompressed header by
/// the (external) bitstream provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureParameters {
    /// Cropped frame width in pixels.
    pub width: u32,
    /// Cropped frame height in pixels.
    pub height: u32,
    pub frame_type: FrameType,
    /// If set, this frame is an intra-only frame. Key frames are implicitly
    /// intra-only.
    pub intra_only: bool,
    pub show_frame: bool,
    pub error_resilient_mode: bool,
    pub frame_parallel_decoding_mode: bool,
    pub reset_frame_context: u8,
    /// Indicates the stored frame context to decode this frame with.
    pub frame_context_idx: u8,
    pub allow_high_precision_mv: bool,
    pub interpolation_filter: InterpolationFilter,
    pub lossless: bool,
    pub tile_cols_log2: u8,
    pub tile_rows_log2: u8,
    /// Size of the uncompressed header in bytes, i.e. the offset of the
    /// compressed header partition.
    pub uncompressed_header_len: usize,
    /// Size of the compressed header (first) partition in bytes.
    pub first_partition_size: usize,
    pub segmentation_enabled: bool,
    pub segmentation_update_map: bool,
    pub segmentation_temporal_update: bool,
    /// Probabilities for decoding segment_id, valid for this frame only.
    pub seg_tree_probs: [u8; SEG_TREE_PROBS],
    /// Probabilities for decoding seg_id_predicted, valid for this frame only.
    pub seg_pred_probs: [u8; PREDICTION_PROBS],
    /// Reference slots used by this frame, ordered Last/Golden/AltRef.
    pub ref_frame_idx: [u8; REFS_PER_FRAME],
    /// Sign bias per reference frame type, indexed by [`ReferenceFrameType`].
    pub ref_frame_sign_bias: [bool; MAX_REF_FRAMES],
}

/// What the pipeline remembers about the previous ring slot's frame when
/// deriving the next [`FrameInfo`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PreviousFrame {
    pub resolution: Resolution,
    pub show_frame: bool,
}

/// Derived, read-mostly decode parameters for one frame. Recomputed in full
/// at the start of every frame and owned by the frame's ring slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Cropped dimensions in pixels.
    pub width: u32,
    pub height: u32,
    /// Dimensions aligned up to the 8-pixel block grid.
    pub aligned_width: u32,
    pub aligned_height: u32,
    /// Picture size in 8x8 block units.
    pub b8_cols: usize,
    pub b8_rows: usize,
    /// B8 grid aligned up to full 64x64 superblocks.
    pub b8_cols_aligned: usize,
    pub b8_rows_aligned: usize,
    pub sb64_cols: usize,

    pub tile_cols_log2: u8,
    pub tile_rows_log2: u8,
    pub tile_cols: usize,
    pub tile_rows: usize,

    pub frame_type: FrameType,
    pub is_key_frame: bool,
    pub intra_only: bool,
    pub show_frame: bool,
    pub error_resilient_mode: bool,
    /// Set when frame-parallel decoding is *requested*, in which case this
    /// frame must not write back its adapted probabilities.
    pub frame_parallel_decoding: bool,
    pub lossless: bool,

    pub frame_context_idx: usize,
    pub reset_frame_context: u8,
    /// Whether the probability context was reset (rather than loaded) for
    /// this frame. Recorded from the return value of the reset-or-load
    /// operation, never inferred from store state.
    pub context_reset: bool,

    pub segmentation_enabled: bool,
    pub segmentation_update_map: bool,
    pub segmentation_temporal_update: bool,

    pub interpolation_filter: InterpolationFilter,
    pub is_switchable_interpolation: bool,
    pub allow_high_precision_mv: bool,
    pub ref_frame_sign_bias: [bool; MAX_REF_FRAMES],
    pub seg_quant: [SegmentQuant; MAX_SEGMENTS],

    pub partitions: Partitions,

    /// Frame type of the previously decoded frame.
    pub last_frame_type: FrameType,
    /// True only if the previous ring slot holds a shown frame of identical
    /// cropped dimensions and this frame is neither intra-only nor
    /// error-resilient.
    pub has_prev_frame: bool,
}

fn align(value: usize, to: usize) -> usize {
    (value + to - 1) & !(to - 1)
}

impl FrameInfo {
    /// Derives the per-frame decode parameters from the caller-supplied
    /// picture parameters and the previous slot's recorded state.
    pub fn derive(
        pic: &PictureParameters,
        seg: &SegmentParameters,
        bitstream_len: usize,
        last_frame_type: FrameType,
        prev: &PreviousFrame,
    ) -> Result<FrameInfo, DecodeError> {
        if pic.tile_cols_log2 > MAX_TILE_COLS_LOG2 {
            return Err(DecodeError::MalformedInput(format!(
                "tile_cols_log2 {} exceeds maximum {}",
                pic.tile_cols_log2, MAX_TILE_COLS_LOG2
            )));
        }

        let partitions = Partitions::locate(
            pic.uncompressed_header_len,
            pic.first_partition_size,
            bitstream_len,
        )?;

        let aligned_width = align(pic.width as usize, 1 << LOG2_B8_SIZE);
        let aligned_height = align(pic.height as usize, 1 << LOG2_B8_SIZE);
        let b8_cols = aligned_width >> LOG2_B8_SIZE;
        let b8_rows = aligned_height >> LOG2_B8_SIZE;
        let b8_cols_aligned = align(b8_cols, B64_SIZE_IN_B8);
        let b8_rows_aligned = align(b8_rows, B64_SIZE_IN_B8);

        let is_key_frame = pic.frame_type == FrameType::KeyFrame;
        let intra_only = is_key_frame || pic.intra_only;

        let has_prev_frame = Resolution { width: pic.width, height: pic.height }
            == prev.resolution
            && !pic.error_resilient_mode
            && !intra_only
            && prev.show_frame;

        Ok(FrameInfo {
            width: pic.width,
            height: pic.height,
            aligned_width: aligned_width as u32,
            aligned_height: aligned_height as u32,
            b8_cols,
            b8_rows,
            b8_cols_aligned,
            b8_rows_aligned,
            sb64_cols: b8_cols_aligned / B64_SIZE_IN_B8,
            tile_cols_log2: pic.tile_cols_log2,
            tile_rows_log2: pic.tile_rows_log2,
            tile_cols: 1 << pic.tile_cols_log2,
            tile_rows: 1 << pic.tile_rows_log2,
            frame_type: pic.frame_type,
            is_key_frame,
            intra_only,
            show_frame: pic.show_frame,
            error_resilient_mode: pic.error_resilient_mode,
            frame_parallel_decoding: pic.frame_parallel_decoding_mode,
            lossless: pic.lossless,
            frame_context_idx: (pic.frame_context_idx as usize) % FRAME_CONTEXTS,
            reset_frame_context: pic.reset_frame_context,
            context_reset: false,
            segmentation_enabled: pic.segmentation_enabled,
            segmentation_update_map: pic.segmentation_update_map,
            segmentation_temporal_update: pic.segmentation_temporal_update,
            interpolation_filter: pic.interpolation_filter,
            is_switchable_interpolation: pic.interpolation_filter
                == InterpolationFilter::Switchable,
            allow_high_precision_mv: pic.allow_high_precision_mv,
            ref_frame_sign_bias: pic.ref_frame_sign_bias,
            seg_quant: seg.quant,
            partitions,
            last_frame_type,
            has_prev_frame,
        })
    }

    pub fn resolution(&self) -> Resolution {
        Resolution { width: self.width, height: self.height }
    }

    /// B8-column ranges of this frame's tile columns.
    pub fn tile_column_bounds(&self) -> Vec<std::ops::Range<usize>> {
        tile_column_bounds(
            self.tile_cols,
            self.tile_cols_log2,
            self.sb64_cols,
            self.b8_cols,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_partitions() {
        let p = Partitions::locate(10, 20, 100).unwrap();
        assert_eq!(p.header, ByteRange { offset: 10, size: 20 });
        assert_eq!(p.tiles, ByteRange { offset: 30, size: 70 });
    }

    #[test]
    fn locate_rejects_short_header() {
        assert!(matches!(
            Partitions::locate(1, 20, 100),
            Err(DecodeError::MalformedInput(_))
        ));
    }

    #[test]
    fn locate_rejects_overrun() {
        assert!(matches!(
            Partitions::locate(10, 200, 100),
            Err(DecodeError::MalformedInput(_))
        ));
    }

    #[test]
    fn tile_scan_single_tile() {
        let data = [0xaau8; 17];
        let ranges = scan_tile_ranges(&data, 1, 1).unwrap();
        assert_eq!(ranges, vec![ByteRange { offset: 0, size: 17 }]);
    }

    #[test]
    fn tile_scan_two_columns() {
        // First tile: 4-byte size prefix (3), then 3 bytes of payload. The
        // last tile takes the remainder with no prefix.
        let data = [0, 0, 0, 3, 1, 2, 3, 9, 9];
        let ranges = scan_tile_ranges(&data, 1, 2).unwrap();
        assert_eq!(ranges[0], ByteRange { offset: 4, size: 3 });
        assert_eq!(ranges[1], ByteRange { offset: 7, size: 2 });
    }

    #[test]
    fn tile_scan_rejects_truncated_prefix() {
        let data = [0, 0];
        assert!(matches!(
            scan_tile_ranges(&data, 1, 2),
            Err(DecodeError::MalformedInput(_))
        ));
    }

    #[test]
    fn tile_scan_rejects_overrun_tile() {
        let data = [0, 0, 0, 200, 1, 2, 3];
        assert!(matches!(
            scan_tile_ranges(&data, 1, 2),
            Err(DecodeError::MalformedInput(_))
        ));
    }

    #[test]
    fn tile_bounds_cover_picture() {
        // 80 B8 columns (640 px), 10 superblock columns, 4 tile columns.
        let bounds = tile_column_bounds(4, 2, 10, 80);
        assert_eq!(bounds.len(), 4);
        assert_eq!(bounds[0].start, 0);
        assert_eq!(bounds[3].end, 80);
        for w in bounds.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
    }

    #[test]
    fn derive_rejects_oversized_tile_grid() {
        let pic = PictureParameters {
            width: 640,
            height: 480,
            tile_cols_log2: MAX_TILE_COLS_LOG2 + 1,
            uncompressed_header_len: 10,
            first_partition_size: 20,
            ..Default::default()
        };
        let prev = PreviousFrame::default();
        assert!(matches!(
            FrameInfo::derive(&pic, &SegmentParameters::default(), 100, FrameType::KeyFrame, &prev),
            Err(DecodeError::MalformedInput(_))
        ));
    }

    #[test]
    fn derive_has_prev_frame_rule() {
        let pic = PictureParameters {
            width: 640,
            height: 480,
            frame_type: FrameType::InterFrame,
            uncompressed_header_len: 10,
            first_partition_size: 20,
            ..Default::default()
        };
        let seg = SegmentParameters::default();

        let vga = Resolution { width: 640, height: 480 };

        let prev = PreviousFrame { resolution: vga, show_frame: true };
        let info =
            FrameInfo::derive(&pic, &seg, 100, FrameType::KeyFrame, &prev).unwrap();
        assert!(info.has_prev_frame);
        assert_eq!(info.b8_cols, 80);
        assert_eq!(info.b8_cols_aligned, 80);
        assert_eq!(info.b8_rows, 60);
        assert_eq!(info.b8_rows_aligned, 64);

        // Dimension mismatch invalidates the previous frame.
        let qvga = Resolution { width: 320, height: 240 };
        let prev = PreviousFrame { resolution: qvga, show_frame: true };
        let info =
            FrameInfo::derive(&pic, &seg, 100, FrameType::KeyFrame, &prev).unwrap();
        assert!(!info.has_prev_frame);

        // So does a hidden previous frame.
        let prev = PreviousFrame { resolution: vga, show_frame: false };
        let info =
            FrameInfo::derive(&pic, &seg, 100, FrameType::KeyFrame, &prev).unwrap();
        assert!(!info.has_prev_frame);

        // And error-resilient or intra-only coding of the current frame.
        let mut er = pic.clone();
        er.error_resilient_mode = true;
        let prev = PreviousFrame { resolution: vga, show_frame: true };
        let info = FrameInfo::derive(&er, &seg, 100, FrameType::KeyFrame, &prev).unwrap();
        assert!(!info.has_prev_frame);

        let mut intra = pic.clone();
        intra.intra_only = true;
        let info =
            FrameInfo::derive(&intra, &seg, 100, FrameType::KeyFrame, &prev).unwrap();
        assert!(!info.has_prev_frame);
    }
}
