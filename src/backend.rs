// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Collaborator interfaces consumed by the pipeline controller.
//!
//! The bit-level arithmetic decoder, the tile/coefficient parser and the
//! pixel loop filter are external components. They are injected at decoder
//! creation as a [`DecoderBackend`] trait object, alongside an optional set
//! of notification callbacks.

pub mod dummy;

use crate::codec::vp9::context::AboveTileSpan;
use crate::codec::vp9::probs::FrameContext;
use crate::codec::vp9::FrameInfo;
use crate::decoder::vp9::TileState;

/// Binary arithmetic-coding decoder over one entropy-coded partition.
///
/// The engine is opaque to the pipeline: the controller only initializes it
/// over the header partition (which validates the partition marker) and
/// hands it to the compressed-header parser.
pub trait BacEngine: Send {
    /// Primes the engine over `partition`. Fails when the partition cannot
    /// hold the marker or the marker mismatches; the frame is then aborted
    /// before any tile is parsed.
    fn init(&mut self, partition: &[u8]) -> anyhow::Result<()>;

    /// Decodes one symbol against an 8-bit probability.
    fn decode_symbol(&mut self, prob: u8) -> bool;
}

/// Everything one tile worker needs to parse one tile column: the column's
/// tile payloads (one per tile row, top to bottom), its disjoint slice of
/// the shared above contexts, and the previous frame's segment-id map as
/// temporal prediction source.
pub struct TileColumn<'a> {
    pub index: usize,
    pub tiles: Vec<&'a [u8]>,
    pub above: AboveTileSpan<'a>,
    pub prev_seg_ids: &'a [u8],
}

/// The external parsing/filtering collaborator set.
///
/// Implementations must be shareable across tile workers; tile columns are
/// parsed concurrently with disjoint mutable state, everything else runs on
/// the single control path.
pub trait DecoderBackend: Send + Sync {
    /// Creates the arithmetic-decoding engine owned by one ring slot.
    fn new_bac_engine(&self) -> Box<dyn BacEngine>;

    /// Parses the compressed header fields from the header partition,
    /// updating the working probability snapshot with the per-frame
    /// probability updates it carries.
    fn parse_compressed_header(
        &self,
        frame: &FrameInfo,
        bac: &mut dyn BacEngine,
        context: &mut FrameContext,
    ) -> anyhow::Result<()>;

    /// Decodes one tile column's syntax and residuals, accumulating symbol
    /// occurrences into `tile.counts` and writing the column's above
    /// context rows.
    fn parse_tile_column(
        &self,
        frame: &FrameInfo,
        context: &FrameContext,
        tile: &mut TileState,
        column: TileColumn<'_>,
    ) -> anyhow::Result<()>;

    /// Applies this frame's decoded segment ids to the carry-over map.
    /// Invoked on the single control path after all tile workers joined.
    fn update_segment_map(&self, frame: &FrameInfo, map: &mut [u8]) -> anyhow::Result<()>;

    /// Loop-filters the frame's reconstructed samples in place.
    fn loop_filter(&self, frame: &FrameInfo) -> anyhow::Result<()>;
}

pub type SyncCallback = Box<dyn Fn(usize, usize) + Send + Sync>;
pub type DeblockDoneCallback = Box<dyn Fn(usize) -> anyhow::Result<()> + Send + Sync>;
pub type RenderCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Notification callbacks registered at decoder creation. Every operation
/// is optional; an absent one is simply not invoked.
#[derive(Default)]
pub struct CallbackSet {
    /// Frame N's inputs are ready relative to frame N-1; arguments are the
    /// current and previous ring indices.
    pub sync: Option<SyncCallback>,
    /// Deblocking of the given ring index completed; a non-success status
    /// short-circuits the remaining stages of the frame.
    pub deblock_done: Option<DeblockDoneCallback>,
    /// The given ring index is ready for presentation.
    pub render: Option<RenderCallback>,
}
