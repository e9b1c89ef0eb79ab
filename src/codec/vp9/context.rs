// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Row-context buffers shared by tile workers and the cross-frame
//! segmentation carry-over.
//!
//! All buffers here are grow-only: they are provisioned for the widest frame
//! seen so far and reused as-is for narrower frames, with the first tile row
//! of each frame overwriting whatever the previous frame left behind.

use std::mem;
use std::ops::Range;

use log::debug;

use crate::codec::vp9::FrameInfo;
use crate::decoder::DecodeError;

/// Coded planes carrying above entropy context (Y, U, V).
pub const ENTROPY_PLANES: usize = 3;
/// Entropy context is kept per 4x4 block, two entries per B8 column.
pub const ENTROPY_CTX_PER_B8: usize = 2;

fn alloc_zeroed(size: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).map_err(|_| DecodeError::AllocationFailure)?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Splits `buf` into one mutable chunk per bound, `scale` bytes per B8
/// column. Bounds must be ascending and disjoint; anything past the last
/// bound stays unborrowed.
fn chunk_by_bounds<'a>(
    buf: &'a mut [u8],
    bounds: &[Range<usize>],
    scale: usize,
) -> Vec<&'a mut [u8]> {
    let mut chunks = Vec::with_capacity(bounds.len());
    let mut rest = buf;
    let mut pos = 0;

    for bound in bounds {
        let start = bound.start * scale;
        let end = bound.end * scale;
        let (_, tail) = mem::take(&mut rest).split_at_mut(start - pos);
        let (chunk, tail) = tail.split_at_mut(end - start);
        chunks.push(chunk);
        rest = tail;
        pos = end;
    }

    chunks
}

/// The disjoint slice of every above-context buffer covering one tile
/// column, handed to the worker parsing that column.
pub struct AboveTileSpan<'a> {
    /// B8 columns this span covers.
    pub bounds: Range<usize>,
    pub partition: &'a mut [u8],
    pub pred_seg_id: &'a mut [u8],
    pub entropy: [&'a mut [u8]; ENTROPY_PLANES],
}

/// Per-frame above row contexts: partition context and predicted-segment
/// context per B8 column, plus per-plane entropy context. Consumed row by
/// row across the frame and shared (column-disjoint) across tile workers.
#[derive(Default)]
pub struct AboveContexts {
    /// Provisioned width in B8 units. Only ever grows.
    width_b8: usize,
    partition: Vec<u8>,
    pred_seg_id: Vec<u8>,
    /// One contiguous block holding all three planes, each spanning
    /// `width_b8 * ENTROPY_CTX_PER_B8` bytes, so that the U and V spans are
    /// plain offsets from the Y span.
    entropy: Vec<u8>,
}

impl AboveContexts {
    /// Grows all four regions to `width_b8` columns if the current
    /// provisioned width is smaller; otherwise reuses the buffers untouched.
    /// Returns whether a reallocation happened.
    ///
    /// Growth discards the previous contents: they describe a frame of a
    /// different width and the first tile row of this frame overwrites every
    /// column it touches. The reuse path performs no zeroing for the same
    /// reason.
    pub fn ensure_capacity(&mut self, width_b8: usize) -> Result<bool, DecodeError> {
        if width_b8 <= self.width_b8 {
            return Ok(false);
        }

        debug!("growing above contexts: {} -> {} B8 columns", self.width_b8, width_b8);

        self.partition = alloc_zeroed(width_b8)?;
        self.pred_seg_id = alloc_zeroed(width_b8)?;
        self.entropy = alloc_zeroed(width_b8 * ENTROPY_CTX_PER_B8 * ENTROPY_PLANES)?;
        self.width_b8 = width_b8;

        Ok(true)
    }

    pub fn width_b8(&self) -> usize {
        self.width_b8
    }

    pub fn partition(&self) -> &[u8] {
        &self.partition
    }

    pub fn pred_seg_id(&self) -> &[u8] {
        &self.pred_seg_id
    }

    pub fn entropy_plane(&self, plane: usize) -> &[u8] {
        let len = self.width_b8 * ENTROPY_CTX_PER_B8;
        &self.entropy[plane * len..(plane + 1) * len]
    }

    /// Carves the buffers into disjoint per-tile-column spans. The returned
    /// spans can be moved to independent workers; each worker only touches
    /// the columns it owns.
    pub fn split_tile_spans(&mut self, bounds: &[Range<usize>]) -> Vec<AboveTileSpan<'_>> {
        let plane_len = self.width_b8 * ENTROPY_CTX_PER_B8;
        let (y, rest) = self.entropy.split_at_mut(plane_len);
        let (u, v) = rest.split_at_mut(plane_len);

        let partition = chunk_by_bounds(&mut self.partition, bounds, 1);
        let pred_seg_id = chunk_by_bounds(&mut self.pred_seg_id, bounds, 1);
        let y = chunk_by_bounds(y, bounds, ENTROPY_CTX_PER_B8);
        let u = chunk_by_bounds(u, bounds, ENTROPY_CTX_PER_B8);
        let v = chunk_by_bounds(v, bounds, ENTROPY_CTX_PER_B8);

        bounds
            .iter()
            .cloned()
            .zip(partition)
            .zip(pred_seg_id)
            .zip(y.into_iter().zip(u).zip(v))
            .map(|(((bounds, partition), pred_seg_id), ((y, u), v))| AboveTileSpan {
                bounds,
                partition,
                pred_seg_id,
                entropy: [y, u, v],
            })
            .collect()
    }
}

/// The last decoded segment-id map, one byte per 8x8 block on the
/// B64-aligned grid. Persists across frames as the temporal prediction
/// source for segment ids.
#[derive(Default)]
pub struct SegmentMapCarryOver {
    buf: Vec<u8>,
}

impl SegmentMapCarryOver {
    /// Makes the carry-over usable for `frame`.
    ///
    /// On a resolution change the map from the previous frame describes a
    /// different grid: the buffer grows if the new grid exceeds its
    /// capacity, and is zero-filled otherwise. Intra-only and
    /// error-resilient frames zero-fill unconditionally since the previous
    /// map cannot be trusted as a prediction source.
    pub fn prepare(
        &mut self,
        frame: &FrameInfo,
        resolution_changed: bool,
    ) -> Result<(), DecodeError> {
        if resolution_changed {
            let size = frame.b8_cols_aligned * frame.b8_rows_aligned;
            if size > self.buf.len() {
                debug!("growing segment carry-over: {} -> {} bytes", self.buf.len(), size);
                self.buf = alloc_zeroed(size)?;
            } else {
                self.buf.fill(0);
            }
        }

        if frame.intra_only || frame.error_resilient_mode {
            self.buf.fill(0);
        }

        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}
