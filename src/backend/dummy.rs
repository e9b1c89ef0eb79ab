// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A fake backend that records every interaction.
//!
//! Used by pipeline tests to drive [`crate::decoder::vp9::HostDecoder`]
//! without a real entropy decoder or pixel pipeline. Its behavior is fully
//! deterministic so that runs with different worker counts are comparable.

use std::sync::Arc;
use std::sync::Mutex;

use anyhow::anyhow;

use crate::backend::BacEngine;
use crate::backend::DecoderBackend;
use crate::backend::TileColumn;
use crate::codec::vp9::probs::FrameContext;
use crate::codec::vp9::FrameInfo;
use crate::decoder::vp9::TileState;

/// Everything the dummy backend observed, in call order where relevant.
#[derive(Default)]
pub struct Recording {
    /// Tile column indices in the order workers parsed them. Unordered
    /// across workers, ascending within one worker.
    pub parsed_columns: Vec<usize>,
    pub compressed_headers: usize,
    pub loop_filtered: usize,
    pub seg_map_updates: usize,
    /// Per parsed column, whether the previous segment-id map it was handed
    /// read as all zero.
    pub prev_seg_all_zero: Vec<bool>,
}

pub struct DummyBackend {
    pub recording: Arc<Mutex<Recording>>,
    /// Scale for the synthetic symbol counts; 0 leaves all counts at zero so
    /// forward adaptation becomes the identity.
    pub count_weight: u32,
    pub fail_loop_filter: bool,
    /// Value written over the segment carry-over map on update.
    pub seg_map_fill: u8,
}

impl DummyBackend {
    pub fn new() -> Self {
        DummyBackend {
            recording: Arc::new(Mutex::new(Recording::default())),
            count_weight: 1,
            fail_loop_filter: false,
            seg_map_fill: 9,
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts any partition whose first byte has the marker bit cleared.
#[derive(Default)]
pub struct DummyBacEngine {
    initialized: bool,
}

impl BacEngine for DummyBacEngine {
    fn init(&mut self, partition: &[u8]) -> anyhow::Result<()> {
        match partition.first() {
            None => Err(anyhow!("empty header partition")),
            Some(byte) if byte & 0x80 != 0 => Err(anyhow!("partition marker mismatch")),
            Some(_) => {
                self.initialized = true;
                Ok(())
            }
        }
    }

    fn decode_symbol(&mut self, prob: u8) -> bool {
        prob >= 128
    }
}

impl DecoderBackend for DummyBackend {
    fn new_bac_engine(&self) -> Box<dyn BacEngine> {
        Box::<DummyBacEngine>::default()
    }

    fn parse_compressed_header(
        &self,
        _frame: &FrameInfo,
        bac: &mut dyn BacEngine,
        context: &mut FrameContext,
    ) -> anyhow::Result<()> {
        // Consume one symbol so the engine is exercised, without changing
        // the working snapshot relative to what was loaded.
        let _ = bac.decode_symbol(context.skip[0]);
        self.recording.lock().unwrap().compressed_headers += 1;
        Ok(())
    }

    fn parse_tile_column(
        &self,
        _frame: &FrameInfo,
        _context: &FrameContext,
        tile: &mut TileState,
        mut column: TileColumn<'_>,
    ) -> anyhow::Result<()> {
        {
            let mut recording = self.recording.lock().unwrap();
            recording.parsed_columns.push(column.index);
            recording
                .prev_seg_all_zero
                .push(column.prev_seg_ids.iter().all(|&b| b == 0));
        }

        if self.count_weight > 0 {
            // Deterministic per-column counts: independent of worker
            // assignment, so merged totals only depend on the frame.
            let payload: u32 = column.tiles.iter().map(|t| t.len() as u32).sum();
            tile.counts.skip[0][0] += self.count_weight * (column.index as u32 + 1);
            tile.counts.skip[0][1] += self.count_weight * payload;
            tile.counts.partition[column.index % 16][0][1] += self.count_weight;
        }

        column.above.partition.fill(column.index as u8 + 1);

        Ok(())
    }

    fn update_segment_map(&self, _frame: &FrameInfo, map: &mut [u8]) -> anyhow::Result<()> {
        map.fill(self.seg_map_fill);
        self.recording.lock().unwrap().seg_map_updates += 1;
        Ok(())
    }

    fn loop_filter(&self, _frame: &FrameInfo) -> anyhow::Result<()> {
        if self.fail_loop_filter {
            return Err(anyhow!("loop filter failed"));
        }
        self.recording.lock().unwrap().loop_filtered += 1;
        Ok(())
    }
}
