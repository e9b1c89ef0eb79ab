// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The per-frame pipeline controller.
//!
//! [`HostDecoder`] owns a two-slot ring of frame-parse contexts so that the
//! entropy decode of frame N+1 can begin before all side effects of frame N
//! (loop filtering, presentation) complete. Each frame runs five strictly
//! sequential stages: PreParse, ParseTiles, PostParse, LoopFilter and
//! Render. Only ParseTiles fans out, to at most `worker_count` tile-column
//! workers; a failing stage short-circuits the rest of its frame and the
//! ring still advances on the next call.

use std::sync::Mutex;
use std::thread;

use anyhow::anyhow;
use log::debug;
use log::info;

use crate::backend::BacEngine;
use crate::backend::CallbackSet;
use crate::backend::DecoderBackend;
use crate::backend::TileColumn;
use crate::codec::vp9::context::AboveContexts;
use crate::codec::vp9::context::SegmentMapCarryOver;
use crate::codec::vp9::probs::FrameContext;
use crate::codec::vp9::probs::ProbabilityContextStore;
use crate::codec::vp9::probs::SymbolCounts;
use crate::codec::vp9::scan_tile_ranges;
use crate::codec::vp9::ByteRange;
use crate::codec::vp9::FrameInfo;
use crate::codec::vp9::FrameType;
use crate::codec::vp9::PictureParameters;
use crate::codec::vp9::PreviousFrame;
use crate::codec::vp9::ReferenceFrameType;
use crate::codec::vp9::SegmentParameters;
use crate::decoder::DecodeError;
use crate::decoder::Result;

/// Ring depth: how far decode may run ahead of the renderer's consumption.
pub const RING_SLOTS: usize = 2;

/// Reference-frame map entry marking an intra-coded block.
pub const INTRA_REF_PAIR: [i8; 2] = [ReferenceFrameType::Intra as i8; 2];

/// One frame's worth of caller-supplied input: the raw bitstream and the
/// picture/segment parameters decoded from its uncompressed header.
#[derive(Clone)]
pub struct InputBuffer {
    pub bitstream: Vec<u8>,
    pub pic_params: PictureParameters,
    pub seg_params: SegmentParameters,
}

/// One output slot shared with the reconstruction side. The reference-frame
/// map holds one pair of reference ids per 8x8 block.
#[derive(Default)]
pub struct OutputBuffer {
    pub reference_frame: Vec<[i8; 2]>,
}

/// Per-worker tile parsing state. Each worker walks a column-strided subset
/// of tile columns and accumulates the symbol occurrences it observed.
pub struct TileState {
    /// Next tile column this worker will parse.
    pub curr_col: usize,
    /// Total tile columns in the frame.
    pub tile_cols: usize,
    /// Number of workers striding the columns.
    pub stride: usize,
    pub counts: SymbolCounts,
}

impl Default for TileState {
    fn default() -> Self {
        TileState { curr_col: 0, tile_cols: 0, stride: 1, counts: SymbolCounts::default() }
    }
}

/// One ring slot: the full parse context of one in-flight frame.
/// Reinitialized whenever its slot is reused, freed only at teardown.
struct FrameState {
    curr_index: usize,
    prev_index: usize,
    output_index: usize,
    input: Option<InputBuffer>,
    frame_info: FrameInfo,
    tiles: Vec<TileState>,
    tiles_in_use: usize,
    bac: Box<dyn BacEngine>,
    above: AboveContexts,
    tile_ranges: Vec<ByteRange>,
    task_id: u64,
}

/// The top-level decoder object. All per-frame state hangs off this handle;
/// its lifetime is creation to drop.
pub struct HostDecoder {
    ring: Vec<FrameState>,
    curr_index: usize,
    worker_count: usize,
    probs: ProbabilityContextStore,
    seg_carry_over: SegmentMapCarryOver,
    outputs: Vec<OutputBuffer>,
    backend: Box<dyn DecoderBackend>,
    callbacks: CallbackSet,
    last_frame_type: FrameType,
    /// Serializes the sync/render notifications the external renderer
    /// observes across frames.
    render_mutex: Mutex<()>,
    next_task_id: u64,
}

impl HostDecoder {
    /// Creates a decoder around the injected collaborators. `worker_count`
    /// fixes the ParseTiles parallelism for the decoder's lifetime; the
    /// default of 1 degenerates to fully sequential decode.
    pub fn new(
        backend: Box<dyn DecoderBackend>,
        callbacks: CallbackSet,
        worker_count: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);

        let ring = (0..RING_SLOTS)
            .map(|_| FrameState {
                curr_index: 0,
                prev_index: 0,
                output_index: 0,
                input: None,
                frame_info: FrameInfo::default(),
                tiles: (0..worker_count).map(|_| TileState::default()).collect(),
                tiles_in_use: 0,
                bac: backend.new_bac_engine(),
                above: AboveContexts::default(),
                tile_ranges: Vec::new(),
                task_id: 0,
            })
            .collect();

        info!("created host decoder: {} ring slots, {} workers", RING_SLOTS, worker_count);

        HostDecoder {
            ring,
            curr_index: 0,
            worker_count,
            probs: ProbabilityContextStore::default(),
            seg_carry_over: SegmentMapCarryOver::default(),
            outputs: Vec::new(),
            backend,
            callbacks,
            last_frame_type: FrameType::KeyFrame,
            render_mutex: Mutex::new(()),
            next_task_id: 0,
        }
    }

    /// Number of output buffer slots the caller must provide: the ring
    /// depth.
    pub fn buffer_count(&self) -> usize {
        RING_SLOTS
    }

    pub fn set_output_buffers(&mut self, outputs: Vec<OutputBuffer>) {
        self.outputs = outputs;
    }

    pub fn output_buffer(&self, index: usize) -> &OutputBuffer {
        &self.outputs[index]
    }

    pub fn probability_store(&self) -> &ProbabilityContextStore {
        &self.probs
    }

    pub fn segment_carry_over(&self) -> &[u8] {
        self.seg_carry_over.as_slice()
    }

    /// Decode parameters of the most recently initialized frame.
    pub fn current_frame_info(&self) -> &FrameInfo {
        &self.ring[self.curr_index].frame_info
    }

    /// Advances the ring to the next slot and binds `input` (and the
    /// matching output slot) to it. Must be followed by [`Self::execute`].
    pub fn initialize(&mut self, input: InputBuffer) {
        let curr = (self.curr_index + 1) % RING_SLOTS;
        let prev = self.curr_index;

        let slot = &mut self.ring[curr];
        slot.curr_index = curr;
        slot.prev_index = prev;
        slot.output_index = curr;
        slot.input = Some(input);
        slot.task_id = self.next_task_id;

        self.next_task_id += 1;
        self.curr_index = curr;
    }

    /// Runs the full pipeline for the frame bound by the last
    /// [`Self::initialize`]. A failure aborts the remaining stages of this
    /// frame only; the ring advances normally on the next frame.
    pub fn execute(&mut self) -> Result<()> {
        let idx = self.curr_index;

        self.pre_parse(idx)?;
        self.parse_tiles(idx)?;
        self.post_parse(idx)?;
        self.loop_filter(idx)?;
        self.render(idx)
    }

    fn pre_parse(&mut self, idx: usize) -> Result<()> {
        let prev_idx = self.ring[idx].prev_index;
        let prev_frame = {
            let prev = &self.ring[prev_idx].frame_info;
            PreviousFrame { resolution: prev.resolution(), show_frame: prev.show_frame }
        };

        let slot = &mut self.ring[idx];
        let input = slot
            .input
            .take()
            .ok_or_else(|| DecodeError::Collaborator(anyhow!("no input buffer bound")))?;

        let mut frame_info = FrameInfo::derive(
            &input.pic_params,
            &input.seg_params,
            input.bitstream.len(),
            self.last_frame_type,
            &prev_frame,
        )?;

        debug!(
            "task {}: pre-parse {}x{} {:?} (tiles {}x{})",
            slot.task_id,
            frame_info.width,
            frame_info.height,
            frame_info.frame_type,
            frame_info.tile_rows,
            frame_info.tile_cols
        );

        slot.bac
            .init(frame_info.partitions.header.slice_of(&input.bitstream))
            .map_err(|e| DecodeError::MalformedInput(format!("BAC init failed: {:#}", e)))?;

        frame_info.context_reset = self.probs.reset_or_load(&frame_info);
        self.probs.setup_segmentation_probs(
            &input.pic_params.seg_tree_probs,
            &input.pic_params.seg_pred_probs,
        );

        let tiles_in_use = frame_info.tile_cols.min(self.worker_count);
        slot.tiles_in_use = tiles_in_use;
        for tile in &mut slot.tiles[..tiles_in_use] {
            tile.counts.reset();
        }

        slot.above.ensure_capacity(frame_info.b8_cols_aligned)?;

        let resolution_changed = frame_info.resolution() != prev_frame.resolution;
        self.seg_carry_over.prepare(&frame_info, resolution_changed)?;

        if frame_info.intra_only {
            let output = self
                .outputs
                .get_mut(slot.output_index)
                .ok_or_else(|| DecodeError::Collaborator(anyhow!("no output buffer bound")))?;
            for entry in output.reference_frame.iter_mut() {
                *entry = INTRA_REF_PAIR;
            }
        }

        if let Some(sync) = &self.callbacks.sync {
            let _ordering = self.render_mutex.lock().unwrap_or_else(|e| e.into_inner());
            sync(slot.curr_index, slot.prev_index);
        }

        self.backend.parse_compressed_header(
            &frame_info,
            slot.bac.as_mut(),
            self.probs.current_mut(),
        )?;

        slot.tile_ranges = scan_tile_ranges(
            frame_info.partitions.tiles.slice_of(&input.bitstream),
            frame_info.tile_rows,
            frame_info.tile_cols,
        )?;

        slot.frame_info = frame_info;
        slot.input = Some(input);

        Ok(())
    }

    fn run_worker(
        backend: &dyn DecoderBackend,
        frame: &FrameInfo,
        context: &FrameContext,
        tile: &mut TileState,
        columns: Vec<TileColumn<'_>>,
    ) -> anyhow::Result<()> {
        // Columns are walked strictly left to right within the worker's
        // strided subset; each column reads above rows written by columns
        // with a smaller index.
        for column in columns {
            debug_assert_eq!(column.index, tile.curr_col);
            backend.parse_tile_column(frame, context, tile, column)?;
            tile.curr_col += tile.stride;
        }

        Ok(())
    }

    fn parse_tiles(&mut self, idx: usize) -> Result<()> {
        let FrameState { input, frame_info, tiles, tiles_in_use, above, tile_ranges, task_id, .. } =
            &mut self.ring[idx];
        let input = input
            .as_ref()
            .ok_or_else(|| DecodeError::Collaborator(anyhow!("no input buffer bound")))?;
        let frame_info: &FrameInfo = frame_info;
        let in_use = *tiles_in_use;

        debug!("task {}: parse tiles with {} workers", task_id, in_use);

        let tile_data = frame_info.partitions.tiles.slice_of(&input.bitstream);
        let bounds = frame_info.tile_column_bounds();
        let spans = above.split_tile_spans(&bounds);
        let prev_seg_ids = self.seg_carry_over.as_slice();

        for (worker, tile) in tiles[..in_use].iter_mut().enumerate() {
            tile.curr_col = worker;
            tile.tile_cols = frame_info.tile_cols;
            tile.stride = in_use;
        }

        let mut assignments: Vec<Vec<TileColumn>> = (0..in_use).map(|_| Vec::new()).collect();
        for (col, span) in spans.into_iter().enumerate() {
            let tiles_bytes = (0..frame_info.tile_rows)
                .map(|row| tile_ranges[row * frame_info.tile_cols + col].slice_of(tile_data))
                .collect();
            assignments[col % in_use].push(TileColumn {
                index: col,
                tiles: tiles_bytes,
                above: span,
                prev_seg_ids,
            });
        }

        let backend = self.backend.as_ref();
        let context = self.probs.current();

        if in_use == 1 {
            // The default configuration: a plain sequential loop.
            let columns = assignments.pop().unwrap_or_default();
            Self::run_worker(backend, frame_info, context, &mut tiles[0], columns)?;
        } else {
            thread::scope(|scope| -> anyhow::Result<()> {
                let mut handles = Vec::with_capacity(in_use);
                for (tile, columns) in tiles[..in_use].iter_mut().zip(assignments) {
                    handles.push(scope.spawn(move || {
                        Self::run_worker(backend, frame_info, context, tile, columns)
                    }));
                }

                // Phase-exit barrier: every worker must finish before
                // PostParse reads the merged counts.
                for handle in handles {
                    handle.join().map_err(|_| anyhow!("tile worker panicked"))??;
                }

                Ok(())
            })?;
        }

        Ok(())
    }

    fn post_parse(&mut self, idx: usize) -> Result<()> {
        let slot = &mut self.ring[idx];

        debug!("task {}: post-parse", slot.task_id);

        // Fold every worker's counts into the first tile state.
        if slot.tiles_in_use > 1 {
            let (head, rest) = slot.tiles.split_at_mut(1);
            for other in &rest[..slot.tiles_in_use - 1] {
                head[0].counts.merge(&other.counts);
            }
        }

        self.probs.adapt(&slot.tiles[0].counts);
        self.probs.refresh(&slot.frame_info);

        self.last_frame_type = slot.frame_info.frame_type;

        if slot.frame_info.segmentation_enabled && slot.frame_info.segmentation_update_map {
            self.backend
                .update_segment_map(&slot.frame_info, self.seg_carry_over.as_mut_slice())?;
        }

        Ok(())
    }

    fn loop_filter(&mut self, idx: usize) -> Result<()> {
        let slot = &self.ring[idx];

        debug!("task {}: loop filter", slot.task_id);

        self.backend.loop_filter(&slot.frame_info)?;

        if let Some(deblock_done) = &self.callbacks.deblock_done {
            deblock_done(slot.curr_index)?;
        }

        Ok(())
    }

    fn render(&mut self, idx: usize) -> Result<()> {
        let slot = &mut self.ring[idx];

        debug!("task {}: render", slot.task_id);

        if let Some(render) = &self.callbacks.render {
            let _ordering = self.render_mutex.lock().unwrap_or_else(|e| e.into_inner());
            render(slot.curr_index, slot.prev_index);
        }

        // Release the input bitstream binding; the frame is fully consumed.
        slot.input = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::codec::vp9::InterpolationFilter;

    const HEADER_LEN: usize = 10;
    const FIRST_PARTITION: usize = 8;
    const TILE_PAYLOAD: usize = 4;

    /// Builds a frame whose declared layout is consistent: a zeroed
    /// uncompressed header, a zeroed compressed-header partition (the dummy
    /// BAC accepts a cleared marker bit) and size-prefixed tiles.
    fn input_frame(
        width: u32,
        height: u32,
        frame_type: FrameType,
        tile_cols_log2: u8,
        tweak: impl FnOnce(&mut PictureParameters),
    ) -> InputBuffer {
        let tile_cols = 1usize << tile_cols_log2;

        let mut bitstream = vec![0u8; HEADER_LEN + FIRST_PARTITION];
        for tile in 0..tile_cols {
            if tile != tile_cols - 1 {
                bitstream.extend_from_slice(&(TILE_PAYLOAD as u32).to_be_bytes());
            }
            bitstream.extend_from_slice(&[0xaa; TILE_PAYLOAD]);
        }

        let mut pic_params = PictureParameters {
            width,
            height,
            frame_type,
            show_frame: true,
            interpolation_filter: InterpolationFilter::EightTap,
            tile_cols_log2,
            uncompressed_header_len: HEADER_LEN,
            first_partition_size: FIRST_PARTITION,
            ..Default::default()
        };
        tweak(&mut pic_params);

        InputBuffer { bitstream, pic_params, seg_params: SegmentParameters::default() }
    }

    fn decoder_with(backend: DummyBackend, workers: usize) -> HostDecoder {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut decoder = HostDecoder::new(Box::new(backend), CallbackSet::default(), workers);
        let outputs = (0..decoder.buffer_count())
            .map(|_| OutputBuffer { reference_frame: vec![[7, 7]; 64] })
            .collect();
        decoder.set_output_buffers(outputs);
        decoder
    }

    fn decode(decoder: &mut HostDecoder, input: InputBuffer) -> Result<()> {
        decoder.initialize(input);
        decoder.execute()
    }

    #[test]
    fn has_prev_frame_across_a_steady_sequence() {
        let backend = DummyBackend::new();
        let mut decoder = decoder_with(backend, 1);

        decode(
            &mut decoder,
            input_frame(640, 480, FrameType::KeyFrame, 0, |_| ()),
        )
        .unwrap();
        assert!(!decoder.current_frame_info().has_prev_frame);

        for _ in 0..3 {
            decode(
                &mut decoder,
                input_frame(640, 480, FrameType::InterFrame, 0, |_| ()),
            )
            .unwrap();
            assert!(decoder.current_frame_info().has_prev_frame);
        }
    }

    #[test]
    fn working_snapshot_of_inter_frame_matches_refreshed_slot() {
        let backend = DummyBackend::new();
        // No synthetic counts, so adaptation is the identity and the
        // snapshot relationship is directly observable.
        let backend = DummyBackend { count_weight: 0, ..backend };
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 1);

        decode(
            &mut decoder,
            input_frame(640, 480, FrameType::KeyFrame, 0, |_| ()),
        )
        .unwrap();
        let refreshed_by_a = decoder.probability_store().stored(0).clone();

        decode(
            &mut decoder,
            input_frame(640, 480, FrameType::InterFrame, 0, |p| p.frame_context_idx = 0),
        )
        .unwrap();

        assert!(decoder.current_frame_info().has_prev_frame);
        assert_eq!(*decoder.probability_store().current(), refreshed_by_a);
        assert_eq!(*decoder.probability_store().stored(0), refreshed_by_a);
        assert_eq!(recording.lock().unwrap().parsed_columns.len(), 2);
    }

    #[test]
    fn key_frame_resets_working_snapshot_and_fills_intra_refs() {
        let backend = DummyBackend::new();
        let mut decoder = decoder_with(backend, 1);

        decode(
            &mut decoder,
            input_frame(640, 480, FrameType::KeyFrame, 0, |_| ()),
        )
        .unwrap();

        assert!(decoder.current_frame_info().context_reset);
        let output = decoder.output_buffer(decoder.curr_index);
        assert!(output.reference_frame.iter().all(|&pair| pair == INTRA_REF_PAIR));
    }

    #[test]
    fn carry_over_is_zero_for_intra_and_error_resilient_frames() {
        let backend = DummyBackend::new();
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 1);

        let seg = |p: &mut PictureParameters| {
            p.segmentation_enabled = true;
            p.segmentation_update_map = true;
        };

        decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 0, seg)).unwrap();
        // The dummy backend wrote a non-zero map for the next frame.
        assert!(decoder.segment_carry_over().iter().any(|&b| b != 0));

        decode(&mut decoder, input_frame(640, 480, FrameType::InterFrame, 0, seg)).unwrap();

        decode(
            &mut decoder,
            input_frame(640, 480, FrameType::InterFrame, 0, |p| {
                seg(p);
                p.error_resilient_mode = true;
            }),
        )
        .unwrap();

        let all_zero = &recording.lock().unwrap().prev_seg_all_zero;
        // Key frame and error-resilient frame see a cleared map; the plain
        // inter frame in between sees the carried-over one.
        assert_eq!(all_zero.as_slice(), &[true, false, true]);
    }

    #[test]
    fn resolution_change_regrows_contexts_and_clears_carry_over() {
        let backend = DummyBackend::new();
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 1);

        let seg = |p: &mut PictureParameters| {
            p.segmentation_enabled = true;
            p.segmentation_update_map = true;
        };

        decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 0, seg)).unwrap();
        assert_eq!(decoder.segment_carry_over().len(), 80 * 64);

        // Still context slot 0, but a larger picture: the carry-over grid
        // grows and must read as zero when the frame's tiles parse.
        decode(&mut decoder, input_frame(1280, 720, FrameType::InterFrame, 0, seg)).unwrap();

        assert!(!decoder.current_frame_info().has_prev_frame);
        assert_eq!(decoder.segment_carry_over().len(), 160 * 96);
        assert_eq!(decoder.ring[decoder.curr_index].above.width_b8(), 160);
        let all_zero = &recording.lock().unwrap().prev_seg_all_zero;
        assert_eq!(all_zero.as_slice(), &[true, true]);
    }

    #[test]
    fn short_uncompressed_header_aborts_before_tile_parse() {
        let backend = DummyBackend::new();
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 1);

        let mut input = input_frame(640, 480, FrameType::KeyFrame, 0, |_| ());
        input.pic_params.uncompressed_header_len = 1;

        assert!(matches!(
            decode(&mut decoder, input),
            Err(DecodeError::MalformedInput(_))
        ));
        let recording = recording.lock().unwrap();
        assert!(recording.parsed_columns.is_empty());
        assert_eq!(recording.compressed_headers, 0);
    }

    #[test]
    fn bac_marker_mismatch_aborts_the_frame() {
        let backend = DummyBackend::new();
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 1);

        let mut input = input_frame(640, 480, FrameType::KeyFrame, 0, |_| ());
        // Set the marker bit at the start of the header partition.
        input.bitstream[HEADER_LEN] = 0x80;

        assert!(matches!(
            decode(&mut decoder, input),
            Err(DecodeError::MalformedInput(_))
        ));
        assert!(recording.lock().unwrap().parsed_columns.is_empty());
    }

    #[test]
    fn failed_frame_does_not_pollute_stored_snapshots() {
        let backend = DummyBackend::new();
        let mut decoder = decoder_with(backend, 1);

        decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 0, |_| ())).unwrap();
        let stored = decoder.probability_store().stored(0).clone();

        let mut bad = input_frame(640, 480, FrameType::InterFrame, 0, |_| ());
        bad.pic_params.first_partition_size = 1 << 20;
        assert!(decode(&mut decoder, bad).is_err());

        assert_eq!(*decoder.probability_store().stored(0), stored);

        // The ring advances normally and the next frame decodes.
        decode(&mut decoder, input_frame(640, 480, FrameType::InterFrame, 0, |_| ())).unwrap();
    }

    #[test]
    fn loop_filter_failure_short_circuits_render() {
        let backend = DummyBackend { fail_loop_filter: true, ..DummyBackend::new() };
        let rendered = Arc::new(Mutex::new(Vec::new()));

        let callbacks = CallbackSet {
            render: Some(Box::new({
                let rendered = Arc::clone(&rendered);
                move |curr, _prev| rendered.lock().unwrap().push(curr)
            })),
            ..Default::default()
        };

        let mut decoder = HostDecoder::new(Box::new(backend), callbacks, 1);
        decoder.set_output_buffers(
            (0..RING_SLOTS).map(|_| OutputBuffer { reference_frame: vec![[0, 0]; 64] }).collect(),
        );

        let res = decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 0, |_| ()));
        assert!(matches!(res, Err(DecodeError::Collaborator(_))));
        assert!(rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn callbacks_fire_in_pipeline_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let push = |events: &Arc<Mutex<Vec<String>>>, tag: &'static str| {
            let events = Arc::clone(events);
            move |curr: usize, _prev: usize| events.lock().unwrap().push(format!("{tag}:{curr}"))
        };

        let callbacks = CallbackSet {
            sync: Some(Box::new(push(&events, "sync"))),
            deblock_done: Some(Box::new({
                let events = Arc::clone(&events);
                move |curr| {
                    events.lock().unwrap().push(format!("deblock:{curr}"));
                    Ok(())
                }
            })),
            render: Some(Box::new(push(&events, "render"))),
        };

        let mut decoder = HostDecoder::new(Box::new(DummyBackend::new()), callbacks, 1);
        decoder.set_output_buffers(
            (0..RING_SLOTS).map(|_| OutputBuffer { reference_frame: vec![[0, 0]; 64] }).collect(),
        );

        decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 0, |_| ())).unwrap();
        decode(&mut decoder, input_frame(640, 480, FrameType::InterFrame, 0, |_| ())).unwrap();

        assert_eq!(
            events.lock().unwrap().as_slice(),
            &["sync:1", "deblock:1", "render:1", "sync:0", "deblock:0", "render:0"]
        );
    }

    /// The same sequence decoded at worker counts 1 and 3 must produce
    /// identical merged counts and identical adapted probabilities.
    #[test]
    fn worker_counts_are_observationally_equivalent() {
        let run = |workers: usize| -> (SymbolCounts, FrameContext) {
            let backend = DummyBackend::new();
            let mut decoder = decoder_with(backend, workers);

            decode(&mut decoder, input_frame(640, 480, FrameType::KeyFrame, 3, |_| ())).unwrap();
            decode(&mut decoder, input_frame(640, 480, FrameType::InterFrame, 3, |_| ()))
                .unwrap();

            let slot = &decoder.ring[decoder.curr_index];
            (slot.tiles[0].counts.clone(), decoder.probability_store().current().clone())
        };

        let (counts_seq, probs_seq) = run(1);
        let (counts_par, probs_par) = run(3);

        assert_eq!(counts_seq, counts_par);
        assert_eq!(probs_seq, probs_par);
    }

    #[test]
    fn workers_walk_their_columns_left_to_right() {
        let backend = DummyBackend::new();
        let recording = Arc::clone(&backend.recording);
        let mut decoder = decoder_with(backend, 3);

        decode(&mut decoder, input_frame(1280, 720, FrameType::KeyFrame, 3, |_| ())).unwrap();

        let recording = recording.lock().unwrap();
        let mut parsed = recording.parsed_columns.clone();
        parsed.sort_unstable();
        assert_eq!(parsed, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn ring_depth_is_reported() {
        let decoder = decoder_with(DummyBackend::new(), 1);
        assert_eq!(decoder.buffer_count(), RING_SLOTS);
    }
}
