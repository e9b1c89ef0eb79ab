// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Adaptive probability contexts.
//!
//! A [`FrameContext`] is one full snapshot of the probability tables the
//! entropy decoder consults. The codec keeps four stored snapshots,
//! selectable per frame through `frame_context_idx`; the decode of a frame
//! works on a copy of the selected snapshot (or the codec defaults after a
//! reset), forward-adapts it from the symbol occurrences observed while
//! parsing, and writes it back for future frames unless error-resilient or
//! frame-parallel rules forbid it.

use log::debug;

use crate::codec::vp9::FrameInfo;
use crate::codec::vp9::FRAME_CONTEXTS;
use crate::codec::vp9::PREDICTION_PROBS;
use crate::codec::vp9::SEG_TREE_PROBS;

pub const TX_SIZE_CONTEXTS: usize = 2;

pub const TX_SIZES: usize = 4;
pub const PLANE_TYPES: usize = 2;
pub const REF_TYPES: usize = 2;
pub const COEF_BANDS: usize = 6;
pub const COEFF_CONTEXTS: usize = 6;
/// Coefficient probability nodes coded explicitly per context; the remaining
/// tree nodes are derived by the entropy decoder with a pareto model.
pub const UNCONSTRAINED_NODES: usize = 3;

pub const SKIP_CONTEXTS: usize = 3;
pub const INTER_MODES: usize = 4;
pub const INTER_MODE_CONTEXTS: usize = 7;
pub const SWITCHABLE_FILTERS: usize = 3;
pub const INTERP_FILTER_CONTEXTS: usize = 4;
pub const IS_INTER_CONTEXTS: usize = 4;
pub const COMP_MODE_CONTEXTS: usize = 5;
pub const REF_CONTEXTS: usize = 5;
pub const BLOCK_SIZE_GROUPS: usize = 4;
pub const INTRA_MODES: usize = 10;
pub const PARTITION_TYPES: usize = 4;
pub const PARTITION_CONTEXTS: usize = 16;

pub const MV_JOINTS: usize = 4;
pub const MV_CLASSES: usize = 11;
pub const MV_CLASS0_SIZE: usize = 2;
pub const MV_OFFSET_BITS: usize = 10;
pub const MV_FR_SIZE: usize = 4;

/// Saturation count and maximum blend factor of the forward-adaptation rule.
/// Coefficient probabilities use their own, slightly slower pair.
pub const COUNT_SAT: u32 = 20;
pub const MAX_UPDATE_FACTOR: u32 = 128;
pub const COEF_COUNT_SAT: u32 = 24;
pub const COEF_MAX_UPDATE_FACTOR: u32 = 112;

/// Occurrences of the two branches of one binary probability node.
pub type BinaryCounts = [u32; 2];

pub type CoefProbs =
    [[[[[[u8; UNCONSTRAINED_NODES]; COEFF_CONTEXTS]; COEF_BANDS]; REF_TYPES]; PLANE_TYPES];
        TX_SIZES];
pub type CoefCounts = [[[[[[BinaryCounts; UNCONSTRAINED_NODES]; COEFF_CONTEXTS]; COEF_BANDS];
    REF_TYPES]; PLANE_TYPES]; TX_SIZES];

const DEFAULT_TX_8X8: [[u8; 1]; TX_SIZE_CONTEXTS] = [[100], [66]];
const DEFAULT_TX_16X16: [[u8; 2]; TX_SIZE_CONTEXTS] = [[20, 152], [15, 101]];
const DEFAULT_TX_32X32: [[u8; 3]; TX_SIZE_CONTEXTS] = [[3, 136, 37], [5, 52, 13]];

const DEFAULT_SKIP: [u8; SKIP_CONTEXTS] = [192, 128, 64];

const DEFAULT_INTER_MODE: [[u8; INTER_MODES - 1]; INTER_MODE_CONTEXTS] = [
    [2, 173, 34],
    [7, 145, 85],
    [7, 166, 63],
    [7, 94, 66],
    [8, 64, 46],
    [17, 81, 31],
    [25, 29, 30],
];

const DEFAULT_INTERP_FILTER: [[u8; SWITCHABLE_FILTERS - 1]; INTERP_FILTER_CONTEXTS] =
    [[235, 162], [36, 255], [34, 3], [149, 144]];

const DEFAULT_IS_INTER: [u8; IS_INTER_CONTEXTS] = [9, 102, 187, 225];
const DEFAULT_COMP_MODE: [u8; COMP_MODE_CONTEXTS] = [239, 183, 119, 96, 41];
const DEFAULT_SINGLE_REF: [[u8; 2]; REF_CONTEXTS] =
    [[33, 16], [77, 74], [142, 142], [172, 170], [238, 247]];
const DEFAULT_COMP_REF: [u8; REF_CONTEXTS] = [50, 126, 123, 221, 226];

const DEFAULT_Y_MODE: [[u8; INTRA_MODES - 1]; BLOCK_SIZE_GROUPS] = [
    [65, 32, 18, 144, 162, 194, 41, 51, 98],
    [132, 68, 18, 165, 217, 196, 45, 40, 78],
    [173, 80, 19, 176, 240, 193, 64, 35, 46],
    [221, 135, 38, 194, 248, 121, 96, 85, 29],
];

const DEFAULT_UV_MODE: [[u8; INTRA_MODES - 1]; INTRA_MODES] = [
    [120, 7, 76, 176, 208, 126, 28, 54, 103],
    [48, 12, 154, 155, 139, 90, 34, 117, 119],
    [67, 6, 25, 204, 243, 158, 13, 21, 96],
    [97, 5, 44, 131, 176, 139, 48, 68, 97],
    [83, 5, 42, 156, 111, 152, 26, 49, 152],
    [80, 5, 58, 178, 74, 83, 33, 62, 145],
    [86, 5, 32, 154, 192, 168, 14, 22, 163],
    [85, 5, 32, 156, 216, 148, 19, 29, 73],
    [77, 7, 64, 116, 132, 122, 37, 126, 120],
    [101, 21, 107, 181, 192, 103, 19, 67, 125],
];

const DEFAULT_PARTITION: [[u8; PARTITION_TYPES - 1]; PARTITION_CONTEXTS] = [
    [199, 122, 141],
    [147, 63, 159],
    [148, 133, 118],
    [121, 104, 114],
    [174, 73, 87],
    [92, 41, 83],
    [82, 99, 50],
    [53, 39, 39],
    [177, 58, 59],
    [68, 26, 63],
    [52, 79, 25],
    [17, 14, 12],
    [222, 34, 30],
    [72, 16, 44],
    [58, 32, 12],
    [10, 7, 6],
];

const DEFAULT_MV_JOINTS: [u8; MV_JOINTS - 1] = [32, 64, 96];

const DEFAULT_MV_COMPS: [MvComponentProbs; 2] = [
    MvComponentProbs {
        sign: 128,
        classes: [224, 144, 192, 168, 192, 176, 192, 198, 198, 245],
        class0: [216],
        bits: [136, 140, 148, 160, 176, 192, 224, 234, 234, 240],
        class0_fr: [[128, 128, 64], [96, 112, 64]],
        fr: [64, 96, 64],
        class0_hp: 160,
        hp: 128,
    },
    MvComponentProbs {
        sign: 128,
        classes: [216, 128, 176, 160, 176, 176, 192, 198, 198, 208],
        class0: [208],
        bits: [136, 140, 148, 160, 176, 192, 224, 234, 234, 240],
        class0_fr: [[128, 128, 64], [96, 112, 64]],
        fr: [64, 96, 64],
        class0_hp: 160,
        hp: 128,
    },
];

/// Band- and context-graded coefficient probability defaults: the chance of
/// a significant coefficient drops with band index and neighbour context.
fn default_coef_probs() -> CoefProbs {
    let mut probs = [[[[[[0u8; UNCONSTRAINED_NODES]; COEFF_CONTEXTS]; COEF_BANDS]; REF_TYPES];
        PLANE_TYPES]; TX_SIZES];

    for (tx, per_tx) in probs.iter_mut().enumerate() {
        for per_plane in per_tx.iter_mut() {
            for per_ref in per_plane.iter_mut() {
                for (band, per_band) in per_ref.iter_mut().enumerate() {
                    for (ctx, node) in per_band.iter_mut().enumerate() {
                        let band = band as i32;
                        let ctx = ctx as i32;
                        node[0] = (240 - band * 30 - ctx * 8 + tx as i32 * 4).clamp(1, 255) as u8;
                        node[1] = (180 - band * 20 - ctx * 6).clamp(1, 255) as u8;
                        node[2] = (140 - band * 12 - ctx * 4).clamp(1, 255) as u8;
                    }
                }
            }
        }
    }

    probs
}

/// Probabilities for one motion vector component (row or column).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MvComponentProbs {
    pub sign: u8,
    pub classes: [u8; MV_CLASSES - 1],
    pub class0: [u8; MV_CLASS0_SIZE - 1],
    pub bits: [u8; MV_OFFSET_BITS],
    pub class0_fr: [[u8; MV_FR_SIZE - 1]; MV_CLASS0_SIZE],
    pub fr: [u8; MV_FR_SIZE - 1],
    pub class0_hp: u8,
    pub hp: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MvProbs {
    pub joints: [u8; MV_JOINTS - 1],
    pub comps: [MvComponentProbs; 2],
}

/// One full probability-model snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub tx_8x8: [[u8; 1]; TX_SIZE_CONTEXTS],
    pub tx_16x16: [[u8; 2]; TX_SIZE_CONTEXTS],
    pub tx_32x32: [[u8; 3]; TX_SIZE_CONTEXTS],
    pub coef: CoefProbs,
    pub skip: [u8; SKIP_CONTEXTS],
    pub inter_mode: [[u8; INTER_MODES - 1]; INTER_MODE_CONTEXTS],
    pub interp_filter: [[u8; SWITCHABLE_FILTERS - 1]; INTERP_FILTER_CONTEXTS],
    pub is_inter: [u8; IS_INTER_CONTEXTS],
    pub comp_mode: [u8; COMP_MODE_CONTEXTS],
    pub single_ref: [[u8; 2]; REF_CONTEXTS],
    pub comp_ref: [u8; REF_CONTEXTS],
    pub y_mode: [[u8; INTRA_MODES - 1]; BLOCK_SIZE_GROUPS],
    pub uv_mode: [[u8; INTRA_MODES - 1]; INTRA_MODES],
    pub partition: [[u8; PARTITION_TYPES - 1]; PARTITION_CONTEXTS],
    pub mv: MvProbs,
    /// Per-frame segmentation probabilities. Overlaid from the uncompressed
    /// header after every reset/load, never adapted.
    pub seg_tree_probs: [u8; SEG_TREE_PROBS],
    pub seg_pred_probs: [u8; PREDICTION_PROBS],
}

impl Default for FrameContext {
    fn default() -> Self {
        FrameContext {
            tx_8x8: DEFAULT_TX_8X8,
            tx_16x16: DEFAULT_TX_16X16,
            tx_32x32: DEFAULT_TX_32X32,
            coef: default_coef_probs(),
            skip: DEFAULT_SKIP,
            inter_mode: DEFAULT_INTER_MODE,
            interp_filter: DEFAULT_INTERP_FILTER,
            is_inter: DEFAULT_IS_INTER,
            comp_mode: DEFAULT_COMP_MODE,
            single_ref: DEFAULT_SINGLE_REF,
            comp_ref: DEFAULT_COMP_REF,
            y_mode: DEFAULT_Y_MODE,
            uv_mode: DEFAULT_UV_MODE,
            partition: DEFAULT_PARTITION,
            mv: MvProbs { joints: DEFAULT_MV_JOINTS, comps: DEFAULT_MV_COMPS },
            seg_tree_probs: [255; SEG_TREE_PROBS],
            seg_pred_probs: [255; PREDICTION_PROBS],
        }
    }
}

/// Blends one prior probability with the observed branch frequency. The
/// blend factor grows with the observation count and saturates at
/// `max_factor / 256`; a node with no observations keeps its prior.
fn merge_prob(prior: u8, counts: BinaryCounts, sat: u32, max_factor: u32) -> u8 {
    let den = counts[0] + counts[1];
    if den == 0 {
        return prior;
    }

    let observed =
        ((counts[0] as u64 * 256 + (den as u64 >> 1)) / den as u64).clamp(1, 255) as u32;
    let factor = max_factor * den.min(sat) / sat;

    ((prior as u32 * (256 - factor) + observed * factor + 128) >> 8) as u8
}

fn merge_probs(priors: &mut [u8], counts: &[BinaryCounts], sat: u32, max_factor: u32) {
    for (prior, counts) in priors.iter_mut().zip(counts) {
        *prior = merge_prob(*prior, *counts, sat, max_factor);
    }
}

impl FrameContext {
    /// Forward-adapts every probability node from its observed occurrences.
    /// Segmentation probabilities are per-frame and excluded.
    pub fn adapt(&mut self, counts: &SymbolCounts) {
        for (probs, counts) in self.tx_8x8.iter_mut().zip(&counts.tx_8x8) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        for (probs, counts) in self.tx_16x16.iter_mut().zip(&counts.tx_16x16) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        for (probs, counts) in self.tx_32x32.iter_mut().zip(&counts.tx_32x32) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }

        for (per_tx, counts_tx) in self.coef.iter_mut().zip(&counts.coef) {
            for (per_plane, counts_plane) in per_tx.iter_mut().zip(counts_tx) {
                for (per_ref, counts_ref) in per_plane.iter_mut().zip(counts_plane) {
                    for (per_band, counts_band) in per_ref.iter_mut().zip(counts_ref) {
                        for (node, counts_node) in per_band.iter_mut().zip(counts_band) {
                            merge_probs(
                                node,
                                counts_node,
                                COEF_COUNT_SAT,
                                COEF_MAX_UPDATE_FACTOR,
                            );
                        }
                    }
                }
            }
        }

        merge_probs(&mut self.skip, &counts.skip, COUNT_SAT, MAX_UPDATE_FACTOR);
        for (probs, counts) in self.inter_mode.iter_mut().zip(&counts.inter_mode) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        for (probs, counts) in self.interp_filter.iter_mut().zip(&counts.interp_filter) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        merge_probs(&mut self.is_inter, &counts.is_inter, COUNT_SAT, MAX_UPDATE_FACTOR);
        merge_probs(&mut self.comp_mode, &counts.comp_mode, COUNT_SAT, MAX_UPDATE_FACTOR);
        for (probs, counts) in self.single_ref.iter_mut().zip(&counts.single_ref) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        merge_probs(&mut self.comp_ref, &counts.comp_ref, COUNT_SAT, MAX_UPDATE_FACTOR);
        for (probs, counts) in self.y_mode.iter_mut().zip(&counts.y_mode) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        for (probs, counts) in self.uv_mode.iter_mut().zip(&counts.uv_mode) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        for (probs, counts) in self.partition.iter_mut().zip(&counts.partition) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }

        merge_probs(&mut self.mv.joints, &counts.mv.joints, COUNT_SAT, MAX_UPDATE_FACTOR);
        for (comp, counts) in self.mv.comps.iter_mut().zip(&counts.mv.comps) {
            comp.adapt(counts);
        }
    }
}

impl MvComponentProbs {
    fn adapt(&mut self, counts: &MvComponentCounts) {
        self.sign = merge_prob(self.sign, counts.sign, COUNT_SAT, MAX_UPDATE_FACTOR);
        merge_probs(&mut self.classes, &counts.classes, COUNT_SAT, MAX_UPDATE_FACTOR);
        merge_probs(&mut self.class0, &counts.class0, COUNT_SAT, MAX_UPDATE_FACTOR);
        merge_probs(&mut self.bits, &counts.bits, COUNT_SAT, MAX_UPDATE_FACTOR);
        for (probs, counts) in self.class0_fr.iter_mut().zip(&counts.class0_fr) {
            merge_probs(probs, counts, COUNT_SAT, MAX_UPDATE_FACTOR);
        }
        merge_probs(&mut self.fr, &counts.fr, COUNT_SAT, MAX_UPDATE_FACTOR);
        self.class0_hp = merge_prob(self.class0_hp, counts.class0_hp, COUNT_SAT, MAX_UPDATE_FACTOR);
        self.hp = merge_prob(self.hp, counts.hp, COUNT_SAT, MAX_UPDATE_FACTOR);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MvComponentCounts {
    pub sign: BinaryCounts,
    pub classes: [BinaryCounts; MV_CLASSES - 1],
    pub class0: [BinaryCounts; MV_CLASS0_SIZE - 1],
    pub bits: [BinaryCounts; MV_OFFSET_BITS],
    pub class0_fr: [[BinaryCounts; MV_FR_SIZE - 1]; MV_CLASS0_SIZE],
    pub fr: [BinaryCounts; MV_FR_SIZE - 1],
    pub class0_hp: BinaryCounts,
    pub hp: BinaryCounts,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MvCounts {
    pub joints: [BinaryCounts; MV_JOINTS - 1],
    pub comps: [MvComponentCounts; 2],
}

/// Symbol-occurrence counts gathered while parsing tiles; mirror-shaped with
/// [`FrameContext`], one branch-count pair per probability node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolCounts {
    pub tx_8x8: [[BinaryCounts; 1]; TX_SIZE_CONTEXTS],
    pub tx_16x16: [[BinaryCounts; 2]; TX_SIZE_CONTEXTS],
    pub tx_32x32: [[BinaryCounts; 3]; TX_SIZE_CONTEXTS],
    pub coef: CoefCounts,
    pub skip: [BinaryCounts; SKIP_CONTEXTS],
    pub inter_mode: [[BinaryCounts; INTER_MODES - 1]; INTER_MODE_CONTEXTS],
    pub interp_filter: [[BinaryCounts; SWITCHABLE_FILTERS - 1]; INTERP_FILTER_CONTEXTS],
    pub is_inter: [BinaryCounts; IS_INTER_CONTEXTS],
    pub comp_mode: [BinaryCounts; COMP_MODE_CONTEXTS],
    pub single_ref: [[BinaryCounts; 2]; REF_CONTEXTS],
    pub comp_ref: [BinaryCounts; REF_CONTEXTS],
    pub y_mode: [[BinaryCounts; INTRA_MODES - 1]; BLOCK_SIZE_GROUPS],
    pub uv_mode: [[BinaryCounts; INTRA_MODES - 1]; INTRA_MODES],
    pub partition: [[BinaryCounts; PARTITION_TYPES - 1]; PARTITION_CONTEXTS],
    pub mv: MvCounts,
}

impl Default for SymbolCounts {
    fn default() -> Self {
        let comp = MvComponentCounts {
            sign: [0; 2],
            classes: [[0; 2]; MV_CLASSES - 1],
            class0: [[0; 2]; MV_CLASS0_SIZE - 1],
            bits: [[0; 2]; MV_OFFSET_BITS],
            class0_fr: [[[0; 2]; MV_FR_SIZE - 1]; MV_CLASS0_SIZE],
            fr: [[0; 2]; MV_FR_SIZE - 1],
            class0_hp: [0; 2],
            hp: [0; 2],
        };

        SymbolCounts {
            tx_8x8: [[[0; 2]; 1]; TX_SIZE_CONTEXTS],
            tx_16x16: [[[0; 2]; 2]; TX_SIZE_CONTEXTS],
            tx_32x32: [[[0; 2]; 3]; TX_SIZE_CONTEXTS],
            coef: [[[[[[[0; 2]; UNCONSTRAINED_NODES]; COEFF_CONTEXTS]; COEF_BANDS]; REF_TYPES];
                PLANE_TYPES]; TX_SIZES],
            skip: [[0; 2]; SKIP_CONTEXTS],
            inter_mode: [[[0; 2]; INTER_MODES - 1]; INTER_MODE_CONTEXTS],
            interp_filter: [[[0; 2]; SWITCHABLE_FILTERS - 1]; INTERP_FILTER_CONTEXTS],
            is_inter: [[0; 2]; IS_INTER_CONTEXTS],
            comp_mode: [[0; 2]; COMP_MODE_CONTEXTS],
            single_ref: [[[0; 2]; 2]; REF_CONTEXTS],
            comp_ref: [[0; 2]; REF_CONTEXTS],
            y_mode: [[[0; 2]; INTRA_MODES - 1]; BLOCK_SIZE_GROUPS],
            uv_mode: [[[0; 2]; INTRA_MODES - 1]; INTRA_MODES],
            partition: [[[0; 2]; PARTITION_TYPES - 1]; PARTITION_CONTEXTS],
            mv: MvCounts { joints: [[0; 2]; MV_JOINTS - 1], comps: [comp; 2] },
        }
    }
}

fn accumulate(dst: &mut [BinaryCounts], src: &[BinaryCounts]) {
    for (dst, src) in dst.iter_mut().zip(src) {
        dst[0] += src[0];
        dst[1] += src[1];
    }
}

impl SymbolCounts {
    pub fn reset(&mut self) {
        *self = SymbolCounts::default();
    }

    /// Accumulates another worker's counts into this table.
    pub fn merge(&mut self, other: &SymbolCounts) {
        for (dst, src) in self.tx_8x8.iter_mut().zip(&other.tx_8x8) {
            accumulate(dst, src);
        }
        for (dst, src) in self.tx_16x16.iter_mut().zip(&other.tx_16x16) {
            accumulate(dst, src);
        }
        for (dst, src) in self.tx_32x32.iter_mut().zip(&other.tx_32x32) {
            accumulate(dst, src);
        }

        for (dst_tx, src_tx) in self.coef.iter_mut().zip(&other.coef) {
            for (dst_plane, src_plane) in dst_tx.iter_mut().zip(src_tx) {
                for (dst_ref, src_ref) in dst_plane.iter_mut().zip(src_plane) {
                    for (dst_band, src_band) in dst_ref.iter_mut().zip(src_ref) {
                        for (dst_node, src_node) in dst_band.iter_mut().zip(src_band) {
                            accumulate(dst_node, src_node);
                        }
                    }
                }
            }
        }

        accumulate(&mut self.skip, &other.skip);
        for (dst, src) in self.inter_mode.iter_mut().zip(&other.inter_mode) {
            accumulate(dst, src);
        }
        for (dst, src) in self.interp_filter.iter_mut().zip(&other.interp_filter) {
            accumulate(dst, src);
        }
        accumulate(&mut self.is_inter, &other.is_inter);
        accumulate(&mut self.comp_mode, &other.comp_mode);
        for (dst, src) in self.single_ref.iter_mut().zip(&other.single_ref) {
            accumulate(dst, src);
        }
        accumulate(&mut self.comp_ref, &other.comp_ref);
        for (dst, src) in self.y_mode.iter_mut().zip(&other.y_mode) {
            accumulate(dst, src);
        }
        for (dst, src) in self.uv_mode.iter_mut().zip(&other.uv_mode) {
            accumulate(dst, src);
        }
        for (dst, src) in self.partition.iter_mut().zip(&other.partition) {
            accumulate(dst, src);
        }

        accumulate(&mut self.mv.joints, &other.mv.joints);
        for (dst, src) in self.mv.comps.iter_mut().zip(&other.mv.comps) {
            dst.merge(src);
        }
    }
}

impl MvComponentCounts {
    fn merge(&mut self, other: &MvComponentCounts) {
        accumulate(std::slice::from_mut(&mut self.sign), std::slice::from_ref(&other.sign));
        accumulate(&mut self.classes, &other.classes);
        accumulate(&mut self.class0, &other.class0);
        accumulate(&mut self.bits, &other.bits);
        for (dst, src) in self.class0_fr.iter_mut().zip(&other.class0_fr) {
            accumulate(dst, src);
        }
        accumulate(&mut self.fr, &other.fr);
        accumulate(std::slice::from_mut(&mut self.class0_hp), std::slice::from_ref(&other.class0_hp));
        accumulate(std::slice::from_mut(&mut self.hp), std::slice::from_ref(&other.hp));
    }
}

/// The working probability snapshot plus the four stored snapshots the
/// bitstream selects between.
pub struct ProbabilityContextStore {
    current: FrameContext,
    stored: [FrameContext; FRAME_CONTEXTS],
}

impl Default for ProbabilityContextStore {
    fn default() -> Self {
        let default = FrameContext::default();
        ProbabilityContextStore {
            current: default.clone(),
            stored: [default.clone(), default.clone(), default.clone(), default],
        }
    }
}

impl ProbabilityContextStore {
    /// The working snapshot used to decode the current frame.
    pub fn current(&self) -> &FrameContext {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut FrameContext {
        &mut self.current
    }

    pub fn stored(&self, idx: usize) -> &FrameContext {
        &self.stored[idx]
    }

    /// Overwrites the working snapshot with the codec default tables.
    pub fn reset(&mut self) {
        debug!("probability context reset to defaults");
        self.current = FrameContext::default();
    }

    /// Overwrites the working snapshot with stored snapshot `idx`.
    pub fn load(&mut self, idx: usize) {
        self.current = self.stored[idx].clone();
    }

    /// Resets the working snapshot for intra-only and error-resilient
    /// frames, loads the frame's selected stored snapshot otherwise.
    /// Returns whether a reset was performed.
    pub fn reset_or_load(&mut self, frame: &FrameInfo) -> bool {
        if frame.intra_only || frame.error_resilient_mode {
            self.reset();
            true
        } else {
            self.load(frame.frame_context_idx);
            false
        }
    }

    /// Overlays the per-frame segmentation probabilities onto the working
    /// snapshot. Applied after every reset/load; these entries are never
    /// adapted.
    pub fn setup_segmentation_probs(
        &mut self,
        tree_probs: &[u8; SEG_TREE_PROBS],
        pred_probs: &[u8; PREDICTION_PROBS],
    ) {
        self.current.seg_tree_probs = *tree_probs;
        self.current.seg_pred_probs = *pred_probs;
    }

    /// Forward-adapts the working snapshot from the observed symbol counts.
    pub fn adapt(&mut self, counts: &SymbolCounts) {
        self.current.adapt(counts);
    }

    /// Writes the working snapshot back to the frame's stored slot, unless
    /// error-resilient coding or frame-parallel decoding forbids this frame
    /// from influencing frames already in flight.
    pub fn refresh(&mut self, frame: &FrameInfo) {
        if frame.error_resilient_mode || frame.frame_parallel_decoding {
            debug!(
                "skipping frame context refresh (error_resilient={}, frame_parallel={})",
                frame.error_resilient_mode, frame.frame_parallel_decoding
            );
            return;
        }

        self.stored[frame.frame_context_idx] = self.current.clone();
    }
}
