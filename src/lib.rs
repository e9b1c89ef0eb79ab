// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame-level control core for hybrid VP9 decoding.
//!
//! This crate drives the host-side portion of a software-assisted VP9 decode
//! pipeline: it sequences header-parse, tile-parse, probability-adaptation,
//! loop-filter and present stages over a small ring of in-flight frames,
//! maintains the adaptive probability contexts the entropy decoder depends
//! on, and owns the grow-only row-context and segmentation carry-over
//! buffers shared by tile workers.
//!
//! The bit-level arithmetic decoder, the tile/coefficient parser, the pixel
//! loop filter and the renderer are external collaborators injected through
//! the traits in [`backend`].

pub mod backend;
pub mod codec;
pub mod decoder;

/// A frame resolution in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}
