// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame decode orchestration.

pub mod vp9;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Error returned by the per-frame pipeline.
///
/// There is no retry anywhere in this core: a failed stage short-circuits
/// the remaining stages of its frame and the error surfaces from
/// [`vp9::HostDecoder::execute`]. Recovery (e.g. requesting a key frame) is
/// the caller's job.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bitstream violates the declared layout: header too short to hold
    /// its marker, partition sizes overrunning the buffer, truncated
    /// tile-size prefixes, or an arithmetic-decoder marker mismatch.
    /// Stored probability state is never touched by a frame that fails this
    /// way.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// Growing one of the grow-only context buffers failed. Fatal for the
    /// frame; there is no fallback path.
    #[error("buffer allocation failed")]
    AllocationFailure,
    /// An external collaborator (backend or callback) signalled failure.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}
