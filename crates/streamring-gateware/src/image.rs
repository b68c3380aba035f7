// SPDX-License-Identifier: AGPL-3.0-only

//! Packetized ↔ image stream adapters.
//!
//! ```text
//!   Beat { last }                     ImageBeat { line_last, frame_last }
//!   ─────────────    PacketToImage    ──────────────────────────────────
//!   w0 w1 w2 w3 w4 w5  ──────────▶   w0 w1 w2│ w3 w4 w5│║      (width 3)
//!                      ◀──────────          │ = line_last, ║ = frame_last
//!                      ImageToPacket
//! ```
//!
//! Both adapters are latency-0: `ready` passes straight through and the
//! output word is a pure function of the input word and registered counters.

use crate::error::{GatewareError, Result};
use crate::fault::{FaultKind, StickyFlag};
use crate::stream::{Beat, ImageBeat, StreamStage};
use std::marker::PhantomData;
use tracing::warn;

/// Reinterprets each packet as a raster of `width`-word lines.
///
/// A packet whose length is not a multiple of `width` still flows through:
/// its final partial line closes with `line_last` at packet end, and the
/// sticky shape-mismatch flag is raised.
#[derive(Debug, Clone)]
pub struct PacketToImage<P> {
    width: u32,
    line_ctr: u32,
    frames: u64,
    shape_mismatch: StickyFlag,
    _word: PhantomData<fn(P) -> P>,
}

impl<P> PacketToImage<P> {
    /// Adapter for lines of `width` words.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] if `width` is zero.
    pub fn new(width: u32) -> Result<Self> {
        if width == 0 {
            return Err(GatewareError::invalid_config("line width must be at least 1"));
        }
        Ok(Self {
            width,
            line_ctr: 0,
            frames: 0,
            shape_mismatch: StickyFlag::new(FaultKind::ShapeMismatch),
            _word: PhantomData,
        })
    }

    /// Configured line width in words
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Sticky shape-mismatch flag and its packet count
    #[must_use]
    pub const fn shape_mismatch(&self) -> StickyFlag {
        self.shape_mismatch
    }

    /// Frames (packets) completed so far
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    fn closes_line(&self, beat: &Beat<P>) -> bool {
        beat.last || self.line_ctr + 1 >= self.width
    }
}

impl<P: Clone> StreamStage for PacketToImage<P> {
    type In = Beat<P>;
    type Out = ImageBeat<P>;

    fn offer(&self, upstream: Option<&Beat<P>>) -> Option<ImageBeat<P>> {
        upstream.map(|beat| ImageBeat {
            payload: beat.payload.clone(),
            line_last: self.closes_line(beat),
            frame_last: beat.last,
        })
    }

    fn ready(&self, downstream_ready: bool) -> bool {
        downstream_ready
    }

    fn tick(&mut self, upstream: Option<&Beat<P>>, downstream_ready: bool) {
        let Some(beat) = upstream else { return };
        if !downstream_ready {
            return;
        }
        if beat.last {
            if self.line_ctr + 1 != self.width {
                let partial = self.line_ctr + 1;
                if self.shape_mismatch.raise() {
                    warn!(
                        width = self.width,
                        partial_line = partial,
                        frame = self.frames,
                        "packet length is not a multiple of the line width"
                    );
                }
            }
            self.frames += 1;
            self.line_ctr = 0;
        } else if self.closes_line(beat) {
            self.line_ctr = 0;
        } else {
            self.line_ctr += 1;
        }
    }
}

/// Flattens a raster back into packets: `frame_last` becomes `last`.
///
/// Line boundaries are dropped. `first` is regenerated on the word after
/// each `frame_last`.
#[derive(Debug, Clone)]
pub struct ImageToPacket<P> {
    at_frame_start: bool,
    _word: PhantomData<fn(P) -> P>,
}

impl<P> ImageToPacket<P> {
    /// New adapter, expecting the start of a frame
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_frame_start: true,
            _word: PhantomData,
        }
    }
}

impl<P> Default for ImageToPacket<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone> StreamStage for ImageToPacket<P> {
    type In = ImageBeat<P>;
    type Out = Beat<P>;

    fn offer(&self, upstream: Option<&ImageBeat<P>>) -> Option<Beat<P>> {
        upstream.map(|word| Beat {
            payload: word.payload.clone(),
            first: self.at_frame_start,
            last: word.frame_last,
        })
    }

    fn ready(&self, downstream_ready: bool) -> bool {
        downstream_ready
    }

    fn tick(&mut self, upstream: Option<&ImageBeat<P>>, downstream_ready: bool) {
        if let (Some(word), true) = (upstream, downstream_ready) {
            self.at_frame_start = word.frame_last;
        }
    }
}
