// SPDX-License-Identifier: AGPL-3.0-only

//! Sticky fault flags.
//!
//! The core never stops on a fault. Each fault kind is latched into a flag the
//! host can read, together with an occurrence counter, and the pipeline keeps
//! making forward progress.
//!
//! | Kind | Raised by | Meaning |
//! |------|-----------|---------|
//! | `ShapeMismatch` | `PacketToImage` | packet length not a multiple of the line width |
//! | `Overflow` | `DramRingWriter` | packet longer than `max_packet_size`, truncated |
//! | `BusError` | `DramRingWriter` | write port answered a burst with an error |

use std::fmt;

/// Fault categories recorded by the data plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Packet did not fit the configured raster geometry
    ShapeMismatch,
    /// Packet exceeded the configured maximum size
    Overflow,
    /// Write master returned a non-OK response
    BusError,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch => write!(f, "shape mismatch"),
            Self::Overflow => write!(f, "overflow"),
            Self::BusError => write!(f, "bus error"),
        }
    }
}

/// A latched fault flag with an occurrence counter.
///
/// Once raised the flag stays set for the lifetime of the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickyFlag {
    kind: FaultKind,
    raised: bool,
    count: u32,
}

impl StickyFlag {
    /// New, cleared flag
    #[must_use]
    pub const fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            raised: false,
            count: 0,
        }
    }

    /// Record one occurrence.
    ///
    /// Returns `true` on the occurrence that first sets the flag.
    pub fn raise(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        let first = !self.raised;
        self.raised = true;
        first
    }

    /// Fault category
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Whether the flag has ever been raised
    #[must_use]
    pub const fn is_raised(&self) -> bool {
        self.raised
    }

    /// Number of occurrences (saturating)
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }
}
