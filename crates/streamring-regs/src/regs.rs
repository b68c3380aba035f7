// SPDX-License-Identifier: AGPL-3.0-only

//! Status block register map.
//!
//! The ring writer publishes its state through a block of read-only 32-bit
//! registers. The CSR collaborator places the block somewhere in the host
//! address map; every offset below is relative to that placement.
//!
//! ```text
//! 0x0000  IDENT                 "SRNG" magic
//! 0x0004  VERSION               block layout version
//! 0x0008  N_BUFFERS             region count (construction time)
//! 0x000c  BUFFER_SIZE           region size in words
//! 0x0010  MAX_PACKET_SIZE       cutoff in words
//! 0x0014  WORD_BYTES            bus word width in bytes
//! 0x0018  BASE_ADDR_LO/HI       ring base byte address
//! 0x0020  CURRENT_WRITE_BUFFER  region currently receiving words
//! 0x0024  STATUS                sticky fault bits
//! 0x0028  ACCEPTED_WORDS_LO/HI  64-bit accepted word counter
//! 0x0030  BUFFERS_WRITTEN       completed region fills
//! 0x0034  OVERFLOW_COUNT        forced cutoffs
//! 0x0038  BUS_OK_COUNT          OKAY write responses
//! 0x003c  BUS_ERROR_COUNT       non-OKAY write responses
//! 0x0040  SHAPE_MISMATCH_COUNT  adapter packets off the raster grid
//! 0x0044  FEATURES              construction-time feature bits
//! 0x0100  region table          MAX_REGIONS x 16 bytes
//! ```

// ── Identification ───────────────────────────────────────────────────────────

/// Identification register. Reads [`IDENT_MAGIC`].
pub const IDENT: usize = 0x0000;

/// `"SRNG"` in ASCII, most significant byte first.
pub const IDENT_MAGIC: u32 = 0x5352_4E47;

/// Layout version register.
pub const VERSION: usize = 0x0004;

/// Current layout version.
pub const LAYOUT_VERSION: u32 = 1;

// ── Configuration read-back ──────────────────────────────────────────────────

/// Number of ring regions.
pub const N_BUFFERS: usize = 0x0008;
/// Region size in bus words.
pub const BUFFER_SIZE: usize = 0x000C;
/// Packet cutoff in bus words.
pub const MAX_PACKET_SIZE: usize = 0x0010;
/// Bus word width in bytes.
pub const WORD_BYTES: usize = 0x0014;
/// Ring base byte address (low 32 bits).
pub const BASE_ADDR_LO: usize = 0x0018;
/// Ring base byte address (high 32 bits).
pub const BASE_ADDR_HI: usize = 0x001C;

// ── Live status ──────────────────────────────────────────────────────────────

/// Index of the region currently receiving words.
///
/// Every region other than this one holds a complete fill (or nothing yet).
pub const CURRENT_WRITE_BUFFER: usize = 0x0020;
/// Sticky fault bits, see [`status`].
pub const STATUS: usize = 0x0024;
/// Accepted input words (low 32 bits).
pub const ACCEPTED_WORDS_LO: usize = 0x0028;
/// Accepted input words (high 32 bits).
pub const ACCEPTED_WORDS_HI: usize = 0x002C;
/// Number of completed region fills.
pub const BUFFERS_WRITTEN: usize = 0x0030;
/// Number of packets cut off at `MAX_PACKET_SIZE`.
pub const OVERFLOW_COUNT: usize = 0x0034;
/// Number of OKAY burst responses.
pub const BUS_OK_COUNT: usize = 0x0038;
/// Number of error burst responses.
pub const BUS_ERROR_COUNT: usize = 0x003C;
/// Number of packets whose length was not a multiple of the raster width.
pub const SHAPE_MISMATCH_COUNT: usize = 0x0040;
/// Construction-time feature bits, see [`features`].
pub const FEATURES: usize = 0x0044;

// ── Region table ─────────────────────────────────────────────────────────────

/// First byte of the per-region table.
pub const REGION_TABLE_BASE: usize = 0x0100;
/// Stride between region table entries.
pub const REGION_STRIDE: usize = 0x10;
/// Offset of the base address (low 32 bits) inside a region entry.
pub const REGION_BASE_LO: usize = 0x0;
/// Offset of the base address (high 32 bits) inside a region entry.
pub const REGION_BASE_HI: usize = 0x4;
/// Offset of the fill level in words inside a region entry.
pub const REGION_LEVEL: usize = 0x8;

/// Largest region count the table has room for.
pub const MAX_REGIONS: usize = 64;

/// Size of the whole status block in bytes.
pub const BLOCK_SIZE: usize = 0x1000;

/// Offset of `field` in the table entry of region `index`.
#[must_use]
pub const fn region_register(index: usize, field: usize) -> usize {
    REGION_TABLE_BASE + index * REGION_STRIDE + field
}

/// Splits a table offset into `(region index, field offset)`.
///
/// Returns `None` for offsets outside the table or on the unused word of an entry.
#[must_use]
pub const fn decode_region_register(offset: usize) -> Option<(usize, usize)> {
    if offset < REGION_TABLE_BASE || offset >= REGION_TABLE_BASE + MAX_REGIONS * REGION_STRIDE {
        return None;
    }
    let rel = offset - REGION_TABLE_BASE;
    let field = rel % REGION_STRIDE;
    match field {
        REGION_BASE_LO | REGION_BASE_HI | REGION_LEVEL => Some((rel / REGION_STRIDE, field)),
        _ => None,
    }
}

/// Named scalar registers, in address order.
pub const SCALAR_REGISTERS: &[(usize, &str)] = &[
    (IDENT, "IDENT"),
    (VERSION, "VERSION"),
    (N_BUFFERS, "N_BUFFERS"),
    (BUFFER_SIZE, "BUFFER_SIZE"),
    (MAX_PACKET_SIZE, "MAX_PACKET_SIZE"),
    (WORD_BYTES, "WORD_BYTES"),
    (BASE_ADDR_LO, "BASE_ADDR_LO"),
    (BASE_ADDR_HI, "BASE_ADDR_HI"),
    (CURRENT_WRITE_BUFFER, "CURRENT_WRITE_BUFFER"),
    (STATUS, "STATUS"),
    (ACCEPTED_WORDS_LO, "ACCEPTED_WORDS_LO"),
    (ACCEPTED_WORDS_HI, "ACCEPTED_WORDS_HI"),
    (BUFFERS_WRITTEN, "BUFFERS_WRITTEN"),
    (OVERFLOW_COUNT, "OVERFLOW_COUNT"),
    (BUS_OK_COUNT, "BUS_OK_COUNT"),
    (BUS_ERROR_COUNT, "BUS_ERROR_COUNT"),
    (SHAPE_MISMATCH_COUNT, "SHAPE_MISMATCH_COUNT"),
    (FEATURES, "FEATURES"),
];

// ── Status register bit definitions ──────────────────────────────────────────

/// Bits of [`STATUS`]. All bits are sticky until the block is rebuilt.
pub mod status {
    /// A packet exceeded `MAX_PACKET_SIZE` and was cut off.
    pub const OVERFLOW: u32 = 1 << 0;
    /// The write port answered a burst with an error.
    pub const BUS_ERROR: u32 = 1 << 1;
    /// The raster adapter saw a packet off the line grid.
    pub const SHAPE_MISMATCH: u32 = 1 << 2;
}

/// Bits of [`FEATURES`].
pub mod features {
    /// `CURRENT_WRITE_BUFFER` advances only after the bus acknowledged the
    /// whole finished region.
    pub const COMPLETION_FENCE: u32 = 1 << 0;
}
