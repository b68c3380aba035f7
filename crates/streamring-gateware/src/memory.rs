// SPDX-License-Identifier: AGPL-3.0-only

//! DRAM models behind the simulated write port.
//!
//! | Model | Memory use | Readable | Purpose |
//! |-------|-----------|----------|---------|
//! | [`SparseDram`] | pages touched | yes | host reads, fault injection |
//! | [`DigestDram`] | one digest per region | no | full-size captures |

use crate::bus::BusResponse;
use crate::error::{GatewareError, Result};
use crate::ring::RingLayout;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Bytes per stored word
pub const WORD_BYTES: u64 = 8;

const PAGE_WORDS: usize = 512;
const PAGE_BYTES: u64 = PAGE_WORDS as u64 * WORD_BYTES;

/// Sink for word writes coming out of a write master
pub trait MemoryModel {
    /// Store one word and report how the slave answered.
    fn write(&mut self, address: u64, data: u64) -> BusResponse;
}

/// Word-granular read access, as the host sees DRAM
pub trait MemoryRead {
    /// Load the word at byte `address`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::MemoryRead`] if the address cannot be read.
    fn read(&self, address: u64) -> Result<u64>;
}

impl<M: MemoryModel + ?Sized> MemoryModel for &mut M {
    fn write(&mut self, address: u64, data: u64) -> BusResponse {
        (**self).write(address, data)
    }
}

// ── SparseDram ───────────────────────────────────────────────────────────────

/// Paged DRAM of a fixed size. Unwritten words read as zero.
///
/// Writes past `size` or off word alignment answer `DecErr`; writes into an
/// injected faulty range answer `SlvErr` and are dropped.
pub struct SparseDram {
    size: u64,
    pages: HashMap<u64, Box<[u64; PAGE_WORDS]>>,
    faulty: Vec<Range<u64>>,
    words_written: u64,
}

impl SparseDram {
    /// DRAM of `size` bytes
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            pages: HashMap::new(),
            faulty: Vec::new(),
            words_written: 0,
        }
    }

    /// Make writes into `range` (bytes) fail with `SlvErr`
    #[must_use]
    pub fn with_faulty_range(mut self, range: Range<u64>) -> Self {
        self.faulty.push(range);
        self
    }

    /// Size in bytes
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Words successfully stored so far
    #[must_use]
    pub const fn words_written(&self) -> u64 {
        self.words_written
    }

    /// Read `count` consecutive words starting at `address`.
    ///
    /// # Errors
    ///
    /// Fails on the first word that cannot be read.
    pub fn read_words(&self, address: u64, count: u64) -> Result<Vec<u64>> {
        (0..count).map(|i| self.read(address + i * WORD_BYTES)).collect()
    }

    fn check(&self, address: u64) -> std::result::Result<(), &'static str> {
        if address % WORD_BYTES != 0 {
            return Err("unaligned");
        }
        if address.checked_add(WORD_BYTES).map_or(true, |end| end > self.size) {
            return Err("beyond end of memory");
        }
        Ok(())
    }
}

impl fmt::Debug for SparseDram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseDram")
            .field("size", &self.size)
            .field("pages", &self.pages.len())
            .field("faulty", &self.faulty)
            .field("words_written", &self.words_written)
            .finish()
    }
}

impl MemoryModel for SparseDram {
    fn write(&mut self, address: u64, data: u64) -> BusResponse {
        if self.check(address).is_err() {
            return BusResponse::DecErr;
        }
        if self.faulty.iter().any(|r| r.contains(&address)) {
            return BusResponse::SlvErr;
        }
        let page = self
            .pages
            .entry(address / PAGE_BYTES)
            .or_insert_with(|| Box::new([0; PAGE_WORDS]));
        page[((address % PAGE_BYTES) / WORD_BYTES) as usize] = data;
        self.words_written += 1;
        BusResponse::Okay
    }
}

impl MemoryRead for SparseDram {
    fn read(&self, address: u64) -> Result<u64> {
        self.check(address)
            .map_err(|reason| GatewareError::memory_read(address, reason))?;
        Ok(self
            .pages
            .get(&(address / PAGE_BYTES))
            .map_or(0, |page| page[((address % PAGE_BYTES) / WORD_BYTES) as usize]))
    }
}

// ── DigestDram ───────────────────────────────────────────────────────────────

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fold_word(digest: u64, word: u64) -> u64 {
    word.to_le_bytes()
        .iter()
        .fold(digest, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Digest of a word sequence, matching what [`DigestDram`] computes for a
/// region filled from offset 0 in order.
pub fn digest_words(words: impl IntoIterator<Item = u64>) -> u64 {
    words.into_iter().fold(FNV_OFFSET, fold_word)
}

/// Keeps an order-sensitive FNV-1a digest per ring region instead of data.
///
/// A write to word offset 0 restarts the region's digest, so after a fill
/// the digest covers exactly the words of the latest fill. Addresses outside
/// the ring answer `DecErr`.
#[derive(Debug, Clone)]
pub struct DigestDram {
    layout: RingLayout,
    digests: Vec<u64>,
    words: Vec<u64>,
    out_of_order: u64,
}

impl DigestDram {
    /// Digest store for `layout`
    #[must_use]
    pub fn new(layout: RingLayout) -> Self {
        let n = layout.n_buffers();
        Self {
            layout,
            digests: vec![FNV_OFFSET; n],
            words: vec![0; n],
            out_of_order: 0,
        }
    }

    /// Digest of region `index`
    #[must_use]
    pub fn region_digest(&self, index: usize) -> Option<u64> {
        self.digests.get(index).copied()
    }

    /// Words folded into region `index` since its last restart
    #[must_use]
    pub fn region_words(&self, index: usize) -> Option<u64> {
        self.words.get(index).copied()
    }

    /// Writes that did not land on the next sequential offset of their region
    #[must_use]
    pub const fn out_of_order_writes(&self) -> u64 {
        self.out_of_order
    }
}

impl MemoryModel for DigestDram {
    fn write(&mut self, address: u64, data: u64) -> BusResponse {
        let Some((region, offset)) = self.layout.region_of(address) else {
            return BusResponse::DecErr;
        };
        if offset == 0 {
            self.digests[region] = FNV_OFFSET;
            self.words[region] = 0;
        } else if offset != self.words[region] {
            self.out_of_order += 1;
        }
        self.digests[region] = fold_word(self.digests[region], data);
        self.words[region] += 1;
        BusResponse::Okay
    }
}
