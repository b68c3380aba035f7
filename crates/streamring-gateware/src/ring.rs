// SPDX-License-Identifier: AGPL-3.0-only

//! Ring buffer address storage.
//!
//! A ring is `n_buffers` equally sized regions laid out back to back:
//!
//! ```text
//! base_address
//! │
//! ▼
//! ┌──────────────┬──────────────┬──────────────┬──────────────┐
//! │   region 0   │   region 1   │     ...      │  region n-1  │
//! └──────────────┴──────────────┴──────────────┴──────────────┘
//!  ◀─ buffer_size words ─▶
//! ```
//!
//! Geometry is fixed at construction. [`RingStorage`] adds the one piece of
//! state: the index of the region currently receiving words.

use crate::error::{GatewareError, Result};
use streamring_regs::regs::MAX_REGIONS;

/// Static geometry of a ring of memory regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingLayout {
    base_address: u64,
    buffer_size: u64,
    n_buffers: usize,
    word_bytes: u32,
}

impl RingLayout {
    /// Validate and build a layout.
    ///
    /// `base_address` is in bytes, `buffer_size` in words.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] if fewer than two or more
    /// than [`MAX_REGIONS`] regions are requested, if `buffer_size` is zero,
    /// if `word_bytes` is not a power of two, if `base_address` is not word
    /// aligned, or if the ring would run past the end of the address space.
    pub fn new(base_address: u64, buffer_size: u64, n_buffers: usize, word_bytes: u32) -> Result<Self> {
        if n_buffers < 2 {
            return Err(GatewareError::invalid_config(format!(
                "n_buffers must be at least 2, got {n_buffers}"
            )));
        }
        if n_buffers > MAX_REGIONS {
            return Err(GatewareError::invalid_config(format!(
                "n_buffers {n_buffers} exceeds the {MAX_REGIONS} regions of the status block"
            )));
        }
        if buffer_size == 0 {
            return Err(GatewareError::invalid_config("buffer_size must be non-zero"));
        }
        if !word_bytes.is_power_of_two() {
            return Err(GatewareError::invalid_config(format!(
                "word size {word_bytes} is not a power of two"
            )));
        }
        if base_address % u64::from(word_bytes) != 0 {
            return Err(GatewareError::invalid_config(format!(
                "base address {base_address:#x} is not aligned to {word_bytes}-byte words"
            )));
        }
        let total = buffer_size
            .checked_mul(u64::from(word_bytes))
            .and_then(|bytes| bytes.checked_mul(n_buffers as u64))
            .and_then(|bytes| bytes.checked_add(base_address));
        if total.is_none() {
            return Err(GatewareError::invalid_config(
                "ring extends past the end of the address space",
            ));
        }
        Ok(Self {
            base_address,
            buffer_size,
            n_buffers,
            word_bytes,
        })
    }

    /// First byte of the ring
    #[must_use]
    pub const fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Region size in words
    #[must_use]
    pub const fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Number of regions
    #[must_use]
    pub const fn n_buffers(&self) -> usize {
        self.n_buffers
    }

    /// Bytes per word
    #[must_use]
    pub const fn word_bytes(&self) -> u32 {
        self.word_bytes
    }

    /// Region size in bytes
    #[must_use]
    pub const fn region_bytes(&self) -> u64 {
        self.buffer_size * self.word_bytes as u64
    }

    /// Byte address of region `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::RegionOutOfRange`] for `index >= n_buffers`.
    pub fn region_base(&self, index: usize) -> Result<u64> {
        if index >= self.n_buffers {
            return Err(GatewareError::RegionOutOfRange {
                index,
                count: self.n_buffers,
            });
        }
        Ok(self.base_address + index as u64 * self.region_bytes())
    }

    /// All region base addresses in index order
    #[must_use]
    pub fn region_bases(&self) -> Vec<u64> {
        (0..self.n_buffers as u64)
            .map(|i| self.base_address + i * self.region_bytes())
            .collect()
    }

    /// Byte address of word `offset` inside region `index`.
    ///
    /// The index is reduced modulo `n_buffers`; callers keep `offset` below
    /// `buffer_size`.
    #[must_use]
    pub fn word_address(&self, index: usize, offset: u64) -> u64 {
        let region = (index % self.n_buffers) as u64;
        self.base_address + region * self.region_bytes() + offset * u64::from(self.word_bytes)
    }

    /// One past the last byte of the ring
    #[must_use]
    pub const fn end_address(&self) -> u64 {
        self.base_address + self.n_buffers as u64 * self.region_bytes()
    }

    /// Map a byte address back to `(region, word offset)`.
    ///
    /// Returns `None` outside the ring or for an address that is not word aligned.
    #[must_use]
    pub fn region_of(&self, address: u64) -> Option<(usize, u64)> {
        if address < self.base_address || address >= self.end_address() {
            return None;
        }
        let rel = address - self.base_address;
        if rel % u64::from(self.word_bytes) != 0 {
            return None;
        }
        let region = usize::try_from(rel / self.region_bytes()).ok()?;
        let offset = (rel % self.region_bytes()) / u64::from(self.word_bytes);
        Some((region, offset))
    }

    /// Index following `index`, wrapping
    #[must_use]
    pub const fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.n_buffers
    }

    /// Index preceding `index`, wrapping
    #[must_use]
    pub const fn previous_index(&self, index: usize) -> usize {
        (index + self.n_buffers - 1) % self.n_buffers
    }
}

/// Ring geometry plus the active write index.
#[derive(Debug, Clone)]
pub struct RingStorage {
    layout: RingLayout,
    current: usize,
}

impl RingStorage {
    /// Storage starting at region 0
    #[must_use]
    pub const fn new(layout: RingLayout) -> Self {
        Self { layout, current: 0 }
    }

    /// Geometry
    #[must_use]
    pub const fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Region currently receiving words
    #[must_use]
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Move to the next region and return its index
    pub fn advance(&mut self) -> usize {
        self.current = self.layout.next_index(self.current);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_contiguous() {
        let l = RingLayout::new(0x1000, 0x100, 4, 8).unwrap();
        assert_eq!(l.region_bases(), vec![0x1000, 0x1800, 0x2000, 0x2800]);
        assert_eq!(l.region_base(3).unwrap(), 0x2800);
        assert_eq!(l.end_address(), 0x3000);
        assert_eq!(l.word_address(1, 2), 0x1810);
    }

    #[test]
    fn region_of_inverts_word_address() {
        let l = RingLayout::new(0x0f80_0000, 0x40, 3, 8).unwrap();
        for region in 0..3 {
            for offset in [0, 1, 0x3f] {
                assert_eq!(l.region_of(l.word_address(region, offset)), Some((region, offset)));
            }
        }
        assert_eq!(l.region_of(0x0f80_0000 - 8), None);
        assert_eq!(l.region_of(l.end_address()), None);
        assert_eq!(l.region_of(0x0f80_0004), None);
    }

    #[test]
    fn geometry_is_validated() {
        assert!(RingLayout::new(0, 16, 1, 8).is_err());
        assert!(RingLayout::new(0, 16, MAX_REGIONS + 1, 8).is_err());
        assert!(RingLayout::new(0, 0, 2, 8).is_err());
        assert!(RingLayout::new(0, 16, 2, 6).is_err());
        assert!(RingLayout::new(4, 16, 2, 8).is_err());
        assert!(RingLayout::new(u64::MAX - 64, 16, 2, 8).is_err());
        assert!(RingLayout::new(0, 16, MAX_REGIONS, 8).is_ok());
    }

    #[test]
    fn out_of_range_region() {
        let l = RingLayout::new(0, 16, 2, 8).unwrap();
        assert!(matches!(
            l.region_base(2),
            Err(GatewareError::RegionOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn storage_wraps() {
        let mut s = RingStorage::new(RingLayout::new(0, 4, 3, 8).unwrap());
        let seen: Vec<usize> = (0..5).map(|_| s.advance()).collect();
        assert_eq!(seen, vec![1, 2, 0, 1, 2]);
        assert_eq!(s.layout().region_base(s.current()).unwrap(), 64);
        assert_eq!(s.layout().previous_index(0), 2);
    }
}
