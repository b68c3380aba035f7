// SPDX-License-Identifier: AGPL-3.0-only

//! Write-port geometry for each supported platform.
//!
//! The ring writer never talks to a bus directly. It hands word requests to a
//! write master whose shape depends on the platform:
//!
//! ```text
//! Port       Word    Burst  FIFO   DRAM window              Default ring base
//! ────────── ─────── ────── ────── ──────────────────────── ─────────────────
//! sim        64 bit  16     16     4 GiB (sparse)           0x0000_0000
//! zynq HP    64 bit  16     128    1 GiB DDR                0x0f80_0000
//! zynqmp HP  64 bit  16     128    2 GiB DDR (low window)   0x1000_0000
//! ```
//!
//! The Zynq default base is the top of the range the stock kernel leaves to
//! the programmable logic on the reference boards.

/// Simulation port: word-addressed, unlimited bandwidth apart from the FIFO.
pub mod sim {
    /// Bytes per bus word.
    pub const WORD_BYTES: u32 = 8;
    /// Words per burst before the writer must commit.
    pub const MAX_BURST_LEN: u32 = 16;
    /// Outstanding words the port buffers before back-pressuring.
    pub const WRITE_FIFO_DEPTH: usize = 16;
    /// Words retired into memory per cycle.
    pub const DRAIN_PER_CYCLE: usize = 1;
    /// Size of the modelled memory.
    pub const DRAM_SIZE: u64 = 4 * 1024 * 1024 * 1024; // 4 GiB
    /// Ring base when the configuration leaves it open.
    pub const DEFAULT_RING_BASE: u64 = 0;
    /// Port clock.
    pub const CLOCK_HZ: u64 = 100_000_000;
}

/// Zynq-7000 high-performance AXI3 slave port.
pub mod zynq_hp {
    /// Bytes per bus word (64-bit HP port).
    pub const WORD_BYTES: u32 = 8;
    /// AXI3 bursts are at most 16 beats.
    pub const MAX_BURST_LEN: u32 = 16;
    /// Depth of the HP write-data FIFO.
    pub const WRITE_FIFO_DEPTH: usize = 128;
    /// Words retired per cycle.
    pub const DRAIN_PER_CYCLE: usize = 1;
    /// DDR behind the port.
    pub const DRAM_SIZE: u64 = 1024 * 1024 * 1024; // 1 GiB
    /// Ring base when the configuration leaves it open.
    pub const DEFAULT_RING_BASE: u64 = 0x0f80_0000;
    /// Port clock.
    pub const CLOCK_HZ: u64 = 150_000_000;
}

/// Zynq UltraScale+ high-performance AXI4 slave port.
pub mod zynqmp_hp {
    /// Bytes per bus word (HP port configured 64 bits wide).
    pub const WORD_BYTES: u32 = 8;
    /// Bursts are kept at 16 beats to match the write-response budget.
    pub const MAX_BURST_LEN: u32 = 16;
    /// Depth of the HP write-data FIFO.
    pub const WRITE_FIFO_DEPTH: usize = 128;
    /// Words retired per cycle.
    pub const DRAIN_PER_CYCLE: usize = 1;
    /// Low DDR window.
    pub const DRAM_SIZE: u64 = 2 * 1024 * 1024 * 1024; // 2 GiB
    /// Ring base when the configuration leaves it open.
    pub const DEFAULT_RING_BASE: u64 = 0x1000_0000;
    /// Port clock.
    pub const CLOCK_HZ: u64 = 250_000_000;
}

/// Port enumeration for table lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Simulation port.
    Sim,
    /// Zynq-7000 HP port.
    ZynqHp,
    /// Zynq UltraScale+ HP port.
    ZynqMpHp,
}

impl Port {
    /// Bytes per bus word.
    #[must_use]
    pub const fn word_bytes(self) -> u32 {
        match self {
            Self::Sim => sim::WORD_BYTES,
            Self::ZynqHp => zynq_hp::WORD_BYTES,
            Self::ZynqMpHp => zynqmp_hp::WORD_BYTES,
        }
    }

    /// Size of the DRAM window behind the port.
    #[must_use]
    pub const fn dram_size(self) -> u64 {
        match self {
            Self::Sim => sim::DRAM_SIZE,
            Self::ZynqHp => zynq_hp::DRAM_SIZE,
            Self::ZynqMpHp => zynqmp_hp::DRAM_SIZE,
        }
    }

    /// Default ring base address.
    #[must_use]
    pub const fn default_ring_base(self) -> u64 {
        match self {
            Self::Sim => sim::DEFAULT_RING_BASE,
            Self::ZynqHp => zynq_hp::DEFAULT_RING_BASE,
            Self::ZynqMpHp => zynqmp_hp::DEFAULT_RING_BASE,
        }
    }
}
