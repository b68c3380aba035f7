// SPDX-License-Identifier: AGPL-3.0-only

//! Target platforms and ring-writer elaboration.
//!
//! The set of platforms is closed: [`PlatformKind`] names every variant and
//! [`PlatformKind::platform`] hands out the matching [`Platform`]
//! implementation. Elaboration goes through that trait object, never through
//! a lookup by name.
//!
//! | Kind | Port | Clock domains |
//! |------|------|---------------|
//! | `sim` | [`Port::Sim`] | `sync` |
//! | `zynq` | [`Port::ZynqHp`] | `sync`, `axi_hp` |
//! | `zynqmp` | [`Port::ZynqMpHp`] | `sync`, `axi_hp` |

use crate::bus::{BusGeometry, SimWriteMaster};
use crate::context::SimContext;
use crate::error::{GatewareError, Result};
use crate::memory::MemoryModel;
use crate::sim::StallProfile;
use crate::writer::{DramRingWriter, RingWriterConfig};
use std::fmt;
use std::str::FromStr;
use streamring_regs::port::{self, Port};
use tracing::info;

/// Every supported platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlatformKind {
    /// Pure simulation
    #[default]
    Sim,
    /// Zynq-7000 PL writing through an HP port
    Zynq,
    /// Zynq UltraScale+ PL writing through an HP port
    ZynqMp,
}

impl PlatformKind {
    /// All variants
    pub const ALL: [Self; 3] = [Self::Sim, Self::Zynq, Self::ZynqMp];

    /// The platform implementation for this kind
    #[must_use]
    pub fn platform(self) -> Box<dyn Platform> {
        match self {
            Self::Sim => Box::new(SimPlatform),
            Self::Zynq => Box::new(ZynqPlatform),
            Self::ZynqMp => Box::new(ZynqMpPlatform),
        }
    }

    /// Memory write port of this platform
    #[must_use]
    pub const fn port(self) -> Port {
        match self {
            Self::Sim => Port::Sim,
            Self::Zynq => Port::ZynqHp,
            Self::ZynqMp => Port::ZynqMpHp,
        }
    }

    /// Lower-case name used on the command line
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Zynq => "zynq",
            Self::ZynqMp => "zynqmp",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlatformKind {
    type Err = GatewareError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| GatewareError::invalid_config(format!("unknown platform `{s}` (expected sim, zynq or zynqmp)")))
    }
}

/// A target the ring writer can be elaborated for
pub trait Platform: fmt::Debug {
    /// Which variant this is
    fn kind(&self) -> PlatformKind;

    /// Memory write port geometry
    fn bus(&self) -> BusGeometry {
        BusGeometry::for_port(self.kind().port())
    }

    /// Clock domains the design needs, as `(name, hz)`
    fn clocks(&self) -> Vec<(&'static str, u64)>;

    /// Ring writer configuration matching the port defaults
    fn default_config(&self) -> RingWriterConfig {
        let bus = self.bus();
        RingWriterConfig::default()
            .with_base_address(bus.default_ring_base)
            .with_word_bytes(bus.word_bytes)
            .with_max_burst_len(bus.max_burst_len)
    }

    /// Platform-specific checks on a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] if the ring does not fit the port.
    fn check(&self, config: &RingWriterConfig) -> Result<()> {
        let bus = self.bus();
        if config.word_bytes != bus.word_bytes {
            return Err(GatewareError::invalid_config(format!(
                "{} port words are {} bytes, configuration asks for {}",
                self.kind(),
                bus.word_bytes,
                config.word_bytes
            )));
        }
        let end = config.layout()?.end_address();
        if end > bus.dram_size {
            return Err(GatewareError::invalid_config(format!(
                "ring ends at {end:#x}, past the {:#x}-byte DRAM window of {}",
                bus.dram_size,
                self.kind()
            )));
        }
        Ok(())
    }
}

impl dyn Platform {
    /// Elaborate a ring writer driving a simulated write port of this
    /// platform, registering the platform's clocks in `ctx`.
    ///
    /// The configured burst length is clamped to what the port supports.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] if the configuration does not
    /// validate or does not fit the port.
    pub fn elaborate_ring_writer<M: MemoryModel>(
        &self,
        ctx: &mut SimContext,
        config: RingWriterConfig,
        memory: M,
        stall: StallProfile,
    ) -> Result<DramRingWriter<SimWriteMaster<M>>> {
        for (name, hz) in self.clocks() {
            ctx.add_clock(name, hz)?;
        }
        let bus = self.bus();
        let config = config.with_max_burst_len(config.max_burst_len.min(bus.max_burst_len));
        config.validate()?;
        self.check(&config)?;

        info!(
            platform = %self.kind(),
            n_buffers = config.n_buffers,
            buffer_size = config.buffer_size,
            fifo_depth = bus.fifo_depth,
            "elaborating ring writer"
        );
        DramRingWriter::new(config, SimWriteMaster::with_stalls(memory, bus, stall))
    }
}

/// Simulation target
#[derive(Debug, Clone, Copy, Default)]
pub struct SimPlatform;

impl Platform for SimPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Sim
    }

    fn clocks(&self) -> Vec<(&'static str, u64)> {
        vec![("sync", port::sim::CLOCK_HZ)]
    }
}

/// Zynq-7000 target
#[derive(Debug, Clone, Copy, Default)]
pub struct ZynqPlatform;

impl Platform for ZynqPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Zynq
    }

    fn clocks(&self) -> Vec<(&'static str, u64)> {
        vec![("sync", port::zynq_hp::CLOCK_HZ), ("axi_hp", port::zynq_hp::CLOCK_HZ)]
    }
}

/// Zynq UltraScale+ target
#[derive(Debug, Clone, Copy, Default)]
pub struct ZynqMpPlatform;

impl Platform for ZynqMpPlatform {
    fn kind(&self) -> PlatformKind {
        PlatformKind::ZynqMp
    }

    fn clocks(&self) -> Vec<(&'static str, u64)> {
        vec![("sync", port::zynqmp_hp::CLOCK_HZ), ("axi_hp", port::zynqmp_hp::CLOCK_HZ)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SparseDram;

    #[test]
    fn names_round_trip() {
        for kind in PlatformKind::ALL {
            assert_eq!(kind.to_string().parse::<PlatformKind>().unwrap(), kind);
            assert_eq!(kind.platform().kind(), kind);
        }
        assert_eq!("ZynqMP".parse::<PlatformKind>().unwrap(), PlatformKind::ZynqMp);
        assert!("ice40".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn zynq_defaults_follow_port() {
        let config = PlatformKind::Zynq.platform().default_config();
        assert_eq!(config.base_address, 0x0f80_0000);
        assert_eq!(config.n_buffers, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn elaboration_registers_clocks() {
        let mut ctx = SimContext::new();
        let platform = PlatformKind::Zynq.platform();
        let config = RingWriterConfig::new(0x0f80_0000, 64, 4);
        let writer = platform
            .elaborate_ring_writer(&mut ctx, config, SparseDram::new(1 << 30), StallProfile::Never)
            .unwrap();
        assert_eq!(ctx.clock("axi_hp").unwrap(), 150_000_000);
        assert_eq!(writer.master().geometry().fifo_depth, 128);
    }

    #[test]
    fn ring_must_fit_dram() {
        let mut ctx = SimContext::new();
        let config = RingWriterConfig::new(0x3000_0000, 0x0100_0000, 4);
        let result = PlatformKind::Zynq.platform().elaborate_ring_writer(
            &mut ctx,
            config,
            SparseDram::new(1 << 30),
            StallProfile::Never,
        );
        assert!(matches!(result, Err(GatewareError::InvalidConfig { .. })));
    }

    #[test]
    fn contexts_are_independent() {
        let mut a = SimContext::new();
        let mut b = SimContext::new();
        let config = RingWriterConfig::new(0, 16, 2);
        PlatformKind::Sim
            .platform()
            .elaborate_ring_writer(&mut a, config, SparseDram::new(1 << 20), StallProfile::Never)
            .unwrap();
        assert!(b.clock("sync").is_err());
        PlatformKind::Zynq
            .platform()
            .elaborate_ring_writer(&mut b, config, SparseDram::new(1 << 30), StallProfile::Never)
            .unwrap();
        assert_eq!(a.clock("sync").unwrap(), 100_000_000);
        assert_eq!(b.clock("sync").unwrap(), 150_000_000);
    }
}
