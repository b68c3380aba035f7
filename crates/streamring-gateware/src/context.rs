// SPDX-License-Identifier: AGPL-3.0-only

//! Simulation context: clock domains and elapsed cycles.
//!
//! One context is created per simulated design and handed to elaboration and
//! to the testbench. Nothing about clocks lives in process-wide state.

use crate::error::{GatewareError, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// Clock domain table and cycle counter of one simulated design
#[derive(Debug, Clone, Default)]
pub struct SimContext {
    clocks: BTreeMap<String, u64>,
    cycle: u64,
}

impl SimContext {
    /// Empty context at cycle 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register clock domain `name` running at `hz`.
    ///
    /// Registering the same domain twice at the same frequency is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] for a zero frequency or a
    /// domain already registered at a different frequency.
    pub fn add_clock(&mut self, name: impl Into<String>, hz: u64) -> Result<()> {
        let name = name.into();
        if hz == 0 {
            return Err(GatewareError::invalid_config(format!("clock `{name}` has zero frequency")));
        }
        match self.clocks.get(&name) {
            Some(&existing) if existing != hz => Err(GatewareError::invalid_config(format!(
                "clock `{name}` already registered at {existing} Hz, not {hz} Hz"
            ))),
            _ => {
                self.clocks.insert(name, hz);
                Ok(())
            }
        }
    }

    /// Frequency of domain `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::UnknownClock`] if the domain was never added.
    pub fn clock(&self, name: &str) -> Result<u64> {
        self.clocks
            .get(name)
            .copied()
            .ok_or_else(|| GatewareError::UnknownClock { name: name.to_string() })
    }

    /// Registered domains in name order
    pub fn clocks(&self) -> impl Iterator<Item = (&str, u64)> {
        self.clocks.iter().map(|(name, hz)| (name.as_str(), *hz))
    }

    /// Edges simulated so far
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Count `cycles` more edges
    pub fn advance(&mut self, cycles: u64) {
        self.cycle += cycles;
    }

    /// Wall time the simulated cycles represent in domain `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::UnknownClock`] if the domain was never added.
    pub fn elapsed(&self, name: &str) -> Result<Duration> {
        let hz = self.clock(name)?;
        let nanos = u128::from(self.cycle) * 1_000_000_000 / u128::from(hz);
        Ok(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_are_explicit() {
        let mut ctx = SimContext::new();
        ctx.add_clock("sync", 100_000_000).unwrap();
        ctx.add_clock("sync", 100_000_000).unwrap();
        assert!(ctx.add_clock("sync", 50_000_000).is_err());
        assert!(ctx.add_clock("axi", 0).is_err());
        assert_eq!(ctx.clock("sync").unwrap(), 100_000_000);
        assert!(matches!(ctx.clock("pix"), Err(GatewareError::UnknownClock { .. })));
    }

    #[test]
    fn elapsed_follows_cycles() {
        let mut ctx = SimContext::new();
        ctx.add_clock("sync", 100_000_000).unwrap();
        ctx.advance(250);
        assert_eq!(ctx.cycle(), 250);
        assert_eq!(ctx.elapsed("sync").unwrap(), Duration::from_micros(2) + Duration::from_nanos(500));
    }

    #[test]
    fn separate_contexts_do_not_share_clocks() {
        let mut a = SimContext::new();
        a.add_clock("sync", 1).unwrap();
        let b = SimContext::new();
        assert!(b.clock("sync").is_err());
        assert_eq!(a.clocks().count(), 1);
    }
}
