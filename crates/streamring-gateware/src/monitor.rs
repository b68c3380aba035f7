// SPDX-License-Identifier: AGPL-3.0-only

//! Stream contract monitor and transfer statistics.
//!
//! The monitor watches one stream, one cycle at a time, and enforces the
//! no-loss rule: a word offered without being accepted must be offered again,
//! identical, on the next cycle. It replaces a bounded formal check with a
//! runtime assertion that every randomized testbench run goes through.

use crate::error::{GatewareError, Result};
use crate::stream::Framed;
use std::fmt::Debug;

/// Transfer statistics of one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Cycles with `valid && ready`
    pub transfers: u64,
    /// Cycles with `valid && !ready`
    pub stall_cycles: u64,
    /// Cycles with `!valid`
    pub idle_cycles: u64,
    /// Transfers that closed a packet
    pub packets: u64,
}

impl StreamStats {
    /// Total observed cycles
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.transfers + self.stall_cycles + self.idle_cycles
    }

    /// Fraction of cycles that moved a word
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        match self.cycles() {
            0 => 0.0,
            n => self.transfers as f64 / n as f64,
        }
    }
}

/// Per-stream contract checker
#[derive(Debug, Clone)]
pub struct ContractMonitor<T> {
    name: String,
    pending: Option<T>,
    cycle: u64,
    stats: StreamStats,
}

impl<T: Clone + PartialEq + Debug + Framed> ContractMonitor<T> {
    /// New monitor for the stream called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: None,
            cycle: 0,
            stats: StreamStats::default(),
        }
    }

    /// Observe one cycle of the stream.
    ///
    /// Returns whether a transfer happened this cycle.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::ContractViolation`] if a word left pending on
    /// the previous cycle was withdrawn or altered.
    pub fn observe(&mut self, offer: Option<&T>, ready: bool) -> Result<bool> {
        if let Some(held) = &self.pending {
            match offer {
                None => {
                    return Err(GatewareError::contract_violation(
                        &self.name,
                        self.cycle,
                        format!("valid dropped while {held:?} was pending"),
                    ));
                }
                Some(now) if now != held => {
                    return Err(GatewareError::contract_violation(
                        &self.name,
                        self.cycle,
                        format!("pending word changed from {held:?} to {now:?}"),
                    ));
                }
                Some(_) => {}
            }
        }

        let transfer = match offer {
            Some(word) if ready => {
                self.stats.transfers += 1;
                if word.ends_packet() {
                    self.stats.packets += 1;
                }
                self.pending = None;
                true
            }
            Some(word) => {
                self.stats.stall_cycles += 1;
                self.pending = Some(word.clone());
                false
            }
            None => {
                self.stats.idle_cycles += 1;
                false
            }
        };
        self.cycle += 1;
        Ok(transfer)
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics so far
    pub const fn stats(&self) -> StreamStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Beat;

    #[test]
    fn held_word_passes() {
        let mut m = ContractMonitor::new("s");
        let w = Beat::new(5u32);
        assert!(!m.observe(Some(&w), false).unwrap());
        assert!(!m.observe(Some(&w), false).unwrap());
        assert!(m.observe(Some(&w), true).unwrap());
        assert!(!m.observe(None, true).unwrap());
        let s = m.stats();
        assert_eq!((s.transfers, s.stall_cycles, s.idle_cycles), (1, 2, 1));
    }

    #[test]
    fn retraction_is_flagged() {
        let mut m = ContractMonitor::new("s");
        m.observe(Some(&Beat::new(1u8)), false).unwrap();
        let err = m.observe(None, true).unwrap_err();
        assert!(matches!(err, GatewareError::ContractViolation { cycle: 1, .. }));
    }

    #[test]
    fn changed_payload_is_flagged() {
        let mut m = ContractMonitor::new("s");
        m.observe(Some(&Beat::new(1u8)), false).unwrap();
        assert!(m.observe(Some(&Beat::new(2u8)), true).is_err());
    }

    #[test]
    fn changed_last_marker_is_flagged() {
        let mut m = ContractMonitor::new("s");
        m.observe(Some(&Beat::new(1u8)), false).unwrap();
        assert!(m.observe(Some(&Beat::new(1u8).with_last(true)), true).is_err());
    }

    #[test]
    fn packets_counted_on_last() {
        let mut m = ContractMonitor::new("s");
        m.observe(Some(&Beat::new(1u8)), true).unwrap();
        m.observe(Some(&Beat::new(2u8).with_last(true)), true).unwrap();
        assert_eq!(m.stats().packets, 1);
        assert!((m.stats().utilization() - 1.0).abs() < f64::EPSILON);
    }
}
