// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the gateware models
//!
//! Hardware faults (overflow, bus errors, raster shape mismatches) are not
//! errors here: the hardware records them as sticky flags and keeps going,
//! see [`crate::fault`]. This type covers what can go wrong while building
//! or driving the models.

use thiserror::Error;

/// Result type alias for gateware operations
pub type Result<T> = std::result::Result<T, GatewareError>;

/// Errors raised while configuring, elaborating or simulating the core
#[derive(Debug, Error)]
pub enum GatewareError {
    /// Construction-time configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// A producer retracted or changed a word that was offered but not accepted
    #[error("Stream contract violated on `{stream}` at cycle {cycle}: {detail}")]
    ContractViolation {
        /// Name of the monitored stream
        stream: String,
        /// Cycle on which the violation was observed
        cycle: u64,
        /// What happened
        detail: String,
    },

    /// Simulation budget exhausted before the design went idle
    #[error("Simulation did not settle within {cycles} cycles")]
    Timeout {
        /// Cycle budget that ran out
        cycles: u64,
    },

    /// Status block read outside the defined registers
    #[error("Register offset {offset:#06x} is not part of the status block")]
    RegisterOutOfRange {
        /// Offending offset
        offset: usize,
    },

    /// Region index out of range
    #[error("Region {index} out of range (have {count} regions)")]
    RegionOutOfRange {
        /// Requested region
        index: usize,
        /// Number of regions in the ring
        count: usize,
    },

    /// Memory model read failed
    #[error("Memory read at {address:#x} failed: {reason}")]
    MemoryRead {
        /// Byte address
        address: u64,
        /// Reason for failure
        reason: String,
    },

    /// Clock domain was never registered with the simulation context
    #[error("Unknown clock domain: {name}")]
    UnknownClock {
        /// Requested domain
        name: String,
    },

    /// Status block does not identify as a ring writer
    #[error("Status block mismatch: {reason}")]
    BlockMismatch {
        /// What did not match
        reason: String,
    },

    /// Host asked for a finished region before the writer completed one
    #[error("No region has been completed yet")]
    NoCompleteRegion,

    /// I/O error while exporting captured data
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl GatewareError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a contract violation error
    pub fn contract_violation(stream: impl Into<String>, cycle: u64, detail: impl Into<String>) -> Self {
        Self::ContractViolation {
            stream: stream.into(),
            cycle,
            detail: detail.into(),
        }
    }

    /// Create a memory read error
    pub fn memory_read(address: u64, reason: impl Into<String>) -> Self {
        Self::MemoryRead {
            address,
            reason: reason.into(),
        }
    }

    /// Create a status block mismatch error
    pub fn block_mismatch(reason: impl Into<String>) -> Self {
        Self::BlockMismatch {
            reason: reason.into(),
        }
    }
}
