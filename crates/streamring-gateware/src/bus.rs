// SPDX-License-Identifier: AGPL-3.0-only

//! Bus write-master collaborator.
//!
//! The ring writer hands the master one word request per accepted input
//! word. A request with `commit` set closes a burst; the master answers each
//! committed burst with exactly one [`BusResponse`], in issue order.
//!
//! ```text
//!  DramRingWriter ──WriteRequest──▶ ┌──────────────┐ ──words──▶ MemoryModel
//!        ▲                          │ write FIFO   │
//!        └──── can_accept ───────── │ (depth D)    │
//!        └──── BusResponse ──────── └──────────────┘
//! ```
//!
//! Burst framing on the wire is the master's business; [`SimWriteMaster`]
//! models only what the writer can observe: FIFO backpressure, drain rate
//! and the per-burst response.

use crate::memory::MemoryModel;
use crate::sim::{StallPattern, StallProfile};
use std::collections::VecDeque;
use streamring_regs::port::{self, Port};

/// One word handed to the write master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    /// Byte address
    pub address: u64,
    /// Word to store
    pub data: u64,
    /// Closes the current burst
    pub commit: bool,
}

/// Write response of one burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusResponse {
    /// All words stored
    Okay,
    /// Slave error: the target rejected a write
    SlvErr,
    /// Decode error: no slave at the address
    DecErr,
}

impl BusResponse {
    /// Whether the burst completed without error
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Okay)
    }

    /// The more severe of two responses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::DecErr, _) | (_, Self::DecErr) => Self::DecErr,
            (Self::SlvErr, _) | (_, Self::SlvErr) => Self::SlvErr,
            _ => Self::Okay,
        }
    }
}

/// Write-master contract seen by the ring writer
pub trait WriteMaster {
    /// Whether a request presented this cycle will be taken.
    ///
    /// Must depend on registered state only.
    fn can_accept(&self) -> bool;

    /// Clock edge. `request` is only `Some` if `can_accept()` held this cycle.
    ///
    /// Returns the response of a burst that completed on this edge.
    fn tick(&mut self, request: Option<WriteRequest>) -> Option<BusResponse>;

    /// Whether every request taken so far has been retired and answered
    fn is_idle(&self) -> bool;
}

impl<W: WriteMaster + ?Sized> WriteMaster for Box<W> {
    fn can_accept(&self) -> bool {
        (**self).can_accept()
    }

    fn tick(&mut self, request: Option<WriteRequest>) -> Option<BusResponse> {
        (**self).tick(request)
    }

    fn is_idle(&self) -> bool {
        (**self).is_idle()
    }
}

/// Shape of a platform's memory write port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusGeometry {
    /// Bytes per bus word
    pub word_bytes: u32,
    /// Longest burst in words
    pub max_burst_len: u32,
    /// Write FIFO depth in words
    pub fifo_depth: usize,
    /// Words retired into memory per cycle
    pub drain_per_cycle: usize,
    /// Size of the DRAM window
    pub dram_size: u64,
    /// Ring base used when none is configured
    pub default_ring_base: u64,
}

impl BusGeometry {
    /// Geometry of `port`
    #[must_use]
    pub const fn for_port(p: Port) -> Self {
        let (max_burst_len, fifo_depth, drain_per_cycle) = match p {
            Port::Sim => (port::sim::MAX_BURST_LEN, port::sim::WRITE_FIFO_DEPTH, port::sim::DRAIN_PER_CYCLE),
            Port::ZynqHp => (
                port::zynq_hp::MAX_BURST_LEN,
                port::zynq_hp::WRITE_FIFO_DEPTH,
                port::zynq_hp::DRAIN_PER_CYCLE,
            ),
            Port::ZynqMpHp => (
                port::zynqmp_hp::MAX_BURST_LEN,
                port::zynqmp_hp::WRITE_FIFO_DEPTH,
                port::zynqmp_hp::DRAIN_PER_CYCLE,
            ),
        };
        Self {
            word_bytes: p.word_bytes(),
            max_burst_len,
            fifo_depth,
            drain_per_cycle,
            dram_size: p.dram_size(),
            default_ring_base: p.default_ring_base(),
        }
    }
}

impl Default for BusGeometry {
    fn default() -> Self {
        Self::for_port(Port::Sim)
    }
}

// ── Simulation model ─────────────────────────────────────────────────────────

/// FIFO-buffered write master in front of a [`MemoryModel`].
///
/// Each cycle the master first retires up to `drain_per_cycle` queued words
/// into memory, then takes the new request. A stall profile can hold
/// `can_accept` low on top of FIFO backpressure, modelling interconnect
/// contention.
#[derive(Debug)]
pub struct SimWriteMaster<M> {
    memory: M,
    geometry: BusGeometry,
    fifo: VecDeque<WriteRequest>,
    responses: VecDeque<BusResponse>,
    burst_result: BusResponse,
    stall: StallPattern,
    stalled: bool,
    words_retired: u64,
}

impl<M: MemoryModel> SimWriteMaster<M> {
    /// Master with the given port geometry and no extra stalls
    pub fn new(memory: M, geometry: BusGeometry) -> Self {
        Self::with_stalls(memory, geometry, StallProfile::Never)
    }

    /// Master that additionally refuses requests per `stall`
    pub fn with_stalls(memory: M, geometry: BusGeometry, stall: StallProfile) -> Self {
        let mut stall = StallPattern::new(stall);
        let stalled = stall.next_stalled();
        Self {
            memory,
            geometry,
            fifo: VecDeque::with_capacity(geometry.fifo_depth),
            responses: VecDeque::new(),
            burst_result: BusResponse::Okay,
            stall,
            stalled,
            words_retired: 0,
        }
    }

    /// Port geometry
    pub const fn geometry(&self) -> BusGeometry {
        self.geometry
    }

    /// Memory behind the port
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    /// Words waiting in the FIFO
    pub fn queued(&self) -> usize {
        self.fifo.len()
    }

    /// Words written into memory so far
    pub const fn words_retired(&self) -> u64 {
        self.words_retired
    }

    fn drain(&mut self) {
        for _ in 0..self.geometry.drain_per_cycle {
            let Some(req) = self.fifo.pop_front() else { break };
            let result = self.memory.write(req.address, req.data);
            self.burst_result = self.burst_result.worst(result);
            self.words_retired += 1;
            if req.commit {
                self.responses.push_back(self.burst_result);
                self.burst_result = BusResponse::Okay;
            }
        }
    }
}

impl<M: MemoryModel> WriteMaster for SimWriteMaster<M> {
    fn can_accept(&self) -> bool {
        !self.stalled && self.fifo.len() < self.geometry.fifo_depth
    }

    fn tick(&mut self, request: Option<WriteRequest>) -> Option<BusResponse> {
        self.drain();
        if let Some(req) = request {
            self.fifo.push_back(req);
        }
        self.stalled = self.stall.next_stalled();
        self.responses.pop_front()
    }

    fn is_idle(&self) -> bool {
        self.fifo.is_empty() && self.responses.is_empty()
    }
}
