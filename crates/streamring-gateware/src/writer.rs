// SPDX-License-Identifier: AGPL-3.0-only

//! DRAM packet ring-buffer writer.
//!
//! Drains a packetized stream of 64-bit words into a ring of DRAM regions
//! through a [`WriteMaster`]. One region receives one packet; the writer
//! moves to the next region when the packet ends or when it has written
//! `max_packet_size` words of it.
//!
//! ```text
//!                    ┌─────────────────── DramRingWriter ───────────────────┐
//!  Beat<u64> ──────▶ │ cursor ─▶ word_address(index, cursor) ─▶ WriteRequest │ ──▶ WriteMaster
//!  ready ◀────────── │ ◀──────────────── can_accept ──────────────────────── │ ◀──
//!                    │ index ─▶ [fence] ─▶ current_write_buffer (host)       │ ◀── BusResponse
//!                    └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Region switch
//!
//! After each accepted word the writer checks two conditions:
//!
//! | Condition | Switch | Flag |
//! |-----------|--------|------|
//! | `last` on the word | yes | none |
//! | cursor reached `max_packet_size` without `last` | yes | `overflow` (once per packet) |
//!
//! A truncated packet keeps flowing into the next region with no gap.
//!
//! # Hand-off
//!
//! The host finds the latest complete region at `current_write_buffer - 1`.
//! With [`HandoffPolicy::OnAccept`] that index moves on the edge that accepts
//! the boundary word, which can be before the words have reached memory.
//! [`HandoffPolicy::OnCompletion`] holds the published index back until every
//! burst issued up to the boundary has been answered. Input throughput is the
//! same under both policies.

use crate::bus::{BusResponse, WriteMaster, WriteRequest};
use crate::error::{GatewareError, Result};
use crate::fault::{FaultKind, StickyFlag};
use crate::memory::WORD_BYTES;
use crate::ring::{RingLayout, RingStorage};
use crate::stream::{Beat, StreamConsumer};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Words per burst unless the port says otherwise
pub const DEFAULT_MAX_BURST_LEN: u32 = 16;

/// Region size (and cutoff) of the default configuration, in words
pub const DEFAULT_BUFFER_SIZE: u64 = 0x0120_0000;

/// When a new write index becomes visible to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandoffPolicy {
    /// Publish on the edge that accepts the boundary word
    #[default]
    OnAccept,
    /// Publish once the region's last burst has been acknowledged
    OnCompletion,
}

impl fmt::Display for HandoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnAccept => write!(f, "accept"),
            Self::OnCompletion => write!(f, "completion"),
        }
    }
}

impl FromStr for HandoffPolicy {
    type Err = GatewareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "accept" | "on-accept" => Ok(Self::OnAccept),
            "completion" | "on-completion" | "fence" => Ok(Self::OnCompletion),
            other => Err(GatewareError::invalid_config(format!(
                "unknown hand-off policy `{other}` (expected accept or completion)"
            ))),
        }
    }
}

/// Construction-time configuration of a ring writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingWriterConfig {
    /// Ring base byte address
    pub base_address: u64,
    /// Region size in words
    pub buffer_size: u64,
    /// Number of regions
    pub n_buffers: usize,
    /// Cutoff in words, `1..=buffer_size`
    pub max_packet_size: u64,
    /// Bytes per word on the bus
    pub word_bytes: u32,
    /// Words per burst before a forced commit
    pub max_burst_len: u32,
    /// Hand-off policy
    pub handoff: HandoffPolicy,
}

impl Default for RingWriterConfig {
    fn default() -> Self {
        Self::new(0, DEFAULT_BUFFER_SIZE, 4)
    }
}

impl RingWriterConfig {
    /// Ring of `n_buffers` regions of `buffer_size` words at `base_address`,
    /// with the cutoff equal to the region size
    #[must_use]
    pub const fn new(base_address: u64, buffer_size: u64, n_buffers: usize) -> Self {
        Self {
            base_address,
            buffer_size,
            n_buffers,
            max_packet_size: buffer_size,
            word_bytes: 8,
            max_burst_len: DEFAULT_MAX_BURST_LEN,
            handoff: HandoffPolicy::OnAccept,
        }
    }

    /// Set the packet cutoff
    #[must_use]
    pub const fn with_max_packet_size(mut self, words: u64) -> Self {
        self.max_packet_size = words;
        self
    }

    /// Set the hand-off policy
    #[must_use]
    pub const fn with_handoff(mut self, handoff: HandoffPolicy) -> Self {
        self.handoff = handoff;
        self
    }

    /// Set the ring base address
    #[must_use]
    pub const fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    /// Set the bus word width
    #[must_use]
    pub const fn with_word_bytes(mut self, word_bytes: u32) -> Self {
        self.word_bytes = word_bytes;
        self
    }

    /// Set the burst length limit
    #[must_use]
    pub const fn with_max_burst_len(mut self, words: u32) -> Self {
        self.max_burst_len = words;
        self
    }

    /// Ring geometry described by this configuration.
    ///
    /// # Errors
    ///
    /// Propagates [`RingLayout::new`] validation errors.
    pub fn layout(&self) -> Result<RingLayout> {
        RingLayout::new(self.base_address, self.buffer_size, self.n_buffers, self.word_bytes)
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] for an invalid ring geometry,
    /// a region larger than its status register can report, a cutoff
    /// outside `1..=buffer_size`, a word width other than the 64-bit data
    /// path, or a zero burst length.
    pub fn validate(&self) -> Result<()> {
        self.layout()?;
        if self.max_packet_size == 0 || self.max_packet_size > self.buffer_size {
            return Err(GatewareError::invalid_config(format!(
                "max_packet_size {} must be in 1..={}",
                self.max_packet_size, self.buffer_size
            )));
        }
        if u64::from(self.word_bytes) != WORD_BYTES {
            return Err(GatewareError::invalid_config(format!(
                "{}-byte words do not match the {WORD_BYTES}-byte data path",
                self.word_bytes
            )));
        }
        if u32::try_from(self.buffer_size).is_err() {
            return Err(GatewareError::invalid_config(format!(
                "buffer_size {:#x} does not fit the 32-bit BUFFER_SIZE register",
                self.buffer_size
            )));
        }
        if self.max_burst_len == 0 {
            return Err(GatewareError::invalid_config("max_burst_len must be non-zero"));
        }
        Ok(())
    }
}

/// Snapshot of everything the writer exposes to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStatus {
    /// Ring geometry
    pub layout: RingLayout,
    /// Packet cutoff in words
    pub max_packet_size: u64,
    /// Hand-off policy
    pub handoff: HandoffPolicy,
    /// Host-visible active region
    pub current_write_buffer: usize,
    /// Words accepted from the input stream
    pub accepted_words: u64,
    /// Region fills published to the host
    pub buffers_written: u64,
    /// Words written into each region during its latest fill
    pub levels: Vec<u64>,
    /// Sticky overflow flag
    pub overflow: StickyFlag,
    /// Sticky bus error flag
    pub bus_error: StickyFlag,
    /// Bursts answered `Okay`
    pub bus_ok_count: u64,
}

/// Packet ring-buffer writer in front of a write master
pub struct DramRingWriter<M> {
    storage: RingStorage,
    max_packet_size: u64,
    max_burst_len: u32,
    handoff: HandoffPolicy,
    master: M,

    cursor: u64,
    burst_len: u32,
    in_overflow: bool,
    levels: Vec<u64>,

    published: usize,
    fence: VecDeque<(u64, usize)>,
    bursts_issued: u64,
    bursts_completed: u64,

    accepted_words: u64,
    packets: u64,
    buffers_written: u64,
    overflow: StickyFlag,
    bus_error: StickyFlag,
    bus_ok_count: u64,
}

impl<M: WriteMaster> DramRingWriter<M> {
    /// Build a writer for `config` driving `master`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: RingWriterConfig, master: M) -> Result<Self> {
        config.validate()?;
        let layout = config.layout()?;
        debug!(
            base = layout.base_address(),
            buffer_size = layout.buffer_size(),
            n_buffers = layout.n_buffers(),
            max_packet_size = config.max_packet_size,
            handoff = %config.handoff,
            "ring writer configured"
        );
        Ok(Self {
            storage: RingStorage::new(layout),
            max_packet_size: config.max_packet_size,
            max_burst_len: config.max_burst_len,
            handoff: config.handoff,
            master,
            cursor: 0,
            burst_len: 0,
            in_overflow: false,
            levels: vec![0; layout.n_buffers()],
            published: 0,
            fence: VecDeque::new(),
            bursts_issued: 0,
            bursts_completed: 0,
            accepted_words: 0,
            packets: 0,
            buffers_written: 0,
            overflow: StickyFlag::new(FaultKind::Overflow),
            bus_error: StickyFlag::new(FaultKind::BusError),
            bus_ok_count: 0,
        })
    }

    /// Host-visible index of the region receiving words
    #[must_use]
    pub const fn current_write_buffer(&self) -> usize {
        self.published
    }

    /// Region the next accepted word goes to (may run ahead of
    /// [`Self::current_write_buffer`] under the completion fence)
    #[must_use]
    pub const fn write_index(&self) -> usize {
        self.storage.current()
    }

    /// Ring geometry
    #[must_use]
    pub const fn layout(&self) -> &RingLayout {
        self.storage.layout()
    }

    /// Words accepted so far
    #[must_use]
    pub const fn accepted_words(&self) -> u64 {
        self.accepted_words
    }

    /// Packets whose `last` word has been accepted
    #[must_use]
    pub const fn packets(&self) -> u64 {
        self.packets
    }

    /// Sticky overflow flag
    #[must_use]
    pub const fn overflow(&self) -> StickyFlag {
        self.overflow
    }

    /// Sticky bus error flag
    #[must_use]
    pub const fn bus_error(&self) -> StickyFlag {
        self.bus_error
    }

    /// Words written into region `index` during its latest fill
    #[must_use]
    pub fn level(&self, index: usize) -> Option<u64> {
        self.levels.get(index).copied()
    }

    /// Full status snapshot
    #[must_use]
    pub fn status(&self) -> WriterStatus {
        WriterStatus {
            layout: *self.storage.layout(),
            max_packet_size: self.max_packet_size,
            handoff: self.handoff,
            current_write_buffer: self.published,
            accepted_words: self.accepted_words,
            buffers_written: self.buffers_written,
            levels: self.levels.clone(),
            overflow: self.overflow,
            bus_error: self.bus_error,
            bus_ok_count: self.bus_ok_count,
        }
    }

    /// Write master
    pub const fn master(&self) -> &M {
        &self.master
    }

    /// Mutable write master
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    fn accept(&mut self, beat: &Beat<u64>) -> WriteRequest {
        let index = self.storage.current();
        let address = self.storage.layout().word_address(index, self.cursor);
        self.cursor += 1;
        self.levels[index] = self.cursor;
        self.accepted_words += 1;
        self.burst_len += 1;

        let cutoff = self.cursor >= self.max_packet_size;
        let boundary = beat.last || cutoff;
        if cutoff && !beat.last && !self.in_overflow {
            self.in_overflow = true;
            if self.overflow.raise() {
                warn!(
                    region = index,
                    max_packet_size = self.max_packet_size,
                    "packet exceeded max_packet_size, truncating into next region"
                );
            }
        }

        let commit = boundary || self.burst_len >= self.max_burst_len;
        if commit {
            self.burst_len = 0;
            self.bursts_issued += 1;
        }

        if boundary {
            let level = self.cursor;
            self.cursor = 0;
            let next = self.storage.advance();
            self.levels[next] = 0;
            debug!(from = index, to = next, level, forced = !beat.last, "region switch");
            match self.handoff {
                HandoffPolicy::OnAccept => self.publish(next),
                HandoffPolicy::OnCompletion => self.fence.push_back((self.bursts_issued, next)),
            }
        }
        if beat.last {
            self.in_overflow = false;
            self.packets += 1;
        }

        WriteRequest {
            address,
            data: beat.payload,
            commit,
        }
    }

    fn publish(&mut self, index: usize) {
        self.published = index;
        self.buffers_written += 1;
    }

    fn complete(&mut self, response: BusResponse) {
        self.bursts_completed += 1;
        if response.is_ok() {
            self.bus_ok_count += 1;
        } else if self.bus_error.raise() {
            warn!(?response, burst = self.bursts_completed, "write master reported an error");
        }
        while let Some(&(needed, index)) = self.fence.front() {
            if needed > self.bursts_completed {
                break;
            }
            self.fence.pop_front();
            self.publish(index);
        }
    }
}

impl<M: WriteMaster> StreamConsumer<Beat<u64>> for DramRingWriter<M> {
    fn ready(&self) -> bool {
        self.master.can_accept()
    }

    fn tick(&mut self, offer: Option<&Beat<u64>>) {
        let request = match offer {
            Some(beat) if self.master.can_accept() => Some(self.accept(beat)),
            _ => None,
        };
        if let Some(response) = self.master.tick(request) {
            self.complete(response);
        }
    }

    fn is_idle(&self) -> bool {
        self.master.is_idle() && self.fence.is_empty()
    }
}

impl<M: fmt::Debug> fmt::Debug for DramRingWriter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DramRingWriter")
            .field("layout", self.storage.layout())
            .field("write_index", &self.storage.current())
            .field("current_write_buffer", &self.published)
            .field("cursor", &self.cursor)
            .field("accepted_words", &self.accepted_words)
            .field("overflow", &self.overflow)
            .field("bus_error", &self.bus_error)
            .field("master", &self.master)
            .finish_non_exhaustive()
    }
}
