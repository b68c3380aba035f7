// SPDX-License-Identifier: AGPL-3.0-only

//! Simulation harness: stall patterns, stock producers and consumers, and
//! the cycle-driving testbench.
//!
//! ```text
//!   producer ──[input monitor]──▶ stage ──[output monitor]──▶ consumer
//!      ▲                                                          │
//!      └──────────────── Testbench::run (one call per edge) ──────┘
//! ```
//!
//! Every stream the testbench drives is watched by a [`ContractMonitor`], so
//! a run that returns `Ok` has also proven the no-loss rule for the cycles it
//! covered.

use crate::context::SimContext;
use crate::error::{GatewareError, Result};
use crate::monitor::{ContractMonitor, StreamStats};
use crate::stream::{Beat, Framed, StreamConsumer, StreamProducer, StreamStage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt::Debug;
use tracing::debug;

// ── Stall patterns ───────────────────────────────────────────────────────────

/// How often a handshake signal is held off
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StallProfile {
    /// Never stall
    #[default]
    Never,
    /// Stall the first `stalled` cycles of every `period`
    Periodic {
        /// Pattern length in cycles
        period: u64,
        /// Stalled cycles at the start of each period
        stalled: u64,
    },
    /// Stall each cycle independently with `probability`
    Random {
        /// Chance of a stall per cycle, clamped to `0.0..=1.0`
        probability: f64,
        /// RNG seed
        seed: u64,
    },
}

/// A running [`StallProfile`]
#[derive(Debug, Clone)]
pub struct StallPattern {
    profile: StallProfile,
    rng: StdRng,
    cycle: u64,
}

impl StallPattern {
    /// Start `profile` at cycle 0
    #[must_use]
    pub fn new(profile: StallProfile) -> Self {
        let seed = match profile {
            StallProfile::Random { seed, .. } => seed,
            _ => 0,
        };
        Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
            cycle: 0,
        }
    }

    /// Decide the next cycle
    pub fn next_stalled(&mut self) -> bool {
        let cycle = self.cycle;
        self.cycle += 1;
        match self.profile {
            StallProfile::Never => false,
            StallProfile::Periodic { period: 0, .. } => false,
            StallProfile::Periodic { period, stalled } => cycle % period < stalled,
            StallProfile::Random { probability, .. } => {
                let p = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
                self.rng.gen_bool(p)
            }
        }
    }
}

// ── Producers ────────────────────────────────────────────────────────────────

/// Producer replaying a queue of words, with optional `valid` gaps.
///
/// Gaps are only inserted while no word is pending, so the source never
/// withdraws an offered word.
#[derive(Debug, Clone)]
pub struct StreamSource<T> {
    queue: VecDeque<T>,
    gaps: StallPattern,
    gap: bool,
}

impl<T: Clone> StreamSource<T> {
    /// Empty source with `valid` gaps following `gaps`
    #[must_use]
    pub fn new(gaps: StallProfile) -> Self {
        let mut gaps = StallPattern::new(gaps);
        let gap = gaps.next_stalled();
        Self {
            queue: VecDeque::new(),
            gaps,
            gap,
        }
    }

    /// Queue one word
    pub fn push(&mut self, word: T) {
        self.queue.push_back(word);
    }
}

impl<P: Clone> StreamSource<Beat<P>> {
    /// Queue `payload` as one packet
    pub fn push_packet(&mut self, payload: &[P]) {
        self.queue.extend(crate::stream::packet_beats(payload));
    }
}

impl<T: Clone> StreamProducer<T> for StreamSource<T> {
    fn offer(&self) -> Option<T> {
        if self.gap {
            None
        } else {
            self.queue.front().cloned()
        }
    }

    fn tick(&mut self, ready: bool) {
        let offered = !self.gap && !self.queue.is_empty();
        if offered && ready {
            self.queue.pop_front();
        }
        self.gap = if offered && !ready {
            false
        } else {
            self.gaps.next_stalled()
        };
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Producer that computes packets on the fly instead of storing them.
///
/// Word `w` of packet `k` carries `payload(k, w)`. Used for captures too
/// large to hold in memory.
pub struct PacketGenerator<F> {
    lengths: Vec<u64>,
    packet: usize,
    word: u64,
    payload: F,
    gaps: StallPattern,
    gap: bool,
}

impl<F: Fn(usize, u64) -> u64> PacketGenerator<F> {
    /// Generate packets of the given lengths; zero-length entries are skipped
    pub fn new(lengths: Vec<u64>, payload: F, gaps: StallProfile) -> Self {
        let mut gaps = StallPattern::new(gaps);
        let gap = gaps.next_stalled();
        let mut generator = Self {
            lengths,
            packet: 0,
            word: 0,
            payload,
            gaps,
            gap,
        };
        generator.skip_empty();
        generator
    }

    fn skip_empty(&mut self) {
        while self.lengths.get(self.packet) == Some(&0) {
            self.packet += 1;
        }
    }

    fn current(&self) -> Option<Beat<u64>> {
        let len = *self.lengths.get(self.packet)?;
        Some(Beat {
            payload: (self.payload)(self.packet, self.word),
            first: self.word == 0,
            last: self.word + 1 == len,
        })
    }
}

impl<F> Debug for PacketGenerator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketGenerator")
            .field("lengths", &self.lengths)
            .field("packet", &self.packet)
            .field("word", &self.word)
            .finish_non_exhaustive()
    }
}

impl<F: Fn(usize, u64) -> u64> StreamProducer<Beat<u64>> for PacketGenerator<F> {
    fn offer(&self) -> Option<Beat<u64>> {
        if self.gap {
            None
        } else {
            self.current()
        }
    }

    fn tick(&mut self, ready: bool) {
        let offered = self.offer();
        if let (Some(beat), true) = (&offered, ready) {
            if beat.last {
                self.packet += 1;
                self.word = 0;
                self.skip_empty();
            } else {
                self.word += 1;
            }
        }
        self.gap = if offered.is_some() && !ready {
            false
        } else {
            self.gaps.next_stalled()
        };
    }

    fn is_exhausted(&self) -> bool {
        self.packet >= self.lengths.len()
    }
}

// ── Consumers ────────────────────────────────────────────────────────────────

/// Consumer that records every word it accepts
#[derive(Debug, Clone)]
pub struct CollectingSink<T> {
    words: Vec<T>,
    stalls: StallPattern,
    stalled: bool,
}

impl<T: Clone> CollectingSink<T> {
    /// Sink with `ready` held low following `stalls`
    #[must_use]
    pub fn new(stalls: StallProfile) -> Self {
        let mut stalls = StallPattern::new(stalls);
        let stalled = stalls.next_stalled();
        Self {
            words: Vec::new(),
            stalls,
            stalled,
        }
    }

    /// Accepted words in order
    #[must_use]
    pub fn words(&self) -> &[T] {
        &self.words
    }

    /// Take the accepted words, leaving the sink empty
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.words)
    }
}

impl<T: Clone + Framed> CollectingSink<T> {
    /// Accepted words split into packets; a trailing open packet is included
    #[must_use]
    pub fn packets(&self) -> Vec<Vec<T>> {
        let mut packets = Vec::new();
        let mut open = Vec::new();
        for word in &self.words {
            open.push(word.clone());
            if word.ends_packet() {
                packets.push(std::mem::take(&mut open));
            }
        }
        if !open.is_empty() {
            packets.push(open);
        }
        packets
    }
}

impl<T: Clone> StreamConsumer<T> for CollectingSink<T> {
    fn ready(&self) -> bool {
        !self.stalled
    }

    fn tick(&mut self, offer: Option<&T>) {
        if let (Some(word), true) = (offer, self.ready()) {
            self.words.push(word.clone());
        }
        self.stalled = self.stalls.next_stalled();
    }
}

// ── Testbench ────────────────────────────────────────────────────────────────

/// Outcome of a testbench run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Clock edges simulated
    pub cycles: u64,
    /// Producer → stage stream
    pub input: StreamStats,
    /// Stage → consumer stream
    pub output: StreamStats,
}

/// Drives a producer, a stage and a consumer edge by edge
#[derive(Debug, Clone)]
pub struct Testbench {
    budget: u64,
    input_name: String,
    output_name: String,
}

impl Testbench {
    /// Testbench that gives up after `budget` cycles
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            input_name: "input".into(),
            output_name: "output".into(),
        }
    }

    /// Name the two monitored streams in violation reports
    #[must_use]
    pub fn with_stream_names(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.input_name = input.into();
        self.output_name = output.into();
        self
    }

    /// Run until the producer is exhausted and stage and consumer are idle.
    ///
    /// # Errors
    ///
    /// [`GatewareError::ContractViolation`] if either stream breaks the
    /// handshake contract, [`GatewareError::Timeout`] if the budget runs out.
    pub fn run<P, S, C>(&self, ctx: &mut SimContext, producer: &mut P, stage: &mut S, consumer: &mut C) -> Result<RunReport>
    where
        P: StreamProducer<S::In>,
        S: StreamStage,
        S::In: Clone + PartialEq + Debug + Framed,
        S::Out: Clone + PartialEq + Debug + Framed,
        C: StreamConsumer<S::Out>,
    {
        self.run_with(ctx, producer, stage, consumer, |_, _| {})
    }

    /// As [`Testbench::run`], calling `observe(cycle, consumer)` after every edge.
    ///
    /// # Errors
    ///
    /// Same as [`Testbench::run`].
    pub fn run_with<P, S, C>(
        &self,
        ctx: &mut SimContext,
        producer: &mut P,
        stage: &mut S,
        consumer: &mut C,
        mut observe: impl FnMut(u64, &C),
    ) -> Result<RunReport>
    where
        P: StreamProducer<S::In>,
        S: StreamStage,
        S::In: Clone + PartialEq + Debug + Framed,
        S::Out: Clone + PartialEq + Debug + Framed,
        C: StreamConsumer<S::Out>,
    {
        let mut input = ContractMonitor::new(self.input_name.as_str());
        let mut output = ContractMonitor::new(self.output_name.as_str());
        let mut cycles = 0;

        loop {
            if producer.is_exhausted() && stage.is_idle() && consumer.is_idle() {
                break;
            }
            if cycles >= self.budget {
                return Err(GatewareError::Timeout { cycles: self.budget });
            }

            let up = producer.offer();
            let down = stage.offer(up.as_ref());
            let consumer_ready = consumer.ready();
            let stage_ready = stage.ready(consumer_ready);

            input.observe(up.as_ref(), stage_ready)?;
            output.observe(down.as_ref(), consumer_ready)?;

            producer.tick(stage_ready);
            stage.tick(up.as_ref(), consumer_ready);
            consumer.tick(down.as_ref());

            ctx.advance(1);
            cycles += 1;
            observe(cycles, consumer);
        }

        debug!(cycles, transfers = output.stats().transfers, "testbench settled");
        Ok(RunReport {
            cycles,
            input: input.stats(),
            output: output.stats(),
        })
    }
}
