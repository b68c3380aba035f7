// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-latency stream transformer.
//!
//! Converts one input word into one output word through `f`, inserting a
//! declared number of register stages while keeping the stream contract on
//! both sides.
//!
//! ```text
//! latency 0:  out.valid = in.valid          in.ready = out.ready
//!             out.word  = f(in.word)
//!
//! latency L:  in ──▶ [slot 0] ──▶ [slot 1] ──▶ … ──▶ [slot L-1] ──▶ out
//!                     f applied on entry
//!             ready(slot k) = slot k empty ∨ ready(slot k+1)
//! ```
//!
//! A full slot whose successor is ready releases its word and, on the same
//! edge, takes the next one, so a latency-L chain sustains one word per cycle
//! when the consumer is always ready. `ready` never depends on `valid`, only on
//! slot occupancy and the downstream `ready`, which breaks long combinational
//! valid chains without breaking the no-loss rule.

use crate::stream::{Beat, StreamStage};
use std::fmt;
use std::marker::PhantomData;

/// Transformer with `latency` pipeline registers
pub struct StreamTransformer<A, B, F> {
    slots: Vec<Option<B>>,
    f: F,
    _input: PhantomData<fn(A)>,
}

impl<A, B, F> StreamTransformer<A, B, F>
where
    F: Fn(A) -> B,
{
    /// Build a transformer with `latency` register stages around `f`.
    pub fn new(latency: usize, f: F) -> Self {
        Self {
            slots: (0..latency).map(|_| None).collect(),
            f,
            _input: PhantomData,
        }
    }

    /// Declared latency in cycles
    pub fn latency(&self) -> usize {
        self.slots.len()
    }

    /// Words currently held in the register stages
    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl<A, B, F> fmt::Debug for StreamTransformer<A, B, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransformer")
            .field("latency", &self.slots.len())
            .field("occupancy", &self.slots.iter().filter(|s| s.is_some()).count())
            .finish_non_exhaustive()
    }
}

impl<A, B, F> StreamStage for StreamTransformer<A, B, F>
where
    A: Clone,
    B: Clone,
    F: Fn(A) -> B,
{
    type In = A;
    type Out = B;

    fn offer(&self, upstream: Option<&A>) -> Option<B> {
        match self.slots.last() {
            None => upstream.cloned().map(&self.f),
            Some(slot) => slot.clone(),
        }
    }

    fn ready(&self, downstream_ready: bool) -> bool {
        self.slots
            .iter()
            .rev()
            .fold(downstream_ready, |next_ready, slot| slot.is_none() || next_ready)
    }

    fn tick(&mut self, upstream: Option<&A>, downstream_ready: bool) {
        let depth = self.slots.len();
        if depth == 0 {
            return;
        }

        // Walk from the output end so each slot sees its successor's
        // pre-edge ready, and is already vacated when the predecessor moves in.
        let mut next_ready = downstream_ready;
        for k in (0..depth).rev() {
            let was_empty = self.slots[k].is_none();
            if !was_empty && next_ready {
                let word = self.slots[k].take();
                if k + 1 < depth {
                    self.slots[k + 1] = word;
                }
            }
            next_ready = was_empty || next_ready;
        }

        if let Some(word) = upstream {
            if next_ready {
                self.slots[0] = Some((self.f)(word.clone()));
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Transformer over packet beats that maps the payload and keeps `first`/`last`.
pub fn map_payload<P, Q>(
    latency: usize,
    f: impl Fn(P) -> Q,
) -> StreamTransformer<Beat<P>, Beat<Q>, impl Fn(Beat<P>) -> Beat<Q>> {
    StreamTransformer::new(latency, move |beat: Beat<P>| beat.map(&f))
}

/// Pure register chain: a transformer whose function is the identity.
pub type StreamBuffer<T> = StreamTransformer<T, T, fn(T) -> T>;

/// Register chain of `latency` stages. `stream_buffer(1)` is the classic
/// single-entry pipeline register used to cut ready/valid paths.
pub fn stream_buffer<T>(latency: usize) -> StreamBuffer<T> {
    StreamTransformer::new(latency, std::convert::identity::<T> as fn(T) -> T)
}
