// SPDX-License-Identifier: AGPL-3.0-only

//! Valid/ready stream contract.
//!
//! A stream connects one producer to one consumer. A word moves on a clock
//! edge iff the producer offers it (`valid`) and the consumer is `ready` in
//! the same cycle. Once offered, a word must be offered again, unchanged,
//! on every following cycle until it is accepted.
//!
//! # Cycle model
//!
//! Every component is evaluated in two phases per clock edge:
//!
//! ```text
//!   combinational (&self)                 clock edge (&mut self)
//!   ─────────────────────                 ──────────────────────
//!   producer.offer()          ──┐
//!   stage.offer(upstream)       ├──────▶  producer.tick(ready)
//!   consumer.ready()            │         stage.tick(upstream, downstream_ready)
//!   stage.ready(downstream)   ──┘         consumer.tick(offer)
//! ```
//!
//! `offer` never sees `ready`, so `valid` cannot depend on `ready`. A
//! consumer's `ready()` never sees the offer, so `ready` cannot depend on the
//! `valid` of the same node either. Stages may pass `ready` through
//! combinationally (upstream), which is the only permitted dependency.

/// One word of a packetized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Beat<P> {
    /// Payload word
    pub payload: P,
    /// Asserted on the first word of a packet
    pub first: bool,
    /// Asserted on the last word of a packet
    pub last: bool,
}

impl<P> Beat<P> {
    /// A word in the middle of a packet.
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            first: false,
            last: false,
        }
    }

    /// Set the `first` marker.
    #[must_use]
    pub fn with_first(mut self, first: bool) -> Self {
        self.first = first;
        self
    }

    /// Set the `last` marker.
    #[must_use]
    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    /// Replace the payload, keeping the packet markers.
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> Beat<Q> {
        Beat {
            payload: f(self.payload),
            first: self.first,
            last: self.last,
        }
    }
}

/// Frame a payload slice as one packet: `first` on word 0, `last` on the final word.
pub fn packet_beats<P: Clone>(payload: &[P]) -> Vec<Beat<P>> {
    let n = payload.len();
    payload
        .iter()
        .enumerate()
        .map(|(i, p)| Beat {
            payload: p.clone(),
            first: i == 0,
            last: i + 1 == n,
        })
        .collect()
}

/// One word of a raster (image) stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageBeat<P> {
    /// Pixel word
    pub payload: P,
    /// Asserted on the last word of each line
    pub line_last: bool,
    /// Asserted on the last word of each frame
    pub frame_last: bool,
}

/// Words that can close a packet (or frame).
pub trait Framed {
    /// Whether this word is the final one of its packet
    fn ends_packet(&self) -> bool;
}

impl<P> Framed for Beat<P> {
    fn ends_packet(&self) -> bool {
        self.last
    }
}

impl<P> Framed for ImageBeat<P> {
    fn ends_packet(&self) -> bool {
        self.frame_last
    }
}

/// Upstream end of a stream: owns `valid` and the payload.
pub trait StreamProducer<T> {
    /// Word presented this cycle (`None` = `valid` low).
    ///
    /// Must depend on registered state only.
    fn offer(&self) -> Option<T>;

    /// Clock edge. `ready` is the consumer's ready of this cycle.
    fn tick(&mut self, ready: bool);

    /// Whether the producer has nothing left to send
    fn is_exhausted(&self) -> bool;
}

/// A component with one input stream and one output stream.
pub trait StreamStage {
    /// Input word type
    type In;
    /// Output word type
    type Out;

    /// Word presented downstream this cycle, given the upstream offer.
    fn offer(&self, upstream: Option<&Self::In>) -> Option<Self::Out>;

    /// Upstream ready, given the downstream ready of this cycle.
    fn ready(&self, downstream_ready: bool) -> bool;

    /// Clock edge with this cycle's upstream offer and downstream ready.
    fn tick(&mut self, upstream: Option<&Self::In>, downstream_ready: bool);

    /// Whether no word is held inside the stage
    fn is_idle(&self) -> bool {
        true
    }
}

/// Downstream end of a stream: owns `ready`.
pub trait StreamConsumer<T> {
    /// Ready for this cycle. Must depend on registered state only.
    fn ready(&self) -> bool;

    /// Clock edge with this cycle's offer. A transfer happens iff
    /// `offer.is_some() && self.ready()` held before the edge.
    fn tick(&mut self, offer: Option<&T>);

    /// Whether all accepted work has been retired
    fn is_idle(&self) -> bool {
        true
    }
}

/// Zero-latency stage that forwards words untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough<T> {
    _word: std::marker::PhantomData<fn(T) -> T>,
}

impl<T> Passthrough<T> {
    /// New passthrough
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _word: std::marker::PhantomData,
        }
    }
}

impl<T: Clone> StreamStage for Passthrough<T> {
    type In = T;
    type Out = T;

    fn offer(&self, upstream: Option<&T>) -> Option<T> {
        upstream.cloned()
    }

    fn ready(&self, downstream_ready: bool) -> bool {
        downstream_ready
    }

    fn tick(&mut self, _upstream: Option<&T>, _downstream_ready: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_beats_marks_boundaries() {
        let beats = packet_beats(&[10u32, 11, 12]);
        assert!(beats[0].first && !beats[0].last);
        assert!(!beats[1].first && !beats[1].last);
        assert!(!beats[2].first && beats[2].last);
    }

    #[test]
    fn single_word_packet_is_first_and_last() {
        let beats = packet_beats(&[7u8]);
        assert_eq!(beats, vec![Beat { payload: 7, first: true, last: true }]);
    }

    #[test]
    fn map_keeps_markers() {
        let b = Beat::new(3u16).with_last(true).map(u32::from);
        assert_eq!(b, Beat { payload: 3u32, first: false, last: true });
    }

    #[test]
    fn passthrough_forwards_ready_and_offer() {
        let p = Passthrough::<u8>::new();
        assert_eq!(p.offer(Some(&4)), Some(4));
        assert!(!p.ready(false));
        assert!(p.ready(true));
    }
}
