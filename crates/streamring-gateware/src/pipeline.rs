// SPDX-License-Identifier: AGPL-3.0-only

//! Stage composition.
//!
//! [`Chain`] wires the output of one stage into the input of the next and is
//! itself a stage, so pipelines of any length are built by nesting:
//!
//! ```
//! use streamring_gateware::{map_payload, stream_buffer, Beat, StageExt, StreamStage};
//!
//! let mut pipeline = map_payload(1, |x: u32| x * 3)
//!     .then(stream_buffer::<Beat<u32>>(1));
//! pipeline.tick(Some(&Beat::new(2)), true);
//! pipeline.tick(None, true);
//! assert_eq!(pipeline.offer(None), Some(Beat::new(6)));
//! ```

use crate::stream::StreamStage;

/// Two stages connected back to back
#[derive(Debug, Clone)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> Chain<A, B>
where
    A: StreamStage,
    B: StreamStage<In = A::Out>,
{
    /// Connect `first` into `second`
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Upstream stage
    pub const fn first(&self) -> &A {
        &self.first
    }

    /// Downstream stage
    pub const fn second(&self) -> &B {
        &self.second
    }
}

impl<A, B> StreamStage for Chain<A, B>
where
    A: StreamStage,
    B: StreamStage<In = A::Out>,
{
    type In = A::In;
    type Out = B::Out;

    fn offer(&self, upstream: Option<&A::In>) -> Option<B::Out> {
        let middle = self.first.offer(upstream);
        self.second.offer(middle.as_ref())
    }

    fn ready(&self, downstream_ready: bool) -> bool {
        self.first.ready(self.second.ready(downstream_ready))
    }

    fn tick(&mut self, upstream: Option<&A::In>, downstream_ready: bool) {
        // Sample every combinational value before either side moves.
        let middle = self.first.offer(upstream);
        let middle_ready = self.second.ready(downstream_ready);
        self.first.tick(upstream, middle_ready);
        self.second.tick(middle.as_ref(), downstream_ready);
    }

    fn is_idle(&self) -> bool {
        self.first.is_idle() && self.second.is_idle()
    }
}

/// Builder sugar for [`Chain`]
pub trait StageExt: StreamStage + Sized {
    /// Append `next` after this stage
    fn then<N>(self, next: N) -> Chain<Self, N>
    where
        N: StreamStage<In = Self::Out>,
    {
        Chain::new(self, next)
    }
}

impl<S: StreamStage> StageExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{stream_buffer, StreamTransformer};

    #[test]
    fn latencies_add_up() {
        let mut c = stream_buffer::<u32>(2).then(StreamTransformer::new(1, |x: u32| x + 100));
        let mut seen = Vec::new();
        for i in 0..6u32 {
            if let Some(w) = c.offer(Some(&i)) {
                seen.push(w);
            }
            c.tick(Some(&i), true);
        }
        assert_eq!(seen, vec![100, 101, 102]);
    }

    #[test]
    fn stalled_tail_backs_up_to_head() {
        let mut c = stream_buffer::<u32>(1).then(stream_buffer::<u32>(1));
        c.tick(Some(&1), false);
        c.tick(Some(&2), false);
        assert!(!c.ready(false));
        assert!(c.ready(true));
        assert!(!c.is_idle());
    }
}
