// SPDX-License-Identifier: AGPL-3.0-only

//! Cycle-accurate model of a streaming data-plane core.
//!
//! A packet stream arrives over a valid/ready handshake, is optionally
//! reshaped by transformers and raster adapters, and is drained by a ring
//! writer into a set of DRAM regions the host reads in turn.
//!
//! ```text
//!   source ──▶ StreamTransformer ──▶ PacketToImage ─▶ ImageToPacket ──▶ DramRingWriter ──▶ WriteMaster ──▶ DRAM
//!                                                                            │
//!                                                                  CsrBank ◀─┘──▶ HostReader
//! ```
//!
//! Every component is a value evaluated once per clock edge: a
//! combinational phase on `&self` and a clock edge on `&mut self` (see
//! [`stream`]). Hardware faults never stop the pipeline; they latch sticky
//! flags the host reads through the status block.
//!
//! # Quick start
//!
//! ```
//! use streamring_gateware::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let mut ctx = SimContext::new();
//! let config = RingWriterConfig::new(0, 64, 4);
//! let mut writer = PlatformKind::Sim.platform().elaborate_ring_writer(
//!     &mut ctx,
//!     config,
//!     SparseDram::new(1 << 20),
//!     StallProfile::Never,
//! )?;
//!
//! let mut source = StreamSource::<Beat<u64>>::new(StallProfile::Never);
//! source.push_packet(&[1u64, 2, 3]);
//! Testbench::new(1_000).run(&mut ctx, &mut source, &mut Passthrough::<Beat<u64>>::new(), &mut writer)?;
//!
//! assert_eq!(writer.current_write_buffer(), 1);
//! let reader = HostReader::attach(&CsrBank::snapshot(&writer))?;
//! let packet = reader.read_latest_packet(writer.master().memory())?;
//! assert_eq!(packet.len(), 3 * 8);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`stream`] | `Beat`, `ImageBeat`, producer/stage/consumer traits |
//! | [`sim`] | stall patterns, sources, sinks, `Testbench` |
//! | `transformer`, `pipeline` | latency-L stages and their composition |
//! | `image` | packet ↔ raster adapters |
//! | `ring`, `writer` | region geometry and the DRAM ring writer |
//! | `bus`, `memory` | write-master contract, simulated port, DRAM models |
//! | `csr` | status block rendering, the host reader, ring replay |
//! | `platform`, `context` | platform variants, clock domains |

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod bus;
mod context;
mod csr;
mod error;
mod fault;
mod image;
mod memory;
mod monitor;
mod pipeline;
mod platform;
mod ring;
pub mod sim;
pub mod stream;
mod transformer;
mod writer;

pub use bus::{BusGeometry, BusResponse, SimWriteMaster, WriteMaster, WriteRequest};
pub use context::SimContext;
pub use csr::{CsrBank, HostReader, RingStreamReader};
pub use error::{GatewareError, Result};
pub use fault::{FaultKind, StickyFlag};
pub use image::{ImageToPacket, PacketToImage};
pub use memory::{digest_words, DigestDram, MemoryModel, MemoryRead, SparseDram};
pub use monitor::{ContractMonitor, StreamStats};
pub use pipeline::{Chain, StageExt};
pub use platform::{Platform, PlatformKind, SimPlatform, ZynqMpPlatform, ZynqPlatform};
pub use ring::{RingLayout, RingStorage};
pub use sim::{CollectingSink, PacketGenerator, RunReport, StallPattern, StallProfile, StreamSource, Testbench};
pub use stream::{
    packet_beats, Beat, Framed, ImageBeat, Passthrough, StreamConsumer, StreamProducer, StreamStage,
};
pub use transformer::{map_payload, stream_buffer, StreamBuffer, StreamTransformer};
pub use writer::{DramRingWriter, HandoffPolicy, RingWriterConfig, WriterStatus, DEFAULT_BUFFER_SIZE};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        map_payload, packet_beats, stream_buffer, Beat, BusResponse, CollectingSink, CsrBank, DigestDram,
        DramRingWriter, GatewareError, HandoffPolicy, HostReader, ImageBeat, ImageToPacket, MemoryRead,
        PacketGenerator, PacketToImage, Passthrough, PlatformKind, Result, RingLayout, RingStreamReader,
        RingWriterConfig, SimContext, SparseDram, StageExt, StallProfile, StreamConsumer, StreamProducer,
        StreamSource, StreamStage, Testbench, WriteMaster,
    };
}
