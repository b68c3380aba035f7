// SPDX-License-Identifier: AGPL-3.0-only

//! Host-visible status block and the host-side reader.
//!
//! [`CsrBank`] renders a writer snapshot into the register layout of
//! [`streamring_regs::regs`]. [`HostReader`] is the other side of the
//! hand-off: it learns everything it needs from those registers alone, then
//! pulls the latest complete region out of memory. [`RingStreamReader`]
//! does the same every cycle and replays each new region as a packet.
//!
//! ```text
//!   DramRingWriter ──status()──▶ CsrBank ──read32()──▶ HostReader ──▶ Bytes / file
//!                                   │                      │
//!                                   │  MemoryRead ◀────────┤
//!                                   └──────────▶ RingStreamReader ──▶ Beat<u64>
//! ```

use crate::error::{GatewareError, Result};
use crate::fault::StickyFlag;
use crate::image::PacketToImage;
use crate::memory::{MemoryRead, WORD_BYTES};
use crate::ring::RingLayout;
use crate::stream::{Beat, StreamProducer};
use crate::writer::{DramRingWriter, HandoffPolicy, WriterStatus};
use bytes::{BufMut, Bytes, BytesMut};
use std::path::Path;
use streamring_regs::regs;
use tracing::{debug, info};

#[allow(clippy::cast_possible_truncation)]
const fn lo(value: u64) -> u32 {
    value as u32
}

#[allow(clippy::cast_possible_truncation)]
const fn hi(value: u64) -> u32 {
    (value >> 32) as u32
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Read-only snapshot of the status block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrBank {
    status: WriterStatus,
    shape_mismatch: Option<StickyFlag>,
}

impl CsrBank {
    /// Capture the writer's current status
    #[must_use]
    pub fn snapshot<M>(writer: &DramRingWriter<M>) -> Self
    where
        M: crate::bus::WriteMaster,
    {
        Self::from_status(writer.status())
    }

    /// Wrap an existing status snapshot
    #[must_use]
    pub fn from_status(status: WriterStatus) -> Self {
        Self {
            status,
            shape_mismatch: None,
        }
    }

    /// Include the shape-mismatch state of an image adapter upstream
    #[must_use]
    pub fn with_adapter<P>(mut self, adapter: &PacketToImage<P>) -> Self {
        self.shape_mismatch = Some(adapter.shape_mismatch());
        self
    }

    /// Underlying status
    #[must_use]
    pub const fn status(&self) -> &WriterStatus {
        &self.status
    }

    fn status_bits(&self) -> u32 {
        let mut bits = 0;
        if self.status.overflow.is_raised() {
            bits |= regs::status::OVERFLOW;
        }
        if self.status.bus_error.is_raised() {
            bits |= regs::status::BUS_ERROR;
        }
        if self.shape_mismatch.is_some_and(|f| f.is_raised()) {
            bits |= regs::status::SHAPE_MISMATCH;
        }
        bits
    }

    /// Read the 32-bit register at `offset`.
    ///
    /// Region table entries past `n_buffers` read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::RegisterOutOfRange`] for offsets that do not
    /// name a register, unaligned ones included.
    pub fn read32(&self, offset: usize) -> Result<u32> {
        let s = &self.status;
        let layout = &s.layout;
        let value = match offset {
            regs::IDENT => regs::IDENT_MAGIC,
            regs::VERSION => regs::LAYOUT_VERSION,
            regs::N_BUFFERS => saturate(layout.n_buffers() as u64),
            regs::BUFFER_SIZE => saturate(layout.buffer_size()),
            regs::MAX_PACKET_SIZE => saturate(s.max_packet_size),
            regs::WORD_BYTES => layout.word_bytes(),
            regs::BASE_ADDR_LO => lo(layout.base_address()),
            regs::BASE_ADDR_HI => hi(layout.base_address()),
            regs::CURRENT_WRITE_BUFFER => saturate(s.current_write_buffer as u64),
            regs::STATUS => self.status_bits(),
            regs::ACCEPTED_WORDS_LO => lo(s.accepted_words),
            regs::ACCEPTED_WORDS_HI => hi(s.accepted_words),
            regs::BUFFERS_WRITTEN => saturate(s.buffers_written),
            regs::OVERFLOW_COUNT => s.overflow.count(),
            regs::BUS_OK_COUNT => saturate(s.bus_ok_count),
            regs::BUS_ERROR_COUNT => s.bus_error.count(),
            regs::SHAPE_MISMATCH_COUNT => self.shape_mismatch.map_or(0, |f| f.count()),
            regs::FEATURES => match s.handoff {
                HandoffPolicy::OnAccept => 0,
                HandoffPolicy::OnCompletion => regs::features::COMPLETION_FENCE,
            },
            _ => {
                let (index, field) =
                    regs::decode_region_register(offset).ok_or(GatewareError::RegisterOutOfRange { offset })?;
                if index >= layout.n_buffers() {
                    0
                } else {
                    let base = layout.region_base(index)?;
                    match field {
                        regs::REGION_BASE_LO => lo(base),
                        regs::REGION_BASE_HI => hi(base),
                        _ => saturate(s.levels[index]),
                    }
                }
            }
        };
        Ok(value)
    }

    /// Read a 64-bit value split across a LO/HI register pair.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::read32`] errors.
    pub fn read64(&self, lo_offset: usize) -> Result<u64> {
        let low = self.read32(lo_offset)?;
        let high = self.read32(lo_offset + 4)?;
        Ok(u64::from(high) << 32 | u64::from(low))
    }

    /// All named scalar registers with their current values, in address order.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::read32`] errors.
    pub fn dump(&self) -> Result<Vec<(usize, &'static str, u32)>> {
        regs::SCALAR_REGISTERS
            .iter()
            .map(|&(offset, name)| self.read32(offset).map(|value| (offset, name, value)))
            .collect()
    }
}

// ── Host side ────────────────────────────────────────────────────────────────

/// Identify the block and rebuild the ring geometry from its registers.
fn advertised_layout(csr: &CsrBank) -> Result<RingLayout> {
    let ident = csr.read32(regs::IDENT)?;
    if ident != regs::IDENT_MAGIC {
        return Err(GatewareError::block_mismatch(format!("ident {ident:#010x}")));
    }
    let version = csr.read32(regs::VERSION)?;
    if version != regs::LAYOUT_VERSION {
        return Err(GatewareError::block_mismatch(format!(
            "layout version {version}, expected {}",
            regs::LAYOUT_VERSION
        )));
    }
    let word_bytes = csr.read32(regs::WORD_BYTES)?;
    if u64::from(word_bytes) != WORD_BYTES {
        return Err(GatewareError::block_mismatch(format!(
            "{word_bytes}-byte words, data path is {WORD_BYTES} bytes wide"
        )));
    }
    RingLayout::new(
        csr.read64(regs::BASE_ADDR_LO)?,
        u64::from(csr.read32(regs::BUFFER_SIZE)?),
        csr.read32(regs::N_BUFFERS)? as usize,
        word_bytes,
    )
}

/// Host view of the ring, built from status registers only
#[derive(Debug, Clone)]
pub struct HostReader {
    layout: RingLayout,
    current_write_buffer: usize,
    buffers_written: u64,
    levels: Vec<u64>,
}

impl HostReader {
    /// Read the status block and check that it is a ring writer this reader
    /// understands.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::BlockMismatch`] on a wrong magic, layout
    /// version or word width, and [`GatewareError::InvalidConfig`] if the
    /// advertised ring geometry is inconsistent.
    pub fn attach(csr: &CsrBank) -> Result<Self> {
        let layout = advertised_layout(csr)?;
        let levels = (0..layout.n_buffers())
            .map(|i| csr.read32(regs::region_register(i, regs::REGION_LEVEL)).map(u64::from))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layout,
            current_write_buffer: csr.read32(regs::CURRENT_WRITE_BUFFER)? as usize,
            buffers_written: u64::from(csr.read32(regs::BUFFERS_WRITTEN)?),
            levels,
        })
    }

    /// Ring geometry as advertised
    #[must_use]
    pub const fn layout(&self) -> &RingLayout {
        &self.layout
    }

    /// Region the writer is filling
    #[must_use]
    pub const fn current_write_buffer(&self) -> usize {
        self.current_write_buffer
    }

    /// Most recently completed region, if any region was completed yet
    #[must_use]
    pub fn latest_complete_region(&self) -> Option<usize> {
        (self.buffers_written > 0).then(|| self.layout.previous_index(self.current_write_buffer))
    }

    /// Words in region `index` from its latest fill
    #[must_use]
    pub fn region_level(&self, index: usize) -> Option<u64> {
        self.levels.get(index).copied()
    }

    /// Copy the valid words of region `index` out of memory, little-endian.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::RegionOutOfRange`] for a bad index, or the
    /// memory model's read error.
    pub fn read_region<R: MemoryRead + ?Sized>(&self, memory: &R, index: usize) -> Result<Bytes> {
        let level = self.region_level(index).ok_or(GatewareError::RegionOutOfRange {
            index,
            count: self.layout.n_buffers(),
        })?;
        let word_bytes = self.layout.word_bytes() as usize;
        let mut buf = BytesMut::with_capacity(usize::try_from(level).unwrap_or(0) * word_bytes);
        for offset in 0..level {
            let word = memory.read(self.layout.word_address(index, offset))?;
            buf.put_slice(&word.to_le_bytes()[..word_bytes]);
        }
        Ok(buf.freeze())
    }

    /// Copy out the most recently completed region.
    ///
    /// # Errors
    ///
    /// Returns [`GatewareError::NoCompleteRegion`] before the first region
    /// switch, otherwise as [`Self::read_region`].
    pub fn read_latest_packet<R: MemoryRead + ?Sized>(&self, memory: &R) -> Result<Bytes> {
        let index = self.latest_complete_region().ok_or(GatewareError::NoCompleteRegion)?;
        let data = self.read_region(memory, index)?;
        info!(region = index, bytes = data.len(), "read completed region");
        Ok(data)
    }

    /// Write the most recently completed region to `path`, returning the byte count.
    ///
    /// # Errors
    ///
    /// As [`Self::read_latest_packet`], plus I/O errors.
    pub fn write_packet_to_file<R: MemoryRead + ?Sized>(&self, memory: &R, path: impl AsRef<Path>) -> Result<usize> {
        let data = self.read_latest_packet(memory)?;
        std::fs::write(path.as_ref(), &data)?;
        info!(path = %path.as_ref().display(), bytes = data.len(), "packet written");
        Ok(data.len())
    }
}

// ── Stream replay ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Replay {
    region: usize,
    level: u64,
    offset: u64,
}

/// Replays completed regions as a packetized stream.
///
/// Whenever the status block shows a new publication, the region at
/// `current_write_buffer - 1` is emitted `level` words long, `first` on its
/// opening word and `last` on its final one. Regions published while a
/// replay is running are skipped; the next replay starts at the newest.
///
/// [`Self::sync`] is the read port. Call it once per cycle, before sampling
/// [`StreamProducer::offer`], with that cycle's status block and memory.
#[derive(Debug, Clone)]
pub struct RingStreamReader {
    layout: RingLayout,
    consumed: u64,
    replay: Option<Replay>,
    word: Option<Beat<u64>>,
    packets: u64,
    skipped: u64,
}

impl RingStreamReader {
    /// Reader for the ring described by `csr`. Regions already completed
    /// count as new, so the latest of them is replayed first.
    ///
    /// # Errors
    ///
    /// As [`HostReader::attach`].
    pub fn attach(csr: &CsrBank) -> Result<Self> {
        Ok(Self {
            layout: advertised_layout(csr)?,
            consumed: 0,
            replay: None,
            word: None,
            packets: 0,
            skipped: 0,
        })
    }

    /// Region being replayed
    #[must_use]
    pub fn current_read_buffer(&self) -> Option<usize> {
        self.replay.map(|r| r.region)
    }

    /// Regions fully fetched
    #[must_use]
    pub const fn packets(&self) -> u64 {
        self.packets
    }

    /// Completed regions that were overtaken before they could be replayed
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Fetch the next word into the output register if it is free.
    ///
    /// # Errors
    ///
    /// Register read errors, or the memory model's read error.
    pub fn sync<R: MemoryRead + ?Sized>(&mut self, csr: &CsrBank, memory: &R) -> Result<()> {
        if self.word.is_some() {
            return Ok(());
        }
        if self.replay.is_none() {
            let written = u64::from(csr.read32(regs::BUFFERS_WRITTEN)?);
            if written > self.consumed {
                let current = csr.read32(regs::CURRENT_WRITE_BUFFER)? as usize;
                let region = self.layout.previous_index(current);
                let level = u64::from(csr.read32(regs::region_register(region, regs::REGION_LEVEL))?);
                self.skipped += written - self.consumed - 1;
                self.consumed = written;
                if level > 0 {
                    self.replay = Some(Replay {
                        region,
                        level,
                        offset: 0,
                    });
                }
            }
        }
        let Some(mut replay) = self.replay else {
            return Ok(());
        };
        let data = memory.read(self.layout.word_address(replay.region, replay.offset))?;
        self.word = Some(
            Beat::new(data)
                .with_first(replay.offset == 0)
                .with_last(replay.offset + 1 == replay.level),
        );
        replay.offset += 1;
        if replay.offset == replay.level {
            self.packets += 1;
            self.replay = None;
            debug!(region = replay.region, level = replay.level, "region replayed");
        } else {
            self.replay = Some(replay);
        }
        Ok(())
    }
}

impl StreamProducer<Beat<u64>> for RingStreamReader {
    fn offer(&self) -> Option<Beat<u64>> {
        self.word
    }

    fn tick(&mut self, ready: bool) {
        if ready {
            self.word = None;
        }
    }

    fn is_exhausted(&self) -> bool {
        self.word.is_none() && self.replay.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusGeometry, SimWriteMaster};
    use crate::memory::SparseDram;
    use crate::stream::{Beat, StreamConsumer};
    use crate::writer::RingWriterConfig;

    fn filled_writer(packets: &[u64]) -> DramRingWriter<SimWriteMaster<SparseDram>> {
        let master = SimWriteMaster::new(SparseDram::new(1 << 20), BusGeometry::default());
        let mut w = DramRingWriter::new(RingWriterConfig::new(0x1000, 16, 3), master).unwrap();
        for (k, &len) in packets.iter().enumerate() {
            for i in 0..len {
                let beat = Beat::new((k as u64) << 16 | i).with_last(i + 1 == len);
                while !w.ready() {
                    w.tick(None);
                }
                w.tick(Some(&beat));
            }
        }
        while !w.is_idle() {
            w.tick(None);
        }
        w
    }

    #[test]
    fn registers_reflect_status() {
        let w = filled_writer(&[4, 6]);
        let csr = CsrBank::snapshot(&w);
        assert_eq!(csr.read32(regs::IDENT).unwrap(), regs::IDENT_MAGIC);
        assert_eq!(csr.read32(regs::N_BUFFERS).unwrap(), 3);
        assert_eq!(csr.read32(regs::CURRENT_WRITE_BUFFER).unwrap(), 2);
        assert_eq!(csr.read64(regs::ACCEPTED_WORDS_LO).unwrap(), 10);
        assert_eq!(csr.read32(regs::STATUS).unwrap(), 0);
        assert_eq!(csr.read32(regs::region_register(1, regs::REGION_BASE_LO)).unwrap(), 0x1080);
        assert_eq!(csr.read32(regs::region_register(1, regs::REGION_LEVEL)).unwrap(), 6);
        assert_eq!(csr.read32(regs::region_register(9, regs::REGION_LEVEL)).unwrap(), 0);
    }

    #[test]
    fn unknown_offsets_rejected() {
        let csr = CsrBank::snapshot(&filled_writer(&[]));
        assert!(matches!(
            csr.read32(0x48),
            Err(GatewareError::RegisterOutOfRange { offset: 0x48 })
        ));
        assert!(csr.read32(0x102).is_err());
        assert!(csr.read32(regs::region_register(0, 0xc)).is_err());
        assert!(csr.read32(regs::BLOCK_SIZE).is_err());
    }

    #[test]
    fn dump_lists_every_scalar() {
        let csr = CsrBank::snapshot(&filled_writer(&[1]));
        let dump = csr.dump().unwrap();
        assert_eq!(dump.len(), regs::SCALAR_REGISTERS.len());
        assert_eq!(dump[0], (regs::IDENT, "IDENT", regs::IDENT_MAGIC));
    }

    #[test]
    fn adapter_mismatch_shows_in_status() {
        let mut adapter = PacketToImage::<u64>::new(4).unwrap();
        use crate::stream::StreamStage;
        adapter.tick(Some(&Beat::new(0).with_last(true)), true);
        let csr = CsrBank::snapshot(&filled_writer(&[])).with_adapter(&adapter);
        assert_eq!(csr.read32(regs::STATUS).unwrap(), regs::status::SHAPE_MISMATCH);
        assert_eq!(csr.read32(regs::SHAPE_MISMATCH_COUNT).unwrap(), 1);
    }

    #[test]
    fn attach_rejects_other_word_widths() {
        for word_bytes in [16, 4] {
            let status = WriterStatus {
                layout: RingLayout::new(0, 16, 2, word_bytes).unwrap(),
                max_packet_size: 16,
                handoff: HandoffPolicy::OnAccept,
                current_write_buffer: 0,
                accepted_words: 0,
                buffers_written: 0,
                levels: vec![0; 2],
                overflow: StickyFlag::new(crate::fault::FaultKind::Overflow),
                bus_error: StickyFlag::new(crate::fault::FaultKind::BusError),
                bus_ok_count: 0,
            };
            let csr = CsrBank::from_status(status);
            assert_eq!(csr.read32(regs::WORD_BYTES).unwrap(), word_bytes);
            assert!(matches!(
                HostReader::attach(&csr),
                Err(GatewareError::BlockMismatch { .. })
            ));
            assert!(RingStreamReader::attach(&csr).is_err());
        }
    }

    fn drain(reader: &mut RingStreamReader, w: &DramRingWriter<SimWriteMaster<SparseDram>>) -> Vec<Beat<u64>> {
        let csr = CsrBank::snapshot(w);
        let mut out = Vec::new();
        loop {
            reader.sync(&csr, w.master().memory()).unwrap();
            let Some(beat) = reader.offer() else { break };
            out.push(beat);
            reader.tick(true);
        }
        out
    }

    #[test]
    fn replay_starts_at_the_newest_region() {
        let w = filled_writer(&[2, 3, 4]);
        let mut reader = RingStreamReader::attach(&CsrBank::snapshot(&w)).unwrap();
        let beats = drain(&mut reader, &w);
        let payloads: Vec<u64> = beats.iter().map(|b| b.payload).collect();
        assert_eq!(payloads, vec![2 << 16, 2 << 16 | 1, 2 << 16 | 2, 2 << 16 | 3]);
        assert!(beats[0].first && !beats[0].last);
        assert!(beats[3].last && !beats[3].first);
        assert_eq!(reader.skipped(), 2);
        assert_eq!(reader.packets(), 1);
        assert!(reader.is_exhausted());
        assert!(drain(&mut reader, &w).is_empty());
    }

    #[test]
    fn replay_holds_word_while_stalled() {
        let w = filled_writer(&[3]);
        let csr = CsrBank::snapshot(&w);
        let mut reader = RingStreamReader::attach(&csr).unwrap();
        assert_eq!(reader.offer(), None);
        reader.sync(&csr, w.master().memory()).unwrap();
        let held = reader.offer();
        assert_eq!(reader.current_read_buffer(), Some(0));
        reader.tick(false);
        reader.sync(&csr, w.master().memory()).unwrap();
        assert_eq!(reader.offer(), held);
        reader.tick(true);
        reader.sync(&csr, w.master().memory()).unwrap();
        assert_eq!(reader.offer().map(|b| b.payload), Some(1));
    }

    #[test]
    fn reader_needs_a_completed_region() {
        let w = filled_writer(&[]);
        let reader = HostReader::attach(&CsrBank::snapshot(&w)).unwrap();
        assert_eq!(reader.latest_complete_region(), None);
        assert!(matches!(
            reader.read_latest_packet(w.master().memory()),
            Err(GatewareError::NoCompleteRegion)
        ));
    }

    #[test]
    fn reader_returns_latest_packet_le() {
        let w = filled_writer(&[2, 3]);
        let reader = HostReader::attach(&CsrBank::snapshot(&w)).unwrap();
        assert_eq!(reader.latest_complete_region(), Some(1));
        let data = reader.read_latest_packet(w.master().memory()).unwrap();
        assert_eq!(data.len(), 3 * 8);
        assert_eq!(&data[..8], &(1u64 << 16).to_le_bytes());
        assert_eq!(&data[16..], &((1u64 << 16) | 2).to_le_bytes());
    }

    #[test]
    fn reader_writes_file() {
        let w = filled_writer(&[5]);
        let reader = HostReader::attach(&CsrBank::snapshot(&w)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packet.bin");
        let n = reader.write_packet_to_file(w.master().memory(), &path).unwrap();
        assert_eq!(n, 40);
        assert_eq!(std::fs::read(&path).unwrap().len(), 40);
    }
}
