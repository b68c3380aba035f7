// SPDX-License-Identifier: AGPL-3.0-only

//! Ring writer behaviour through the simulated write port.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streamring_gateware::prelude::*;
use streamring_gateware::{MemoryModel, SimWriteMaster};

type Writer<M> = DramRingWriter<SimWriteMaster<M>>;

fn payload(packet: usize, word: u64) -> u64 {
    (packet as u64) << 32 | word
}

fn elaborate<M: MemoryModel>(ctx: &mut SimContext, config: RingWriterConfig, memory: M, stall: StallProfile) -> Writer<M> {
    PlatformKind::Sim
        .platform()
        .elaborate_ring_writer(ctx, config, memory, stall)
        .expect("valid configuration")
}

/// Run `lengths` packets into `writer`, recording every change of the
/// host-visible index.
fn capture<M: MemoryModel>(
    ctx: &mut SimContext,
    writer: &mut Writer<M>,
    lengths: Vec<u64>,
    gaps: StallProfile,
    mut on_publish: impl FnMut(&Writer<M>),
) -> Vec<usize> {
    let mut source = PacketGenerator::new(lengths, payload, gaps);
    let mut seen = Vec::new();
    let mut last_written = 0;
    Testbench::new(10_000_000)
        .run_with(ctx, &mut source, &mut Passthrough::<Beat<u64>>::new(), writer, |_, w| {
            let written = w.status().buffers_written;
            if written != last_written {
                last_written = written;
                seen.push(w.current_write_buffer());
                on_publish(w);
            }
        })
        .expect("capture settles");
    seen
}

#[test]
fn index_progresses_once_per_packet() {
    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = rng.gen_range(2..7);
        let lengths: Vec<u64> = (0..rng.gen_range(1..20)).map(|_| rng.gen_range(1..=32)).collect();
        let gaps = StallProfile::Random { probability: rng.gen_range(0.0..0.5), seed };
        let bus = StallProfile::Random { probability: rng.gen_range(0.0..0.5), seed: !seed };

        let mut ctx = SimContext::new();
        let mut writer = elaborate(&mut ctx, RingWriterConfig::new(0, 32, n), SparseDram::new(1 << 20), bus);
        let seen = capture(&mut ctx, &mut writer, lengths.clone(), gaps, |_| {});

        let k = lengths.len();
        let expected: Vec<usize> = (1..=k).map(|i| i % n).collect();
        assert_eq!(seen, expected, "seed {seed}");
        assert_eq!(writer.current_write_buffer(), k % n);
        assert!(!writer.overflow().is_raised());
        assert_eq!(writer.accepted_words(), lengths.iter().sum::<u64>());

        // the newest n-1 packets are intact in their regions
        let memory = writer.master().memory();
        for (packet, &len) in lengths.iter().enumerate().rev().take(n - 1) {
            let region = packet % n;
            assert_eq!(writer.level(region), Some(len));
            let base = writer.layout().word_address(region, 0);
            let words = memory.read_words(base, len).expect("in range");
            let expected: Vec<u64> = (0..len).map(|w| payload(packet, w)).collect();
            assert_eq!(words, expected, "seed {seed}, packet {packet}");
        }
    }
}

#[test]
fn oversize_packet_flags_once_and_switches_once() {
    let mut ctx = SimContext::new();
    let config = RingWriterConfig::new(0, 16, 4);
    let mut writer = elaborate(&mut ctx, config, SparseDram::new(1 << 20), StallProfile::Never);

    let seen = capture(&mut ctx, &mut writer, vec![17], StallProfile::Never, |_| {});

    assert_eq!(seen, vec![1, 2]);
    assert_eq!(writer.overflow().count(), 1);
    assert_eq!(writer.level(0), Some(16));
    assert_eq!(writer.level(1), Some(1));
    let memory = writer.master().memory();
    assert_eq!(memory.read(writer.layout().word_address(0, 15)).unwrap(), payload(0, 15));
    assert_eq!(memory.read(writer.layout().word_address(1, 0)).unwrap(), payload(0, 16));
}

#[test]
fn overflow_status_reaches_host() {
    let mut ctx = SimContext::new();
    let config = RingWriterConfig::new(0, 16, 4).with_max_packet_size(8);
    let mut writer = elaborate(&mut ctx, config, SparseDram::new(1 << 20), StallProfile::Never);
    capture(&mut ctx, &mut writer, vec![4, 20, 4], StallProfile::Never, |_| {});

    let csr = CsrBank::snapshot(&writer);
    use streamring_regs::regs;
    assert_eq!(csr.read32(regs::STATUS).unwrap() & regs::status::OVERFLOW, regs::status::OVERFLOW);
    assert_eq!(csr.read32(regs::OVERFLOW_COUNT).unwrap(), 1);
    // 4 | 8 8 4 | 4  → five switches
    assert_eq!(csr.read32(regs::BUFFERS_WRITTEN).unwrap(), 5);
    assert_eq!(csr.read32(regs::CURRENT_WRITE_BUFFER).unwrap(), 1);
}

#[test]
fn bus_errors_are_sticky_and_do_not_stall() {
    let mut ctx = SimContext::new();
    let config = RingWriterConfig::new(0, 32, 4);
    let layout = config.layout().unwrap();
    let region1 = layout.region_base(1).unwrap()..layout.region_base(2).unwrap();
    let memory = SparseDram::new(1 << 20).with_faulty_range(region1);
    let mut writer = elaborate(&mut ctx, config, memory, StallProfile::Never);

    capture(&mut ctx, &mut writer, vec![20; 4], StallProfile::Never, |_| {});

    // 20 words = one full burst of 16 plus a 4-word tail
    assert!(writer.bus_error().is_raised());
    assert_eq!(writer.bus_error().count(), 2);
    assert_eq!(writer.status().bus_ok_count, 6);
    assert_eq!(writer.current_write_buffer(), 0);
    let memory = writer.master().memory();
    assert_eq!(memory.read(layout.word_address(2, 19)).unwrap(), payload(2, 19));
    assert_eq!(memory.read(layout.word_address(1, 0)).unwrap(), 0);
}

#[test]
fn ring_past_end_of_memory_decodes_as_error() {
    let mut ctx = SimContext::new();
    let config = RingWriterConfig::new(0, 64, 2);
    // memory covers region 0 only
    let mut writer = elaborate(&mut ctx, config, SparseDram::new(64 * 8), StallProfile::Never);
    capture(&mut ctx, &mut writer, vec![8, 8, 8], StallProfile::Never, |_| {});
    assert_eq!(writer.bus_error().count(), 1);
    assert_eq!(writer.current_write_buffer(), 1);
}

/// Check, at every publication, whether the region the host would now read
/// is already complete in memory.
fn handoff_consistency(policy: HandoffPolicy) -> Vec<bool> {
    let mut ctx = SimContext::new();
    let config = RingWriterConfig::new(0, 64, 3).with_handoff(policy);
    let mut writer = elaborate(&mut ctx, config, SparseDram::new(1 << 20), StallProfile::Never);
    let lengths = vec![40, 7, 64, 1, 33];

    let mut consistent = Vec::new();
    let expected_lengths = lengths.clone();
    let mut published = 0usize;
    capture(&mut ctx, &mut writer, lengths, StallProfile::Never, |w| {
        let reader = HostReader::attach(&CsrBank::snapshot(w)).expect("status block");
        let data = reader.read_latest_packet(w.master().memory()).expect("readable");
        let expected: Vec<u8> = (0..expected_lengths[published])
            .flat_map(|word| payload(published, word).to_le_bytes())
            .collect();
        consistent.push(data.as_ref() == expected.as_slice());
        published += 1;
    });
    consistent
}

#[test]
fn completion_fence_never_exposes_partial_region() {
    let consistent = handoff_consistency(HandoffPolicy::OnCompletion);
    assert_eq!(consistent, vec![true; 5]);
}

#[test]
fn accept_handoff_can_run_ahead_of_memory() {
    let consistent = handoff_consistency(HandoffPolicy::OnAccept);
    assert_eq!(consistent.len(), 5);
    assert!(consistent.iter().any(|ok| !ok));
}

#[test]
fn both_policies_accept_at_the_same_rate() {
    let cycles = |policy| {
        let mut ctx = SimContext::new();
        let config = RingWriterConfig::new(0, 64, 3).with_handoff(policy);
        let mut writer = elaborate(&mut ctx, config, SparseDram::new(1 << 20), StallProfile::Never);
        capture(&mut ctx, &mut writer, vec![64; 6], StallProfile::Never, |_| {});
        ctx.cycle()
    };
    let accept = cycles(HandoffPolicy::OnAccept);
    let fenced = cycles(HandoffPolicy::OnCompletion);
    assert!(fenced <= accept + 2, "accept {accept}, fenced {fenced}");
}
