// SPDX-License-Identifier: AGPL-3.0-only

//! Randomized handshake-contract tests.
//!
//! Every run goes through `Testbench`, which monitors both streams and fails
//! on any retracted or altered pending word. Each test sweeps a range of
//! seeds so the traces cover many stall interleavings.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use streamring_gateware::prelude::*;
use streamring_gateware::sim::RunReport;

const SEEDS: u64 = 64;

fn random_profile(rng: &mut StdRng) -> StallProfile {
    StallProfile::Random {
        probability: rng.gen_range(0.0..0.8),
        seed: rng.gen(),
    }
}

fn random_packets(rng: &mut StdRng, max_packets: usize, max_len: usize) -> Vec<Vec<u32>> {
    (0..rng.gen_range(1..=max_packets))
        .map(|_| (0..rng.gen_range(1..=max_len)).map(|_| rng.gen()).collect())
        .collect()
}

fn source_for(packets: &[Vec<u32>], gaps: StallProfile) -> StreamSource<Beat<u32>> {
    let mut source = StreamSource::new(gaps);
    for p in packets {
        source.push_packet(p);
    }
    source
}

fn drive<S>(stage: &mut S, source: &mut StreamSource<Beat<u32>>, sink: &mut CollectingSink<S::Out>) -> RunReport
where
    S: StreamStage<In = Beat<u32>>,
    S::Out: Clone + PartialEq + std::fmt::Debug + streamring_gateware::Framed,
{
    let mut ctx = SimContext::new();
    Testbench::new(1_000_000)
        .run(&mut ctx, source, stage, sink)
        .expect("contract held")
}

#[test]
fn register_chains_deliver_every_word_in_order() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let latency = rng.gen_range(0..5);
        let packets = random_packets(&mut rng, 6, 40);
        let mut source = source_for(&packets, random_profile(&mut rng));
        let mut sink = CollectingSink::new(random_profile(&mut rng));

        let report = drive(&mut stream_buffer::<Beat<u32>>(latency), &mut source, &mut sink);

        let expected: Vec<Beat<u32>> = packets.iter().flat_map(|p| packet_beats(p)).collect();
        assert_eq!(sink.words(), expected.as_slice(), "seed {seed}, latency {latency}");
        assert_eq!(report.input.transfers, report.output.transfers);
        assert_eq!(report.output.packets, packets.len() as u64);
    }
}

#[test]
fn skid_buffer_output_is_stall_invariant() {
    let mut rng = StdRng::seed_from_u64(7);
    let packets = random_packets(&mut rng, 8, 64);
    let reference = {
        let mut source = source_for(&packets, StallProfile::Never);
        let mut sink = CollectingSink::new(StallProfile::Never);
        drive(&mut stream_buffer::<Beat<u32>>(1), &mut source, &mut sink);
        sink.take()
    };
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut source = source_for(&packets, random_profile(&mut rng));
        let mut sink = CollectingSink::new(random_profile(&mut rng));
        drive(&mut stream_buffer::<Beat<u32>>(1), &mut source, &mut sink);
        assert_eq!(sink.words(), reference.as_slice(), "seed {seed}");
    }
}

#[test]
fn unstalled_chain_sustains_one_word_per_cycle() {
    let words: Vec<u32> = (0..100).collect();
    for latency in 0..4 {
        let mut source = source_for(&[words.clone()], StallProfile::Never);
        let mut sink = CollectingSink::new(StallProfile::Never);
        let report = drive(&mut stream_buffer::<Beat<u32>>(latency), &mut source, &mut sink);
        assert_eq!(report.cycles, 100 + latency as u64, "latency {latency}");
        assert_eq!(report.input.stall_cycles, 0);
    }
}

#[test]
fn mapped_chains_keep_framing() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let packets = random_packets(&mut rng, 5, 20);
        let mut source = source_for(&packets, random_profile(&mut rng));
        let mut sink = CollectingSink::new(random_profile(&mut rng));
        let mut stage = map_payload(rng.gen_range(0..3), |x: u32| u64::from(x) * 2)
            .then(map_payload(rng.gen_range(0..3), |x: u64| x + 1));

        drive(&mut stage, &mut source, &mut sink);

        let expected: Vec<Vec<Beat<u64>>> = packets
            .iter()
            .map(|p| packet_beats(&p.iter().map(|&x| u64::from(x) * 2 + 1).collect::<Vec<_>>()))
            .collect();
        assert_eq!(sink.packets(), expected, "seed {seed}");
    }
}

#[test]
fn image_round_trip_under_backpressure() {
    for seed in 0..SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let width = rng.gen_range(1..9u32);
        let height = rng.gen_range(1..6u32);
        let frames: Vec<Vec<u32>> = (0..3)
            .map(|_| (0..width * height).map(|_| rng.gen()).collect())
            .collect();
        let mut source = source_for(&frames, random_profile(&mut rng));
        let mut sink = CollectingSink::new(random_profile(&mut rng));
        let mut stage = PacketToImage::new(width)
            .expect("width >= 1")
            .then(stream_buffer::<ImageBeat<u32>>(1))
            .then(ImageToPacket::new());

        drive(&mut stage, &mut source, &mut sink);

        let expected: Vec<Beat<u32>> = frames.iter().flat_map(|f| packet_beats(f)).collect();
        assert_eq!(sink.words(), expected.as_slice(), "seed {seed}");
        let adapter = stage.first().first();
        assert!(!adapter.shape_mismatch().is_raised());
        assert_eq!(adapter.frames(), 3);
    }
}

#[test]
fn line_markers_follow_width() {
    let mut rng = StdRng::seed_from_u64(99);
    let width = 5;
    let frame: Vec<u32> = (0..width * 4).collect();
    let mut source = source_for(&[frame], random_profile(&mut rng));
    let mut sink = CollectingSink::new(random_profile(&mut rng));
    let mut stage = PacketToImage::new(width).expect("width >= 1");

    drive(&mut stage, &mut source, &mut sink);

    for (i, word) in sink.words().iter().enumerate() {
        assert_eq!(word.line_last, (i as u32 + 1) % width == 0, "word {i}");
        assert_eq!(word.frame_last, i as u32 + 1 == width * 4, "word {i}");
    }
}

#[test]
fn ragged_packets_flag_mismatch_but_flow() {
    let mut source = source_for(&[vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9], vec![10]], StallProfile::Never);
    let mut sink = CollectingSink::new(StallProfile::Periodic { period: 3, stalled: 1 });
    let mut stage = PacketToImage::new(4).expect("width >= 1");

    drive(&mut stage, &mut source, &mut sink);

    assert_eq!(sink.words().len(), 10);
    assert_eq!(stage.shape_mismatch().count(), 2);
    assert_eq!(stage.frames(), 3);
    let ends: Vec<usize> = sink
        .words()
        .iter()
        .enumerate()
        .filter_map(|(i, w)| w.line_last.then_some(i))
        .collect();
    assert_eq!(ends, vec![3, 4, 8, 9]);
}

/// Producer that drops `valid` every other cycle whether or not its word was taken.
#[derive(Debug)]
struct Flaky {
    cycle: u64,
    left: u32,
}

impl StreamProducer<Beat<u32>> for Flaky {
    fn offer(&self) -> Option<Beat<u32>> {
        (self.cycle % 2 == 0 && self.left > 0).then(|| Beat::new(self.left))
    }

    fn tick(&mut self, ready: bool) {
        if ready && self.offer().is_some() {
            self.left -= 1;
        }
        self.cycle += 1;
    }

    fn is_exhausted(&self) -> bool {
        self.left == 0
    }
}

#[test]
fn retracting_producer_is_caught() {
    let mut ctx = SimContext::new();
    let mut sink = CollectingSink::new(StallProfile::Periodic { period: 4, stalled: 2 });
    let err = Testbench::new(100)
        .with_stream_names("flaky", "out")
        .run(&mut ctx, &mut Flaky { cycle: 0, left: 10 }, &mut Passthrough::<Beat<u32>>::new(), &mut sink)
        .unwrap_err();
    match err {
        GatewareError::ContractViolation { stream, .. } => assert_eq!(stream, "flaky"),
        other => panic!("unexpected error: {other}"),
    }
}
