// SPDX-License-Identifier: AGPL-3.0-only

//! Transformer chain throughput.
//!
//! Pushes one long packet through register chains of increasing latency,
//! with and without a randomly stalling consumer, and checks the delivered
//! stream against the input while timing the simulation.

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use streamring_gateware::{
    map_payload, packet_beats, stream_buffer, Beat, CollectingSink, SimContext, StageExt, StallProfile, StreamSource,
    Testbench,
};
use tracing_subscriber::EnvFilter;

const WORDS: usize = 200_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let mut rng = StdRng::seed_from_u64(42);
    let payload: Vec<u32> = (0..WORDS).map(|_| rng.gen()).collect();
    let expected: Vec<Beat<u64>> = packet_beats(&payload.iter().map(|&x| u64::from(x) + 1).collect::<Vec<_>>());

    println!("Transformer chain throughput ({WORDS} words)");
    println!("===========================================");
    println!("  {:>7}  {:>8}  {:>10}  {:>10}  {:>12}", "latency", "stall p", "cycles", "words/cyc", "Mwords/s");
    println!("  {:-<7}  {:-<8}  {:-<10}  {:-<10}  {:-<12}", "", "", "", "", "");

    for latency in [0usize, 1, 2, 4, 8] {
        for &probability in &[0.0, 0.3] {
            let mut source = StreamSource::<Beat<u32>>::new(StallProfile::Never);
            source.push_packet(&payload);
            let mut sink = CollectingSink::new(StallProfile::Random { probability, seed: 3 });
            let mut stage = map_payload(latency / 2, |x: u32| u64::from(x) + 1)
                .then(stream_buffer::<Beat<u64>>(latency - latency / 2));

            let t0 = Instant::now();
            let report = Testbench::new(WORDS as u64 * 10).run(&mut SimContext::new(), &mut source, &mut stage, &mut sink)?;
            let secs = t0.elapsed().as_secs_f64();

            ensure!(sink.words() == expected.as_slice(), "latency {latency}: delivered stream differs");
            #[allow(clippy::cast_precision_loss)]
            let rate = WORDS as f64 / secs / 1e6;
            println!(
                "  {:>7}  {:>8.2}  {:>10}  {:>10.3}  {:>12.2}",
                latency,
                probability,
                report.cycles,
                report.output.utilization(),
                rate
            );
        }
    }

    Ok(())
}
