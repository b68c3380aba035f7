// SPDX-License-Identifier: AGPL-3.0-only

//! Ring writer throughput under backpressure.
//!
//! Sweeps the write-port stall probability and reports accepted words per
//! simulated cycle, plus how fast the model itself runs on this machine.
//! Packet lengths are drawn at random (fixed seed) up to the cutoff.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use streamring_gateware::{
    Beat, DigestDram, HandoffPolicy, PacketGenerator, Passthrough, PlatformKind, RingWriterConfig, SimContext,
    StallProfile, Testbench,
};
use tracing_subscriber::EnvFilter;

const BUFFER_SIZE: u64 = 0x1_0000;
const PACKETS: usize = 64;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let mut rng = StdRng::seed_from_u64(0x5352);
    let lengths: Vec<u64> = (0..PACKETS).map(|_| rng.gen_range(BUFFER_SIZE / 4..=BUFFER_SIZE)).collect();
    let total: u64 = lengths.iter().sum();

    println!("Ring writer throughput ({PACKETS} packets, {total} words, 4 x {BUFFER_SIZE:#x}-word regions)");
    println!("=====================================================================");
    println!("  {:>8}  {:>10}  {:>12}  {:>11}  {:>12}", "stall p", "handoff", "cycles", "words/cyc", "Mcycles/s");
    println!("  {:-<8}  {:-<10}  {:-<12}  {:-<11}  {:-<12}", "", "", "", "", "");

    for handoff in [HandoffPolicy::OnAccept, HandoffPolicy::OnCompletion] {
        for &probability in &[0.0, 0.1, 0.25, 0.5, 0.75] {
            let platform = PlatformKind::Sim.platform();
            let config = RingWriterConfig::new(0, BUFFER_SIZE, 4).with_handoff(handoff);
            let mut ctx = SimContext::new();
            let mut writer = platform.elaborate_ring_writer(
                &mut ctx,
                config,
                DigestDram::new(config.layout()?),
                StallProfile::Random { probability, seed: 11 },
            )?;
            let mut source = PacketGenerator::new(lengths.clone(), |k, w| (k as u64) << 32 | w, StallProfile::Never);

            let t0 = Instant::now();
            let report = Testbench::new(total * 10).run(
                &mut ctx,
                &mut source,
                &mut Passthrough::<Beat<u64>>::new(),
                &mut writer,
            )?;
            let secs = t0.elapsed().as_secs_f64();

            #[allow(clippy::cast_precision_loss)]
            let rate = report.cycles as f64 / secs / 1e6;
            println!(
                "  {:>8.2}  {:>10}  {:>12}  {:>11.3}  {:>12.1}",
                probability,
                handoff.to_string(),
                report.cycles,
                report.input.utilization(),
                rate
            );
        }
    }

    println!();
    println!("words/cyc tracks 1 - p: the writer never drops below the port's own acceptance rate.");
    Ok(())
}
