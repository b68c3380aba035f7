// SPDX-License-Identifier: AGPL-3.0-only

//! `streamring` — command-line front end for the ring writer models.
//!
//! ```text
//! USAGE:
//!   streamring layout                 Print region addresses for a ring configuration
//!   streamring regs                   Print the status block register map
//!   streamring simulate               Capture packets in simulation and report status
//!   streamring dump <file>            Simulate, then write the latest complete region
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use streamring_gateware::{
    Beat, CsrBank, DramRingWriter, HandoffPolicy, HostReader, PacketGenerator, Passthrough, Platform, PlatformKind,
    RingWriterConfig, SimContext, SimWriteMaster, SparseDram, StallProfile, Testbench, DEFAULT_BUFFER_SIZE,
};
use streamring_regs::regs;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamring", about = "DRAM packet ring writer models", version)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print region base addresses and sizes.
    Layout(RingArgs),
    /// Print the status block register map.
    Regs,
    /// Run a capture in simulation and print the index sequence and status.
    Simulate(SimArgs),
    /// Run a capture, then write the latest complete region to a file.
    Dump {
        /// Output file.
        file: std::path::PathBuf,
        #[command(flatten)]
        sim: SimArgs,
    },
}

#[derive(Args, Clone)]
struct RingArgs {
    /// Target platform (sim, zynq, zynqmp).
    #[arg(long, default_value = "sim")]
    platform: PlatformKind,
    /// Number of ring regions.
    #[arg(long, default_value_t = 4)]
    n_buffers: usize,
    /// Region size in words (decimal or 0x hex).
    #[arg(long, value_parser = parse_u64, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: u64,
    /// Packet cutoff in words; defaults to the region size.
    #[arg(long, value_parser = parse_u64)]
    max_packet_size: Option<u64>,
    /// Ring base byte address; defaults to the platform's.
    #[arg(long, value_parser = parse_u64)]
    base_address: Option<u64>,
    /// When the host sees a new region index (accept, completion).
    #[arg(long, default_value = "accept")]
    handoff: HandoffPolicy,
}

impl RingArgs {
    fn config(&self) -> RingWriterConfig {
        let defaults = self.platform.platform().default_config();
        RingWriterConfig {
            base_address: self.base_address.unwrap_or(defaults.base_address),
            buffer_size: self.buffer_size,
            n_buffers: self.n_buffers,
            max_packet_size: self.max_packet_size.unwrap_or(self.buffer_size),
            handoff: self.handoff,
            ..defaults
        }
    }
}

#[derive(Args, Clone)]
struct SimArgs {
    #[command(flatten)]
    ring: RingArgs,
    /// Packets to send.
    #[arg(long, default_value_t = 5)]
    packets: usize,
    /// Words per packet.
    #[arg(long, value_parser = parse_u64, default_value_t = 1024)]
    packet_len: u64,
    /// Chance per cycle that the source leaves a gap between words.
    #[arg(long, default_value_t = 0.0)]
    gap_probability: f64,
    /// Chance per cycle that the write port refuses a word.
    #[arg(long, default_value_t = 0.0)]
    stall_probability: f64,
    /// Seed for both random patterns.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("`{s}` is not a number: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();

    match cli.command {
        Cmd::Layout(ring) => cmd_layout(&ring)?,
        Cmd::Regs => cmd_regs(),
        Cmd::Simulate(sim) => cmd_simulate(&sim)?,
        Cmd::Dump { file, sim } => cmd_dump(&file, &sim)?,
    }

    Ok(())
}

fn cmd_layout(ring: &RingArgs) -> Result<()> {
    let config = ring.config();
    config.validate()?;
    ring.platform.platform().check(&config)?;
    let layout = config.layout()?;

    println!("Platform        : {}", ring.platform);
    println!("Regions         : {}", layout.n_buffers());
    println!("Region size     : {:#x} words ({} bytes)", layout.buffer_size(), layout.region_bytes());
    println!("Packet cutoff   : {:#x} words", config.max_packet_size);
    println!("Word size       : {} bytes", layout.word_bytes());
    println!("Hand-off        : {}", config.handoff);
    println!();
    for (i, base) in layout.region_bases().iter().enumerate() {
        println!("  region {i:>2}  {base:#012x} .. {:#012x}", base + layout.region_bytes());
    }
    Ok(())
}

fn cmd_regs() {
    println!("Scalar registers (32-bit, read-only):");
    for (offset, name) in regs::SCALAR_REGISTERS {
        println!("  {offset:#06x}  {name}");
    }
    println!();
    println!(
        "Region table at {:#06x}, {} entries of {:#x} bytes:",
        regs::REGION_TABLE_BASE,
        regs::MAX_REGIONS,
        regs::REGION_STRIDE
    );
    println!("  +{:#x}  BASE_LO", regs::REGION_BASE_LO);
    println!("  +{:#x}  BASE_HI", regs::REGION_BASE_HI);
    println!("  +{:#x}  LEVEL", regs::REGION_LEVEL);
    println!();
    println!(
        "STATUS bits: OVERFLOW={:#x} BUS_ERROR={:#x} SHAPE_MISMATCH={:#x}",
        regs::status::OVERFLOW,
        regs::status::BUS_ERROR,
        regs::status::SHAPE_MISMATCH
    );
}

type SimWriter = DramRingWriter<SimWriteMaster<SparseDram>>;

fn payload(packet: usize, word: u64) -> u64 {
    (packet as u64) << 48 | word
}

fn run_capture(sim: &SimArgs) -> Result<(SimWriter, Vec<usize>, u64)> {
    let platform = sim.ring.platform.platform();
    let config = sim.ring.config();
    let bus = platform.bus();
    let stall = StallProfile::Random {
        probability: sim.stall_probability,
        seed: sim.seed,
    };
    let gaps = StallProfile::Random {
        probability: sim.gap_probability,
        seed: sim.seed.wrapping_add(1),
    };

    let mut ctx = SimContext::new();
    let mut writer = platform
        .elaborate_ring_writer(&mut ctx, config, SparseDram::new(bus.dram_size), stall)
        .context("elaborating ring writer")?;

    let total = sim.packet_len.saturating_mul(sim.packets as u64);
    let busy = 1.0 - sim.gap_probability.max(sim.stall_probability).clamp(0.0, 0.99);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let budget = (total as f64 / busy * 4.0) as u64 + 10_000;

    let mut source = PacketGenerator::new(vec![sim.packet_len; sim.packets], payload, gaps);
    let mut indices = Vec::new();
    let mut published = 0;
    let report = Testbench::new(budget)
        .run_with(&mut ctx, &mut source, &mut Passthrough::<Beat<u64>>::new(), &mut writer, |_, w| {
            let written = w.status().buffers_written;
            if written != published {
                published = written;
                indices.push(w.current_write_buffer());
            }
        })
        .context("simulation")?;

    println!("Simulated {} cycles ({:?} of {} clock)", report.cycles, ctx.elapsed("sync")?, platform.kind());
    println!(
        "Input: {} words, {} stall cycles, {} idle cycles",
        report.input.transfers, report.input.stall_cycles, report.input.idle_cycles
    );
    Ok((writer, indices, report.cycles))
}

fn print_status(writer: &SimWriter) -> Result<()> {
    let csr = CsrBank::snapshot(writer);
    println!();
    println!("Status block:");
    for (offset, name, value) in csr.dump()? {
        println!("  {offset:#06x}  {name:<22} {value:#010x}  ({value})");
    }
    for i in 0..writer.layout().n_buffers() {
        println!(
            "  region {i:>2}  base {:#012x}  level {}",
            csr.read64(regs::region_register(i, regs::REGION_BASE_LO))?,
            csr.read32(regs::region_register(i, regs::REGION_LEVEL))?
        );
    }
    Ok(())
}

fn cmd_simulate(sim: &SimArgs) -> Result<()> {
    let (writer, indices, _) = run_capture(sim)?;
    println!("Index sequence: {indices:?}");
    print_status(&writer)
}

fn cmd_dump(file: &std::path::Path, sim: &SimArgs) -> Result<()> {
    let (writer, _, _) = run_capture(sim)?;
    let reader = HostReader::attach(&CsrBank::snapshot(&writer))?;
    let Some(region) = reader.latest_complete_region() else {
        bail!("no region completed; send at least one packet");
    };
    let bytes = reader
        .write_packet_to_file(writer.master().memory(), file)
        .with_context(|| format!("writing {}", file.display()))?;
    println!("Wrote region {region} ({bytes} bytes) to {}", file.display());
    Ok(())
}
