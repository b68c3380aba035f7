// SPDX-License-Identifier: AGPL-3.0-only

//! Capture a few synthetic video frames into a DRAM ring and read the last
//! one back the way host software would.
//!
//! ```text
//! cargo run -p streamring-gateware --example video_capture
//! RUST_LOG=debug cargo run -p streamring-gateware --example video_capture
//! ```

use streamring_gateware::prelude::*;
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const FRAMES: usize = 6;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut ctx = SimContext::new();
    let platform = PlatformKind::Zynq.platform();
    let frame_words = u64::from(WIDTH * HEIGHT);
    let config = platform
        .default_config()
        .with_handoff(HandoffPolicy::OnCompletion);
    let config = RingWriterConfig {
        buffer_size: frame_words,
        max_packet_size: frame_words,
        ..config
    };
    let mut writer = platform.elaborate_ring_writer(
        &mut ctx,
        config,
        SparseDram::new(1 << 30),
        StallProfile::Random { probability: 0.1, seed: 1 },
    )?;

    // sensor → gain → raster → skid buffer → flat packets → ring writer
    let mut pipeline = map_payload(1, |pixel: u16| u64::from(pixel) * 4)
        .then(PacketToImage::new(WIDTH)?)
        .then(stream_buffer::<ImageBeat<u64>>(1))
        .then(ImageToPacket::new());

    let mut sensor = StreamSource::<Beat<u16>>::new(StallProfile::Periodic { period: 8, stalled: 1 });
    for frame in 0..FRAMES {
        let pixels: Vec<u16> = (0..WIDTH * HEIGHT)
            .map(|i| ((i % WIDTH) as u16) ^ ((frame as u16) << 12))
            .collect();
        sensor.push_packet(&pixels);
    }

    let report = Testbench::new(1_000_000)
        .with_stream_names("sensor", "ring")
        .run(&mut ctx, &mut sensor, &mut pipeline, &mut writer)?;

    let csr = CsrBank::snapshot(&writer).with_adapter(pipeline.first().first().second());
    let reader = HostReader::attach(&csr)?;
    let frame = reader.read_latest_packet(writer.master().memory())?;

    println!("cycles            {}", report.cycles);
    println!("elapsed           {:?}", ctx.elapsed("sync")?);
    println!("ring utilization  {:.1}%", report.output.utilization() * 100.0);
    println!("current region    {}", reader.current_write_buffer());
    println!("latest frame      region {:?}, {} bytes", reader.latest_complete_region(), frame.len());
    println!("status            {:#x}", csr.read32(streamring_regs::regs::STATUS)?);
    Ok(())
}
