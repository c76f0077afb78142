pub mod capture;
pub mod config;

use std::path::Path;

use anyhow::Context;
use bytes::BytesMut;
use engine::{Compressor, packet::PacketType};
use rand::{RngCore, SeedableRng, rngs::StdRng};

use crate::config::Config;

/// Build a compressor from the configuration, with a deterministic
/// random source so runs are reproducible.
pub fn build_compressor(config: &Config, random_seed: u64) -> anyhow::Result<Compressor> {
    let mut compressor = Compressor::new(config.rohc.to_options());

    let mut rng = StdRng::seed_from_u64(random_seed);
    compressor.set_random_cb(move || rng.next_u32());

    for id in &config.rohc.profiles {
        let profile = engine::packet::RohcProfile::try_from(*id)
            .map_err(|_| anyhow::anyhow!("unknown profile id 0x{:04x}", id))?;
        compressor
            .activate_profile(profile)
            .with_context(|| format!("failed to activate profile {:?}", profile))?;
    }

    Ok(compressor)
}

/// Compress every IP packet of the flow and check that the last packet
/// classifies as expected. Returns whether the check passed.
///
/// This mirrors the functional test drivers of the original stack: the
/// flow drives the compressor through its state machine and the final
/// classification proves which steady state it reached.
pub fn run_flow(config: &Config, flow: &Path, expected: PacketType) -> anyhow::Result<bool> {
    let mut compressor = build_compressor(config, 5)?;
    let packets = capture::read_ip_packets(flow)?;

    if packets.is_empty() {
        anyhow::bail!("the capture contains no packets");
    }

    let mut rohc_packet = BytesMut::zeroed(4096);

    for (counter, ip_packet) in packets.iter().enumerate() {
        let size = compressor
            .compress(ip_packet, &mut rohc_packet)
            .with_context(|| format!("failed to compress IP packet #{}", counter + 1))?;

        let info = compressor
            .last_packet_info()
            .context("no packet information after compression")?;

        log::info!(
            "packet #{}: {} octets compressed to {}, type '{}'",
            counter + 1,
            ip_packet.len(),
            size,
            info.packet_type
        );
    }

    let last = compressor
        .last_packet_info()
        .context("no packet information after compression")?;

    if last.packet_type != expected {
        log::error!(
            "last packet was compressed as '{}' while '{}' was expected",
            last.packet_type,
            expected
        );
        return Ok(false);
    }

    log::info!("all packets were successfully compressed");
    log::info!("last packet was compressed with the expected packet type");
    Ok(true)
}
