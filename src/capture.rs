//! Reading the IP packets of a capture file.
//!
//! The functional flows are plain pcap captures. The link layer must
//! be Ethernet, Linux cooked or raw IP; anything else cannot be mapped
//! onto IP packets without guessing. Ethernet frames shorter than the
//! minimum frame size may carry padding behind the IP packet, which is
//! trimmed off using the IP total length.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, bail};
use pcap_file::{DataLink, pcap::PcapReader};

const ETHER_HDR_LEN: usize = 14;
const ETHER_FRAME_MIN_LEN: usize = 60;
const LINUX_COOKED_HDR_LEN: usize = 16;

/// Read every IP packet of the capture, link layer stripped.
pub fn read_ip_packets(path: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open the source pcap file {}", path.display()))?;
    let mut reader = PcapReader::new(file).context("failed to parse the source pcap file")?;

    let link_len = match reader.header().datalink {
        DataLink::ETHERNET => ETHER_HDR_LEN,
        DataLink::LINUX_SLL => LINUX_COOKED_HDR_LEN,
        DataLink::RAW => 0,
        datalink => bail!("link layer type {:?} not supported in source dump", datalink),
    };

    let is_ethernet = link_len == ETHER_HDR_LEN;
    let mut packets = Vec::new();

    while let Some(next) = reader.next_packet() {
        let frame = next.context("truncated packet in capture")?;

        if frame.orig_len as usize != frame.data.len() || frame.data.len() <= link_len {
            bail!(
                "truncated packet in capture (len = {}, caplen = {})",
                frame.orig_len,
                frame.data.len()
            );
        }

        let mut ip_packet = frame.data[link_len..].to_vec();

        // short Ethernet frames are padded up to the minimum frame
        // size; the padding is not part of the IP packet.
        if is_ethernet && frame.data.len() <= ETHER_FRAME_MIN_LEN {
            if let Some(total_len) = ip_total_len(&ip_packet) {
                if total_len < ip_packet.len() {
                    ip_packet.truncate(total_len);
                }
            }
        }

        packets.push(ip_packet);
    }

    Ok(packets)
}

fn ip_total_len(packet: &[u8]) -> Option<usize> {
    match packet.first()? >> 4 {
        4 if packet.len() >= 4 => Some(u16::from_be_bytes([packet[2], packet[3]]) as usize),
        6 if packet.len() >= 6 => {
            Some(40 + u16::from_be_bytes([packet[4], packet[5]]) as usize)
        }
        _ => None,
    }
}
