use anyhow::Result;

use codec::feedback::seal_crc;
use rohc_comp_engine::{
    Compressor, CompressorOptions, EngineError,
    packet::{Mode, PacketType, RohcProfile, State},
};

/// A synthetic IPv4/UDP packet. The IP-ID advances with `seq` so the
/// flow looks like a typical sequential sender.
fn udp_packet(seq: u16, checksum: u16) -> Vec<u8> {
    let total_len = 20 + 8 + 4u16;
    let id = 0x1000u16.wrapping_add(seq);

    let mut packet = vec![
        0x45,
        0x00,
        (total_len >> 8) as u8,
        total_len as u8,
        (id >> 8) as u8,
        id as u8,
        0x40,
        0x00,
        0x40,
        17,
        0x00,
        0x00,
        10,
        0,
        0,
        1,
        10,
        0,
        0,
        2,
    ];
    packet.extend_from_slice(&[0xc3, 0x50, 0x00, 0x35, 0x00, 0x0c]);
    packet.extend_from_slice(&checksum.to_be_bytes());
    packet.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    packet
}

/// Like [`udp_packet`] but with different ports, so it opens a second
/// context.
fn other_udp_packet(seq: u16) -> Vec<u8> {
    let mut packet = udp_packet(seq, 0x4242);
    packet[20] = 0x11;
    packet[21] = 0x11;
    packet
}

fn tcp_packet(seq: u16) -> Vec<u8> {
    let mut packet = udp_packet(seq, 0x9999);
    packet[9] = 6;
    packet
}

fn compressor(oa_repetitions_nr: u8, periodic_refreshes_ir_timeout: usize) -> Compressor {
    let mut compressor = Compressor::new(CompressorOptions {
        oa_repetitions_nr,
        periodic_refreshes_ir_timeout,
        ..CompressorOptions::default()
    });

    compressor.set_random_cb(|| 0x1234);
    compressor.activate_profile(RohcProfile::Uncompressed).unwrap();
    compressor.activate_profile(RohcProfile::Udp).unwrap();
    compressor.activate_profile(RohcProfile::Ip).unwrap();
    compressor.activate_profile(RohcProfile::UdpLite).unwrap();

    compressor
}

fn compress_one(compressor: &mut Compressor, packet: &[u8]) -> Result<(PacketType, Vec<u8>)> {
    let mut output = vec![0u8; 4096];
    let size = compressor.compress(packet, &mut output)?;
    output.truncate(size);

    let info = compressor.last_packet_info().unwrap();
    Ok((info.packet_type, output))
}

#[test]
fn rtp_and_esp_profiles_are_rejected() {
    let mut compressor = compressor(3, 1700);

    assert!(matches!(
        compressor.activate_profile(RohcProfile::Rtp),
        Err(EngineError::UnsupportedProfile)
    ));
    assert!(matches!(
        compressor.activate_profile(RohcProfile::Esp),
        Err(EngineError::UnsupportedProfile)
    ));
}

/// A two-packet UDP flow: full IR context establishment, then straight
/// to the smallest packet the profile has.
#[test]
fn minimal_udp_flow_compresses_to_uo0() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    let (first, first_bytes) = compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;
    assert_eq!(first, PacketType::Ir);
    // IR: type octet, profile, CRC, static chain (10 + 4), dynamic
    // chain (5 + 2), 16-bit SN, then the 4 payload octets.
    assert_eq!(first_bytes[0], 0xfd);
    assert_eq!(first_bytes[1], RohcProfile::Udp as u8);
    assert_eq!(first_bytes.len(), 26 + 4);

    let (second, second_bytes) = compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(second, PacketType::Uo0);
    // UO-0 with 4 SN bits and a CRC-3, the checksum remainder and the
    // payload; never an Add-CID octet for CID zero.
    assert_eq!(second_bytes[0] >> 7, 0);
    assert_eq!(second_bytes.len(), 1 + 2 + 4);

    let info = compressor.last_packet_info().unwrap();
    assert_eq!(info.profile, RohcProfile::Udp);
    assert_eq!(info.cid, 0);
    assert_eq!(info.state, State::So);
    Ok(())
}

/// Flipping the UDP checksum between zero and non-zero invalidates
/// the context: the compressor must repeat IR packets until the new
/// behaviour was sent `oa_repetitions_nr` times.
#[test]
fn udp_checksum_flip_forces_ir_repetitions() -> Result<()> {
    let mut compressor = compressor(3, 1700);
    let mut types = Vec::new();

    for seq in 0..5u16 {
        let (packet_type, _) = compress_one(&mut compressor, &udp_packet(seq, 0x1234))?;
        types.push(packet_type);
    }

    // the context settles after three repetitions.
    assert_eq!(
        &types[..],
        &[
            PacketType::Ir,
            PacketType::Ir,
            PacketType::Ir,
            PacketType::Uo0,
            PacketType::Uo0
        ]
    );

    for seq in 5..9u16 {
        let (packet_type, _) = compress_one(&mut compressor, &udp_packet(seq, 0x0000))?;
        types.push(packet_type);
    }

    // packets 6..8 carry the flip, packet 9 may leave IR again.
    assert_eq!(
        &types[5..],
        &[
            PacketType::Ir,
            PacketType::Ir,
            PacketType::Ir,
            PacketType::Uo0
        ]
    );
    Ok(())
}

/// The uncompressed profile sends three IR packets, then Normal
/// packets with a single periodic IR per refresh interval.
#[test]
fn uncompressed_periodic_ir_refresh() -> Result<()> {
    let mut compressor = Compressor::new(CompressorOptions {
        periodic_refreshes_ir_timeout: 20,
        ..CompressorOptions::default()
    });
    compressor.set_random_cb(|| 0x1234);
    compressor.activate_profile(RohcProfile::Uncompressed).unwrap();

    let mut ir_packets = Vec::new();

    for counter in 1..=100u16 {
        let (packet_type, bytes) = compress_one(&mut compressor, &udp_packet(counter, 0xffff))?;

        match packet_type {
            PacketType::Ir => {
                assert_eq!(bytes[0], 0xfc);
                ir_packets.push(counter);
            }
            PacketType::Normal => {
                // first octet of the IP packet, then the rest verbatim.
                assert_eq!(bytes[0], 0x45);
                assert_eq!(&bytes[1..], &udp_packet(counter, 0xffff)[1..]);
            }
            other => panic!("unexpected packet type {}", other),
        }
    }

    assert_eq!(ir_packets, vec![1, 2, 3, 24, 44, 64, 84]);
    Ok(())
}

/// Scenario S5 plus the positive half of the CRC gate: a mode change
/// rides only on feedback protected by a valid CRC option.
#[test]
fn feedback_mode_change_requires_valid_crc() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;
    compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().mode, Mode::Unidirectional);

    // FEEDBACK-2, ACK, mode O, no CRC option: must be ignored.
    compressor.deliver_feedback(&[0x20, 0x01])?;
    let (packet_type, _) = compress_one(&mut compressor, &udp_packet(2, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().mode, Mode::Unidirectional);
    assert_eq!(packet_type, PacketType::Uo0);

    // the same feedback with a CRC option whose value is off by one
    // bit: discarded entirely, no transition of any kind.
    let mut feedback = vec![0x20, 0x02, 0x11, 0x00];
    let crc = seal_crc(&feedback, &codec::crc::CrcTables::default());
    feedback[3] = crc ^ 0x01;
    compressor.deliver_feedback(&feedback)?;

    let (packet_type, _) = compress_one(&mut compressor, &udp_packet(3, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().mode, Mode::Unidirectional);
    assert_eq!(packet_type, PacketType::Uo0);

    // and with the correct CRC the mode changes, which restarts the
    // context from IR.
    let mut feedback = vec![0x20, 0x03, 0x11, 0x00];
    let crc = seal_crc(&feedback, &codec::crc::CrcTables::default());
    feedback[3] = crc;
    compressor.deliver_feedback(&feedback)?;

    let (packet_type, _) = compress_one(&mut compressor, &udp_packet(4, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().mode, Mode::Optimistic);
    assert_eq!(packet_type, PacketType::Ir);
    Ok(())
}

#[test]
fn static_nack_regresses_to_ir_without_crc() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;
    compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().state, State::So);

    // STATIC-NACK, no options, no CRC: still forces IR.
    compressor.deliver_feedback(&[0x80, 0x02])?;

    let (packet_type, _) = compress_one(&mut compressor, &udp_packet(2, 0xabcd))?;
    assert_eq!(packet_type, PacketType::Ir);
    Ok(())
}

#[test]
fn nack_regresses_to_fo_and_uor2() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;
    compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().state, State::So);

    // NACK: the context falls back at least to FO.
    compressor.deliver_feedback(&[0x40, 0x02])?;

    let (packet_type, bytes) = compress_one(&mut compressor, &udp_packet(2, 0xabcd))?;
    assert_eq!(packet_type, PacketType::Uor2);
    assert_eq!(compressor.last_packet_info().unwrap().state, State::Fo);

    // UOR-2: 110 + 5 SN bits, then no extension and a CRC-7.
    assert_eq!(bytes[0] >> 5, 0b110);
    assert_eq!(bytes[1] >> 7, 0);
    Ok(())
}

/// A second flow takes the next CID and its packets lead with an
/// Add-CID octet; the first flow stays on the implicit CID zero.
#[test]
fn second_flow_gets_add_cid_octet() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    let (_, bytes_a) = compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;
    assert_eq!(bytes_a[0], 0xfd);

    let (packet_type, bytes_b) = compress_one(&mut compressor, &other_udp_packet(0))?;
    assert_eq!(packet_type, PacketType::Ir);
    assert_eq!(bytes_b[0], 0xe1);
    assert_eq!(bytes_b[1], 0xfd);
    assert_eq!(compressor.last_packet_info().unwrap().cid, 1);

    // both contexts stay live and keep their CIDs.
    let (_, bytes_a) = compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(compressor.last_packet_info().unwrap().cid, 0);
    assert_ne!(bytes_a[0] >> 4, 0x0e);
    Ok(())
}

/// Capacity failures must not move the state machine.
#[test]
fn too_small_output_leaves_the_context_alone() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    compress_one(&mut compressor, &udp_packet(0, 0xabcd))?;

    let mut tiny = [0u8; 4];
    assert!(matches!(
        compressor.compress(&udp_packet(1, 0xabcd), &mut tiny),
        Err(EngineError::BufferTooSmall)
    ));

    // the retry with a real buffer proceeds as if nothing happened.
    let (packet_type, _) = compress_one(&mut compressor, &udp_packet(1, 0xabcd))?;
    assert_eq!(packet_type, PacketType::Uo0);
    Ok(())
}

#[test]
fn unparseable_packet_is_rejected() {
    let mut compressor = compressor(1, 1700);
    let mut output = vec![0u8; 256];

    assert!(matches!(
        compressor.compress(&[0x95u8; 32], &mut output),
        Err(EngineError::MalformedPacket)
    ));
}

/// The IP-only profile carries flows the UDP profile cannot, and the
/// transport header survives as opaque payload.
#[test]
fn tcp_flow_uses_the_ip_only_profile() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    let (first, first_bytes) = compress_one(&mut compressor, &tcp_packet(0))?;
    assert_eq!(first, PacketType::Ir);
    assert_eq!(compressor.last_packet_info().unwrap().profile, RohcProfile::Ip);
    assert_eq!(first_bytes[1], RohcProfile::Ip as u8);

    let packet = tcp_packet(1);
    let (second, second_bytes) = compress_one(&mut compressor, &packet)?;
    assert_eq!(second, PacketType::Uo0);
    // one octet of UO-0, then everything behind the IP header.
    assert_eq!(&second_bytes[1..], &packet[20..]);
    Ok(())
}

/// Fragmented packets cannot be header-compressed and fall through to
/// the uncompressed profile.
#[test]
fn fragments_fall_back_to_uncompressed() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    let mut fragment = udp_packet(0, 0xabcd);
    fragment[6] = 0x20;

    let (packet_type, _) = compress_one(&mut compressor, &fragment)?;
    assert_eq!(packet_type, PacketType::Ir);
    assert_eq!(
        compressor.last_packet_info().unwrap().profile,
        RohcProfile::Uncompressed
    );
    Ok(())
}

/// Property: over a long unidirectional flow the number of IR packets
/// tracks the refresh interval.
#[test]
fn ir_refresh_cadence_over_a_long_flow() -> Result<()> {
    let mut compressor = compressor(1, 20);
    let mut ir_packets = Vec::new();

    for counter in 1..=100u16 {
        let (packet_type, _) = compress_one(&mut compressor, &udp_packet(counter, 0xabcd))?;
        if packet_type == PacketType::Ir {
            ir_packets.push(counter);
        }
    }

    assert_eq!(ir_packets, vec![1, 22, 42, 62, 82]);
    Ok(())
}

/// UDP-Lite flows compress like UDP but always carry the checksum in
/// the UO tail.
#[test]
fn udp_lite_flow_compresses() -> Result<()> {
    let mut compressor = compressor(1, 1700);

    let mut packet = udp_packet(0, 0xbeef);
    packet[9] = 136;

    let (first, first_bytes) = compress_one(&mut compressor, &packet)?;
    assert_eq!(first, PacketType::Ir);
    assert_eq!(
        compressor.last_packet_info().unwrap().profile,
        RohcProfile::UdpLite
    );
    // the UDP-Lite dynamic chain carries coverage and checksum.
    assert_eq!(first_bytes.len(), 26 + 2 + 4);

    let mut packet = udp_packet(1, 0xbeef);
    packet[9] = 136;

    let (second, second_bytes) = compress_one(&mut compressor, &packet)?;
    assert_eq!(second, PacketType::Uo0);
    assert_eq!(second_bytes.len(), 1 + 2 + 4);
    Ok(())
}
