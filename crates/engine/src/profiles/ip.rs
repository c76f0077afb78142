//! IP-only profile (0x0004).
//!
//! The degenerate member of the RFC 3095 family: no transport header
//! is compressed, so every hook of the generic engine is a no-op. Its
//! value is the IP header compression itself, and it is what the UDP
//! and UDP-Lite overlays inherit their IP handling from.

use codec::{
    crc::{CrcKind, CrcTables},
    headers::PacketHeaders,
    writer::PacketWriter,
};

use crate::{
    EngineError,
    packet::{PacketType, RohcProfile},
    rfc3095::ProfileBehavior,
};

pub struct IpBehavior;

impl ProfileBehavior for IpBehavior {
    fn profile(&self) -> RohcProfile {
        RohcProfile::Ip
    }

    fn next_header_len(&self) -> usize {
        0
    }

    fn matches(&self, _headers: &PacketHeaders<'_>) -> bool {
        true
    }

    fn detect_changes(&mut self, _headers: &PacketHeaders<'_>, _oa_repetitions_nr: u8) -> bool {
        false
    }

    fn code_static_part(
        &self,
        _headers: &PacketHeaders<'_>,
        _writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn code_dynamic_part(
        &self,
        _headers: &PacketHeaders<'_>,
        _writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn code_uo_remainder(
        &self,
        _headers: &PacketHeaders<'_>,
        _writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn crc_static(
        &self,
        _headers: &PacketHeaders<'_>,
        _kind: CrcKind,
        crc: u8,
        _tables: &CrcTables,
    ) -> u8 {
        crc
    }

    fn crc_dynamic(
        &self,
        _headers: &PacketHeaders<'_>,
        _kind: CrcKind,
        crc: u8,
        _tables: &CrcTables,
    ) -> u8 {
        crc
    }

    fn update(
        &mut self,
        _headers: &PacketHeaders<'_>,
        _packet_type: PacketType,
        _oa_repetitions_nr: u8,
    ) {
    }
}
