//! UDP-Lite profile (0x0008) overlay.
//!
//! [RFC4019]: https://tools.ietf.org/html/rfc4019
//!
//! UDP-Lite replaces the UDP length field with a checksum coverage,
//! and its checksum is mandatory. For the compressor this means the
//! dynamic part carries coverage and checksum, the checksum rides in
//! the tail of every UO packet unconditionally, and a coverage change
//! is the overlay surprise that regresses the context to IR.

use codec::{
    crc::{CrcKind, CrcTables},
    headers::{IPPROTO_UDPLITE, PacketHeaders, UdpHeader},
    writer::PacketWriter,
};

use crate::{
    EngineError,
    packet::{PacketType, RohcProfile},
    rfc3095::ProfileBehavior,
};

pub struct UdpLiteBehavior {
    old_udp: UdpHeader,
    /// How many times the coverage was carried in a dynamic chain
    /// since it last changed.
    coverage_change_count: u8,
    toggled: bool,
}

impl UdpLiteBehavior {
    pub fn new(udp: UdpHeader) -> Self {
        Self {
            old_udp: udp,
            coverage_change_count: 0,
            toggled: false,
        }
    }
}

impl ProfileBehavior for UdpLiteBehavior {
    fn profile(&self) -> RohcProfile {
        RohcProfile::UdpLite
    }

    fn next_header_len(&self) -> usize {
        8
    }

    fn matches(&self, headers: &PacketHeaders<'_>) -> bool {
        headers.inner.protocol() == IPPROTO_UDPLITE
            && headers.udp.is_some_and(|udp| {
                udp.source_port() == self.old_udp.source_port()
                    && udp.dest_port() == self.old_udp.dest_port()
            })
    }

    fn detect_changes(&mut self, headers: &PacketHeaders<'_>, oa_repetitions_nr: u8) -> bool {
        let Some(udp) = headers.udp else {
            return false;
        };

        self.toggled = udp.coverage() != self.old_udp.coverage();
        self.toggled || self.coverage_change_count < oa_repetitions_nr
    }

    fn code_static_part(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        let Some(udp) = &headers.udp else {
            return Err(EngineError::MalformedPacket);
        };

        writer.extend(&udp.raw()[0..4])?;
        Ok(())
    }

    fn code_dynamic_part(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        let Some(udp) = &headers.udp else {
            return Err(EngineError::MalformedPacket);
        };

        writer.extend(&udp.raw()[4..8])?;
        Ok(())
    }

    fn code_uo_remainder(
        &self,
        headers: &PacketHeaders<'_>,
        writer: &mut PacketWriter<'_>,
    ) -> Result<(), EngineError> {
        let Some(udp) = &headers.udp else {
            return Err(EngineError::MalformedPacket);
        };

        writer.extend(&udp.raw()[6..8])?;
        Ok(())
    }

    fn crc_static(
        &self,
        headers: &PacketHeaders<'_>,
        kind: CrcKind,
        crc: u8,
        tables: &CrcTables,
    ) -> u8 {
        match &headers.udp {
            Some(udp) => udp.crc_static(kind, crc, tables),
            None => crc,
        }
    }

    fn crc_dynamic(
        &self,
        headers: &PacketHeaders<'_>,
        kind: CrcKind,
        crc: u8,
        tables: &CrcTables,
    ) -> u8 {
        match &headers.udp {
            Some(udp) => udp.crc_dynamic(kind, crc, tables),
            None => crc,
        }
    }

    fn update(
        &mut self,
        headers: &PacketHeaders<'_>,
        packet_type: PacketType,
        oa_repetitions_nr: u8,
    ) {
        let Some(udp) = headers.udp else {
            return;
        };

        if self.toggled {
            self.coverage_change_count = 0;
        }

        if matches!(packet_type, PacketType::Ir | PacketType::IrDyn) {
            self.coverage_change_count = (self.coverage_change_count + 1).min(oa_repetitions_nr);
            self.old_udp = udp;
        }

        self.toggled = false;
    }
}
