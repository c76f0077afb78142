//! UDP profile (0x0002) overlay.
//!
//! [Section 5.11]: https://tools.ietf.org/html/rfc3095#section-5.11
//!
//! On top of the generic engine the UDP profile adds a 4-octet static
//! part (the ports), a 2-octet dynamic part (the checksum) and the UO
//! packet tail:
//!
//! ```text
//!      --- --- --- --- --- --- --- ---
//!     :                               :
//!  13 +         UDP Checksum          +  2 octets,
//!     :                               :  if context(UDP Checksum) != 0
//!      --- --- --- --- --- --- --- ---
//! ```
//!
//! The checksum is either disabled for the whole flow (value zero) or
//! carried in every UO packet. A flow that flips between the two
//! invalidates the context, so the overlay regresses to IR and keeps
//! resending the dynamic chain until the new behaviour was repeated
//! `oa_repetitions_nr` times.

use codec::{
    crc::{CrcKind, CrcTables},
    headers::{IPPROTO_UDP, PacketHeaders, UdpHeader},
    writer::PacketWriter,
};

use crate::{
    EngineError,
    packet::{PacketType, RohcProfile},
    rfc3095::ProfileBehavior,
};

pub struct UdpBehavior {
    /// The previous UDP header; refreshed on IR and IR-DYN only, so UO
    /// packets keep appending the checksum until the decompressor was
    /// told it went away.
    old_udp: UdpHeader,
    /// How many times the checksum was carried in a dynamic chain
    /// since its presence last changed.
    checksum_change_count: u8,
    /// Scratch flags of the packet under compression.
    send_udp_dynamic: bool,
    toggled: bool,
}

impl UdpBehavior {
    pub fn new(udp: UdpHeader) -> Self {
        Self {
            old_udp: udp,
            checksum_change_count: 0,
            send_udp_dynamic: false,
            toggled: false,
        }
    }
}

impl ProfileBehavior for UdpBehavior {
    fn profile(&self) -> RohcProfile {
        RohcProfile::Udp
    }

    fn next_header_len(&self) -> usize {
        8
    }

    fn matches(&self, headers: &PacketHeaders<'_>) -> bool {
        headers.inner.protocol() == IPPROTO_UDP
            && headers.udp.is_some_and(|udp| {
                udp.source_port() == self.old_udp.source_port()
                    && udp.dest_port() == self.old_udp.dest_port()
            })
    }

    fn detect_changes(&mut self, headers: &PacketHeaders<'_>, oa_repetitions_nr: u8) -> bool {
        let Some(udp) = headers.udp else {
            return false;
        };

        self.toggled = (udp.checksum() != 0) != (self.old_udp.checksum() != 0);
        self.send_udp_dynamic = self.toggled || self.checksum_change_count < oa_repetitions_nr;

        if self.send_udp_dynamic {
            log::debug!("UDP checksum behaviour still settling, dynamic part required");
        }

        self.send_udp_dynamic
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

        writer.extend(&udp.raw()[6..8])?;
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

        if self.old_udp.checksum() != 0 {
            writer.extend(&udp.raw()[6..8])?;
        }

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
            self.checksum_change_count = 0;
        }

        if matches!(packet_type, PacketType::Ir | PacketType::IrDyn) {
            self.checksum_change_count = (self.checksum_change_count + 1).min(oa_repetitions_nr);
            self.old_udp = udp;
        }

        self.toggled = false;
        self.send_udp_dynamic = false;
    }
}
