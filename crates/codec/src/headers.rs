//! Views over the uncompressed IP/UDP headers.
//!
//! The compressor works from the original header octets: change
//! detection compares them, static/dynamic chains copy them verbatim
//! and the header CRC of UO packets is computed over them. The views
//! therefore keep the raw octets and read fields on demand.
//!
//! The CRC-STATIC / CRC-DYNAMIC split follows RFC 3095 section 5.9.2:
//! octets carrying fields that never change during the flow lifetime
//! feed CRC-STATIC, all remaining octets feed CRC-DYNAMIC.

use crate::{
    Error,
    crc::{CrcKind, CrcTables, crc_calculate},
};

pub const IPPROTO_IPIP: u8 = 4;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_IPV6: u8 = 41;
pub const IPPROTO_UDPLITE: u8 = 136;

/// IPv4 header without options.
///
/// Flows whose headers carry options are not compressible by the RFC
/// 3095 profiles in this crate family; parsing keeps the fixed 20
/// octets and reports the real header length separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    raw: [u8; 20],
    header_len: usize,
}

impl Ipv4Header {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 20 {
            return Err(Error::InvalidInput);
        }

        if bytes[0] >> 4 != 4 {
            return Err(Error::InvalidInput);
        }

        let header_len = ((bytes[0] & 0x0f) as usize) * 4;
        if header_len < 20 || bytes.len() < header_len {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            raw: bytes[..20].try_into()?,
            header_len,
        })
    }

    pub fn raw(&self) -> &[u8; 20] {
        &self.raw
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn has_options(&self) -> bool {
        self.header_len > 20
    }

    pub fn tos(&self) -> u8 {
        self.raw[1]
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes([self.raw[2], self.raw[3]])
    }

    pub fn id(&self) -> u16 {
        u16::from_be_bytes([self.raw[4], self.raw[5]])
    }

    pub fn df(&self) -> bool {
        self.raw[6] & 0x40 != 0
    }

    /// More-fragments flag or a non-zero fragment offset.
    pub fn is_fragmented(&self) -> bool {
        self.raw[6] & 0x20 != 0 || (u16::from_be_bytes([self.raw[6], self.raw[7]]) & 0x1fff) != 0
    }

    pub fn ttl(&self) -> u8 {
        self.raw[8]
    }

    pub fn protocol(&self) -> u8 {
        self.raw[9]
    }

    pub fn src(&self) -> &[u8] {
        &self.raw[12..16]
    }

    pub fn dst(&self) -> &[u8] {
        &self.raw[16..20]
    }

    pub fn crc_static(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        let crc = crc_calculate(kind, &self.raw[0..2], crc, tables);
        let crc = crc_calculate(kind, &self.raw[6..10], crc, tables);
        crc_calculate(kind, &self.raw[12..20], crc, tables)
    }

    pub fn crc_dynamic(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        let crc = crc_calculate(kind, &self.raw[2..6], crc, tables);
        crc_calculate(kind, &self.raw[10..12], crc, tables)
    }
}

/// IPv6 base header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    raw: [u8; 40],
}

impl Ipv6Header {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 40 || bytes[0] >> 4 != 6 {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            raw: bytes[..40].try_into()?,
        })
    }

    pub fn raw(&self) -> &[u8; 40] {
        &self.raw
    }

    pub fn traffic_class(&self) -> u8 {
        (self.raw[0] << 4) | (self.raw[1] >> 4)
    }

    pub fn flow_label(&self) -> u32 {
        u32::from_be_bytes([0, self.raw[1] & 0x0f, self.raw[2], self.raw[3]])
    }

    pub fn payload_len(&self) -> u16 {
        u16::from_be_bytes([self.raw[4], self.raw[5]])
    }

    pub fn next_header(&self) -> u8 {
        self.raw[6]
    }

    pub fn hop_limit(&self) -> u8 {
        self.raw[7]
    }

    pub fn src(&self) -> &[u8] {
        &self.raw[8..24]
    }

    pub fn dst(&self) -> &[u8] {
        &self.raw[24..40]
    }

    pub fn crc_static(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        let crc = crc_calculate(kind, &self.raw[0..4], crc, tables);
        let crc = crc_calculate(kind, &self.raw[6..7], crc, tables);
        crc_calculate(kind, &self.raw[8..40], crc, tables)
    }

    pub fn crc_dynamic(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        let crc = crc_calculate(kind, &self.raw[4..6], crc, tables);
        crc_calculate(kind, &self.raw[7..8], crc, tables)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpHeader {
    V4(Ipv4Header),
    V6(Ipv6Header),
}

impl IpHeader {
    /// # Test
    ///
    /// ```
    /// use rohc_comp_codec::headers::IpHeader;
    ///
    /// let packet = [
    ///     0x45, 0x00, 0x00, 0x1c, 0x30, 0x39, 0x40, 0x00, 0x40, 0x11, 0x00,
    ///     0x00, 0xc0, 0xa8, 0x00, 0x01, 0xc0, 0xa8, 0x00, 0x02,
    /// ];
    ///
    /// let header = IpHeader::parse(&packet).unwrap();
    ///
    /// assert_eq!(header.version(), 4);
    /// assert_eq!(header.protocol(), 17);
    /// assert_eq!(header.header_len(), 20);
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput);
        }

        match bytes[0] >> 4 {
            4 => Ok(Self::V4(Ipv4Header::parse(bytes)?)),
            6 => Ok(Self::V6(Ipv6Header::parse(bytes)?)),
            _ => Err(Error::InvalidInput),
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            Self::V4(_) => 4,
            Self::V6(_) => 6,
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            Self::V4(v4) => v4.header_len(),
            Self::V6(_) => 40,
        }
    }

    /// Protocol carried behind this header.
    pub fn protocol(&self) -> u8 {
        match self {
            Self::V4(v4) => v4.protocol(),
            Self::V6(v6) => v6.next_header(),
        }
    }

    pub fn src(&self) -> &[u8] {
        match self {
            Self::V4(v4) => v4.src(),
            Self::V6(v6) => v6.src(),
        }
    }

    pub fn dst(&self) -> &[u8] {
        match self {
            Self::V4(v4) => v4.dst(),
            Self::V6(v6) => v6.dst(),
        }
    }

    pub fn is_fragmented(&self) -> bool {
        match self {
            Self::V4(v4) => v4.is_fragmented(),
            Self::V6(_) => false,
        }
    }

    pub fn crc_static(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        match self {
            Self::V4(v4) => v4.crc_static(kind, crc, tables),
            Self::V6(v6) => v6.crc_static(kind, crc, tables),
        }
    }

    pub fn crc_dynamic(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        match self {
            Self::V4(v4) => v4.crc_dynamic(kind, crc, tables),
            Self::V6(v6) => v6.crc_dynamic(kind, crc, tables),
        }
    }

    /// Same source, destination, version and protocol: the headers
    /// belong to the same flow.
    pub fn same_flow(&self, other: &IpHeader) -> bool {
        match (self, other) {
            (Self::V4(a), Self::V4(b)) => {
                a.src() == b.src() && a.dst() == b.dst() && a.protocol() == b.protocol()
            }
            (Self::V6(a), Self::V6(b)) => {
                a.src() == b.src()
                    && a.dst() == b.dst()
                    && a.next_header() == b.next_header()
                    && a.flow_label() == b.flow_label()
            }
            _ => false,
        }
    }
}

/// UDP header. The same octets serve UDP-Lite, whose length field is
/// reinterpreted as the checksum coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    raw: [u8; 8],
}

impl UdpHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 8 {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            raw: bytes[..8].try_into()?,
        })
    }

    pub fn raw(&self) -> &[u8; 8] {
        &self.raw
    }

    pub fn source_port(&self) -> u16 {
        u16::from_be_bytes([self.raw[0], self.raw[1]])
    }

    pub fn dest_port(&self) -> u16 {
        u16::from_be_bytes([self.raw[2], self.raw[3]])
    }

    pub fn len(&self) -> u16 {
        u16::from_be_bytes([self.raw[4], self.raw[5]])
    }

    /// UDP-Lite checksum coverage, sharing the length field octets.
    pub fn coverage(&self) -> u16 {
        self.len()
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.raw[6], self.raw[7]])
    }

    pub fn crc_static(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        crc_calculate(kind, &self.raw[0..4], crc, tables)
    }

    pub fn crc_dynamic(&self, kind: CrcKind, crc: u8, tables: &CrcTables) -> u8 {
        crc_calculate(kind, &self.raw[4..8], crc, tables)
    }
}

/// The parsed header stack of one uncompressed packet.
///
/// At most two IP headers (an outer tunnel header plus the innermost
/// one) are recognized, matching what the RFC 3095 profiles can
/// describe. The transport header is present when the innermost
/// protocol is UDP or UDP-Lite and the packet is not fragmented.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeaders<'a> {
    pub outer: Option<IpHeader>,
    pub inner: IpHeader,
    pub udp: Option<UdpHeader>,
    packet: &'a [u8],
    ip_hdrs_len: usize,
}

impl<'a> PacketHeaders<'a> {
    pub fn parse(packet: &'a [u8]) -> Result<Self, Error> {
        let first = IpHeader::parse(packet)?;

        let (outer, inner, ip_hdrs_len) = match first.protocol() {
            IPPROTO_IPIP | IPPROTO_IPV6 if !first.is_fragmented() => {
                let inner = IpHeader::parse(&packet[first.header_len()..])?;
                let len = first.header_len() + inner.header_len();
                (Some(first), inner, len)
            }
            _ => (None, first, first.header_len()),
        };

        let udp = match inner.protocol() {
            IPPROTO_UDP | IPPROTO_UDPLITE if !inner.is_fragmented() => {
                UdpHeader::parse(&packet[ip_hdrs_len..]).ok()
            }
            _ => None,
        };

        Ok(Self {
            outer,
            inner,
            udp,
            packet,
            ip_hdrs_len,
        })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.packet
    }

    /// Total length of the IP header stack.
    pub fn ip_headers_len(&self) -> usize {
        self.ip_hdrs_len
    }

    /// Offset of the first octet not covered by the compressed header
    /// chain: past the IP headers, and past the transport header when
    /// one was recognized.
    pub fn payload_offset(&self) -> usize {
        self.ip_hdrs_len + if self.udp.is_some() { 8 } else { 0 }
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.packet[self.payload_offset().min(self.packet.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_packet() -> Vec<u8> {
        let mut packet = vec![
            0x45, 0x00, 0x00, 0x20, 0x00, 0x2a, 0x40, 0x00, 0x40, 0x11, 0xbe, 0xef, 0x0a, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x02,
        ];
        packet.extend_from_slice(&[0x12, 0x34, 0x00, 0x35, 0x00, 0x0c, 0xab, 0xcd]);
        packet.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        packet
    }

    #[test]
    fn parses_ipv4_udp() {
        let packet = udp_packet();
        let headers = PacketHeaders::parse(&packet).unwrap();

        assert!(headers.outer.is_none());
        assert_eq!(headers.inner.protocol(), IPPROTO_UDP);

        let udp = headers.udp.unwrap();
        assert_eq!(udp.source_port(), 0x1234);
        assert_eq!(udp.dest_port(), 53);
        assert_eq!(udp.checksum(), 0xabcd);
        assert_eq!(headers.payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn fragmented_packet_has_no_transport_view() {
        let mut packet = udp_packet();
        packet[6] = 0x20;
        let headers = PacketHeaders::parse(&packet).unwrap();

        assert!(headers.inner.is_fragmented());
        assert!(headers.udp.is_none());
    }

    #[test]
    fn ip_in_ip_exposes_both_levels() {
        let inner = udp_packet();
        let mut packet = vec![
            0x45, 0x00, 0x00, 0x40, 0x01, 0x00, 0x40, 0x00, 0x40, 0x04, 0x00, 0x00, 0xc0, 0xa8,
            0x01, 0x01, 0xc0, 0xa8, 0x01, 0x02,
        ];
        packet.extend_from_slice(&inner);

        let headers = PacketHeaders::parse(&packet).unwrap();
        assert!(headers.outer.is_some());
        assert_eq!(headers.inner.protocol(), IPPROTO_UDP);
        assert_eq!(headers.payload_offset(), 48);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let packet = [0x95u8; 20];
        assert!(PacketHeaders::parse(&packet).is_err());
    }
}
