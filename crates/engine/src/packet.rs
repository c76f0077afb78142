//! ROHC profile and packet type registries.

use std::str::FromStr;

use num_enum::TryFromPrimitive;

use crate::EngineError;

/// ROHC Profile Identifiers
///
/// [RFC3095]: https://tools.ietf.org/html/rfc3095
/// [Section 8]: https://tools.ietf.org/html/rfc3095#section-8
///
/// Profiles define which protocol stack a context compresses.
/// [Section 8] of [RFC3095] assigns the identifiers below; the RTP,
/// ESP and RTP/UDP-Lite profiles are recognized but not implemented by
/// this compressor.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum RohcProfile {
    Uncompressed = 0x0000,
    Rtp = 0x0001,
    Udp = 0x0002,
    Esp = 0x0003,
    Ip = 0x0004,
    RtpUdpLite = 0x0007,
    UdpLite = 0x0008,
}

impl RohcProfile {
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Uncompressed | Self::Udp | Self::Ip | Self::UdpLite
        )
    }
}

/// The classifying tag attached to every compressed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Ir,
    IrDyn,
    Uo0,
    Uo1,
    Uor2,
    Normal,
}

impl PacketType {
    /// Human readable packet name, as printed by the test drivers.
    pub fn descr(self) -> &'static str {
        match self {
            Self::Ir => "IR",
            Self::IrDyn => "IR-DYN",
            Self::Uo0 => "UO-0",
            Self::Uo1 => "UO-1",
            Self::Uor2 => "UOR-2",
            Self::Normal => "Normal",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.descr())
    }
}

impl FromStr for PacketType {
    type Err = EngineError;

    /// # Test
    ///
    /// ```
    /// use rohc_comp_engine::packet::PacketType;
    ///
    /// assert_eq!("uo0".parse::<PacketType>().unwrap(), PacketType::Uo0);
    /// assert_eq!("uor2".parse::<PacketType>().unwrap(), PacketType::Uor2);
    /// assert!("uor2rtp".parse::<PacketType>().is_err());
    /// ```
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "ir" => Self::Ir,
            "irdyn" => Self::IrDyn,
            "uo0" => Self::Uo0,
            "uo1" => Self::Uo1,
            "uor2" => Self::Uor2,
            "normal" => Self::Normal,
            _ => return Err(EngineError::UnknownPacketType),
        })
    }
}

/// Compression operating modes, with their on-the-wire values as used
/// by the mode field of FEEDBACK-2.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Mode {
    Unidirectional = 1,
    Optimistic = 2,
    Reliable = 3,
}

/// Compressor context states, RFC 3095 section 4.3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Ir,
    Fo,
    So,
}
