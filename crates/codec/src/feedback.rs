//! Feedback parsing.
//!
//! [Section 5.7.6]: https://tools.ietf.org/html/rfc3095#section-5.7.6
//!
//! Feedback sent from a decompressor carries acknowledgments back to
//! the compressor. FEEDBACK-1 is a single profile-specific octet (an
//! ACK carrying SN bits). FEEDBACK-2 has room for a type, a mode and a
//! 12-bit SN, followed by a list of options:
//!
//! ```text
//!      0   1   2   3   4   5   6   7
//!    +---+---+---+---+---+---+---+---+
//!    |Acktype| Mode  |      SN       |
//!    +---+---+---+---+---+---+---+---+
//!    |              SN               |
//!    +---+---+---+---+---+---+---+---+
//!    /       Feedback options        /
//!    +---+---+---+---+---+---+---+---+
//!
//!    option = | Opt Type | Opt Len | followed by Opt Len octets
//! ```
//!
//! The CRC option protects the whole feedback element: its value octet
//! is zeroed in place, CRC-8 is recomputed over the complete buffer and
//! compared against the captured value. A mismatch condemns the entire
//! feedback.

use num_enum::TryFromPrimitive;

use crate::{
    Error,
    crc::{CRC_INIT_8, CrcKind, CrcTables, crc_calculate},
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum AckType {
    Ack = 0,
    Nack = 1,
    StaticNack = 2,
    Reserved = 3,
}

/// Feedback option registry, RFC 3095 section 5.7.6.3 onwards.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum OptionType {
    Crc = 1,
    Reject = 2,
    SnNotValid = 3,
    Sn = 4,
    Clock = 5,
    Jitter = 6,
    Loss = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    /// No CRC option was present.
    Absent,
    /// A CRC option was present and the recomputed value matched.
    Valid,
    /// A CRC option was present but did not match; the feedback must
    /// be discarded.
    Invalid,
}

#[derive(Debug)]
pub struct Feedback2 {
    pub acktype: AckType,
    /// Requested mode, zero when the decompressor requests no change.
    pub mode: u8,
    /// SN bits accumulated from the header and any SN options.
    pub sn: u32,
    pub sn_not_valid: bool,
    pub crc: CrcStatus,
    /// Option types that were present but carry no semantics here
    /// (Reject, Loss, unknown codes); reported so the engine can trace
    /// them.
    pub ignored_options: Vec<u8>,
}

#[derive(Debug)]
pub enum Feedback {
    /// FEEDBACK-1: an ACK with the SN bits carried inline.
    Ack1 { sn: u8 },
    Feedback2(Feedback2),
}

/// Parse one feedback element.
///
/// `bytes` is the complete feedback data as delivered to the
/// compressor, CID information included; `specific_offset` marks where
/// the profile-specific part starts. The buffer is mutable because CRC
/// verification zeroes the CRC option value in place before
/// recomputing.
///
/// # Test
///
/// ```
/// use rohc_comp_codec::crc::CrcTables;
/// use rohc_comp_codec::feedback::{AckType, Feedback, parse};
///
/// let tables = CrcTables::default();
///
/// // FEEDBACK-2: NACK, no mode change, SN 0x123, no options.
/// let mut buffer = [0x41, 0x23];
/// let feedback = parse(&mut buffer, 0, &tables).unwrap();
///
/// match feedback {
///     Feedback::Feedback2(fb) => {
///         assert_eq!(fb.acktype, AckType::Nack);
///         assert_eq!(fb.mode, 0);
///         assert_eq!(fb.sn, 0x123);
///     }
///     _ => unreachable!(),
/// }
/// ```
pub fn parse(
    bytes: &mut [u8],
    specific_offset: usize,
    tables: &CrcTables,
) -> Result<Feedback, Error> {
    let specific_size = bytes.len().saturating_sub(specific_offset);
    if specific_size == 0 {
        return Err(Error::MalformedFeedback);
    }

    if specific_size == 1 {
        return Ok(Feedback::Ack1 {
            sn: bytes[specific_offset],
        });
    }

    let acktype = AckType::try_from(bytes[specific_offset] >> 6).unwrap_or(AckType::Reserved);
    let mode = (bytes[specific_offset] >> 4) & 0x03;
    let mut sn =
        (((bytes[specific_offset] & 0x0f) as u32) << 8) | bytes[specific_offset + 1] as u32;

    let mut crc_in_packet = 0u8;
    let mut crc_used = false;
    let mut sn_not_valid = false;
    let mut ignored_options = Vec::new();

    // walk the option list, never past the declared specific size.
    let mut offset = specific_offset + 2;
    while offset < bytes.len() {
        let opt = bytes[offset] >> 4;
        let optlen = (bytes[offset] & 0x0f) as usize;

        if offset + 1 + optlen > bytes.len() {
            return Err(Error::MalformedFeedback);
        }

        match OptionType::try_from(opt) {
            Ok(OptionType::Crc) if optlen >= 1 => {
                crc_in_packet = bytes[offset + 1];
                crc_used = true;
                // zeroed for the recomputation below.
                bytes[offset + 1] = 0;
            }
            Ok(OptionType::Sn) if optlen >= 1 => {
                sn = (sn << 8) | bytes[offset + 1] as u32;
            }
            Ok(OptionType::SnNotValid) => {
                sn_not_valid = true;
            }
            _ => {
                ignored_options.push(opt);
            }
        }

        offset += 1 + optlen;
    }

    let crc = if crc_used {
        if crc_calculate(CrcKind::Crc8, bytes, CRC_INIT_8, tables) == crc_in_packet {
            CrcStatus::Valid
        } else {
            CrcStatus::Invalid
        }
    } else {
        CrcStatus::Absent
    };

    Ok(Feedback::Feedback2(Feedback2 {
        acktype,
        mode,
        sn,
        sn_not_valid,
        crc,
        ignored_options,
    }))
}

/// Compute the value of a CRC option for a feedback element whose CRC
/// option value octet is still zero.
///
/// Only exercised by tests and by peers building feedback; the
/// compressor itself never emits feedback in this profile set.
pub fn seal_crc(bytes: &[u8], tables: &CrcTables) -> u8 {
    crc_calculate(CrcKind::Crc8, bytes, CRC_INIT_8, tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback1_is_a_plain_ack() {
        let tables = CrcTables::default();
        let mut buffer = [0x2a];

        match parse(&mut buffer, 0, &tables).unwrap() {
            Feedback::Ack1 { sn } => assert_eq!(sn, 0x2a),
            _ => unreachable!(),
        }
    }

    #[test]
    fn valid_crc_option_is_recognized() {
        let tables = CrcTables::default();

        // ACK, mode O, SN 1, CRC option with a zero placeholder.
        let mut buffer = vec![0x20, 0x01, 0x11, 0x00];
        let crc = seal_crc(&buffer, &tables);
        buffer[3] = crc;

        match parse(&mut buffer, 0, &tables).unwrap() {
            Feedback::Feedback2(fb) => {
                assert_eq!(fb.acktype, AckType::Ack);
                assert_eq!(fb.mode, 2);
                assert_eq!(fb.crc, CrcStatus::Valid);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn corrupted_crc_option_is_flagged() {
        let tables = CrcTables::default();

        let mut buffer = vec![0x20, 0x01, 0x11, 0x00];
        let crc = seal_crc(&buffer, &tables);
        buffer[3] = crc ^ 0x01;

        match parse(&mut buffer, 0, &tables).unwrap() {
            Feedback::Feedback2(fb) => assert_eq!(fb.crc, CrcStatus::Invalid),
            _ => unreachable!(),
        }
    }

    #[test]
    fn sn_option_extends_the_sequence_number() {
        let tables = CrcTables::default();

        let mut buffer = vec![0x01, 0x23, 0x41, 0x45];
        match parse(&mut buffer, 0, &tables).unwrap() {
            Feedback::Feedback2(fb) => assert_eq!(fb.sn, 0x12345),
            _ => unreachable!(),
        }
    }

    #[test]
    fn truncated_option_list_is_rejected() {
        let tables = CrcTables::default();

        // option claims 4 octets of payload but only 1 remains.
        let mut buffer = vec![0x00, 0x01, 0x14, 0xaa];
        assert!(matches!(
            parse(&mut buffer, 0, &tables),
            Err(Error::MalformedFeedback)
        ));
    }

    #[test]
    fn unknown_options_are_skipped_not_fatal() {
        let tables = CrcTables::default();

        let mut buffer = vec![0x00, 0x01, 0xf1, 0xaa, 0x30];
        match parse(&mut buffer, 0, &tables).unwrap() {
            Feedback::Feedback2(fb) => {
                assert!(fb.sn_not_valid);
                assert_eq!(fb.ignored_options, vec![0x0f]);
            }
            _ => unreachable!(),
        }
    }
}
