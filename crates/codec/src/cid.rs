//! Context identifier encoding.
//!
//! [Section 5.2.3]: https://tools.ietf.org/html/rfc3095#section-5.2.3
//!
//! A ROHC channel either uses small CIDs (0..15) or large CIDs
//! (0..2^14-1); the choice is channel-wide and negotiated out of band.
//!
//! With small CIDs, CID zero is implicit and any other CID is conveyed
//! by an Add-CID octet prefixed to the packet:
//!
//! ```text
//!     0   1   2   3   4   5   6   7
//!   +---+---+---+---+---+---+---+---+
//!   | 1   1   1   0 |      CID      |
//!   +---+---+---+---+---+---+---+---+
//! ```
//!
//! With large CIDs, the CID is a 1-2 octet self-describing variable
//! length value inserted *between* the packet type octet and the rest
//! of the packet ([Section 5.2.3]), which is why encoding reserves the
//! type position and hands it back to the packet builder.

use crate::{Error, writer::PacketWriter};

pub const SMALL_CID_MAX: u16 = 15;
pub const LARGE_CID_MAX: u16 = (1 << 14) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CidType {
    Small,
    Large,
}

impl CidType {
    pub fn max_cid(self) -> u16 {
        match self {
            Self::Small => SMALL_CID_MAX,
            Self::Large => LARGE_CID_MAX,
        }
    }
}

/// Write the CID information of a packet and reserve the position of
/// the packet type octet.
///
/// Returns the reserved position; the caller back-fills it once the
/// packet type is known. On return the writer cursor sits where the
/// remainder of the packet continues.
///
/// # Test
///
/// ```
/// use rohc_comp_codec::cid::{CidType, encode};
/// use rohc_comp_codec::writer::PacketWriter;
///
/// let mut buf = [0u8; 8];
/// let mut writer = PacketWriter::new(&mut buf);
///
/// let first = encode(&mut writer, CidType::Small, 5).unwrap();
/// writer.commit(first, 0xfd);
///
/// assert_eq!(writer.as_slice(), &[0xe5, 0xfd]);
/// ```
pub fn encode(writer: &mut PacketWriter<'_>, cid_type: CidType, cid: u16) -> Result<usize, Error> {
    if cid > cid_type.max_cid() {
        return Err(Error::CidTooLarge);
    }

    match cid_type {
        CidType::Small => {
            if cid != 0 {
                writer.push(0xe0 | cid as u8)?;
            }

            writer.reserve()
        }
        CidType::Large => {
            let first = writer.reserve()?;

            if cid < 0x80 {
                writer.push(cid as u8)?;
            } else {
                writer.push(0x80 | (cid >> 8) as u8)?;
                writer.push(cid as u8)?;
            }

            Ok(first)
        }
    }
}

/// Read the CID information off the front of a feedback payload.
///
/// Returns the CID and the offset where the profile-specific part
/// starts.
///
/// # Test
///
/// ```
/// use rohc_comp_codec::cid::{CidType, decode};
///
/// assert_eq!(decode(&[0xe5, 0xf1], CidType::Small).unwrap(), (5, 1));
/// assert_eq!(decode(&[0xf1, 0x00], CidType::Small).unwrap(), (0, 0));
/// assert_eq!(decode(&[0x05, 0xf1], CidType::Large).unwrap(), (5, 1));
/// assert_eq!(decode(&[0x81, 0x05, 0xf1], CidType::Large).unwrap(), (261, 2));
/// ```
pub fn decode(bytes: &[u8], cid_type: CidType) -> Result<(u16, usize), Error> {
    if bytes.is_empty() {
        return Err(Error::InvalidInput);
    }

    match cid_type {
        CidType::Small => {
            if bytes[0] >> 4 == 0x0e {
                Ok(((bytes[0] & 0x0f) as u16, 1))
            } else {
                Ok((0, 0))
            }
        }
        CidType::Large => {
            if bytes[0] & 0x80 == 0 {
                Ok((bytes[0] as u16, 1))
            } else if bytes.len() >= 2 {
                let cid = (((bytes[0] & 0x3f) as u16) << 8) | bytes[1] as u16;
                Ok((cid, 2))
            } else {
                Err(Error::InvalidInput)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_cid_zero_has_no_add_cid_octet() {
        let mut buf = [0u8; 4];
        let mut writer = PacketWriter::new(&mut buf);

        let first = encode(&mut writer, CidType::Small, 0).unwrap();
        assert_eq!(first, 0);
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn large_cid_is_inserted_after_the_first_octet() {
        let mut buf = [0u8; 4];
        let mut writer = PacketWriter::new(&mut buf);

        let first = encode(&mut writer, CidType::Large, 300).unwrap();
        writer.commit(first, 0xf8);

        assert_eq!(writer.as_slice(), &[0xf8, 0x81, 0x2c]);
    }

    #[test]
    fn cid_over_channel_maximum_is_rejected() {
        let mut buf = [0u8; 4];
        let mut writer = PacketWriter::new(&mut buf);

        assert!(matches!(
            encode(&mut writer, CidType::Small, 16),
            Err(Error::CidTooLarge)
        ));
    }
}
