//! ROHC CRC family
//!
//! [Section 5.9.1]: https://tools.ietf.org/html/rfc3095#section-5.9.1
//!
//! The CRC in the IR and IR-DYN packet is calculated over the entire IR
//! or IR-DYN packet, without the packet type octet... The CRC of
//! compressed headers is calculated over the entire original header,
//! before compression. [Section 5.9.1] defines the three polynomials:
//!
//! - 3-bit CRC: C(x) = x^0 + x^1 + x^3
//! - 7-bit CRC: C(x) = x^0 + x^1 + x^2 + x^3 + x^6 + x^7
//! - 8-bit CRC: C(x) = x^0 + x^1 + x^2 + x^8
//!
//! The CRCs are computed LSB first, so the lookup tables are built from
//! the bit-reversed polynomials. Tables are owned by the compressor
//! instance, not the process, so instances stay independently testable.

/// Bit-reversed polynomials of the RFC 3095 CRCs.
const POLYNOM_3: u8 = 0x6;
const POLYNOM_7: u8 = 0x79;
const POLYNOM_8: u8 = 0xe0;

pub const CRC_INIT_3: u8 = 0x07;
pub const CRC_INIT_7: u8 = 0x7f;
pub const CRC_INIT_8: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrcKind {
    Crc3,
    Crc7,
    Crc8,
}

impl CrcKind {
    /// The initial value the register starts from for this width.
    pub fn init(self) -> u8 {
        match self {
            Self::Crc3 => CRC_INIT_3,
            Self::Crc7 => CRC_INIT_7,
            Self::Crc8 => CRC_INIT_8,
        }
    }
}

/// The three 256-entry lookup tables, precomputed once per compressor.
pub struct CrcTables {
    crc3: [u8; 256],
    crc7: [u8; 256],
    crc8: [u8; 256],
}

impl Default for CrcTables {
    fn default() -> Self {
        Self {
            crc3: build_table(POLYNOM_3),
            crc7: build_table(POLYNOM_7),
            crc8: build_table(POLYNOM_8),
        }
    }
}

fn build_table(polynom: u8) -> [u8; 256] {
    let mut table = [0u8; 256];

    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u8;

        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ polynom
            } else {
                crc >> 1
            };
        }

        *entry = crc;
    }

    table
}

/// Compute a ROHC CRC over a buffer.
///
/// The result occupies the low `width` bits of the returned byte. The
/// `init` argument is either the RFC initial value or the result of a
/// previous call, which is how CRC-STATIC and CRC-DYNAMIC regions are
/// chained over several headers.
///
/// # Test
///
/// ```
/// use rohc_comp_codec::crc::{CrcKind, CrcTables, crc_calculate};
///
/// let tables = CrcTables::default();
///
/// // Catalog check values of CRC-3/ROHC, CRC-7/ROHC and CRC-8/ROHC.
/// assert_eq!(crc_calculate(CrcKind::Crc3, b"123456789", CrcKind::Crc3.init(), &tables), 0x06);
/// assert_eq!(crc_calculate(CrcKind::Crc7, b"123456789", CrcKind::Crc7.init(), &tables), 0x53);
/// assert_eq!(crc_calculate(CrcKind::Crc8, b"123456789", CrcKind::Crc8.init(), &tables), 0xd0);
/// ```
pub fn crc_calculate(kind: CrcKind, bytes: &[u8], init: u8, tables: &CrcTables) -> u8 {
    let mut crc = init;

    match kind {
        CrcKind::Crc3 => {
            for byte in bytes {
                crc = tables.crc3[(byte ^ (crc & 0x07)) as usize];
            }
        }
        CrcKind::Crc7 => {
            for byte in bytes {
                crc = tables.crc7[(byte ^ (crc & 0x7f)) as usize];
            }
        }
        CrcKind::Crc8 => {
            for byte in bytes {
                crc = tables.crc8[(byte ^ crc) as usize];
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_calls_match_single_call() {
        let tables = CrcTables::default();

        let whole = crc_calculate(CrcKind::Crc8, b"static+dynamic", CRC_INIT_8, &tables);
        let first = crc_calculate(CrcKind::Crc8, b"static+", CRC_INIT_8, &tables);
        let chained = crc_calculate(CrcKind::Crc8, b"dynamic", first, &tables);

        assert_eq!(whole, chained);
    }

    #[test]
    fn results_fit_their_width() {
        let tables = CrcTables::default();

        for len in 0..64usize {
            let buf: Vec<u8> = (0..len as u8).map(|i| i.wrapping_mul(37)).collect();
            assert!(crc_calculate(CrcKind::Crc3, &buf, CRC_INIT_3, &tables) <= 0x07);
            assert!(crc_calculate(CrcKind::Crc7, &buf, CRC_INIT_7, &tables) <= 0x7f);
        }
    }
}
