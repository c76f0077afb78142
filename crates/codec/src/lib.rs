//! ## RObust Header Compression (ROHC) wire formats
//!
//! [RFC3095]: https://tools.ietf.org/html/rfc3095
//! [Section 5.2]: https://tools.ietf.org/html/rfc3095#section-5.2
//!
//! Header compression is possible due to the fact that there is much
//! redundancy between header fields, both within the same packet header
//! and in particular between consecutive packets belonging to the same
//! packet stream.  The ROHC scheme transmits the static field
//! information initially and only partially at first, and utilizes
//! dependencies and predictability for other fields.  [RFC3095]
//! describes the packet formats used on the wire; [Section 5.2]
//! describes how feedback and compressed headers share the channel.
//!
//! This crate holds the wire-format leaves of the compressor: the ROHC
//! CRC family, the W-LSB encoder, the CID codec, the header views over
//! uncompressed packets and the feedback parser. It performs no I/O and
//! keeps no per-flow state.

pub mod cid;
pub mod crc;
pub mod feedback;
pub mod headers;
pub mod wlsb;
pub mod writer;

use std::array::TryFromSliceError;

#[derive(Debug)]
pub enum Error {
    InvalidInput,
    BufferTooSmall,
    MalformedFeedback,
    CidTooLarge,
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}
