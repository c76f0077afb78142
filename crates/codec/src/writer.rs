//! The rohc-packet-under-build buffer.
//!
//! ROHC packet formats interleave fields whose values are only known
//! once later parts have been written: the packet type octet sits
//! before the CID information but is chosen after it, and the IR CRC
//! covers everything up to and including its own zeroed position. The
//! writer wraps the caller-owned output buffer and exposes
//! reserve/commit semantics so this back-fill stays a local, bounded
//! operation.

use crate::Error;

pub struct PacketWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> PacketWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Append one octet.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        if self.len == self.buf.len() {
            return Err(Error::BufferTooSmall);
        }

        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a run of octets.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.buf.len() - self.len < bytes.len() {
            return Err(Error::BufferTooSmall);
        }

        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Reserve one zeroed octet and return its position for a later
    /// [`commit`](Self::commit).
    ///
    /// # Test
    ///
    /// ```
    /// use rohc_comp_codec::writer::PacketWriter;
    ///
    /// let mut buf = [0u8; 4];
    /// let mut writer = PacketWriter::new(&mut buf);
    ///
    /// let first = writer.reserve().unwrap();
    /// writer.push(0xaa).unwrap();
    /// writer.commit(first, 0xfd);
    ///
    /// assert_eq!(writer.as_slice(), &[0xfd, 0xaa]);
    /// ```
    pub fn reserve(&mut self) -> Result<usize, Error> {
        let position = self.len;
        self.push(0)?;
        Ok(position)
    }

    /// Back-fill a previously reserved position.
    pub fn commit(&mut self, position: usize, byte: u8) {
        debug_assert!(position < self.len);
        self.buf[position] = byte;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_past_capacity_fails() {
        let mut buf = [0u8; 2];
        let mut writer = PacketWriter::new(&mut buf);

        assert!(writer.push(1).is_ok());
        assert!(writer.push(2).is_ok());
        assert!(matches!(writer.push(3), Err(Error::BufferTooSmall)));
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn extend_checks_remaining_space() {
        let mut buf = [0u8; 3];
        let mut writer = PacketWriter::new(&mut buf);

        writer.push(0).unwrap();
        assert!(matches!(
            writer.extend(&[1, 2, 3]),
            Err(Error::BufferTooSmall)
        ));
        assert!(writer.extend(&[1, 2]).is_ok());
        assert_eq!(writer.as_slice(), &[0, 1, 2]);
    }
}
