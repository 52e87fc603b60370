//! The IPS patch model: literal and RLE patch records.
//!
//! A patch is one decoded record from an IPS stream. It can be applied to a
//! seekable target, re-encoded in wire form, or formatted for display.

use std::fmt;
use std::io::{Seek, SeekFrom, Write};

use crate::error::{IpsError, Result};

/// Largest offset representable in the 3-byte wire field.
pub const MAX_OFFSET: u32 = 0x00FF_FFFF;

/// Largest literal payload representable in the 2-byte wire length field.
pub const MAX_RUN: usize = 0xFFFF;

/// One IPS patch record.
///
/// The format has exactly two record shapes, distinguished on the wire by a
/// length field of zero:
/// - **Bytes**: write a literal byte sequence at an offset
/// - **Rle**: write one byte value repeated `len` times at an offset
///
/// Patches are immutable once constructed. Sequence order is meaningful:
/// later patches override earlier ones where they overlap, and nothing in
/// this crate sorts or deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Write `data` verbatim at `offset` in the target.
    Bytes {
        /// Target byte offset (0..=0xFFFFFF on the wire).
        offset: u32,
        /// Literal bytes to write.
        data: Vec<u8>,
    },
    /// Write `len` copies of `value` at `offset` in the target.
    Rle {
        /// Target byte offset (0..=0xFFFFFF on the wire).
        offset: u32,
        /// Run length.
        len: u16,
        /// Byte value to repeat.
        value: u8,
    },
}

impl Patch {
    /// Create a literal patch.
    #[must_use]
    pub fn bytes(offset: u32, data: Vec<u8>) -> Self {
        Self::Bytes { offset, data }
    }

    /// Create an RLE patch.
    #[must_use]
    pub const fn rle(offset: u32, len: u16, value: u8) -> Self {
        Self::Rle { offset, len, value }
    }

    /// Target offset of this patch.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        match self {
            Self::Bytes { offset, .. } | Self::Rle { offset, .. } => *offset,
        }
    }

    /// Number of target bytes this patch writes.
    #[must_use]
    pub fn output_len(&self) -> u64 {
        match self {
            Self::Bytes { data, .. } => data.len() as u64,
            Self::Rle { len, .. } => u64::from(*len),
        }
    }

    /// Check if this is a literal patch.
    #[must_use]
    pub const fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes { .. })
    }

    /// Check if this is an RLE patch.
    #[must_use]
    pub const fn is_rle(&self) -> bool {
        matches!(self, Self::Rle { .. })
    }

    /// Validate the encode-time invariants.
    ///
    /// The decoder accepts anything the wire can express (including a
    /// degenerate zero-length run), but the encoder must reject values
    /// the wire cannot represent.
    ///
    /// # Errors
    ///
    /// Returns `OffsetOutOfRange` if the offset exceeds 3 bytes,
    /// `EmptyPatch` or `PatchTooLong` for unrepresentable literal lengths,
    /// and `ZeroRunLength` for an RLE patch with no run.
    pub fn validate(&self) -> Result<()> {
        let offset = self.offset();
        if offset > MAX_OFFSET {
            return Err(IpsError::OffsetOutOfRange { offset });
        }
        match self {
            Self::Bytes { data, .. } if data.is_empty() => Err(IpsError::EmptyPatch),
            Self::Bytes { data, .. } if data.len() > MAX_RUN => {
                Err(IpsError::PatchTooLong { len: data.len() })
            }
            Self::Rle { len: 0, .. } => Err(IpsError::ZeroRunLength),
            _ => Ok(()),
        }
    }

    /// Apply the patch to a seekable target.
    ///
    /// Seeks the target to the patch offset and writes the literal bytes or
    /// the expanded run. The target must already be large enough; the patch
    /// never extends or truncates it.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or writing fails.
    pub fn apply<T: Write + Seek>(&self, target: &mut T) -> Result<()> {
        target.seek(SeekFrom::Start(u64::from(self.offset())))?;
        match self {
            Self::Bytes { data, .. } => target.write_all(data)?,
            Self::Rle { len, value, .. } => {
                let run = vec![*value; usize::from(*len)];
                target.write_all(&run)?;
            }
        }
        Ok(())
    }

    /// Write the record in IPS wire form.
    ///
    /// Layout: 3-byte big-endian offset, 2-byte big-endian length, then the
    /// literal payload; an RLE record writes length 0 followed by a 2-byte
    /// run length and the fill byte.
    ///
    /// # Errors
    ///
    /// Returns a validation error before writing anything if the patch
    /// cannot be represented on the wire, or an I/O error on write failure.
    pub fn write_wire<W: Write>(&self, sink: &mut W) -> Result<()> {
        self.validate()?;
        let off = self.offset().to_be_bytes();
        match self {
            Self::Bytes { data, .. } => {
                #[allow(clippy::cast_possible_truncation)] // validated <= MAX_RUN
                let len = (data.len() as u16).to_be_bytes();
                sink.write_all(&[off[1], off[2], off[3], len[0], len[1]])?;
                sink.write_all(data)?;
            }
            Self::Rle { len, value, .. } => {
                let run = len.to_be_bytes();
                sink.write_all(&[off[1], off[2], off[3], 0, 0, run[0], run[1], *value])?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { offset, data } => {
                write!(f, "{offset:06X}: patch of length {}", data.len())
            }
            Self::Rle { offset, len, value } => {
                write!(f, "{offset:06X}: patch of length {len}, value {value:02X}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn display_bytes() {
        let p = Patch::bytes(0xFE, vec![1, 2, 3, 4]);
        assert_eq!(p.to_string(), "0000FE: patch of length 4");
    }

    #[test]
    fn display_rle() {
        let p = Patch::rle(0x15, 0x0E, 0x07);
        assert_eq!(p.to_string(), "000015: patch of length 14, value 07");
    }

    #[test]
    fn accessors() {
        let b = Patch::bytes(10, vec![0xAA; 3]);
        let r = Patch::rle(20, 256, 0xFE);
        assert_eq!(b.offset(), 10);
        assert_eq!(b.output_len(), 3);
        assert!(b.is_bytes());
        assert!(!b.is_rle());
        assert_eq!(r.offset(), 20);
        assert_eq!(r.output_len(), 256);
        assert!(r.is_rle());
    }

    #[test]
    fn apply_bytes() {
        let mut target = Cursor::new(vec![0u8; 16]);
        Patch::bytes(4, vec![1, 2, 3]).apply(&mut target).unwrap();
        let buf = target.into_inner();
        assert_eq!(&buf[..8], &[0, 0, 0, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn apply_rle() {
        let mut target = Cursor::new(vec![0u8; 16]);
        Patch::rle(2, 5, 0xAB).apply(&mut target).unwrap();
        let buf = target.into_inner();
        assert_eq!(&buf[..9], &[0, 0, 0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0, 0]);
    }

    #[test]
    fn apply_does_not_truncate() {
        let mut target = Cursor::new(vec![0x44u8; 16]);
        Patch::bytes(0, vec![9]).apply(&mut target).unwrap();
        assert_eq!(target.into_inner().len(), 16);
    }

    #[test]
    fn write_wire_bytes() {
        let mut buf = Vec::new();
        Patch::bytes(0xFE, vec![1, 2, 3, 4]).write_wire(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x00, 0xFE, 0x00, 0x04, 1, 2, 3, 4]);
    }

    #[test]
    fn write_wire_rle() {
        let mut buf = Vec::new();
        Patch::rle(0x100, 0x100, 0xFE).write_wire(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0xFE]);
    }

    #[test]
    fn write_wire_rejects_large_offset() {
        let mut buf = Vec::new();
        let err = Patch::rle(MAX_OFFSET + 1, 1, 0).write_wire(&mut buf).unwrap_err();
        assert!(matches!(err, IpsError::OffsetOutOfRange { offset } if offset == 0x0100_0000));
        assert!(buf.is_empty());
    }

    #[test]
    fn write_wire_rejects_empty_literal() {
        let mut buf = Vec::new();
        let err = Patch::bytes(0, Vec::new()).write_wire(&mut buf).unwrap_err();
        assert!(matches!(err, IpsError::EmptyPatch));
    }

    #[test]
    fn write_wire_rejects_long_literal() {
        let mut buf = Vec::new();
        let err = Patch::bytes(0, vec![0; MAX_RUN + 1]).write_wire(&mut buf).unwrap_err();
        assert!(matches!(err, IpsError::PatchTooLong { len } if len == MAX_RUN + 1));
    }

    #[test]
    fn write_wire_rejects_zero_run() {
        let mut buf = Vec::new();
        let err = Patch::rle(0, 0, 0xFF).write_wire(&mut buf).unwrap_err();
        assert!(matches!(err, IpsError::ZeroRunLength));
    }

    #[test]
    fn validate_boundary_values() {
        assert!(Patch::rle(MAX_OFFSET, 1, 0).validate().is_ok());
        assert!(Patch::bytes(0, vec![0; MAX_RUN]).validate().is_ok());
        assert!(Patch::rle(0, u16::MAX, 0).validate().is_ok());
    }
}
