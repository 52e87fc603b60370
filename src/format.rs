//! Synchronous IPS stream codec.
//!
//! An IPS stream is a 5-byte `"PATCH"` magic, a sequence of records, and a
//! 3-byte `"EOF"` terminator. The terminator is not framed separately: it is
//! discovered by attempting a normal 5-byte record-header read and finding
//! that the stream ended with exactly the `"EOF"` bytes available. A short
//! read with any other content is a genuine truncation.

use std::io::{ErrorKind, Read, Write};

use crate::error::{IpsError, Result};
use crate::patch::Patch;

/// Stream magic: ASCII "PATCH".
pub const MAGIC: [u8; 5] = *b"PATCH";

/// Stream terminator: ASCII "EOF".
pub const EOF_MARKER: [u8; 3] = *b"EOF";

/// Record header size: 3-byte offset + 2-byte length.
pub(crate) const RECORD_HEADER_SIZE: usize = 5;

/// Read into `buf` until it is full or the stream ends, returning the number
/// of bytes obtained. `ErrorKind::Interrupted` reads are retried.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// `read_exact` that reports end-of-stream as a truncated IPS stream rather
/// than a bare I/O error. Used inside record bodies, where running out of
/// input can never be the terminator.
fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            IpsError::Truncated
        } else {
            IpsError::Io(e)
        }
    })
}

/// Consume and validate the stream magic.
pub(crate) fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; MAGIC.len()];
    read_exact_or_truncated(reader, &mut magic)?;
    if magic == MAGIC {
        Ok(())
    } else {
        Err(IpsError::NotIps)
    }
}

/// Decode the next record, or detect the terminator.
///
/// Returns `Ok(None)` on a clean terminator: the record-header read came up
/// short with at least the three `"EOF"` bytes obtained. Any other short
/// read is `Truncated`.
pub(crate) fn read_record<R: Read>(reader: &mut R) -> Result<Option<Patch>> {
    let mut head = [0u8; RECORD_HEADER_SIZE];
    let filled = read_fully(reader, &mut head)?;
    if filled < RECORD_HEADER_SIZE {
        if filled >= EOF_MARKER.len() && head[..EOF_MARKER.len()] == EOF_MARKER {
            return Ok(None);
        }
        return Err(IpsError::Truncated);
    }

    let offset = u32::from_be_bytes([0, head[0], head[1], head[2]]);
    let len = u16::from_be_bytes([head[3], head[4]]);

    if len == 0 {
        // Length 0 is the RLE sentinel: 2-byte run length + fill value.
        // A zero run length is degenerate but accepted as the wire gives it.
        let mut tail = [0u8; 3];
        read_exact_or_truncated(reader, &mut tail)?;
        let run = u16::from_be_bytes([tail[0], tail[1]]);
        Ok(Some(Patch::rle(offset, run, tail[2])))
    } else {
        let mut data = vec![0u8; usize::from(len)];
        read_exact_or_truncated(reader, &mut data)?;
        Ok(Some(Patch::bytes(offset, data)))
    }
}

/// Lazy pull iterator over the patches in an IPS stream.
///
/// The header is validated eagerly in [`PatchReader::new`], so a malformed
/// header surfaces before the first pull. The iterator is single-pass and
/// fused: after the terminator or an error it yields `None` forever.
///
/// # Example
///
/// ```rust
/// use std::io::Cursor;
/// use ips::{Patch, PatchReader};
///
/// let mut stream = Vec::new();
/// ips::write_patches(&mut stream, &[Patch::rle(0x15, 14, 0x07)]).unwrap();
///
/// let reader = PatchReader::new(Cursor::new(stream)).unwrap();
/// let patches: Result<Vec<Patch>, _> = reader.collect();
/// assert_eq!(patches.unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct PatchReader<R> {
    reader: R,
    done: bool,
}

impl<R: Read> PatchReader<R> {
    /// Open an IPS stream, consuming and validating the magic header.
    ///
    /// # Errors
    ///
    /// Returns `NotIps` if the stream does not start with `"PATCH"`,
    /// `Truncated` if it is shorter than the header, or an I/O error.
    pub fn new(mut reader: R) -> Result<Self> {
        read_magic(&mut reader)?;
        Ok(Self {
            reader,
            done: false,
        })
    }

    /// Decode the next record, or `None` at the terminator.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` on a short read that is not the terminator, or
    /// an I/O error.
    pub fn next_patch(&mut self) -> Result<Option<Patch>> {
        if self.done {
            return Ok(None);
        }
        let next = read_record(&mut self.reader);
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next
    }
}

impl<R: Read> Iterator for PatchReader<R> {
    type Item = Result<Patch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_patch().transpose()
    }
}

/// Decode all patches from an IPS stream into a vector.
///
/// # Errors
///
/// Returns an error on a malformed header, truncation, or I/O failure.
pub fn read_patches<R: Read>(reader: R) -> Result<Vec<Patch>> {
    PatchReader::new(reader)?.collect()
}

/// Call `handler` once per decoded record, in stream order.
///
/// The handler's result is observed before the next record is decoded; a
/// handler error stops decoding immediately.
///
/// # Errors
///
/// Returns decoding errors or the first handler error.
pub fn for_each_patch<R, F>(reader: R, mut handler: F) -> Result<()>
where
    R: Read,
    F: FnMut(Patch) -> Result<()>,
{
    let mut reader = PatchReader::new(reader)?;
    while let Some(patch) = reader.next_patch()? {
        handler(patch)?;
    }
    Ok(())
}

/// Encode a patch sequence as an IPS stream: magic, records in order,
/// terminator. No ordering or overlap validation is performed.
///
/// # Errors
///
/// Returns a validation error for a patch the wire cannot represent, or an
/// I/O error, leaving the sink partially written.
pub fn write_patches<'a, W, I>(sink: &mut W, patches: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Patch>,
{
    sink.write_all(&MAGIC)?;
    for patch in patches {
        patch.write_wire(sink)?;
    }
    sink.write_all(&EOF_MARKER)?;
    Ok(())
}

#[cfg(test)]
pub(crate) const KNOWN_IPS: [u8; 33] = [
    0x50, 0x41, 0x54, 0x43, 0x48, // "PATCH"
    0x00, 0x00, 0x15, 0x00, 0x00, 0x00, 0x0E, 0x07, // RLE at 0x15, 14 x 0x07
    0x00, 0x00, 0xFE, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04, // literal at 0xFE
    0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0xFE, // RLE at 0x100, 256 x 0xFE
    0x45, 0x4F, 0x46, // "EOF"
];

#[cfg(test)]
pub(crate) fn known_patches() -> Vec<Patch> {
    vec![
        Patch::rle(0x15, 0x0E, 0x07),
        Patch::bytes(0xFE, vec![1, 2, 3, 4]),
        Patch::rle(0x100, 0x100, 0xFE),
    ]
}
