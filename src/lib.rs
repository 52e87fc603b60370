//! # ips
//!
//! Codec and applier for the IPS binary patch format.
//!
//! An IPS stream starts with the ASCII magic `"PATCH"`, carries a sequence
//! of patch records, and ends with the ASCII terminator `"EOF"`. Records come
//! in two shapes sharing a 5-byte header (3-byte big-endian offset, 2-byte
//! big-endian length): a nonzero length introduces that many literal payload
//! bytes, while length zero marks an RLE record with its own 2-byte run
//! length and a single fill byte. The terminator is recognized when a record
//! header read comes up short with exactly the `"EOF"` bytes available.
//!
//! ## Features
//!
//! - **Byte-exact codec**: decoding and re-encoding reproduces any
//!   well-formed stream bit for bit
//! - **Streaming**: lazy pull iteration, synchronous push, and a pipelined
//!   async push adapter that overlaps decoding with patch application
//! - **Applier**: each patch writes its effect at its offset in any
//!   seekable target
//!
//! ## Example
//!
//! ```rust
//! use std::io::Cursor;
//! use ips::{Patch, PatchReader};
//!
//! // Encode a patch sequence as an IPS stream
//! let patches = vec![
//!     Patch::rle(0x15, 14, 0x07),
//!     Patch::bytes(0xFE, vec![1, 2, 3, 4]),
//! ];
//! let mut stream = Vec::new();
//! ips::write_patches(&mut stream, &patches).unwrap();
//!
//! // Decode it back and apply to a target buffer
//! let mut target = Cursor::new(vec![0u8; 512]);
//! for patch in PatchReader::new(Cursor::new(&stream)).unwrap() {
//!     patch.unwrap().apply(&mut target).unwrap();
//! }
//! assert_eq!(target.get_ref()[0xFE..0x102], [1, 2, 3, 4]);
//! ```
//!
//! Patch application has no partial-success semantics: a failure abandons
//! the operation and the target is left as patched so far. Callers that
//! need a pristine target on failure must keep their own copy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

#[cfg(feature = "async")]
pub mod async_format;
mod error;
mod format;
mod patch;

pub use error::{IpsError, Result};
pub use format::{for_each_patch, read_patches, write_patches, PatchReader, EOF_MARKER, MAGIC};
pub use patch::{Patch, MAX_OFFSET, MAX_RUN};

#[cfg(feature = "async")]
pub use async_format::AsyncPatchReader;
