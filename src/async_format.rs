//! Asynchronous IPS stream codec using tokio.
//!
//! Mirrors the synchronous codec in [`crate::format`] over tokio's async I/O
//! traits, and adds the pipelined push adapter: while a handler future for
//! record *n* is running, the decoder already reads record *n+1* from the
//! source. Handler invocations stay strictly sequential and in record order.

use std::future::Future;
use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use crate::error::{IpsError, Result};
use crate::format::{EOF_MARKER, MAGIC, RECORD_HEADER_SIZE};
use crate::patch::Patch;

impl Patch {
    /// Apply the patch to an async seekable target.
    ///
    /// Async counterpart of [`Patch::apply`]: seek to the patch offset and
    /// write the literal bytes or the expanded run. The target must already
    /// be large enough.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or writing fails.
    pub async fn apply_async<T>(&self, target: &mut T) -> Result<()>
    where
        T: AsyncWrite + AsyncSeek + Unpin,
    {
        target.seek(SeekFrom::Start(u64::from(self.offset()))).await?;
        match self {
            Self::Bytes { data, .. } => target.write_all(data).await?,
            Self::Rle { len, value, .. } => {
                let run = vec![*value; usize::from(*len)];
                target.write_all(&run).await?;
            }
        }
        Ok(())
    }
}

async fn read_fully<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<()> {
    reader.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IpsError::Truncated
        } else {
            IpsError::Io(e)
        }
    })?;
    Ok(())
}

/// Async lazy pull reader over the patches in an IPS stream.
///
/// The magic header is validated in [`AsyncPatchReader::new`], so a
/// malformed header surfaces before the first record is requested.
#[derive(Debug)]
pub struct AsyncPatchReader<R> {
    reader: R,
    done: bool,
}

impl<R: AsyncRead + Unpin> AsyncPatchReader<R> {
    /// Open an IPS stream, consuming and validating the magic header.
    ///
    /// # Errors
    ///
    /// Returns `NotIps` if the stream does not start with `"PATCH"`,
    /// `Truncated` if it is shorter than the header, or an I/O error.
    pub async fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; MAGIC.len()];
        read_exact_or_truncated(&mut reader, &mut magic).await?;
        if magic != MAGIC {
            return Err(IpsError::NotIps);
        }
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
    pub async fn next_patch(&mut self) -> Result<Option<Patch>> {
        if self.done {
            return Ok(None);
        }
        let next = self.read_record().await;
        if !matches!(next, Ok(Some(_))) {
            self.done = true;
        }
        next
    }

    async fn read_record(&mut self) -> Result<Option<Patch>> {
        let mut head = [0u8; RECORD_HEADER_SIZE];
        let filled = read_fully(&mut self.reader, &mut head).await?;
        if filled < RECORD_HEADER_SIZE {
            if filled >= EOF_MARKER.len() && head[..EOF_MARKER.len()] == EOF_MARKER {
                return Ok(None);
            }
            return Err(IpsError::Truncated);
        }

        let offset = u32::from_be_bytes([0, head[0], head[1], head[2]]);
        let len = u16::from_be_bytes([head[3], head[4]]);

        if len == 0 {
            let mut tail = [0u8; 3];
            read_exact_or_truncated(&mut self.reader, &mut tail).await?;
            let run = u16::from_be_bytes([tail[0], tail[1]]);
            Ok(Some(Patch::rle(offset, run, tail[2])))
        } else {
            let mut data = vec![0u8; usize::from(len)];
            read_exact_or_truncated(&mut self.reader, &mut data).await?;
            Ok(Some(Patch::bytes(offset, data)))
        }
    }
}

/// Decode all patches from an async IPS stream into a vector.
///
/// # Errors
///
/// Returns an error on a malformed header, truncation, or I/O failure.
pub async fn read_patches<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<Patch>> {
    let mut reader = AsyncPatchReader::new(reader).await?;
    let mut patches = Vec::new();
    while let Some(patch) = reader.next_patch().await? {
        patches.push(patch);
    }
    Ok(patches)
}

/// Call a synchronous `handler` once per decoded record, in stream order.
///
/// The handler's result is observed before the next record is decoded.
///
/// # Errors
///
/// Returns decoding errors or the first handler error.
pub async fn for_each_patch<R, F>(reader: R, mut handler: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Patch) -> Result<()>,
{
    let mut reader = AsyncPatchReader::new(reader).await?;
    while let Some(patch) = reader.next_patch().await? {
        handler(patch)?;
    }
    Ok(())
}

/// Call an async `handler` once per decoded record with one-deep pipelining.
///
/// The decoder starts reading record *n+1* as soon as record *n* has been
/// handed to its handler, and awaits handler *n* only just before handler
/// *n+1* would be dispatched (or before finishing, for the last record).
/// The overlap is a throughput optimization only: handlers never overlap
/// each other, and each sees its record in stream order.
///
/// # Errors
///
/// Returns decoding errors or the first handler error; no further handler
/// is invoked after either.
pub async fn for_each_patch_pipelined<R, F, Fut>(reader: R, mut handler: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Patch) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut reader = AsyncPatchReader::new(reader).await?;
    let mut in_flight: Option<Fut> = None;
    loop {
        let next = match in_flight.take() {
            Some(task) => {
                let (next, done) = tokio::join!(reader.next_patch(), task);
                done?;
                next?
            }
            None => reader.next_patch().await?,
        };
        match next {
            Some(patch) => in_flight = Some(handler(patch)),
            None => return Ok(()),
        }
    }
}

/// Encode a patch sequence as an IPS stream to an async sink.
///
/// # Errors
///
/// Returns a validation error for a patch the wire cannot represent, or an
/// I/O error, leaving the sink partially written.
pub async fn write_patches<'a, W, I>(sink: &mut W, patches: I) -> Result<()>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = &'a Patch>,
{
    sink.write_all(&MAGIC).await?;
    let mut record = Vec::new();
    for patch in patches {
        record.clear();
        patch.write_wire(&mut record)?;
        sink.write_all(&record).await?;
    }
    sink.write_all(&EOF_MARKER).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{known_patches, KNOWN_IPS};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn decode_known_stream() {
        let patches = read_patches(Cursor::new(KNOWN_IPS)).await.unwrap();
        assert_eq!(patches, known_patches());
    }

    #[tokio::test]
    async fn encode_known_patches() {
        let mut buf = Vec::new();
        write_patches(&mut buf, &known_patches()).await.unwrap();
        assert_eq!(buf, KNOWN_IPS);
    }

    #[tokio::test]
    async fn bad_magic_fails_before_first_pull() {
        let err = AsyncPatchReader::new(Cursor::new(b"XXXXXEOF".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IpsError::NotIps));
    }

    #[tokio::test]
    async fn terminator_detection() {
        assert!(read_patches(Cursor::new(b"PATCHEOF".to_vec()))
            .await
            .unwrap()
            .is_empty());
        let err = read_patches(Cursor::new(b"PATCH\x00\x00\x15".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IpsError::Truncated));
    }

    #[tokio::test]
    async fn sync_handler_sees_records_in_order() {
        let mut seen = Vec::new();
        for_each_patch(Cursor::new(KNOWN_IPS), |p| {
            seen.push(p);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(seen, known_patches());
    }

    #[tokio::test]
    async fn pipelined_handler_sees_records_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        for_each_patch_pipelined(Cursor::new(KNOWN_IPS), move |p| {
            let sink = Arc::clone(&sink);
            async move {
                // Suspend mid-handler; order must still hold.
                tokio::task::yield_now().await;
                sink.lock().unwrap().push(p);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), known_patches());
    }

    #[tokio::test]
    async fn pipelined_handlers_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&active);
        for_each_patch_pipelined(Cursor::new(KNOWN_IPS), move |_| {
            let active = Arc::clone(&counter);
            async move {
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pipelined_handler_error_stops_iteration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = for_each_patch_pipelined(Cursor::new(KNOWN_IPS), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(IpsError::Truncated) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IpsError::Truncated));
        // Handler n+1 is never dispatched after handler n fails.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn apply_async_known_scenario() {
        let mut target = Cursor::new(vec![0x44u8; 2048]);
        let mut reader = AsyncPatchReader::new(Cursor::new(KNOWN_IPS)).await.unwrap();
        while let Some(patch) = reader.next_patch().await.unwrap() {
            patch.apply_async(&mut target).await.unwrap();
        }
        let buf = target.into_inner();
        assert!(buf[..21].iter().all(|&b| b == 0x44));
        assert!(buf[21..35].iter().all(|&b| b == 0x07));
        assert!(buf[35..254].iter().all(|&b| b == 0x44));
        assert_eq!(buf[254], 0x01);
        assert_eq!(buf[255], 0x02);
        assert!(buf[256..512].iter().all(|&b| b == 0xFE));
        assert!(buf[512..].iter().all(|&b| b == 0x44));
    }
}
