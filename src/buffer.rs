//! Byte buffer utilities: typed concatenation and `read_at_least`.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Concatenate any number of byte chunks into one contiguous buffer.
///
/// An empty input returns an empty buffer; a single chunk is returned
/// unchanged (no extra copy beyond the owned `Bytes` the caller already
/// passed in).
pub fn concat<I>(chunks: I) -> Bytes
where
    I: IntoIterator<Item = Bytes>,
{
    let mut iter = chunks.into_iter();
    let Some(first) = iter.next() else {
        return Bytes::new();
    };
    let Some(second) = iter.next() else {
        return first;
    };

    let mut buf = BytesMut::with_capacity(first.len() + second.len());
    buf.extend_from_slice(&first);
    buf.extend_from_slice(&second);
    for chunk in iter {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

/// Read from `reader` in widening passes until at least `n` bytes have
/// accumulated, or the stream ends.
///
/// Returns the accumulated bytes, which may be longer than `n` (the caller
/// owns slicing the remainder). Fails with `Error::ShortRead` if the reader
/// is exhausted before `n` bytes arrive.
pub async fn read_at_least<R>(reader: &mut R, n: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(n.max(64));
    let mut filled = 0usize;

    while filled < n {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            return Err(Error::ShortRead);
        }
        filled += read;
    }

    buf.truncate(filled);
    Ok(buf.freeze())
}
