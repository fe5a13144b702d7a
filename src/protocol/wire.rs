//! Length prefixed strings and padding
//!
//! Integers go through tokio's `AsyncReadExt` on the way in and `bytes::BufMut`
//! on the way out, both big endian like the rest of RFB.

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::VncError;

/// Append a u32 length and the UTF-8 bytes of `s`
pub(crate) fn put_string<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub(crate) async fn write_string<S>(writer: &mut S, s: &str) -> Result<(), VncError>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(4 + s.len());
    put_string(&mut buf, s);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Read `len` bytes of text, rejecting anything above `max_len` before reading it
pub(crate) async fn read_text<S>(reader: &mut S, len: usize, max_len: usize) -> Result<String, VncError>
where
    S: AsyncRead + Unpin,
{
    if len > max_len {
        return Err(VncError::CutTextTooLong(len));
    }
    let mut text = vec![0_u8; len];
    reader.read_exact(&mut text).await?;
    Ok(String::from_utf8_lossy(&text).into_owned())
}

pub(crate) async fn read_string<S>(reader: &mut S, max_len: usize) -> Result<String, VncError>
where
    S: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    read_text(reader, len, max_len).await
}

pub(crate) async fn skip<S>(reader: &mut S, padding: usize) -> Result<(), VncError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0_u8; 8];
    let mut left = padding;
    while left > 0 {
        let n = left.min(buf.len());
        reader.read_exact(&mut buf[..n]).await?;
        left -= n;
    }
    Ok(())
}
