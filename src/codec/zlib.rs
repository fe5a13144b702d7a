use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression};

use super::deflate_sync;
use crate::server::Framebuffer;
use crate::{PixelFormat, Rect, VncError};

/// Raw pixels deflated through one zlib stream that lives as long as the session
///
/// +--------------+--------------+-------------+
/// | No. of bytes | Type [Value] | Description |
/// +--------------+--------------+-------------+
/// | 4            | U32          | length      |
/// | length       | U8 array     | zlibData    |
/// +--------------+--------------+-------------+
pub struct ZlibEncoder {
    stream: Compress,
    scratch: Vec<u8>,
}

impl Default for ZlibEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibEncoder {
    pub fn new() -> Self {
        Self::with_level(Compression::default())
    }

    pub fn with_level(level: Compression) -> Self {
        Self {
            stream: Compress::new(level, true),
            scratch: Vec::new(),
        }
    }

    pub(crate) fn encode(
        &mut self,
        framebuffer: &Framebuffer,
        rect: Rect,
        pixel_format: &PixelFormat,
        buf: &mut BytesMut,
    ) -> Result<(), VncError> {
        self.scratch.clear();
        framebuffer.put_rect(rect, pixel_format, &mut self.scratch);
        let compressed = deflate_sync(&mut self.stream, &self.scratch)?;
        buf.put_u32(compressed.len() as u32);
        buf.put_slice(&compressed);
        Ok(())
    }
}
