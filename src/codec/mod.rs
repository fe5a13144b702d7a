//! Framebuffer encoders
//!
//! Every encoding the server can produce is a variant of [`Encoder`]. The
//! session keeps them in an [`EncoderRegistry`] and switches the active one
//! whenever the client sends `SetEncodings`.

use bytes::BytesMut;
use flate2::{Compress, FlushCompress};

use crate::server::Framebuffer;
use crate::{PixelFormat, Rect, VncEncoding, VncError};

mod raw;
mod tight;
mod zlib;

pub use raw::RawEncoder;
pub use tight::TightEncoder;
pub use zlib::ZlibEncoder;

pub enum Encoder {
    Raw(RawEncoder),
    Zlib(ZlibEncoder),
    Tight(TightEncoder),
}

impl Encoder {
    pub fn new(encoding: VncEncoding) -> Result<Self, VncError> {
        match encoding {
            VncEncoding::Raw => Ok(Encoder::Raw(RawEncoder)),
            VncEncoding::Zlib => Ok(Encoder::Zlib(ZlibEncoder::new())),
            VncEncoding::Tight => Ok(Encoder::Tight(TightEncoder::new())),
            other => Err(VncError::UnsupportedEncoder(other)),
        }
    }

    pub fn encoding(&self) -> VncEncoding {
        match self {
            Encoder::Raw(_) => VncEncoding::Raw,
            Encoder::Zlib(_) => VncEncoding::Zlib,
            Encoder::Tight(_) => VncEncoding::Tight,
        }
    }

    /// Cut `rect` into pieces this encoding is able to carry
    pub(crate) fn split(&self, rect: Rect) -> Vec<Rect> {
        match self {
            Encoder::Tight(_) => tight::split(rect),
            _ => vec![rect],
        }
    }

    /// Append the payload of `rect` (without the rectangle header) to `buf`
    pub(crate) fn encode(
        &mut self,
        framebuffer: &Framebuffer,
        rect: Rect,
        pixel_format: &PixelFormat,
        buf: &mut BytesMut,
    ) -> Result<(), VncError> {
        match self {
            Encoder::Raw(raw) => {
                raw.encode(framebuffer, rect, pixel_format, buf);
                Ok(())
            }
            Encoder::Zlib(zlib) => zlib.encode(framebuffer, rect, pixel_format, buf),
            Encoder::Tight(tight) => tight.encode(framebuffer, rect, pixel_format, buf),
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Encoder").field(&self.encoding()).finish()
    }
}

/// Encoders the server offers, Raw is always present and is the default
#[derive(Debug)]
pub struct EncoderRegistry {
    encoders: Vec<Encoder>,
    active: usize,
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self {
            encoders: vec![Encoder::Raw(RawEncoder)],
            active: 0,
        }
    }
}

impl EncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, encoding: VncEncoding) -> Result<(), VncError> {
        if self.contains(encoding) {
            return Ok(());
        }
        self.encoders.push(Encoder::new(encoding)?);
        Ok(())
    }

    pub fn contains(&self, encoding: VncEncoding) -> bool {
        self.encoders.iter().any(|e| e.encoding() == encoding)
    }

    pub fn encodings(&self) -> Vec<VncEncoding> {
        self.encoders.iter().map(Encoder::encoding).collect()
    }

    /// Activate the first of the client's encodings we have an encoder for
    ///
    /// The active encoder stays as it is when nothing matches.
    pub fn select(&mut self, client_encodings: &[i32]) -> Option<VncEncoding> {
        for &id in client_encodings {
            if let Some(idx) = self
                .encoders
                .iter()
                .position(|e| i32::from(e.encoding()) == id)
            {
                self.active = idx;
                return Some(self.encoders[idx].encoding());
            }
        }
        None
    }

    pub fn active(&self) -> &Encoder {
        &self.encoders[self.active]
    }

    pub(crate) fn active_mut(&mut self) -> &mut Encoder {
        &mut self.encoders[self.active]
    }
}

/// Deflate `input` through a long lived stream and sync flush it
///
/// The stream is never reset, the client inflates with the matching
/// persistent stream.
pub(crate) fn deflate_sync(stream: &mut Compress, input: &[u8]) -> Result<Vec<u8>, VncError> {
    let mut output = Vec::with_capacity(input.len() + input.len() / 1000 + 64);
    let before = stream.total_in();
    loop {
        let consumed = (stream.total_in() - before) as usize;
        stream.compress_vec(&input[consumed..], &mut output, FlushCompress::Sync)?;
        let consumed = (stream.total_in() - before) as usize;
        // a sync flush is complete once zlib stops short of filling the buffer
        if consumed == input.len() && output.len() < output.capacity() {
            break;
        }
        output.reserve(output.capacity().max(64));
    }
    Ok(output)
}
