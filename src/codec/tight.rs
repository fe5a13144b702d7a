//! Tight encoding, fill and basic compression only
//!
//! Solid rectangles become a single TPIXEL, everything else goes through zlib
//! stream 0 with the copy filter.

use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression};

use super::deflate_sync;
use crate::server::Framebuffer;
use crate::{PixelFormat, Rect, VncError};

const FILL: u8 = 0x80;
const BASIC_STREAM_0: u8 = 0x00;

/// Clients refuse rectangles wider than this
const MAX_RECT_WIDTH: u16 = 2048;
/// Upper bound of pixels in one rectangle
const MAX_RECT_SIZE: usize = 65536;
/// Shorter data is sent uncompressed and without a length
const MIN_TO_COMPRESS: usize = 12;

pub struct TightEncoder {
    stream: Compress,
    pixels: Vec<u32>,
}

impl Default for TightEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TightEncoder {
    pub fn new() -> Self {
        Self {
            stream: Compress::new(Compression::default(), true),
            pixels: Vec::new(),
        }
    }

    pub(crate) fn encode(
        &mut self,
        framebuffer: &Framebuffer,
        rect: Rect,
        pixel_format: &PixelFormat,
        buf: &mut BytesMut,
    ) -> Result<(), VncError> {
        self.pixels.clear();
        self.pixels
            .extend(framebuffer.pixels_in(rect, pixel_format));

        if let Some(&first) = self.pixels.first() {
            if self.pixels.iter().all(|&p| p == first) {
                buf.put_u8(FILL);
                put_tpixel(pixel_format, first, buf);
                return Ok(());
            }
        }

        let mut data = Vec::with_capacity(self.pixels.len() * 3);
        for &pixel in &self.pixels {
            put_tpixel(pixel_format, pixel, &mut data);
        }

        buf.put_u8(BASIC_STREAM_0);
        if data.len() < MIN_TO_COMPRESS {
            buf.put_slice(&data);
            return Ok(());
        }
        let compressed = deflate_sync(&mut self.stream, &data)?;
        put_compact_len(buf, compressed.len());
        buf.put_slice(&compressed);
        Ok(())
    }
}

fn put_tpixel<B: BufMut>(pixel_format: &PixelFormat, pixel: u32, buf: &mut B) {
    if pixel_format.is_tpixel() {
        buf.put_slice(&pixel_format.rgb(pixel));
    } else {
        pixel_format.put_pixel(pixel, buf);
    }
}

/// 7 bits per byte, low bits first, at most 3 bytes
fn put_compact_len<B: BufMut>(buf: &mut B, len: usize) {
    if len < 128 {
        buf.put_u8(len as u8);
    } else if len < 16384 {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 7) as u8);
    } else {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((((len >> 7) & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 14) as u8);
    }
}

pub(super) fn split(rect: Rect) -> Vec<Rect> {
    if rect.width <= MAX_RECT_WIDTH && rect.area() <= MAX_RECT_SIZE {
        return vec![rect];
    }
    let mut pieces = Vec::new();
    let mut x = 0;
    while x < rect.width {
        let width = (rect.width - x).min(MAX_RECT_WIDTH);
        let rows = (MAX_RECT_SIZE / width as usize).clamp(1, u16::MAX as usize) as u16;
        let mut y = 0;
        while y < rect.height {
            let height = (rect.height - y).min(rows);
            pieces.push(Rect::new(rect.x + x, rect.y + y, width, height));
            y += height;
        }
        x += width;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_rect_is_a_fill() {
        let mut fb = Framebuffer::new("tight", 4, 4, PixelFormat::rgb32()).unwrap();
        for px in fb.pixels_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&0x0011_2233_u32.to_le_bytes());
        }
        let mut buf = BytesMut::new();
        TightEncoder::new()
            .encode(&fb, fb.bounds(), &PixelFormat::rgb32(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x80, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn tiny_rects_are_sent_uncompressed() {
        let mut fb = Framebuffer::new("tight", 2, 1, PixelFormat::rgb32()).unwrap();
        fb.pixels_mut()[..4].copy_from_slice(&0x00ff_0000_u32.to_le_bytes());
        let mut buf = BytesMut::new();
        TightEncoder::new()
            .encode(&fb, fb.bounds(), &PixelFormat::rgb32(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x00, 0xff, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn compact_length() {
        let mut buf = Vec::new();
        put_compact_len(&mut buf, 100);
        put_compact_len(&mut buf, 300);
        put_compact_len(&mut buf, 20000);
        assert_eq!(buf, [100, 0xac, 0x02, 0xa0, 0x9c, 0x01]);
    }

    #[test]
    fn large_rects_are_split() {
        let pieces = split(Rect::new(0, 0, 3000, 100));
        assert!(pieces
            .iter()
            .all(|r| r.width <= MAX_RECT_WIDTH && r.area() <= MAX_RECT_SIZE));
        assert_eq!(pieces.iter().map(Rect::area).sum::<usize>(), 300_000);
        assert_eq!(split(Rect::new(5, 5, 64, 64)), [Rect::new(5, 5, 64, 64)]);
    }
}
