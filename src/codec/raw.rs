use bytes::BytesMut;

use crate::server::Framebuffer;
use crate::{PixelFormat, Rect};

/// Pixels as they are, `width * height * bytes_per_pixel` bytes in the client format
#[derive(Debug, Default, Clone, Copy)]
pub struct RawEncoder;

impl RawEncoder {
    pub(crate) fn encode(
        &self,
        framebuffer: &Framebuffer,
        rect: Rect,
        pixel_format: &PixelFormat,
        buf: &mut BytesMut,
    ) {
        buf.reserve(rect.area() * pixel_format.bytes_per_pixel());
        framebuffer.put_rect(rect, pixel_format, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_follows_the_client_format() {
        let fb = Framebuffer::new("raw", 8, 8, PixelFormat::rgb32()).unwrap();
        let mut buf = BytesMut::new();
        RawEncoder.encode(&fb, Rect::new(2, 2, 3, 4), &PixelFormat::rgb32(), &mut buf);
        assert_eq!(buf.len(), 3 * 4 * 4);

        let mut buf = BytesMut::new();
        RawEncoder.encode(&fb, Rect::new(2, 2, 3, 4), &PixelFormat::rgb565(), &mut buf);
        assert_eq!(buf.len(), 3 * 4 * 2);
    }
}
