use std::sync::Arc;

use bytes::BufMut;

use crate::{ExtendedDesktopSizeStatus, PixelFormat, Rect, VncError};

/// A snapshot of the desktop
///
/// Pixels are stored row by row without padding, each pixel laid out as
/// described by `pixel_format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    name: String,
    width: u16,
    height: u16,
    pixel_format: PixelFormat,
    pixels: Vec<u8>,
}

impl Framebuffer {
    /// A black framebuffer
    pub fn new(
        name: impl Into<String>,
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
    ) -> Result<Self, VncError> {
        let len = width as usize * height as usize * pixel_format.bytes_per_pixel();
        Self::from_pixels(name, width, height, pixel_format, vec![0; len])
    }

    pub fn from_pixels(
        name: impl Into<String>,
        width: u16,
        height: u16,
        pixel_format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, VncError> {
        pixel_format.validate()?;
        let expected = width as usize * height as usize * pixel_format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(VncError::InvalidPixelBuffer {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            pixel_format,
            pixels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Same geometry and layout, so pixel rows can be compared byte by byte
    pub(crate) fn is_compatible(&self, other: &Framebuffer) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.pixel_format == other.pixel_format
    }

    /// Bytes of row `y` from column `x`, `width` pixels long
    ///
    /// `rect` style coordinates must already be clipped to the framebuffer.
    pub(crate) fn row(&self, x: u16, y: u16, width: u16) -> &[u8] {
        let bpp = self.pixel_format.bytes_per_pixel();
        let start = y as usize * self.stride() + x as usize * bpp;
        &self.pixels[start..start + width as usize * bpp]
    }

    /// Pixels of `rect` re-expressed in the `to` layout, row-major
    pub(crate) fn pixels_in<'a>(&'a self, rect: Rect, to: &'a PixelFormat) -> impl Iterator<Item = u32> + 'a {
        let bpp = self.pixel_format.bytes_per_pixel();
        (rect.y..rect.y + rect.height).flat_map(move |y| {
            self.row(rect.x, y, rect.width)
                .chunks_exact(bpp)
                .map(move |px| self.pixel_format.translate(self.pixel_format.read_pixel(px), to))
        })
    }

    /// Append the pixels of `rect` to `buf` in the `to` layout
    pub(crate) fn put_rect<B: BufMut>(&self, rect: Rect, to: &PixelFormat, buf: &mut B) {
        if self.pixel_format == *to {
            for y in rect.y..rect.y + rect.height {
                buf.put_slice(self.row(rect.x, y, rect.width));
            }
        } else {
            for pixel in self.pixels_in(rect, to) {
                to.put_pixel(pixel, buf);
            }
        }
    }
}

/// The desktop being served, implemented by the host
pub trait FramebufferSource: Send + Sync {
    /// Take a fresh snapshot
    ///
    /// Runs on tokio's blocking pool, so it may block.
    fn capture(&self) -> std::io::Result<Arc<Framebuffer>>;

    /// Resize the desktop on behalf of the client, also run on the blocking pool
    fn set_desktop_size(&self, width: u16, height: u16) -> ExtendedDesktopSizeStatus {
        tracing::debug!("Refusing desktop resize to {}x{}", width, height);
        ExtendedDesktopSizeStatus::Prohibited
    }
}

/// Capture on the blocking pool, a panicking source counts as a failed capture
pub(crate) async fn capture(source: &Arc<dyn FramebufferSource>) -> std::io::Result<Arc<Framebuffer>> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source.capture())
        .await
        .unwrap_or_else(|e| Err(e.into()))
}

/// Resize on the blocking pool and capture the result
pub(crate) async fn resize(
    source: &Arc<dyn FramebufferSource>,
    width: u16,
    height: u16,
) -> (ExtendedDesktopSizeStatus, std::io::Result<Arc<Framebuffer>>) {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || {
        let status = source.set_desktop_size(width, height);
        (status, source.capture())
    })
    .await
    .unwrap_or_else(|e| (ExtendedDesktopSizeStatus::OutOfResources, Err(e.into())))
}
