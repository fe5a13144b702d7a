//! Damage tracking and FramebufferUpdate serialization
//!
//! The session remembers the snapshot that was last put on the wire. An
//! incremental request is answered with the 64x64 tiles that differ from it,
//! merged into runs along each tile row, plus whatever the host invalidated
//! by hand.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::framebuffer::{Framebuffer, FramebufferSource};
use crate::codec::EncoderRegistry;
use crate::protocol::{FramebufferUpdateRequest, ServerMsg};
use crate::{
    ExtendedDesktopSizeReason, ExtendedDesktopSizeStatus, PixelFormat, Rect, Screen, VncEncoding,
    VncError,
};

const TILE: u16 = 64;

/// Everything the update pipeline shares between the session and its handles
pub(crate) struct UpdateState {
    pub(crate) closed: bool,
    pub(crate) source: Option<Arc<dyn FramebufferSource>>,
    pub(crate) framebuffer: Option<Arc<Framebuffer>>,
    last_sent: Option<Arc<Framebuffer>>,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) request: Option<FramebufferUpdateRequest>,
    pub(crate) encoders: EncoderRegistry,
    client_encodings: Vec<i32>,
    client_size: (u16, u16),
    dirty: Vec<Rect>,
}

impl UpdateState {
    pub(crate) fn new(source: Option<Arc<dyn FramebufferSource>>, encoders: EncoderRegistry) -> Self {
        Self {
            closed: false,
            source,
            framebuffer: None,
            last_sent: None,
            pixel_format: PixelFormat::rgb32(),
            request: None,
            encoders,
            client_encodings: Vec::new(),
            client_size: (0, 0),
            dirty: Vec::new(),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), VncError> {
        if self.closed {
            Err(VncError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// The framebuffer announced by ServerInit
    pub(crate) fn init(&mut self, framebuffer: Arc<Framebuffer>) {
        self.pixel_format = *framebuffer.pixel_format();
        self.client_size = (framebuffer.width(), framebuffer.height());
        self.framebuffer = Some(framebuffer);
        self.last_sent = None;
    }

    pub(crate) fn set_pixel_format(&mut self, pixel_format: PixelFormat) {
        self.pixel_format = pixel_format;
        // nothing the client holds is valid in the new format
        self.last_sent = None;
    }

    pub(crate) fn set_encodings(&mut self, encodings: Vec<i32>) -> Option<VncEncoding> {
        let selected = self.encoders.select(&encodings);
        self.client_encodings = encodings;
        selected
    }

    pub(crate) fn invalidate(&mut self, rects: &[Rect]) {
        self.dirty.extend(rects.iter().filter(|r| !r.is_empty()));
    }

    /// Forget the last sent snapshot and record the size the client now knows
    pub(crate) fn resized(&mut self, width: u16, height: u16) {
        self.client_size = (width, height);
        self.last_sent = None;
    }

    fn supports(&self, encoding: VncEncoding) -> bool {
        self.client_encodings.contains(&i32::from(encoding))
    }

    /// Serialize one FramebufferUpdate answering `request` from `snapshot`
    pub(crate) fn encode_update(
        &mut self,
        snapshot: &Arc<Framebuffer>,
        request: FramebufferUpdateRequest,
    ) -> Result<BytesMut, VncError> {
        let area = request.rect.clip(snapshot.width(), snapshot.height());
        let region = match area {
            None => Vec::new(),
            Some(area) if !request.incremental => vec![area],
            Some(area) => self.damage(snapshot, area),
        };
        self.dirty.retain(|r| r.intersect(&request.rect).is_none());

        let size = (snapshot.width(), snapshot.height());
        let resize = if size != self.client_size {
            self.client_size = size;
            if self.supports(VncEncoding::ExtendedDesktopSizePseudo) {
                Some(VncEncoding::ExtendedDesktopSizePseudo)
            } else if self.supports(VncEncoding::DesktopSizePseudo) {
                Some(VncEncoding::DesktopSizePseudo)
            } else {
                None
            }
        } else {
            None
        };

        let encoder = self.encoders.active_mut();
        let mut pieces: Vec<Rect> = region.iter().flat_map(|r| encoder.split(*r)).collect();
        let extra = usize::from(resize.is_some());
        if pieces.len() + extra > u16::MAX as usize {
            if let Some(bounds) = bounding(&region) {
                pieces = encoder.split(bounds);
            }
        }
        let count = u16::try_from(pieces.len() + extra)
            .map_err(|_| VncError::General("Too many rectangles for one update".to_string()))?;

        let mut buf = BytesMut::new();
        ServerMsg::FramebufferUpdate { rects: count }.put(&mut buf);
        match resize {
            Some(VncEncoding::ExtendedDesktopSizePseudo) => put_extended_desktop_size(
                &mut buf,
                ExtendedDesktopSizeReason::Server,
                ExtendedDesktopSizeStatus::Success,
                size.0,
                size.1,
            ),
            Some(_) => {
                Rect::new(0, 0, size.0, size.1).put(&mut buf);
                buf.put_i32(VncEncoding::DesktopSizePseudo.into());
            }
            None => {}
        }

        let encoding = i32::from(encoder.encoding());
        tracing::trace!("Sending {} rects as {:?}", pieces.len(), encoder.encoding());
        for piece in pieces {
            piece.put(&mut buf);
            buf.put_i32(encoding);
            encoder.encode(snapshot, piece, &self.pixel_format, &mut buf)?;
        }

        self.last_sent = Some(Arc::clone(snapshot));
        Ok(buf)
    }

    fn damage(&self, snapshot: &Framebuffer, area: Rect) -> Vec<Rect> {
        let Some(last) = self
            .last_sent
            .as_ref()
            .filter(|last| last.is_compatible(snapshot))
        else {
            return vec![area];
        };

        let mut rects = changed_tiles(last, snapshot, area);
        for dirty in self.dirty.iter().filter_map(|r| r.intersect(&area)) {
            if !rects.iter().any(|r| r.contains(&dirty)) {
                rects.push(dirty);
            }
        }
        rects
    }
}

/// Runs of adjacent tiles of `area` that differ between the two snapshots
pub(crate) fn changed_tiles(old: &Framebuffer, new: &Framebuffer, area: Rect) -> Vec<Rect> {
    let mut changed = Vec::new();
    let mut y = (area.y / TILE * TILE) as u32;
    while y < area.bottom() {
        let mut run: Option<Rect> = None;
        let mut x = (area.x / TILE * TILE) as u32;
        while x < area.right() {
            let tile = Rect::new(x as u16, y as u16, TILE, TILE).intersect(&area);
            match tile {
                Some(tile) if tile_differs(old, new, tile) => {
                    run = Some(match run {
                        Some(r) if r.right() == tile.x as u32 => {
                            Rect::new(r.x, r.y, r.width + tile.width, r.height)
                        }
                        Some(r) => {
                            changed.push(r);
                            tile
                        }
                        None => tile,
                    });
                }
                _ => changed.extend(run.take()),
            }
            x += TILE as u32;
        }
        changed.extend(run);
        y += TILE as u32;
    }
    changed
}

fn tile_differs(old: &Framebuffer, new: &Framebuffer, tile: Rect) -> bool {
    (tile.y..tile.y + tile.height)
        .any(|y| old.row(tile.x, y, tile.width) != new.row(tile.x, y, tile.width))
}

fn bounding(rects: &[Rect]) -> Option<Rect> {
    let first = rects.first()?;
    let (mut x0, mut y0) = (first.x, first.y);
    let (mut x1, mut y1) = (first.right(), first.bottom());
    for r in &rects[1..] {
        x0 = x0.min(r.x);
        y0 = y0.min(r.y);
        x1 = x1.max(r.right());
        y1 = y1.max(r.bottom());
    }
    Some(Rect::new(x0, y0, (x1 - x0 as u32) as u16, (y1 - y0 as u32) as u16))
}

/// An ExtendedDesktopSize pseudo rectangle describing a single screen
///
/// +--------------+--------------+-------------------+
/// | No. of bytes | Type [Value] | Description       |
/// +--------------+--------------+-------------------+
/// | 2            | U16          | x-position=reason |
/// | 2            | U16          | y-position=status |
/// | 2            | U16          | width             |
/// | 2            | U16          | height            |
/// | 4            | S32 [-308]   | encoding-type     |
/// | 1            | U8           | number-of-screens |
/// | 3            |              | padding           |
/// | 16           | SCREEN       | screen            |
/// +--------------+--------------+-------------------+
pub(crate) fn put_extended_desktop_size<B: BufMut>(
    buf: &mut B,
    reason: ExtendedDesktopSizeReason,
    status: ExtendedDesktopSizeStatus,
    width: u16,
    height: u16,
) {
    Rect::new(reason.into(), status.into(), width, height).put(buf);
    buf.put_i32(VncEncoding::ExtendedDesktopSizePseudo.into());
    buf.put_u8(1);
    buf.put_bytes(0, 3);
    Screen::from((width, height)).put(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u16, height: u16) -> Framebuffer {
        Framebuffer::new("tiles", width, height, PixelFormat::rgb32()).unwrap()
    }

    fn poke(fb: &mut Framebuffer, x: usize, y: usize) {
        let offset = y * fb.stride() + x * 4;
        fb.pixels_mut()[offset] ^= 0xff;
    }

    #[test]
    fn unchanged_frames_have_no_damage() {
        let fb = blank(200, 100);
        assert!(changed_tiles(&fb, &fb.clone(), fb.bounds()).is_empty());
    }

    #[test]
    fn adjacent_tiles_merge_along_a_row() {
        let old = blank(200, 100);
        let mut new = old.clone();
        poke(&mut new, 10, 10);
        poke(&mut new, 70, 10);
        poke(&mut new, 199, 99);

        let changed = changed_tiles(&old, &new, new.bounds());
        assert_eq!(
            changed,
            [Rect::new(0, 0, 128, 64), Rect::new(192, 64, 8, 36)]
        );
    }

    #[test]
    fn damage_is_clipped_to_the_area() {
        let old = blank(128, 128);
        let mut new = old.clone();
        poke(&mut new, 40, 40);
        let changed = changed_tiles(&old, &new, Rect::new(32, 32, 16, 16));
        assert_eq!(changed, [Rect::new(32, 32, 16, 16)]);
        assert!(changed_tiles(&old, &new, Rect::new(64, 64, 64, 64)).is_empty());
    }

    #[test]
    fn bounding_rect() {
        let rects = [Rect::new(10, 10, 5, 5), Rect::new(0, 20, 2, 2)];
        assert_eq!(bounding(&rects), Some(Rect::new(0, 10, 15, 12)));
        assert_eq!(bounding(&[]), None);
    }

    #[test]
    fn extended_desktop_size_layout() {
        let mut buf = Vec::new();
        put_extended_desktop_size(
            &mut buf,
            ExtendedDesktopSizeReason::Client,
            ExtendedDesktopSizeStatus::Success,
            100,
            200,
        );
        assert_eq!(
            buf,
            [
                0, 1, 0, 0, 0, 100, 0, 200, 0xff, 0xff, 0xfe, 0xcc, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 100, 0, 200, 0, 0, 0, 0
            ]
        );
    }
}
