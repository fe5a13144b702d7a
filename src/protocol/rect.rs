use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::VncError;

/// A rect where the image should be updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    // right/bottom edges are exclusive and may exceed u16::MAX for hostile input
    pub(crate) fn right(&self) -> u32 {
        self.x as u32 + self.width as u32
    }

    pub(crate) fn bottom(&self) -> u32 {
        self.y as u32 + self.height as u32
    }

    /// Whether the far edges still fit the 16 bit coordinate space
    pub fn is_representable(&self) -> bool {
        self.right() <= u16::MAX as u32 + 1 && self.bottom() <= u16::MAX as u32 + 1
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x as u32 || bottom <= y as u32 {
            return None;
        }
        Some(Rect::new(x, y, (right - x as u32) as u16, (bottom - y as u32) as u16))
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Clip to a `width` x `height` surface anchored at the origin
    pub fn clip(&self, width: u16, height: u16) -> Option<Rect> {
        self.intersect(&Rect::new(0, 0, width, height))
    }

    pub(crate) fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
    }

    pub(crate) async fn read<S>(reader: &mut S) -> Result<Self, VncError>
    where
        S: AsyncRead + Unpin,
    {
        Ok(Rect {
            x: reader.read_u16().await?,
            y: reader.read_u16().await?,
            width: reader.read_u16().await?,
            height: reader.read_u16().await?,
        })
    }
}

/// One screen of the extended desktop layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Screen {
    pub id: u32,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub flags: u32,
}

impl From<(u16, u16)> for Screen {
    fn from(tuple: (u16, u16)) -> Self {
        Self {
            width: tuple.0,
            height: tuple.1,
            ..Default::default()
        }
    }
}

impl Screen {
    // +--------------+--------------+-------------+
    // | No. of bytes | Type [Value] | Description |
    // +--------------+--------------+-------------+
    // | 4            | U32          | id          |
    // | 2            | U16          | x-position  |
    // | 2            | U16          | y-position  |
    // | 2            | U16          | width       |
    // | 2            | U16          | height      |
    // | 4            | U32          | flags       |
    // +--------------+--------------+-------------+
    pub(crate) async fn read<S>(reader: &mut S) -> Result<Self, VncError>
    where
        S: AsyncRead + Unpin,
    {
        Ok(Screen {
            id: reader.read_u32().await?,
            x: reader.read_u16().await?,
            y: reader.read_u16().await?,
            width: reader.read_u16().await?,
            height: reader.read_u16().await?,
            flags: reader.read_u32().await?,
        })
    }

    pub(crate) fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.id);
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_u32(self.flags);
    }
}
