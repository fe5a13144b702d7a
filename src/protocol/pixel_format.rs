use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::VncError;

//  +--------------+--------------+-----------------+
//  | No. of bytes | Type [Value] | Description     |
//  +--------------+--------------+-----------------+
//  | 1            | U8           | bits-per-pixel  |
//  | 1            | U8           | depth           |
//  | 1            | U8           | big-endian-flag |
//  | 1            | U8           | true-color-flag |
//  | 2            | U16          | red-max         |
//  | 2            | U16          | green-max       |
//  | 2            | U16          | blue-max        |
//  | 1            | U8           | red-shift       |
//  | 1            | U8           | green-shift     |
//  | 1            | U8           | blue-shift      |
//  | 3            |              | padding         |
//  +--------------+--------------+-----------------+
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian_flag: u8,
    pub true_color_flag: u8,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    pub const WIRE_LEN: usize = 16;

    /// 32 bit little endian `0x00RRGGBB`, i.e. `[b, g, r, x]` in memory
    pub fn rgb32() -> Self {
        Self::bgra()
    }

    /// `[b, g, r, a]` in memory
    pub fn bgra() -> Self {
        PixelFormat {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_color_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// `[r, g, b, a]` in memory
    pub fn rgba() -> Self {
        PixelFormat {
            red_shift: 0,
            blue_shift: 16,
            ..Self::bgra()
        }
    }

    /// 16 bit little endian 5-6-5
    pub fn rgb565() -> Self {
        PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 0,
            true_color_flag: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian_flag != 0
    }

    /// Check the format describes pixels we are able to produce
    ///
    /// Colour maps are not supported, every channel must be a contiguous
    /// bit field that fits inside the pixel.
    pub fn validate(&self) -> Result<(), VncError> {
        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            return Err(VncError::InvalidPixelFormat);
        }
        if self.depth == 0 || self.depth > self.bits_per_pixel || self.true_color_flag == 0 {
            return Err(VncError::InvalidPixelFormat);
        }
        for (max, shift) in [
            (self.red_max, self.red_shift),
            (self.green_max, self.green_shift),
            (self.blue_max, self.blue_shift),
        ] {
            if max == 0 || max & max.wrapping_add(1) != 0 {
                return Err(VncError::InvalidPixelFormat);
            }
            if shift as u32 + max.count_ones() > self.bits_per_pixel as u32 {
                return Err(VncError::InvalidPixelFormat);
            }
        }
        Ok(())
    }

    /// Tight sends 3 byte pixels for this layout
    pub(crate) fn is_tpixel(&self) -> bool {
        self.bits_per_pixel == 32
            && self.depth == 24
            && self.red_max == 255
            && self.green_max == 255
            && self.blue_max == 255
    }

    pub(crate) async fn read<S>(reader: &mut S) -> Result<Self, VncError>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = [0_u8; Self::WIRE_LEN];
        reader.read_exact(&mut buf).await?;
        Ok(buf.into())
    }

    pub(crate) fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&<[u8; Self::WIRE_LEN]>::from(*self));
    }

    pub(crate) fn read_pixel(&self, bytes: &[u8]) -> u32 {
        match (self.bits_per_pixel, self.is_big_endian()) {
            (8, _) => bytes[0] as u32,
            (16, true) => u16::from_be_bytes([bytes[0], bytes[1]]) as u32,
            (16, false) => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            (_, true) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            (_, false) => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    pub(crate) fn put_pixel<B: BufMut>(&self, pixel: u32, buf: &mut B) {
        match (self.bits_per_pixel, self.is_big_endian()) {
            (8, _) => buf.put_u8(pixel as u8),
            (16, true) => buf.put_u16(pixel as u16),
            (16, false) => buf.put_u16_le(pixel as u16),
            (_, true) => buf.put_u32(pixel),
            (_, false) => buf.put_u32_le(pixel),
        }
    }

    /// Re-express `pixel` (in `self` layout) in the `to` layout
    pub(crate) fn translate(&self, pixel: u32, to: &PixelFormat) -> u32 {
        if self == to {
            return pixel;
        }
        let channel = |shift: u8, max: u16, to_shift: u8, to_max: u16| -> u32 {
            let value = (pixel >> shift) & max as u32;
            let scaled = (value * to_max as u32 + max as u32 / 2) / max as u32;
            scaled << to_shift
        };
        channel(self.red_shift, self.red_max, to.red_shift, to.red_max)
            | channel(self.green_shift, self.green_max, to.green_shift, to.green_max)
            | channel(self.blue_shift, self.blue_max, to.blue_shift, to.blue_max)
    }

    /// 8 bit red, green and blue of a pixel in a format with 255 channel maxima
    pub(crate) fn rgb(&self, pixel: u32) -> [u8; 3] {
        [
            (pixel >> self.red_shift) as u8,
            (pixel >> self.green_shift) as u8,
            (pixel >> self.blue_shift) as u8,
        ]
    }
}

impl From<PixelFormat> for [u8; PixelFormat::WIRE_LEN] {
    fn from(pf: PixelFormat) -> Self {
        let red = pf.red_max.to_be_bytes();
        let green = pf.green_max.to_be_bytes();
        let blue = pf.blue_max.to_be_bytes();
        [
            pf.bits_per_pixel,
            pf.depth,
            pf.big_endian_flag,
            pf.true_color_flag,
            red[0],
            red[1],
            green[0],
            green[1],
            blue[0],
            blue[1],
            pf.red_shift,
            pf.green_shift,
            pf.blue_shift,
            0,
            0,
            0,
        ]
    }
}

impl From<[u8; PixelFormat::WIRE_LEN]> for PixelFormat {
    fn from(pf: [u8; PixelFormat::WIRE_LEN]) -> Self {
        PixelFormat {
            bits_per_pixel: pf[0],
            depth: pf[1],
            big_endian_flag: pf[2],
            true_color_flag: pf[3],
            red_max: u16::from_be_bytes([pf[4], pf[5]]),
            green_max: u16::from_be_bytes([pf[6], pf[7]]),
            blue_max: u16::from_be_bytes([pf[8], pf[9]]),
            red_shift: pf[10],
            green_shift: pf[11],
            blue_shift: pf[12],
        }
    }
}
