#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum VncEncoding {
    Raw = 0,
    CopyRect = 1,
    // Rre = 2,
    // Hextile = 5,
    Zlib = 6,
    Tight = 7,
    Trle = 15,
    Zrle = 16,
    CursorPseudo = -239,
    DesktopSizePseudo = -223,
    LastRectPseudo = -224,
    ExtendedDesktopSizePseudo = -308,
}

impl TryFrom<i32> for VncEncoding {
    type Error = i32;

    fn try_from(num: i32) -> Result<Self, Self::Error> {
        match num {
            0 => Ok(VncEncoding::Raw),
            1 => Ok(VncEncoding::CopyRect),
            // 2 => VncEncoding::Rre,
            // 5 => VncEncoding::Hextile,
            6 => Ok(VncEncoding::Zlib),
            7 => Ok(VncEncoding::Tight),
            15 => Ok(VncEncoding::Trle),
            16 => Ok(VncEncoding::Zrle),
            -239 => Ok(VncEncoding::CursorPseudo),
            -223 => Ok(VncEncoding::DesktopSizePseudo),
            -224 => Ok(VncEncoding::LastRectPseudo),
            -308 => Ok(VncEncoding::ExtendedDesktopSizePseudo),
            unknown => Err(unknown),
        }
    }
}

impl From<VncEncoding> for i32 {
    fn from(e: VncEncoding) -> Self {
        e as i32
    }
}

impl From<VncEncoding> for u32 {
    fn from(e: VncEncoding) -> Self {
        e as i32 as u32
    }
}

impl VncEncoding {
    pub fn is_pseudo(&self) -> bool {
        (*self as i32) < 0
    }
}
