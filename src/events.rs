use crate::{PixelFormat, Screen};

/// Client input and control messages surfaced to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A key was pressed (`down == true`) or released, `key` is an X11 keysym
    KeyEvent { down: bool, key: u32 },
    /// Pointer moved or buttons changed
    ///
    /// bit 0: left, bit 1: middle, bit 2: right, bits 3/4: wheel up/down
    PointerEvent { x: u16, y: u16, button_mask: u8 },
    /// The client's clipboard changed
    ClientCutText(String),
    /// The client switched the pixel format of further updates
    SetPixelFormat(PixelFormat),
    /// The client asked for a new desktop layout
    SetDesktopSize {
        width: u16,
        height: u16,
        screens: Vec<Screen>,
    },
    /// The session reached its closed state
    Disconnected,
}
