/// Who triggered a desktop size change, sent in the x field of the
/// `ExtendedDesktopSize` rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtendedDesktopSizeReason {
    Server = 0,
    Client = 1,
    OtherClient = 2,
}

/// Result of a resize request, sent in the y field of the
/// `ExtendedDesktopSize` rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtendedDesktopSizeStatus {
    Success = 0,
    Prohibited = 1,
    OutOfResources = 2,
    InvalidLayout = 3,
}

impl From<ExtendedDesktopSizeReason> for u16 {
    fn from(reason: ExtendedDesktopSizeReason) -> Self {
        reason as u16
    }
}

impl From<ExtendedDesktopSizeStatus> for u16 {
    fn from(status: ExtendedDesktopSizeStatus) -> Self {
        status as u16
    }
}
