pub mod desktop_size;
pub mod encoding;
pub mod messages;
pub mod pixel_format;
pub mod rect;
pub mod security;
pub mod version;
pub mod wire;

pub use desktop_size::{ExtendedDesktopSizeReason, ExtendedDesktopSizeStatus};
pub use encoding::VncEncoding;
pub use messages::{ClientMsg, FramebufferUpdateRequest, ServerMsg};
pub use pixel_format::PixelFormat;
pub use rect::{Rect, Screen};
pub use security::SecurityType;
pub use version::VncVersion;
