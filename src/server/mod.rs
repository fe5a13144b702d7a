mod auth;
mod builder;
mod framebuffer;
mod handle;
mod session;
mod update;

pub use crate::protocol::FramebufferUpdateRequest;
pub use builder::VncAcceptor;
pub use framebuffer::{Framebuffer, FramebufferSource};
pub use handle::SessionHandle;
pub use session::{SessionState, VncServerSession};

/// Default upper bound for clipboard text in either direction
pub const DEFAULT_MAX_CUT_TEXT: usize = 10 * 1024 * 1024;
