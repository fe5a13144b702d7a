//! # VNCSERVER-RS
//!
//! ## Description
//! + An async implementation of VNC server side protocol
//!
//! ## Simple example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use vncserver::{Framebuffer, FramebufferSource, PixelFormat, VncAcceptor, VncEncoding};
//!
//! struct Blank;
//!
//! impl FramebufferSource for Blank {
//!     fn capture(&self) -> std::io::Result<Arc<Framebuffer>> {
//!         Framebuffer::new("blank", 640, 480, PixelFormat::rgb32())
//!             .map(Arc::new)
//!             .map_err(std::io::Error::other)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = TcpListener::bind("127.0.0.1:5900").await?;
//!     let (tcp, _) = listener.accept().await?;
//!
//!     let mut session = VncAcceptor::new(tcp)
//!         .set_password("secret")
//!         .add_encoder(VncEncoding::Zlib)
//!         .set_framebuffer_source(Arc::new(Blank))
//!         .build()?;
//!
//!     // Push screen changes from another task
//!     let handle = session.handle();
//!     tokio::spawn(async move {
//!         let mut ticker = tokio::time::interval(std::time::Duration::from_millis(40));
//!         loop {
//!             ticker.tick().await;
//!             if handle.framebuffer_send_changes().await.is_err() {
//!                 break;
//!             }
//!         }
//!     });
//!
//!     session.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0
//!    ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license
//!    ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

pub mod codec;
pub mod error;
pub mod events;
pub mod protocol;
pub mod server;

pub use codec::{Encoder, EncoderRegistry};
pub use error::*;
pub use events::*;
pub use protocol::{
    ExtendedDesktopSizeReason, ExtendedDesktopSizeStatus, PixelFormat, Rect, Screen,
    SecurityType, VncEncoding, VncVersion,
};
pub use server::{
    Framebuffer, FramebufferSource, FramebufferUpdateRequest, SessionHandle, SessionState,
    VncAcceptor, VncServerSession, DEFAULT_MAX_CUT_TEXT,
};
