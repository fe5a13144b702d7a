use thiserror::Error;

use crate::{SessionState, VncEncoding};

#[derive(Debug, Error)]
pub enum VncError {
    #[error("The server and client could not agree on any authentication method")]
    NoAuthMethod,
    #[error("Client chose security type {0} which was not offered")]
    InvalidAuthMethod(u8),
    #[error("Failed to authenticate")]
    AuthenticationFailed,
    #[error("Password authentication is enabled but no password is set")]
    MissingPassword,
    #[error("Unsupported security type {0}")]
    UnsupportedSecurityType(u8),
    #[error("Invalid pixel format")]
    InvalidPixelFormat,
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    InvalidPixelBuffer { expected: usize, actual: usize },
    #[error("Unknown VNC message type: {0}")]
    UnknownMessage(u8),
    #[error("{0:?} can not be used to encode framebuffer updates")]
    UnsupportedEncoder(VncEncoding),
    #[error("Cut text of {0} bytes exceeds the configured limit")]
    CutTextTooLong(usize),
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Operation not allowed in state {0:?}")]
    InvalidState(SessionState),
    #[error("No framebuffer source was set")]
    NoFramebufferSource,
    #[error("Session closed")]
    SessionClosed,
    #[error("Compression error: {0}")]
    Compress(#[from] flate2::CompressError),
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),
    #[error("VNC Error with message: {0}")]
    General(String),
}
