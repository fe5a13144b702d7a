use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::watch;

use super::framebuffer::FramebufferSource;
use super::handle::SessionHandle;
use super::session::{SessionState, VncServerSession};
use super::update::UpdateState;
use super::DEFAULT_MAX_CUT_TEXT;
use crate::codec::EncoderRegistry;
use crate::{SecurityType, VncEncoding, VncError};

/// Builder to set up the server side of a vnc connection
pub struct VncAcceptor<R, W> {
    reader: R,
    writer: W,
    password: Option<String>,
    auth_methods: Vec<SecurityType>,
    encoders: Vec<VncEncoding>,
    source: Option<Arc<dyn FramebufferSource>>,
    max_cut_text: usize,
}

impl<S> VncAcceptor<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Serve a client connected through `stream`
    ///
    /// ```no_run
    /// use vncserver::{VncAcceptor, VncError};
    /// use tokio::{self, net::TcpListener};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), VncError> {
    ///     let listener = TcpListener::bind("127.0.0.1:5900").await?;
    ///     let (tcp, _) = listener.accept().await?;
    ///     let session = VncAcceptor::new(tcp)
    ///         .set_password("password")
    ///         .add_encoder(vncserver::VncEncoding::Tight)
    ///         .add_encoder(vncserver::VncEncoding::Zlib)
    ///         .build()?;
    ///     Ok(())
    /// }
    /// ```
    ///
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer)
    }
}

impl<R, W> VncAcceptor<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Serve a client over separate read and write halves
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            password: None,
            auth_methods: Vec::new(),
            encoders: Vec::new(),
            source: None,
            max_cut_text: DEFAULT_MAX_CUT_TEXT,
        }
    }

    /// Password for [SecurityType::VncAuth]
    ///
    /// Only the first 8 bytes take part in the DES challenge
    ///
    /// When no method is added explicitly, setting a password makes VncAuth
    /// the only method offered
    ///
    pub fn set_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Security types to offer, in order of preference
    ///
    /// [SecurityType::None] and [SecurityType::VncAuth] are supported
    ///
    pub fn add_auth_method(mut self, method: SecurityType) -> Self {
        if !self.auth_methods.contains(&method) {
            self.auth_methods.push(method);
        }
        self
    }

    /// Encodings that we are able to send besides [VncEncoding::Raw]
    ///
    /// One of [VncEncoding::Zlib] and [VncEncoding::Tight]
    ///
    /// The client decides which one is used
    ///
    pub fn add_encoder(mut self, encoding: VncEncoding) -> Self {
        self.encoders.push(encoding);
        self
    }

    /// The desktop to serve, required before the handshake reaches ServerInit
    pub fn set_framebuffer_source(mut self, source: Arc<dyn FramebufferSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Longest clipboard text accepted from or sent to the client
    pub fn set_max_cut_text(mut self, max: usize) -> Self {
        self.max_cut_text = max;
        self
    }

    /// Complete the server configuration
    ///
    pub fn build(self) -> Result<VncServerSession<R, W>, VncError> {
        let auth_methods = match (self.auth_methods.is_empty(), &self.password) {
            (false, _) => self.auth_methods,
            (true, Some(_)) => vec![SecurityType::VncAuth],
            (true, None) => vec![SecurityType::None],
        };
        for method in &auth_methods {
            if !method.is_supported() {
                return Err(VncError::UnsupportedSecurityType((*method).into()));
            }
            if *method == SecurityType::VncAuth && self.password.is_none() {
                return Err(VncError::MissingPassword);
            }
        }

        let mut encoders = EncoderRegistry::new();
        for encoding in self.encoders {
            encoders.register(encoding)?;
        }

        let (phase_tx, phase_rx) = watch::channel(SessionState::Connecting);
        let handle = SessionHandle::new(
            self.writer,
            UpdateState::new(self.source, encoders),
            phase_rx,
            self.max_cut_text,
        );
        Ok(VncServerSession::new(
            self.reader,
            handle,
            phase_tx,
            auth_methods,
            self.password,
            self.max_cut_text,
        ))
    }
}
