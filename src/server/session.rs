use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, trace, warn};

use super::auth::AuthHelper;
use super::framebuffer::{self, Framebuffer, FramebufferSource};
use super::handle::SessionHandle;
use crate::protocol::security::AuthResult;
use crate::protocol::{wire, ClientMsg};
use crate::{PixelFormat, Rect, SecurityType, ServerEvent, VncEncoding, VncError, VncVersion};

const NO_AUTH_METHOD_REASON: &str =
    "The server and client could not agree on any authentication method.";
const INVALID_AUTH_METHOD_REASON: &str = "Invalid authentication method.";
const AUTH_FAILED_REASON: &str = "Failed to authenticate";

/// Where a session is in the protocol
///
/// States are only ever left forwards. Steps may be skipped, so a host that
/// did part of the handshake itself, e.g. a proxy that already sent
/// SecurityResult, can start a session at [`VncServerSession::negotiate_desktop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    NegotiatingVersion,
    NegotiatingSecurity,
    Authenticating,
    NegotiatingDesktop,
    Connected,
    Closed,
}

impl SessionState {
    fn advance(&mut self, next: SessionState) -> Result<(), VncError> {
        if *self == SessionState::Closed {
            return Err(VncError::SessionClosed);
        }
        if next < *self {
            return Err(VncError::InvalidState(*self));
        }
        trace!("Session state {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }
}

/// Server side of one RFB connection
///
/// The session owns the read half of the transport and drives the handshake
/// and the client message loop. Everything that writes to the client is
/// shared with [`SessionHandle`]s, see [`VncServerSession::handle`].
pub struct VncServerSession<R, W> {
    reader: R,
    handle: SessionHandle<W>,
    state: SessionState,
    phase: watch::Sender<SessionState>,
    version: Option<VncVersion>,
    auth_methods: Vec<SecurityType>,
    auth_method: Option<SecurityType>,
    password: Option<String>,
    shared: bool,
    max_cut_text: usize,
    event_tx: UnboundedSender<ServerEvent>,
    event_rx: Option<UnboundedReceiver<ServerEvent>>,
}

impl<R, W> VncServerSession<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub(super) fn new(
        reader: R,
        handle: SessionHandle<W>,
        phase: watch::Sender<SessionState>,
        auth_methods: Vec<SecurityType>,
        password: Option<String>,
        max_cut_text: usize,
    ) -> Self {
        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            reader,
            handle,
            state: SessionState::Connecting,
            phase,
            version: None,
            auth_methods,
            auth_method: None,
            password,
            shared: false,
            max_cut_text,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The version line the client answered with
    pub fn version(&self) -> Option<VncVersion> {
        self.version
    }

    pub fn auth_method(&self) -> Option<SecurityType> {
        self.auth_method
    }

    /// The shared flag of ClientInit, this server does not act on it
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn handle(&self) -> SessionHandle<W> {
        self.handle.clone()
    }

    /// Client input and control messages
    ///
    /// Can be taken once, events are buffered until then.
    pub fn events(&mut self) -> Option<impl Stream<Item = ServerEvent>> {
        self.event_rx.take().map(UnboundedReceiverStream::new)
    }

    pub async fn framebuffer(&self) -> Option<Arc<Framebuffer>> {
        self.handle.framebuffer().await
    }

    /// The layout pixels are translated to before they are encoded
    pub async fn client_pixel_format(&self) -> PixelFormat {
        self.handle.state().await.pixel_format
    }

    pub async fn active_encoding(&self) -> VncEncoding {
        self.handle.state().await.encoders.active().encoding()
    }

    pub async fn framebuffer_send_changes(&self) -> Result<bool, VncError> {
        self.handle.framebuffer_send_changes().await
    }

    pub async fn framebuffer_manual_invalidate(&self, rects: &[Rect]) -> Result<(), VncError> {
        self.handle.framebuffer_manual_invalidate(rects).await
    }

    pub async fn send_local_clipboard_change(&self, text: &str) -> Result<(), VncError> {
        self.handle.send_local_clipboard_change(text).await
    }

    pub async fn set_framebuffer_source(
        &self,
        source: Arc<dyn FramebufferSource>,
    ) -> Result<(), VncError> {
        self.handle.set_framebuffer_source(source).await
    }

    /// Move forwards and let the handles know
    fn advance(&mut self, next: SessionState) -> Result<(), VncError> {
        self.state.advance(next)?;
        self.phase.send_replace(next);
        Ok(())
    }

    fn emit(&self, event: ServerEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    /// Move to `Closed`, tell the handles and the host
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.phase.send_replace(SessionState::Closed);
        self.handle.close().await;
        self.emit(ServerEvent::Disconnected);
        info!("Session closed");
    }

    async fn closing<T>(&mut self, result: Result<T, VncError>) -> Result<T, VncError> {
        if let Err(e) = &result {
            debug!("Closing session: {}", e);
            self.close().await;
        }
        result
    }

    /// Send our version line and read the client's
    ///
    /// Returns the security types to offer. Only a 3.8 client gets a list,
    /// an empty one means the client is older. [`Self::negotiate`] then
    /// runs the 3.7 selection over the configured methods or the 3.3 flow.
    pub async fn negotiate_version(&mut self) -> Result<Vec<SecurityType>, VncError> {
        self.advance(SessionState::NegotiatingVersion)?;
        let result = self.exchange_versions().await;
        let version = self.closing(result).await?;
        self.version = Some(version);
        self.advance(SessionState::NegotiatingSecurity)?;

        if version.selects_security_type() {
            Ok(self.auth_methods.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn exchange_versions(&mut self) -> Result<VncVersion, VncError> {
        let writer = self.handle.writer();
        VncVersion::SERVER.write(&mut *writer.lock().await).await?;
        let version = VncVersion::read(&mut self.reader).await?;
        trace!("Client version {:?}", version);
        Ok(version)
    }

    /// Security type selection over `offered`
    ///
    /// Follows RFB 3.7 when the client announced it and RFB 3.8 otherwise.
    /// A 3.7 client gets no SecurityResult after `None` and no reason strings
    /// once a list was sent.
    pub async fn negotiate_security(&mut self, offered: &[SecurityType]) -> Result<(), VncError> {
        if offered.len() > u8::MAX as usize {
            return Err(VncError::InvalidArgument(
                "at most 255 security types can be offered",
            ));
        }
        self.advance(SessionState::NegotiatingSecurity)?;
        let result = self.select_security(offered).await;
        self.closing(result).await
    }

    async fn select_security(&mut self, offered: &[SecurityType]) -> Result<(), VncError> {
        let rfb37 = self.version == Some(VncVersion::RFB37);
        let lock = self.handle.writer();
        let mut writer = lock.lock().await;

        if offered.is_empty() {
            SecurityType::write_empty_list(NO_AUTH_METHOD_REASON, &mut *writer).await?;
            return Err(VncError::NoAuthMethod);
        }

        SecurityType::write_list(offered, &mut *writer).await?;
        let choice = SecurityType::read_choice(&mut self.reader).await?;
        let method = SecurityType::try_from(choice)
            .ok()
            .filter(|method| offered.contains(method) && method.is_supported());
        let Some(method) = method else {
            warn!("Client chose security type {}", choice);
            if !rfb37 {
                AuthResult::Failed
                    .write(Some(INVALID_AUTH_METHOD_REASON), &mut *writer)
                    .await?;
            }
            return Err(VncError::InvalidAuthMethod(choice));
        };
        trace!("Client chose {:?}", method);
        self.auth_method = Some(method);
        self.advance(SessionState::Authenticating)?;

        if method == SecurityType::VncAuth {
            let result = self.challenge(&mut *writer).await?;
            if result == AuthResult::Failed {
                warn!("Client failed VNC authentication");
                let reason = (!rfb37).then_some(AUTH_FAILED_REASON);
                result.write(reason, &mut *writer).await?;
                return Err(VncError::AuthenticationFailed);
            }
            AuthResult::Ok.write(None, &mut *writer).await?;
        } else if !rfb37 {
            AuthResult::Ok.write(None, &mut *writer).await?;
        }
        info!("Auth done, {:?}", method);
        self.advance(SessionState::NegotiatingDesktop)
    }

    /// RFB 3.3 security handshake, the server picks the method
    pub async fn negotiate_security_legacy(&mut self) -> Result<(), VncError> {
        self.advance(SessionState::NegotiatingSecurity)?;
        let result = self.impose_security().await;
        self.closing(result).await
    }

    async fn impose_security(&mut self) -> Result<(), VncError> {
        let lock = self.handle.writer();
        let mut writer = lock.lock().await;

        let Some(method) = self.auth_methods.first().copied() else {
            SecurityType::Invalid.write_legacy(&mut *writer).await?;
            wire::write_string(&mut *writer, NO_AUTH_METHOD_REASON).await?;
            writer.flush().await?;
            return Err(VncError::NoAuthMethod);
        };
        method.write_legacy(&mut *writer).await?;
        self.auth_method = Some(method);
        self.advance(SessionState::Authenticating)?;

        if method == SecurityType::VncAuth {
            let result = self.challenge(&mut *writer).await?;
            result.write(None, &mut *writer).await?;
            if result == AuthResult::Failed {
                warn!("Client failed VNC authentication");
                return Err(VncError::AuthenticationFailed);
            }
        }
        info!("Auth done, {:?}", method);
        self.advance(SessionState::NegotiatingDesktop)
    }

    async fn challenge(&mut self, writer: &mut W) -> Result<AuthResult, VncError> {
        let auth = AuthHelper::new(self.password.as_deref())?;
        auth.write(writer).await?;
        auth.finish(&mut self.reader).await
    }

    /// ClientInit and ServerInit
    pub async fn negotiate_desktop(&mut self) -> Result<(), VncError> {
        self.advance(SessionState::NegotiatingDesktop)?;
        let result = self.exchange_init().await;
        self.closing(result).await?;
        self.advance(SessionState::Connected)?;
        info!("Client connected");
        Ok(())
    }

    async fn exchange_init(&mut self) -> Result<(), VncError> {
        self.shared = self.reader.read_u8().await? != 0;
        trace!("Client shared flag {}", self.shared);

        let source = self
            .handle
            .state()
            .await
            .source
            .clone()
            .ok_or(VncError::NoFramebufferSource)?;
        let framebuffer = framebuffer::capture(&source).await?;

        // +--------------+--------------+------------------------------+
        // | No. of bytes | Type [Value] | Description                  |
        // +--------------+--------------+------------------------------+
        // | 2            | U16          | framebuffer-width in pixels  |
        // | 2            | U16          | framebuffer-height in pixels |
        // | 16           | PIXEL_FORMAT | server-pixel-format          |
        // | 4            | U32          | name-length                  |
        // | name-length  | U8 array     | name-string                  |
        // +--------------+--------------+------------------------------+
        let mut buf = BytesMut::with_capacity(24 + framebuffer.name().len());
        buf.put_u16(framebuffer.width());
        buf.put_u16(framebuffer.height());
        framebuffer.pixel_format().put(&mut buf);
        wire::put_string(&mut buf, framebuffer.name());

        let mut state = self.handle.state().await;
        state.ensure_open()?;
        state.init(framebuffer);
        let lock = self.handle.writer();
        let mut writer = lock.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// The whole handshake, ending in `Connected`
    pub async fn negotiate(&mut self) -> Result<(), VncError> {
        let offered = self.negotiate_version().await?;
        match self.version {
            Some(VncVersion::RFB38) => self.negotiate_security(&offered).await?,
            Some(VncVersion::RFB37) => {
                let offered = self.auth_methods.clone();
                self.negotiate_security(&offered).await?
            }
            _ => self.negotiate_security_legacy().await?,
        }
        self.negotiate_desktop().await
    }

    /// Read and act on one client message
    pub async fn handle_message(&mut self) -> Result<(), VncError> {
        self.ensure_connected()?;
        let result = match self.read_message().await {
            Ok(Some(msg)) => self.dispatch(msg).await,
            Ok(None) => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
            Err(e) => Err(e),
        };
        self.closing(result).await.map(|_| ())
    }

    /// `None` when the client hung up between two messages
    async fn read_message(&mut self) -> Result<Option<ClientMsg>, VncError> {
        let msg_type = match self.reader.read_u8().await {
            Ok(msg_type) => msg_type,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ClientMsg::read_body(msg_type, &mut self.reader, self.max_cut_text)
            .await
            .map(Some)
    }

    fn ensure_connected(&self) -> Result<(), VncError> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::Closed => Err(VncError::SessionClosed),
            state => Err(VncError::InvalidState(state)),
        }
    }

    /// Returns whether the client asked for a full update
    async fn dispatch(&mut self, msg: ClientMsg) -> Result<bool, VncError> {
        match msg {
            ClientMsg::SetPixelFormat(pf) => {
                debug!("Client pixel format {:?}", pf);
                self.handle.state().await.set_pixel_format(pf);
                self.emit(ServerEvent::SetPixelFormat(pf));
            }
            ClientMsg::SetEncodings(encodings) => {
                trace!("Client encodings {:?}", encodings);
                let selected = self.handle.state().await.set_encodings(encodings);
                if let Some(encoding) = selected {
                    debug!("Encoding updates as {:?}", encoding);
                }
            }
            ClientMsg::FramebufferUpdateRequest(request) => {
                trace!("Update request {:?}", request);
                let mut state = self.handle.state().await;
                state.ensure_open()?;
                state.request = Some(request);
                return Ok(!request.incremental);
            }
            ClientMsg::KeyEvent { down, key } => {
                self.emit(ServerEvent::KeyEvent { down, key });
            }
            ClientMsg::PointerEvent { button_mask, x, y } => {
                self.emit(ServerEvent::PointerEvent { x, y, button_mask });
            }
            ClientMsg::ClientCutText(text) => {
                self.emit(ServerEvent::ClientCutText(text));
            }
            ClientMsg::SetDesktopSize {
                width,
                height,
                screens,
            } => {
                self.handle.reply_desktop_size(width, height).await?;
                self.emit(ServerEvent::SetDesktopSize {
                    width,
                    height,
                    screens,
                });
            }
        }
        Ok(false)
    }

    /// Handshake, then serve client messages until the client goes away
    ///
    /// The session is closed whichever way this returns.
    pub async fn run(&mut self) -> Result<(), VncError> {
        let result = self.serve().await;
        self.close().await;
        result
    }

    async fn serve(&mut self) -> Result<(), VncError> {
        self.negotiate().await?;
        while let Some(msg) = self.read_message().await? {
            if self.dispatch(msg).await? {
                self.handle.framebuffer_send_changes().await?;
            }
        }
        info!("Client disconnected");
        Ok(())
    }
}
