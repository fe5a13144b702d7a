use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::framebuffer::{self, Framebuffer, FramebufferSource};
use super::session::SessionState;
use super::update::{self, UpdateState};
use crate::protocol::ServerMsg;
use crate::{ExtendedDesktopSizeReason, ExtendedDesktopSizeStatus, Rect, VncError};

/// The sending side of a session
///
/// Cheap to clone and safe to move to another task, e.g. a timer that pushes
/// screen changes while the session keeps reading client messages. The
/// update state is always locked before the writer.
pub struct SessionHandle<W> {
    writer: Arc<Mutex<W>>,
    state: Arc<Mutex<UpdateState>>,
    phase: watch::Receiver<SessionState>,
    max_cut_text: usize,
}

impl<W> Clone for SessionHandle<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            state: Arc::clone(&self.state),
            phase: self.phase.clone(),
            max_cut_text: self.max_cut_text,
        }
    }
}

impl<W> SessionHandle<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        writer: W,
        state: UpdateState,
        phase: watch::Receiver<SessionState>,
        max_cut_text: usize,
    ) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            state: Arc::new(Mutex::new(state)),
            phase,
            max_cut_text,
        }
    }

    pub(crate) fn writer(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.writer)
    }

    pub(crate) async fn state(&self) -> MutexGuard<'_, UpdateState> {
        self.state.lock().await
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), VncError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Where the session is in the protocol right now
    pub fn session_state(&self) -> SessionState {
        *self.phase.borrow()
    }

    /// Server messages may only follow ServerInit
    fn ensure_connected(&self) -> Result<(), VncError> {
        match self.session_state() {
            SessionState::Connected => Ok(()),
            SessionState::Closed => Err(VncError::SessionClosed),
            state => Err(VncError::InvalidState(state)),
        }
    }

    pub(crate) async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Replace the desktop being served, the next update captures from it
    pub async fn set_framebuffer_source(
        &self,
        source: Arc<dyn FramebufferSource>,
    ) -> Result<(), VncError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.source = Some(source);
        Ok(())
    }

    /// Answer the pending update request, if there is one
    ///
    /// Returns `Ok(true)` when a FramebufferUpdate was written. A failed
    /// capture is logged and leaves the previous framebuffer in place.
    pub async fn framebuffer_send_changes(&self) -> Result<bool, VncError> {
        let source = {
            let state = self.state.lock().await;
            state.ensure_open()?;
            if state.request.is_none() {
                return Ok(false);
            }
            match &state.source {
                Some(source) => Arc::clone(source),
                None => return Ok(false),
            }
        };

        let snapshot = match framebuffer::capture(&source).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Framebuffer capture failed: {}", e);
                return Ok(false);
            }
        };

        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.framebuffer = Some(Arc::clone(&snapshot));
        // another task may have answered the request while we were capturing
        let Some(request) = state.request.take() else {
            return Ok(false);
        };
        let buf = state.encode_update(&snapshot, request)?;
        self.write(&buf).await?;
        Ok(true)
    }

    /// Mark `rects` as changed so the next incremental update includes them
    pub async fn framebuffer_manual_invalidate(&self, rects: &[Rect]) -> Result<(), VncError> {
        if rects.iter().any(|r| !r.is_representable()) {
            return Err(VncError::InvalidArgument(
                "rectangle exceeds the 16 bit coordinate space",
            ));
        }
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        state.invalidate(rects);
        Ok(())
    }

    /// Tell the client the server side clipboard changed
    pub async fn send_local_clipboard_change(&self, text: &str) -> Result<(), VncError> {
        if text.len() > u32::MAX as usize || text.len() > self.max_cut_text {
            return Err(VncError::InvalidArgument("clipboard text is too long"));
        }
        let mut buf = BytesMut::with_capacity(8 + text.len());
        ServerMsg::ServerCutText(text.to_owned()).put(&mut buf);

        let state = self.state.lock().await;
        state.ensure_open()?;
        self.ensure_connected()?;
        self.write(&buf).await?;
        drop(state);
        Ok(())
    }

    /// Resize on behalf of the client and report the outcome
    pub(crate) async fn reply_desktop_size(
        &self,
        width: u16,
        height: u16,
    ) -> Result<ExtendedDesktopSizeStatus, VncError> {
        let source = self.state.lock().await.source.clone();
        let (status, snapshot) = match source {
            Some(source) => match framebuffer::resize(&source, width, height).await {
                (status, Ok(snapshot)) => (status, Some(snapshot)),
                (status, Err(e)) => {
                    warn!("Capture after resize failed: {}", e);
                    (status, None)
                }
            },
            None => (ExtendedDesktopSizeStatus::Prohibited, None),
        };
        debug!("Desktop resize to {}x{}: {:?}", width, height, status);

        let mut state = self.state.lock().await;
        state.ensure_open()?;
        if snapshot.is_some() {
            state.framebuffer = snapshot;
        }
        let (width, height) = state
            .framebuffer
            .as_deref()
            .map_or((0, 0), |fb| (fb.width(), fb.height()));
        state.resized(width, height);

        let mut buf = BytesMut::new();
        ServerMsg::FramebufferUpdate { rects: 1 }.put(&mut buf);
        update::put_extended_desktop_size(
            &mut buf,
            ExtendedDesktopSizeReason::Client,
            status,
            width,
            height,
        );
        self.write(&buf).await?;
        Ok(status)
    }

    /// The snapshot most recently captured
    pub async fn framebuffer(&self) -> Option<Arc<Framebuffer>> {
        self.state.lock().await.framebuffer.clone()
    }
}
