#![allow(dead_code)]

use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use vncserver::{
    ExtendedDesktopSizeStatus, Framebuffer, FramebufferSource, PixelFormat, VncAcceptor,
    VncServerSession,
};

/// Client bytes fed to the session, shared so leftovers can be inspected
#[derive(Clone, Default)]
pub struct Input(Arc<Mutex<Cursor<Vec<u8>>>>);

impl Input {
    pub fn new(bytes: &[u8]) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(bytes.to_vec()))))
    }

    pub fn push(&self, bytes: &[u8]) {
        self.0.lock().unwrap().get_mut().extend_from_slice(bytes);
    }

    pub fn remaining(&self) -> usize {
        let cursor = self.0.lock().unwrap();
        cursor.get_ref().len() - cursor.position() as usize
    }
}

impl AsyncRead for Input {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let mut cursor = self.0.lock().unwrap();
        let pos = cursor.position() as usize;
        let n = buf.remaining().min(cursor.get_ref().len() - pos);
        buf.put_slice(&cursor.get_ref()[pos..pos + n]);
        cursor.set_position((pos + n) as u64);
        Poll::Ready(Ok(()))
    }
}

/// Everything the session wrote
#[derive(Clone, Default)]
pub struct Output(Arc<Mutex<Vec<u8>>>);

impl Output {
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl AsyncWrite for Output {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A desktop whose next capture can be swapped or made to fail
pub struct TestSource {
    frame: Mutex<Option<Arc<Framebuffer>>>,
    resize: ExtendedDesktopSizeStatus,
    gate: Mutex<Option<Receiver<()>>>,
    pub captures: AtomicUsize,
}

impl TestSource {
    pub fn new(width: u16, height: u16) -> Arc<Self> {
        Self::with_resize(width, height, ExtendedDesktopSizeStatus::Prohibited)
    }

    pub fn with_resize(width: u16, height: u16, resize: ExtendedDesktopSizeStatus) -> Arc<Self> {
        Arc::new(Self {
            frame: Mutex::new(Some(Arc::new(blank(width, height)))),
            resize,
            gate: Mutex::new(None),
            captures: AtomicUsize::new(0),
        })
    }

    /// `None` makes every following capture fail
    pub fn set_frame(&self, frame: Option<Framebuffer>) {
        *self.frame.lock().unwrap() = frame.map(Arc::new);
    }

    pub fn frame(&self) -> Option<Arc<Framebuffer>> {
        self.frame.lock().unwrap().clone()
    }

    /// The next capture blocks its thread until the returned sender fires
    pub fn hold_next_capture(&self) -> Sender<()> {
        let (release, gate) = channel();
        *self.gate.lock().unwrap() = Some(gate);
        release
    }
}

impl FramebufferSource for TestSource {
    fn capture(&self) -> std::io::Result<Arc<Framebuffer>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.frame
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| std::io::Error::other("display went away"))
    }

    fn set_desktop_size(&self, _width: u16, _height: u16) -> ExtendedDesktopSizeStatus {
        self.resize
    }
}

pub fn blank(width: u16, height: u16) -> Framebuffer {
    Framebuffer::new("test", width, height, PixelFormat::rgb32()).unwrap()
}

pub type TestSession = VncServerSession<Input, Output>;

pub fn acceptor(input: &Input, output: &Output) -> VncAcceptor<Input, Output> {
    VncAcceptor::from_parts(input.clone(), output.clone())
}

/// A 3.8 client without authentication, just past ServerInit
pub async fn connected(source: Arc<TestSource>) -> (TestSession, Input, Output) {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .add_encoder(vncserver::VncEncoding::Zlib)
        .set_framebuffer_source(source)
        .build()
        .unwrap();
    session.negotiate().await.unwrap();
    output.take();
    (session, input, output)
}

pub fn string(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn update_request(incremental: bool, x: u16, y: u16, width: u16, height: u16) -> Vec<u8> {
    let mut msg = vec![3, incremental as u8];
    for v in [x, y, width, height] {
        msg.extend_from_slice(&v.to_be_bytes());
    }
    msg
}

pub fn set_encodings(encodings: &[i32]) -> Vec<u8> {
    let mut msg = vec![2, 0];
    msg.extend_from_slice(&(encodings.len() as u16).to_be_bytes());
    for e in encodings {
        msg.extend_from_slice(&e.to_be_bytes());
    }
    msg
}
