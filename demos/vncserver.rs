use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::Level;
use vncserver::{
    ExtendedDesktopSizeStatus, Framebuffer, FramebufferSource, PixelFormat, ServerEvent,
    VncAcceptor, VncEncoding,
};

#[derive(FromArgs)]
#[argh(description = "A VNC server that serves an animated test pattern")]
struct Args {
    #[argh(option, short = 'l')]
    #[argh(default = "String::from(\"127.0.0.1:5900\")")]
    #[argh(description = "address to listen on")]
    listen: String,

    #[argh(option, short = 'p')]
    #[argh(description = "password for vnc authentication")]
    password: Option<String>,

    #[argh(option, default = "800")]
    #[argh(description = "desktop width")]
    width: u16,

    #[argh(option, default = "600")]
    #[argh(description = "desktop height")]
    height: u16,

    #[argh(option, default = "40")]
    #[argh(description = "milliseconds between screen updates")]
    interval: u64,
}

/// Colour bars scrolling sideways, one step per capture
struct TestPattern {
    width: AtomicU16,
    height: AtomicU16,
    frame: AtomicU32,
}

impl TestPattern {
    fn new(width: u16, height: u16) -> Self {
        Self {
            width: AtomicU16::new(width),
            height: AtomicU16::new(height),
            frame: AtomicU32::new(0),
        }
    }
}

impl FramebufferSource for TestPattern {
    fn capture(&self) -> std::io::Result<Arc<Framebuffer>> {
        let width = self.width.load(Ordering::Relaxed);
        let height = self.height.load(Ordering::Relaxed);
        let frame = self.frame.fetch_add(1, Ordering::Relaxed);

        let mut fb = Framebuffer::new("vncserver-rs", width, height, PixelFormat::rgb32())
            .map_err(std::io::Error::other)?;
        let stride = fb.stride();
        for (y, row) in fb.pixels_mut().chunks_exact_mut(stride).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let bar = ((x as u32 + frame * 4) / 64) % 8;
                let shade = (y * 255 / height.max(1) as usize) as u8;
                // blue, green, red, unused
                px[0] = if bar & 1 != 0 { shade } else { 0 };
                px[1] = if bar & 2 != 0 { shade } else { 0 };
                px[2] = if bar & 4 != 0 { shade } else { 0 };
            }
        }
        Ok(Arc::new(fb))
    }

    fn set_desktop_size(&self, width: u16, height: u16) -> ExtendedDesktopSizeStatus {
        if width == 0 || height == 0 {
            return ExtendedDesktopSizeStatus::InvalidLayout;
        }
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
        ExtendedDesktopSizeStatus::Success
    }
}

async fn serve(tcp: TcpStream, args: Arc<Args>) -> Result<()> {
    let mut acceptor = VncAcceptor::new(tcp)
        .add_encoder(VncEncoding::Tight)
        .add_encoder(VncEncoding::Zlib)
        .set_framebuffer_source(Arc::new(TestPattern::new(args.width, args.height)));
    if let Some(password) = &args.password {
        acceptor = acceptor.set_password(password.as_str());
    }
    let mut session = acceptor.build()?;

    let mut events = session.events().expect("events are taken once");
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                ServerEvent::Disconnected => break,
                ServerEvent::ClientCutText(text) => tracing::info!("Client clipboard: {}", text),
                event => tracing::debug!("{:?}", event),
            }
        }
    });

    let handle = session.handle();
    let interval = Duration::from_millis(args.interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = handle.framebuffer_send_changes().await {
                tracing::debug!("Update loop stopped: {}", e);
                break;
            }
        }
    });

    session.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Create tracing subscriber
    let level = if cfg!(debug_assertions) {
        Level::TRACE
    } else {
        Level::INFO
    };

    let subscriber = tracing_subscriber::fmt()
        .pretty()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to setting default subscriber");

    let args: Arc<Args> = Arc::new(argh::from_env());
    let listener = TcpListener::bind(&args.listen).await?;
    println!("Serving VNC on {}", args.listen);

    loop {
        let (tcp, peer) = listener.accept().await?;
        tracing::info!("Connection from {}", peer);
        let args = Arc::clone(&args);
        tokio::spawn(async move {
            if let Err(e) = serve(tcp, args).await {
                tracing::error!("{}: {}", peer, e);
            }
        });
    }
}
