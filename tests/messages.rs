mod common;

use std::sync::Arc;

use common::{acceptor, blank, connected, set_encodings, string, update_request, Input, Output, TestSource};
use futures::{FutureExt, StreamExt};
use vncserver::{
    ExtendedDesktopSizeStatus, Framebuffer, PixelFormat, Rect, Screen, ServerEvent, SessionState,
    VncEncoding, VncError,
};

fn numbered(width: u16, height: u16) -> Framebuffer {
    let pixels = (0..width as u32 * height as u32)
        .flat_map(|i| i.to_le_bytes())
        .collect();
    Framebuffer::from_pixels("test", width, height, PixelFormat::rgb32(), pixels).unwrap()
}

fn raw_update(fb: &Framebuffer, rect: Rect) -> Vec<u8> {
    let mut out = vec![0, 0, 0, 1];
    for v in [rect.x, rect.y, rect.width, rect.height] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0, 0, 0]);
    let bpp = 4;
    for y in rect.y..rect.y + rect.height {
        let start = y as usize * fb.stride() + rect.x as usize * bpp;
        out.extend_from_slice(&fb.pixels()[start..start + rect.width as usize * bpp]);
    }
    out
}

#[tokio::test]
async fn set_encodings_picks_the_first_known_encoder() {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .set_framebuffer_source(TestSource::new(4, 2))
        .build()
        .unwrap();
    session.negotiate().await.unwrap();
    output.take();

    input.push(&set_encodings(&[0, 6]));
    session.handle_message().await.unwrap();
    assert_eq!(session.active_encoding().await, VncEncoding::Raw);

    let (mut session, input, output) = connected(TestSource::new(4, 2)).await;
    input.push(&set_encodings(&[6, 0]));
    session.handle_message().await.unwrap();
    assert_eq!(session.active_encoding().await, VncEncoding::Zlib);

    // nothing usable keeps the current encoder
    input.push(&set_encodings(&[16, -239]));
    session.handle_message().await.unwrap();
    assert_eq!(session.active_encoding().await, VncEncoding::Zlib);
    assert!(output.take().is_empty());
    assert_eq!(input.remaining(), 0);
}

#[tokio::test]
async fn full_update_in_raw() {
    let source = TestSource::new(4, 2);
    source.set_frame(Some(numbered(4, 2)));
    let (mut session, input, output) = connected(source).await;

    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    assert!(session.framebuffer_send_changes().await.unwrap());
    assert_eq!(output.take(), raw_update(&numbered(4, 2), Rect::new(0, 0, 4, 2)));

    // the request was answered
    assert!(!session.framebuffer_send_changes().await.unwrap());
    assert!(output.take().is_empty());
}

#[tokio::test]
async fn requests_are_clipped_to_the_framebuffer() {
    let source = TestSource::new(4, 2);
    source.set_frame(Some(numbered(4, 2)));
    let (mut session, input, output) = connected(source).await;

    input.push(&update_request(false, 2, 1, 100, 100));
    session.handle_message().await.unwrap();
    assert!(session.framebuffer_send_changes().await.unwrap());
    assert_eq!(output.take(), raw_update(&numbered(4, 2), Rect::new(2, 1, 2, 1)));
}

#[tokio::test]
async fn incremental_updates_only_carry_changes() {
    let source = TestSource::new(100, 70);
    let (mut session, input, output) = connected(source.clone()).await;

    input.push(&update_request(false, 0, 0, 100, 70));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    output.take();

    // nothing changed, still one (empty) update
    input.push(&update_request(true, 0, 0, 100, 70));
    session.handle_message().await.unwrap();
    assert!(session.framebuffer_send_changes().await.unwrap());
    assert_eq!(output.take(), [0, 0, 0, 0]);

    let mut frame = blank(100, 70);
    let offset = 65 * frame.stride() + 70 * 4;
    frame.pixels_mut()[offset] = 0xff;
    source.set_frame(Some(frame.clone()));

    input.push(&update_request(true, 0, 0, 100, 70));
    session.handle_message().await.unwrap();
    assert!(session.framebuffer_send_changes().await.unwrap());
    assert_eq!(output.take(), raw_update(&frame, Rect::new(64, 64, 36, 6)));
}

#[tokio::test]
async fn capture_failure_keeps_the_previous_framebuffer() {
    let source = TestSource::new(4, 2);
    let (mut session, input, output) = connected(source.clone()).await;
    let before = session.framebuffer().await.unwrap();

    source.set_frame(None);
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    assert!(!session.framebuffer_send_changes().await.unwrap());
    assert!(output.take().is_empty());
    assert!(Arc::ptr_eq(&before, &session.framebuffer().await.unwrap()));
    assert_eq!(session.state(), SessionState::Connected);

    // the request survives until a capture works
    source.set_frame(Some(blank(4, 2)));
    assert!(session.framebuffer_send_changes().await.unwrap());
    assert_eq!(output.take(), raw_update(&blank(4, 2), Rect::new(0, 0, 4, 2)));
}

#[tokio::test]
async fn manual_invalidation() {
    let (mut session, input, output) = connected(TestSource::new(8, 8)).await;
    input.push(&update_request(false, 0, 0, 8, 8));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    output.take();

    session
        .framebuffer_manual_invalidate(&[Rect::new(1, 1, 2, 1)])
        .await
        .unwrap();
    input.push(&update_request(true, 0, 0, 8, 8));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    assert_eq!(output.take(), raw_update(&blank(8, 8), Rect::new(1, 1, 2, 1)));

    // consumed by the update that covered it
    input.push(&update_request(true, 0, 0, 8, 8));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    assert_eq!(output.take(), [0, 0, 0, 0]);
}

#[tokio::test]
async fn argument_errors_do_no_io() {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .set_framebuffer_source(TestSource::new(4, 2))
        .set_max_cut_text(4)
        .build()
        .unwrap();
    session.negotiate().await.unwrap();
    output.take();

    assert!(matches!(
        session
            .framebuffer_manual_invalidate(&[Rect::new(0, 0, 1, 1), Rect::new(65000, 0, 1000, 1)])
            .await,
        Err(VncError::InvalidArgument(_))
    ));
    assert!(matches!(
        session.send_local_clipboard_change("hello").await,
        Err(VncError::InvalidArgument(_))
    ));
    assert!(output.take().is_empty());

    // nothing was marked by the rejected call
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    output.take();
    input.push(&update_request(true, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    assert_eq!(output.take(), [0, 0, 0, 0]);
}

#[tokio::test]
async fn local_clipboard_change() {
    let (session, _input, output) = connected(TestSource::new(4, 2)).await;
    session.send_local_clipboard_change("hello").await.unwrap();
    let mut expected = vec![3, 0, 0, 0];
    expected.extend(string("hello"));
    assert_eq!(output.take(), expected);
}

#[tokio::test]
async fn input_messages_become_events() {
    let (mut session, input, output) = connected(TestSource::new(4, 2)).await;
    let mut events = session.events().unwrap();

    input.push(&[4, 1, 0, 0, 0, 0, 0xff, 0x0d]);
    input.push(&[5, 0b101, 0, 10, 0, 20]);
    input.push(&[6, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    for _ in 0..3 {
        session.handle_message().await.unwrap();
    }
    assert_eq!(input.remaining(), 0);
    assert!(output.take().is_empty());

    assert_eq!(
        events.next().await,
        Some(ServerEvent::KeyEvent {
            down: true,
            key: 0xff0d
        })
    );
    assert_eq!(
        events.next().await,
        Some(ServerEvent::PointerEvent {
            x: 10,
            y: 20,
            button_mask: 0b101
        })
    );
    assert_eq!(
        events.next().await,
        Some(ServerEvent::ClientCutText("hi".to_string()))
    );
    assert!(events.next().now_or_never().is_none());
}

#[tokio::test]
async fn oversized_cut_text_closes_the_session() {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .set_framebuffer_source(TestSource::new(4, 2))
        .set_max_cut_text(4)
        .build()
        .unwrap();
    session.negotiate().await.unwrap();

    input.push(&[6, 0, 0, 0, 0, 0, 0, 5]);
    assert!(matches!(
        session.handle_message().await,
        Err(VncError::CutTextTooLong(5))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn client_pixel_format_is_used_for_updates() {
    let (mut session, input, output) = connected(TestSource::new(2, 1)).await;
    let mut events = session.events().unwrap();

    let mut msg = vec![0, 0, 0, 0];
    msg.extend_from_slice(&<[u8; 16]>::from(PixelFormat::rgb565()));
    input.push(&msg);
    session.handle_message().await.unwrap();
    assert_eq!(session.client_pixel_format().await, PixelFormat::rgb565());
    assert_eq!(
        events.next().await,
        Some(ServerEvent::SetPixelFormat(PixelFormat::rgb565()))
    );

    input.push(&update_request(false, 0, 0, 2, 1));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();
    assert_eq!(
        output.take(),
        [0, 0, 0, 1, 0, 0, 0, 0, 0, 2, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0]
    );
}

#[tokio::test]
async fn invalid_pixel_format_is_read_in_full() {
    let (mut session, input, _output) = connected(TestSource::new(2, 1)).await;
    let mut format = <[u8; 16]>::from(PixelFormat::rgb32());
    format[0] = 24;
    let mut msg = vec![0, 0, 0, 0];
    msg.extend_from_slice(&format);
    input.push(&msg);

    assert!(matches!(
        session.handle_message().await,
        Err(VncError::InvalidPixelFormat)
    ));
    assert_eq!(input.remaining(), 0);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn unknown_message_closes_the_session() {
    let (mut session, input, _output) = connected(TestSource::new(2, 1)).await;
    let mut events = session.events().unwrap();
    input.push(&[9]);
    assert!(matches!(
        session.handle_message().await,
        Err(VncError::UnknownMessage(9))
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(events.next().await, Some(ServerEvent::Disconnected));
    assert!(matches!(
        session.handle_message().await,
        Err(VncError::SessionClosed)
    ));
}

fn set_desktop_size(width: u16, height: u16) -> Vec<u8> {
    let mut msg = vec![251, 0];
    msg.extend_from_slice(&width.to_be_bytes());
    msg.extend_from_slice(&height.to_be_bytes());
    msg.extend_from_slice(&[1, 0]);
    msg.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
    msg.extend_from_slice(&width.to_be_bytes());
    msg.extend_from_slice(&height.to_be_bytes());
    msg.extend_from_slice(&[0, 0, 0, 0]);
    msg
}

#[tokio::test]
async fn set_desktop_size_reports_the_actual_size() {
    let source = TestSource::with_resize(100, 200, ExtendedDesktopSizeStatus::Success);
    let (mut session, input, output) = connected(source).await;
    let mut events = session.events().unwrap();

    input.push(&set_desktop_size(200, 300));
    session.handle_message().await.unwrap();
    assert_eq!(input.remaining(), 0);
    assert_eq!(
        output.take(),
        [
            0, 0, 0, 1, // FramebufferUpdate with one rect
            0, 1, 0, 0, 0, 100, 0, 200, 0xff, 0xff, 0xfe, 0xcc, // Client, Success
            1, 0, 0, 0, // one screen
            0, 0, 0, 0, 0, 0, 0, 0, 0, 100, 0, 200, 0, 0, 0, 0,
        ]
    );
    assert_eq!(
        events.next().await,
        Some(ServerEvent::SetDesktopSize {
            width: 200,
            height: 300,
            screens: vec![Screen {
                width: 200,
                height: 300,
                ..Default::default()
            }],
        })
    );
}

#[tokio::test]
async fn set_desktop_size_can_be_refused() {
    let (mut session, input, output) = connected(TestSource::new(4, 2)).await;
    input.push(&set_desktop_size(8, 8));
    session.handle_message().await.unwrap();
    let written = output.take();
    assert_eq!(&written[4..12], &[0, 1, 0, 1, 0, 4, 0, 2]);
}

#[tokio::test]
async fn server_side_resize_is_announced() {
    let source = TestSource::new(4, 2);
    let (mut session, input, output) = connected(source.clone()).await;
    input.push(&set_encodings(&[0, -308]));
    session.handle_message().await.unwrap();

    source.set_frame(Some(blank(2, 2)));
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();

    let mut expected = vec![
        0, 0, 0, 2, // resize and one raw rect
        0, 0, 0, 0, 0, 2, 0, 2, 0xff, 0xff, 0xfe, 0xcc, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2,
        0, 2, 0, 0, 0, 0,
    ];
    expected.extend(&raw_update(&blank(2, 2), Rect::new(0, 0, 2, 2))[4..]);
    assert_eq!(output.take(), expected);
}

#[tokio::test]
async fn zlib_updates_inflate_to_raw_pixels() {
    use flate2::{Decompress, FlushDecompress};

    let source = TestSource::new(16, 16);
    source.set_frame(Some(numbered(16, 16)));
    let (mut session, input, output) = connected(source).await;
    input.push(&set_encodings(&[6]));
    input.push(&update_request(false, 0, 0, 16, 16));
    session.handle_message().await.unwrap();
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();

    let written = output.take();
    assert_eq!(&written[..4], &[0, 0, 0, 1]);
    assert_eq!(&written[12..16], &[0, 0, 0, 6]);
    let len = u32::from_be_bytes(written[16..20].try_into().unwrap()) as usize;
    assert_eq!(written.len(), 20 + len);

    let mut pixels = Vec::with_capacity(16 * 16 * 4 + 64);
    Decompress::new(true)
        .decompress_vec(&written[20..], &mut pixels, FlushDecompress::Sync)
        .unwrap();
    assert_eq!(pixels, numbered(16, 16).pixels());
}

#[tokio::test]
async fn handles_work_from_other_tasks() {
    let (mut session, input, output) = connected(TestSource::new(4, 2)).await;
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();

    let handle = session.handle();
    let sent = tokio::spawn(async move { handle.framebuffer_send_changes().await })
        .await
        .unwrap()
        .unwrap();
    assert!(sent);
    assert_eq!(output.take(), raw_update(&blank(4, 2), Rect::new(0, 0, 4, 2)));

    let handle = session.handle();
    session.close().await;
    assert!(handle.is_closed().await);
    assert!(matches!(
        handle.send_local_clipboard_change("x").await,
        Err(VncError::SessionClosed)
    ));
    assert!(output.take().is_empty());
}

#[tokio::test]
async fn run_answers_full_requests_and_ends_on_eof() {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    input.push(&update_request(false, 0, 0, 2, 2));
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .set_framebuffer_source(TestSource::new(2, 2))
        .build()
        .unwrap();
    let mut events = session.events().unwrap();

    session.run().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(events.next().await, Some(ServerEvent::Disconnected));

    let written = output.take();
    let update = raw_update(&blank(2, 2), Rect::new(0, 0, 2, 2));
    assert!(written.ends_with(&update));
}

#[tokio::test]
async fn eof_inside_a_message_is_an_error() {
    let input = Input::new(b"RFB 003.008\n\x01\x01");
    input.push(&[4, 1, 0]);
    let output = Output::default();
    let mut session = acceptor(&input, &output)
        .set_framebuffer_source(TestSource::new(2, 2))
        .build()
        .unwrap();

    match session.run().await {
        Err(VncError::IoError(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected an io error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn tight_updates_fill_or_compress() {
    use flate2::{Decompress, FlushDecompress};

    let input = Input::new(b"RFB 003.008\n\x01\x01");
    let output = Output::default();
    let source = TestSource::new(4, 2);
    let mut session = acceptor(&input, &output)
        .add_encoder(VncEncoding::Tight)
        .set_framebuffer_source(source.clone())
        .build()
        .unwrap();
    session.negotiate().await.unwrap();
    output.take();

    input.push(&set_encodings(&[7]));
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    session.handle_message().await.unwrap();
    assert_eq!(session.active_encoding().await, VncEncoding::Tight);
    session.framebuffer_send_changes().await.unwrap();
    assert_eq!(
        output.take(),
        [0, 0, 0, 1, 0, 0, 0, 0, 0, 4, 0, 2, 0, 0, 0, 7, 0x80, 0, 0, 0]
    );

    let mut frame = blank(4, 2);
    frame.pixels_mut()[..4].copy_from_slice(&0x00ff_0000_u32.to_le_bytes());
    source.set_frame(Some(frame));
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();
    session.framebuffer_send_changes().await.unwrap();

    let written = output.take();
    assert_eq!(&written[..16], &[0, 0, 0, 1, 0, 0, 0, 0, 0, 4, 0, 2, 0, 0, 0, 7]);
    assert_eq!(written[16], 0x00);
    let len = written[17] as usize;
    assert!(len < 128);
    assert_eq!(written.len(), 18 + len);

    let mut pixels = Vec::with_capacity(64);
    Decompress::new(true)
        .decompress_vec(&written[18..], &mut pixels, FlushDecompress::Sync)
        .unwrap();
    let mut expected = vec![0xff, 0, 0];
    expected.resize(8 * 3, 0);
    assert_eq!(pixels, expected);
}

#[tokio::test]
async fn slow_capture_does_not_stall_the_reader() {
    use std::sync::atomic::Ordering;

    let source = TestSource::new(4, 2);
    let (mut session, input, output) = connected(source.clone()).await;
    let mut events = session.events().unwrap();
    input.push(&update_request(false, 0, 0, 4, 2));
    session.handle_message().await.unwrap();

    let captures = source.captures.load(Ordering::SeqCst);
    let release = source.hold_next_capture();
    let handle = session.handle();
    let update = tokio::spawn(async move { handle.framebuffer_send_changes().await });
    while source.captures.load(Ordering::SeqCst) == captures {
        tokio::task::yield_now().await;
    }

    // the capture is parked, client messages are still read
    input.push(&[4, 1, 0, 0, 0, 0, 0, 0x41]);
    session.handle_message().await.unwrap();
    assert_eq!(
        events.next().await,
        Some(ServerEvent::KeyEvent {
            down: true,
            key: 0x41
        })
    );
    assert!(output.take().is_empty());

    release.send(()).unwrap();
    assert!(update.await.unwrap().unwrap());
    assert_eq!(output.take(), raw_update(&blank(4, 2), Rect::new(0, 0, 4, 2)));
}
