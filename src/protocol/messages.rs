use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire;
use crate::{PixelFormat, Rect, Screen, VncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientMsgType {
    SetPixelFormat = 0,
    SetEncodings = 2,
    FramebufferUpdateRequest = 3,
    KeyEvent = 4,
    PointerEvent = 5,
    ClientCutText = 6,
    SetDesktopSize = 251,
}

impl TryFrom<u8> for ClientMsgType {
    type Error = VncError;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        match num {
            0 => Ok(ClientMsgType::SetPixelFormat),
            2 => Ok(ClientMsgType::SetEncodings),
            3 => Ok(ClientMsgType::FramebufferUpdateRequest),
            4 => Ok(ClientMsgType::KeyEvent),
            5 => Ok(ClientMsgType::PointerEvent),
            6 => Ok(ClientMsgType::ClientCutText),
            251 => Ok(ClientMsgType::SetDesktopSize),
            invalid => Err(VncError::UnknownMessage(invalid)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerMsgType {
    FramebufferUpdate = 0,
    SetColorMapEntries = 1,
    Bell = 2,
    ServerCutText = 3,
}

impl From<ServerMsgType> for u8 {
    fn from(e: ServerMsgType) -> Self {
        e as u8
    }
}

/// A pending request for pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub rect: Rect,
}

impl FramebufferUpdateRequest {
    pub fn new(incremental: bool, rect: Rect) -> Self {
        Self { incremental, rect }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    SetPixelFormat(PixelFormat),
    SetEncodings(Vec<i32>),
    FramebufferUpdateRequest(FramebufferUpdateRequest),
    KeyEvent { down: bool, key: u32 },
    PointerEvent { button_mask: u8, x: u16, y: u16 },
    ClientCutText(String),
    SetDesktopSize {
        width: u16,
        height: u16,
        screens: Vec<Screen>,
    },
}

impl ClientMsg {
    /// Read the body of a message whose type byte was `msg_type`
    ///
    /// A body that fails validation is still read in full so the stream is
    /// never left in the middle of a message.
    pub(crate) async fn read_body<S>(
        msg_type: u8,
        reader: &mut S,
        max_cut_text: usize,
    ) -> Result<Self, VncError>
    where
        S: AsyncRead + Unpin,
    {
        let msg_type: ClientMsgType = msg_type.try_into()?;
        tracing::trace!("Client message {:?}", msg_type);

        match msg_type {
            ClientMsgType::SetPixelFormat => {
                // +--------------+--------------+--------------+
                // | No. of bytes | Type [Value] | Description  |
                // +--------------+--------------+--------------+
                // | 1            | U8 [0]       | message-type |
                // | 3            |              | padding      |
                // | 16           | PIXEL_FORMAT | pixel-format |
                // +--------------+--------------+--------------+
                wire::skip(reader, 3).await?;
                let pf = PixelFormat::read(reader).await?;
                pf.validate()?;
                Ok(ClientMsg::SetPixelFormat(pf))
            }
            ClientMsgType::SetEncodings => {
                // +--------------+--------------+---------------------+
                // | No. of bytes | Type [Value] | Description         |
                // +--------------+--------------+---------------------+
                // | 1            | U8 [2]       | message-type        |
                // | 1            |              | padding             |
                // | 2            | U16          | number-of-encodings |
                // +--------------+--------------+---------------------+
                wire::skip(reader, 1).await?;
                let count = reader.read_u16().await?;
                let mut encodings = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    encodings.push(reader.read_i32().await?);
                }
                Ok(ClientMsg::SetEncodings(encodings))
            }
            ClientMsgType::FramebufferUpdateRequest => {
                let incremental = reader.read_u8().await? != 0;
                let rect = Rect::read(reader).await?;
                Ok(ClientMsg::FramebufferUpdateRequest(
                    FramebufferUpdateRequest::new(incremental, rect),
                ))
            }
            ClientMsgType::KeyEvent => {
                let down = reader.read_u8().await? != 0;
                wire::skip(reader, 2).await?;
                let key = reader.read_u32().await?;
                Ok(ClientMsg::KeyEvent { down, key })
            }
            ClientMsgType::PointerEvent => {
                let button_mask = reader.read_u8().await?;
                let x = reader.read_u16().await?;
                let y = reader.read_u16().await?;
                Ok(ClientMsg::PointerEvent { button_mask, x, y })
            }
            ClientMsgType::ClientCutText => {
                wire::skip(reader, 3).await?;
                let text = wire::read_string(reader, max_cut_text).await?;
                Ok(ClientMsg::ClientCutText(text))
            }
            ClientMsgType::SetDesktopSize => {
                // +--------------+--------------+-------------------+
                // | No. of bytes | Type [Value] | Description       |
                // +--------------+--------------+-------------------+
                // | 1            | U8 [251]     | message-type      |
                // | 1            |              | padding           |
                // | 2            | U16          | width             |
                // | 2            | U16          | height            |
                // | 1            | U8           | number-of-screens |
                // | 1            |              | padding           |
                // +--------------+--------------+-------------------+
                wire::skip(reader, 1).await?;
                let width = reader.read_u16().await?;
                let height = reader.read_u16().await?;
                let count = reader.read_u8().await?;
                wire::skip(reader, 1).await?;
                let mut screens = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    screens.push(Screen::read(reader).await?);
                }
                Ok(ClientMsg::SetDesktopSize {
                    width,
                    height,
                    screens,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMsg {
    /// Message header, `rects` rectangles are expected to follow
    FramebufferUpdate { rects: u16 },
    ServerCutText(String),
}

impl ServerMsg {
    pub(crate) fn put<B: BufMut>(&self, buf: &mut B) {
        match self {
            ServerMsg::FramebufferUpdate { rects } => {
                buf.put_u8(ServerMsgType::FramebufferUpdate.into());
                buf.put_u8(0);
                buf.put_u16(*rects);
            }
            ServerMsg::ServerCutText(text) => {
                buf.put_u8(ServerMsgType::ServerCutText.into());
                buf.put_bytes(0, 3);
                wire::put_string(buf, text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(reader: &mut &[u8], max_cut_text: usize) -> Result<ClientMsg, VncError> {
        let msg_type = reader.read_u8().await?;
        ClientMsg::read_body(msg_type, reader, max_cut_text).await
    }

    #[tokio::test]
    async fn set_pixel_format_consumed_even_when_invalid() {
        let mut input = vec![0_u8, 0, 0, 0];
        let mut bad: [u8; 16] = PixelFormat::rgb32().into();
        bad[0] = 24;
        input.extend_from_slice(&bad);
        input.push(0xaa);

        let mut reader = &input[..];
        assert!(matches!(
            read(&mut reader, 16).await,
            Err(VncError::InvalidPixelFormat)
        ));
        assert_eq!(reader, &[0xaa]);
    }

    #[tokio::test]
    async fn key_and_pointer_events() {
        let input = [4_u8, 1, 0, 0, 0, 0, 0xff, 0x0d, 5, 0x03, 0, 10, 0, 20];
        let mut reader = &input[..];
        assert_eq!(
            read(&mut reader, 16).await.unwrap(),
            ClientMsg::KeyEvent {
                down: true,
                key: 0xff0d
            }
        );
        assert_eq!(
            read(&mut reader, 16).await.unwrap(),
            ClientMsg::PointerEvent {
                button_mask: 3,
                x: 10,
                y: 20
            }
        );
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn unknown_message_type() {
        let input = [150_u8];
        let mut reader = &input[..];
        assert!(matches!(
            read(&mut reader, 16).await,
            Err(VncError::UnknownMessage(150))
        ));
    }

    #[test]
    fn server_cut_text_layout() {
        let mut buf = Vec::new();
        ServerMsg::ServerCutText("hi".to_string()).put(&mut buf);
        assert_eq!(buf, [3, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    }
}
