use crate::protocol::wire;
use crate::VncError;
use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityType {
    Invalid = 0,
    None = 1,
    VncAuth = 2,
    RA2 = 5,
    RA2ne = 6,
    Tight = 16,
    Ultra = 17,
    Tls = 18,
    VeNCrypt = 19,
    GtkVncSasl = 20,
    Md5Hash = 21,
    ColinDeanXvp = 22,
    RA2_256 = 129,
}

impl TryFrom<u8> for SecurityType {
    type Error = VncError;
    fn try_from(num: u8) -> Result<Self, Self::Error> {
        match num {
            0 => Ok(SecurityType::Invalid),
            1 => Ok(SecurityType::None),
            2 => Ok(SecurityType::VncAuth),
            5 => Ok(SecurityType::RA2),
            6 => Ok(SecurityType::RA2ne),
            16 => Ok(SecurityType::Tight),
            17 => Ok(SecurityType::Ultra),
            18 => Ok(SecurityType::Tls),
            19 => Ok(SecurityType::VeNCrypt),
            20 => Ok(SecurityType::GtkVncSasl),
            21 => Ok(SecurityType::Md5Hash),
            22 => Ok(SecurityType::ColinDeanXvp),
            129 => Ok(SecurityType::RA2_256),
            invalid => Err(VncError::UnsupportedSecurityType(invalid)),
        }
    }
}

impl From<SecurityType> for u8 {
    fn from(e: SecurityType) -> Self {
        e as u8
    }
}

impl SecurityType {
    /// Methods this server is able to run to completion
    pub fn is_supported(&self) -> bool {
        matches!(self, SecurityType::None | SecurityType::VncAuth)
    }

    /// Offer `types` to a 3.8 client
    ///
    /// +--------------------------+-------------+--------------------------+
    /// | No. of bytes             | Type        | Description              |
    /// |                          | [Value]     |                          |
    /// +--------------------------+-------------+--------------------------+
    /// | 1                        | U8          | number-of-security-types |
    /// | number-of-security-types | U8 array    | security-types           |
    /// +--------------------------+-------------+--------------------------+
    pub(crate) async fn write_list<S>(types: &[SecurityType], writer: &mut S) -> Result<(), VncError>
    where
        S: AsyncWrite + Unpin,
    {
        let count = u8::try_from(types.len())
            .map_err(|_| VncError::InvalidArgument("at most 255 security types can be offered"))?;
        let mut buf = Vec::with_capacity(1 + types.len());
        buf.put_u8(count);
        buf.extend(types.iter().map(|t| u8::from(*t)));
        writer.write_all(&buf).await?;
        writer.flush().await?;
        tracing::trace!("Offered security types: {:?}", types);
        Ok(())
    }

    /// A zero length list followed by the reason, the connection is over after this
    pub(crate) async fn write_empty_list<S>(reason: &str, writer: &mut S) -> Result<(), VncError>
    where
        S: AsyncWrite + Unpin,
    {
        writer.write_u8(0).await?;
        wire::write_string(writer, reason).await?;
        writer.flush().await?;
        Ok(())
    }

    /// RFB 3.3 has the server decide and send a single word
    pub(crate) async fn write_legacy<S>(&self, writer: &mut S) -> Result<(), VncError>
    where
        S: AsyncWrite + Unpin,
    {
        writer.write_u32(u8::from(*self) as u32).await?;
        writer.flush().await?;
        Ok(())
    }

    /// The raw byte the client answered with, it may not name any known type
    pub(crate) async fn read_choice<S>(reader: &mut S) -> Result<u8, VncError>
    where
        S: AsyncRead + Unpin,
    {
        Ok(reader.read_u8().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AuthResult {
    Ok = 0,
    Failed = 1,
}

impl From<AuthResult> for u32 {
    fn from(e: AuthResult) -> Self {
        e as u32
    }
}

impl AuthResult {
    /// SecurityResult, a failure carries a reason string unless `reason` is `None`
    pub(crate) async fn write<S>(self, reason: Option<&str>, writer: &mut S) -> Result<(), VncError>
    where
        S: AsyncWrite + Unpin,
    {
        let mut buf = Vec::with_capacity(8);
        buf.put_u32(self.into());
        if let (AuthResult::Failed, Some(reason)) = (self, reason) {
            wire::put_string(&mut buf, reason);
        }
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}
