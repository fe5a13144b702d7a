use crate::protocol::security::des::{self, CHALLENGE_LEN};
use crate::protocol::security::AuthResult;
use crate::VncError;
use rand::{rngs::OsRng, RngCore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One round of VNC password authentication
pub(super) struct AuthHelper {
    challenge: [u8; CHALLENGE_LEN],
    expected: Option<[u8; CHALLENGE_LEN]>,
}

impl AuthHelper {
    /// A fresh random challenge, without a password every response is wrong
    pub(super) fn new(password: Option<&str>) -> Result<Self, VncError> {
        let mut challenge = [0; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut challenge);
        let expected = password
            .map(|password| des::encrypt(&challenge, password))
            .transpose()?;
        Ok(Self {
            challenge,
            expected,
        })
    }

    pub(super) async fn write<S>(&self, writer: &mut S) -> Result<(), VncError>
    where
        S: AsyncWrite + Unpin,
    {
        writer.write_all(&self.challenge).await?;
        writer.flush().await?;
        Ok(())
    }

    pub(super) async fn finish<S>(self, reader: &mut S) -> Result<AuthResult, VncError>
    where
        S: AsyncRead + Unpin,
    {
        let mut response = [0; CHALLENGE_LEN];
        reader.read_exact(&mut response).await?;

        let Some(expected) = self.expected else {
            return Ok(AuthResult::Failed);
        };
        let diff = expected
            .iter()
            .zip(response.iter())
            .fold(0, |acc, (a, b)| acc | (a ^ b));
        Ok(if diff == 0 {
            AuthResult::Ok
        } else {
            AuthResult::Failed
        })
    }
}
