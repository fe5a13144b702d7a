//! The DES flavour of VNC authentication
//!
//! The password is cut or NUL padded to 8 bytes and the bits of every byte
//! are mirrored before it is used as the DES key.

use ::des::cipher::generic_array::GenericArray;
use ::des::cipher::{BlockEncrypt, KeyInit};
use ::des::Des;

use crate::VncError;

pub const CHALLENGE_LEN: usize = 16;

pub(crate) fn password_key(password: &str) -> [u8; 8] {
    let credential_len = password.len();
    let mut key = [0u8; 8];
    for (i, key_i) in key.iter_mut().enumerate() {
        let c = if i < credential_len {
            password.as_bytes()[i]
        } else {
            0
        };
        *key_i = c.reverse_bits();
    }
    key
}

/// The response a client holding `password` sends for `challenge`
pub fn encrypt(challenge: &[u8; CHALLENGE_LEN], password: &str) -> Result<[u8; CHALLENGE_LEN], VncError> {
    let key = password_key(password);
    let cipher = Des::new_from_slice(&key)
        .map_err(|_| VncError::General("Invalid DES key length".to_string()))?;

    let mut response = *challenge;
    for block in response.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(response)
}
