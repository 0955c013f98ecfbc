//! Payload wire encodings.
//!
//! aes-scheme payload:
//!   `<base64 ciphertext>:::<lowercase hex IV>`
//! Ciphertext uses the standard base64 alphabet with padding; the IV is 16
//! bytes. Neither encoding can contain the separator.
//!
//! rsa-scheme payload: standard base64 of the raw RSA ciphertext. No
//! padding scheme is applied inside the ciphertext — the encrypting side
//! must match exactly, there is no negotiation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

const SEPARATOR: &str = ":::";

/// IV length fixed by the wire format.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Missing ':::' separator in aes payload")]
    MissingSeparator,

    #[error("Bad IV: {0}")]
    BadIv(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

/// Assemble an aes wire payload from ciphertext and IV.
pub fn encode_aes_payload(ciphertext: &[u8], iv: &[u8; IV_LEN]) -> String {
    format!("{}{SEPARATOR}{}", STANDARD.encode(ciphertext), hex::encode(iv))
}

/// Split an aes wire payload into (ciphertext, IV).
pub fn split_aes_payload(payload: &str) -> Result<(Vec<u8>, [u8; IV_LEN]), WireError> {
    let (ciphertext_b64, iv_hex) = payload
        .split_once(SEPARATOR)
        .ok_or(WireError::MissingSeparator)?;
    let ciphertext = STANDARD.decode(ciphertext_b64)?;
    let iv_bytes = hex::decode(iv_hex).map_err(|e| WireError::BadIv(e.to_string()))?;
    let iv: [u8; IV_LEN] = iv_bytes
        .try_into()
        .map_err(|b: Vec<u8>| WireError::BadIv(format!("expected {IV_LEN} bytes, got {}", b.len())))?;
    Ok((ciphertext, iv))
}

/// Encode raw RSA ciphertext for the wire.
pub fn encode_rsa_payload(ciphertext: &[u8]) -> String {
    STANDARD.encode(ciphertext)
}

/// Decode an rsa wire payload. Stray whitespace is tolerated.
pub fn decode_rsa_payload(payload: &str) -> Result<Vec<u8>, WireError> {
    Ok(STANDARD.decode(payload.trim())?)
}
