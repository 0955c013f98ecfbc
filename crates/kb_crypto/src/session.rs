//! AES session cipher.
//!
//! A bootstrapped (identity, application) pair shares a 32-byte AES key,
//! delivered hex-encoded inside an RSA bootstrap packet. Payloads are
//! AES-256-CBC with PKCS#7 padding and a fresh random 16-byte IV per call;
//! the IV travels next to the ciphertext in the wire payload.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const SESSION_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// 32-byte AES-256 session key. Hex-encoded at rest; zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Fresh random key. The external side generates these in production;
    /// local generation exists for tooling and tests.
    pub fn generate() -> SessionKey {
        let mut bytes = [0u8; SESSION_KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SessionKey(bytes)
    }

    /// Parse the hex form used at rest and in key-delivery payloads. Only
    /// whole 32-byte keys are accepted: a session key is rotated as a unit
    /// or not at all.
    pub fn from_hex(hex_key: &str) -> Result<SessionKey, CryptoError> {
        let bytes = hex::decode(hex_key)?;
        let bytes: [u8; SESSION_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!(
                "session key must be {SESSION_KEY_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(SessionKey(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Encrypt with a caller-supplied IV. Exposed for deterministic cases in
/// tests; production callers want `encrypt`.
pub fn encrypt_with_iv(
    key: &SessionKey,
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let enc = Aes256CbcEnc::new_from_slices(&key.0, iv).map_err(|_| CryptoError::AesEncrypt)?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Encrypt under a fresh random IV; returns (ciphertext, iv).
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; IV_LEN]), CryptoError> {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    let ciphertext = encrypt_with_iv(key, &iv, plaintext)?;
    Ok((ciphertext, iv))
}

/// Decrypt. CBC provides no authentication, so a wrong key usually (not
/// always) surfaces as a padding error; callers treat any failure as
/// "undecryptable, retry later".
pub fn decrypt(key: &SessionKey, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let dec = Aes256CbcDec::new_from_slices(&key.0, iv).map_err(|_| CryptoError::AesDecrypt)?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::AesDecrypt)
}
