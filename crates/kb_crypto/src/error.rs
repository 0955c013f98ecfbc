use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("PEM error: {0}")]
    Pem(String),

    #[error("Raw RSA encryption failed: {0}")]
    RsaEncrypt(String),

    #[error("Raw RSA decryption failed")]
    RsaDecrypt,

    #[error("AES encryption failed")]
    AesEncrypt,

    #[error("AES decryption failed")]
    AesDecrypt,

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
