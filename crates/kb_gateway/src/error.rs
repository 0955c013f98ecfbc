use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid identity id: {0}")]
    InvalidIdentity(i64),

    #[error("No application identity for identity {identity_id} in {application}")]
    UnknownApplicationUser { application: String, identity_id: i64 },

    #[error("Identity {identity_id} has no session key yet for {application}")]
    SessionNotBootstrapped { application: String, identity_id: i64 },

    #[error("Workforce directory error: {0}")]
    Directory(String),

    #[error("Store error: {0}")]
    Store(#[from] kb_store::StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] kb_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
