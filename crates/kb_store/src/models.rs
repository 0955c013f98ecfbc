//! Row models — these map to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One VPN-side identity and its RSA pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdentityRow {
    /// Stable, externally assigned id.
    pub identity_id: i64,
    /// PKCS#8 PEM public key.
    pub rsa_public_key: String,
    /// PKCS#8 PEM private key — secret material, never serialised.
    #[serde(skip_serializing, default)]
    pub rsa_private_key: String,
    pub created_at: DateTime<Utc>,
}

/// Pseudonymous binding of one identity to one application.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AppIdentityRow {
    pub id: i64,
    pub identity_id: i64,
    pub application: String,
    /// Opaque token the external side addresses this user by. Generated
    /// once, never reused, immutable after creation.
    pub external_user_id: String,
    /// Hex-encoded 32-byte AES session key — secret, NULL until the first
    /// bootstrap packet is consumed. Never serialised.
    #[serde(skip_serializing, default)]
    pub session_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One queued, possibly-encrypted message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PacketRow {
    pub packet_id: i64,
    pub identity_id: i64,
    pub application: String,
    /// Stored scheme tag; parse with `kb_proto::Scheme::from_tag`.
    pub scheme: String,
    pub direction: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// A dequeued to-external packet joined with its pseudonymous identity.
/// The internal identity id is already gone by the time this exists.
#[derive(Debug, Clone)]
pub struct ExportedPacket {
    pub external_user_id: String,
    pub scheme: String,
    pub direction: String,
    pub payload: String,
}
