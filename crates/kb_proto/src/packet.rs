//! Packet tags: encryption scheme and flow direction.

use serde::{Deserialize, Serialize};

/// Encryption scheme of a queued packet.
///
/// Transitions are forward-only: a packet enters the store as `Rsa` or `Aes`
/// (or already `Plaintext`) and is only deleted once its payload has been
/// reduced to plaintext and consumed. A failed decrypt leaves the stored tag
/// untouched so the packet is retried on a later call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Asymmetric bootstrap packet (session-key delivery).
    Rsa,
    /// Symmetric session packet.
    Aes,
    /// Resolved or never-encrypted packet.
    Plaintext,
}

impl Scheme {
    /// Stored column tag.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Scheme::Rsa => "rsa",
            Scheme::Aes => "aes",
            Scheme::Plaintext => "plaintext",
        }
    }

    /// Parse a stored tag. An unrecognised tag is treated as plaintext by
    /// policy: the payload is surfaced as-is rather than dropped.
    pub fn from_tag(tag: &str) -> Scheme {
        match tag {
            "rsa" => Scheme::Rsa,
            "aes" => Scheme::Aes,
            _ => Scheme::Plaintext,
        }
    }
}

/// Flow direction of a queued packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Destined for VPN-side retrieval.
    ToInternal,
    /// Destined for export to the external relay channel.
    ToExternal,
}

impl Direction {
    /// Stored column tag.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Direction::ToInternal => "to-internal",
            Direction::ToExternal => "to-external",
        }
    }
}
