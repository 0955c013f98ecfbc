//! kb_crypto — Keybridge relay cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Secret key material is zeroized on drop and never serialised.
//! - Algorithms are fixed by the relay wire protocol: raw (no-padding)
//!   RSA-2048 for session-key bootstrap, AES-256-CBC for session payloads.
//!   Interoperability with the external side leaves no room to upgrade one
//!   end alone.
//!
//! # Module layout
//! - `keypair` — RSA identity key pairs + the `KeyPairGenerator` capability
//! - `session` — AES session keys and the payload cipher
//! - `error`   — unified error type

pub mod error;
pub mod keypair;
pub mod session;

pub use error::CryptoError;
pub use keypair::{KeyPairGenerator, Rsa2048Generator, RsaKeyPair};
pub use session::SessionKey;
