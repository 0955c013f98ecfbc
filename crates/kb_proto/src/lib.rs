//! kb_proto — Wire types and payload codec for the Keybridge relay queue
//!
//! Everything that crosses the external relay channel is described here.
//!
//! # Modules
//! - `packet` — scheme and direction tags carried by every queued packet
//! - `api`    — import/export entry contracts and the key-delivery marker
//! - `wire`   — payload encodings (`<ciphertext>:::<iv-hex>`, base64 rsa)

pub mod api;
pub mod packet;
pub mod wire;

pub use api::{ExportEntry, ImportEntry, KeyDelivery};
pub use packet::{Direction, Scheme};
pub use wire::WireError;
