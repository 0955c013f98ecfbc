//! kb_gateway — Keybridge relay orchestration
//!
//! Composes the store, crypto and wire crates into the secure relay queue.
//!
//! # Modules
//! - `keystore`     — RSA pair per identity + sequential batch provisioning
//! - `identity_map` — pseudonymous bindings and session-key rotation
//! - `pipeline`     — stateless packet decryption and its encrypt counterpart
//! - `gateway`      — import / export / retrieve / submit orchestration
//! - `settings`     — embedder configuration
//! - `relay`        — wiring (explicit dependency injection, no globals)

pub mod error;
pub mod gateway;
pub mod identity_map;
pub mod keystore;
pub mod pipeline;
pub mod relay;
pub mod settings;

pub use error::GatewayError;
pub use gateway::RelayGateway;
pub use identity_map::IdentityMap;
pub use keystore::{KeyStore, WorkforceDirectory};
pub use relay::Relay;
pub use settings::RelaySettings;
