//! kb_store — Durable relay queue and identity tables over SQLite
//!
//! # Storage strategy
//! SQLite via sqlx, WAL journal. Queue payloads are stored exactly as they
//! arrived — still encrypted for rsa/aes schemes — so the store never holds
//! decrypted message content at rest. Key-material columns
//! (`rsa_private_key`, `session_key`) are secret: the row models exclude
//! them from serialisation.
//!
//! # Repositories
//! Cross-entity lookups (export join, provisioning set-difference) are
//! explicit query methods on [`Store`], not string-built SQL at call sites.
//!
//! # Migration
//! sqlx migrations in `migrations/` run on open.

pub mod db;
pub mod error;
pub mod models;

mod app_identities;
mod identities;
mod packets;

pub use db::Store;
pub use error::StoreError;
pub use packets::SchemeFilter;
