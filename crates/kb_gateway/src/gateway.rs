//! Relay orchestration: import, export, retrieval, submission.

use serde_json::Value;
use tracing::{debug, warn};

use kb_crypto::SessionKey;
use kb_proto::{Direction, ExportEntry, ImportEntry, KeyDelivery, Scheme};
use kb_store::{SchemeFilter, Store};

use crate::{
    error::GatewayError,
    identity_map::IdentityMap,
    keystore::KeyStore,
    pipeline::{self, Decrypted, KeyMaterial},
};

/// Orchestrates the relay queue. Operations on different
/// (identity, application) pairs are independent and may run in parallel;
/// callers SHOULD serialise `retrieve_for` per pair — a concurrent pair of
/// calls cannot corrupt the store (deletes are idempotent) but may deliver
/// the same result twice.
#[derive(Clone)]
pub struct RelayGateway {
    store: Store,
    keys: KeyStore,
    identities: IdentityMap,
}

impl RelayGateway {
    pub fn new(store: Store, keys: KeyStore, identities: IdentityMap) -> Self {
        Self {
            store,
            keys,
            identities,
        }
    }

    /// Accept a batch from the external channel. Entries addressed to an
    /// unknown pseudonymous id are logged and skipped; one bad record never
    /// fails the batch. Payloads are enqueued still encrypted — decryption
    /// waits for retrieval. Returns the number of packets enqueued.
    pub async fn import(
        &self,
        application: &str,
        entries: &[ImportEntry],
    ) -> Result<usize, GatewayError> {
        let mut imported = 0;
        for entry in entries {
            let Some(identity_id) = self
                .identities
                .lookup_by_external_id(application, &entry.external_user_id)
                .await?
            else {
                warn!(
                    application,
                    external_user_id = %entry.external_user_id,
                    "no local match for imported packet, skipping"
                );
                continue;
            };
            self.store
                .enqueue_packet(
                    identity_id,
                    application,
                    entry.scheme,
                    Direction::ToInternal,
                    &entry.payload,
                )
                .await?;
            imported += 1;
        }
        Ok(imported)
    }

    /// Drain the to-external queue for `application`, exactly once per
    /// packet from the store's perspective. Internal identity ids are
    /// replaced by pseudonymous ones before anything leaves this call.
    pub async fn export(&self, application: &str) -> Result<Vec<ExportEntry>, GatewayError> {
        let packets = self.store.dequeue_for_export(application).await?;
        let unmapped = self.store.unmapped_export_count(application).await?;
        if unmapped > 0 {
            warn!(
                application,
                unmapped, "to-external packets without an application identity left queued"
            );
        }
        Ok(packets
            .into_iter()
            .map(|p| ExportEntry {
                external_user_id: p.external_user_id,
                scheme: Scheme::from_tag(&p.scheme),
                direction: Direction::ToExternal,
                payload: p.payload,
            })
            .collect())
    }

    /// Fetch, decrypt and consume pending to-internal packets for one
    /// (application, identity) pair.
    ///
    /// Two phases, rsa first: that is how the session key is delivered, so
    /// a bootstrap packet and the first messages encrypted under its key
    /// can be consumed in a single call. Packets that decrypt contribute
    /// their values (arrays are flattened) and are deleted; packets that do
    /// not stay queued at their original scheme for a later retry.
    pub async fn retrieve_for(
        &self,
        application: &str,
        identity_id: i64,
    ) -> Result<Vec<Value>, GatewayError> {
        let mut results = Vec::new();
        let mut consumed = Vec::new();

        // Phase 1: rsa bootstrap packets.
        let rsa_packets = self
            .store
            .find_pending(
                identity_id,
                application,
                SchemeFilter::Is(Scheme::Rsa),
                Direction::ToInternal,
            )
            .await?;
        let key_pair = if rsa_packets.is_empty() {
            None
        } else {
            self.keys.key_pair(identity_id).await?
        };

        let mut delivered_key: Option<SessionKey> = None;
        let keys = KeyMaterial {
            rsa: key_pair.as_ref(),
            session: None,
        };
        for packet in &rsa_packets {
            match pipeline::decrypt(Scheme::from_tag(&packet.scheme), &packet.payload, &keys) {
                Decrypted::Value(value) => {
                    for item in flatten(value) {
                        match take_key_delivery(&item) {
                            // Last delivered key wins within a batch.
                            Some(key) => delivered_key = Some(key),
                            None => results.push(item),
                        }
                    }
                    consumed.push(packet.packet_id);
                }
                Decrypted::Unchanged => {}
            }
        }

        if let Some(key) = delivered_key {
            // Persist before phase 2 so messages encrypted under the fresh
            // key decrypt in this same call.
            self.identities
                .rotate_session_key(identity_id, application, &key)
                .await?;
        }

        // Phase 2: session and plaintext packets.
        let other_packets = self
            .store
            .find_pending(
                identity_id,
                application,
                SchemeFilter::IsNot(Scheme::Rsa),
                Direction::ToInternal,
            )
            .await?;
        let session_key = if other_packets.is_empty() {
            None
        } else {
            self.identities.session_key(identity_id, application).await?
        };
        let keys = KeyMaterial {
            rsa: None,
            session: session_key.as_ref(),
        };
        for packet in &other_packets {
            match pipeline::decrypt(Scheme::from_tag(&packet.scheme), &packet.payload, &keys) {
                Decrypted::Value(value) => {
                    for item in flatten(value) {
                        if take_key_delivery(&item).is_some() {
                            // Session keys are only written from rsa
                            // bootstrap packets; a marker arriving on the
                            // session channel is dropped, not rotated.
                            warn!(
                                application,
                                identity_id, "ignoring key delivery outside rsa bootstrap"
                            );
                            continue;
                        }
                        results.push(item);
                    }
                    consumed.push(packet.packet_id);
                }
                Decrypted::Unchanged => {}
            }
        }

        self.store.delete_packets(&consumed).await?;
        debug!(
            application,
            identity_id,
            consumed = consumed.len(),
            returned = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }

    /// Encrypt `data` for the external side and queue it.
    ///
    /// `data` is one JSON value or an array of them; either way the whole
    /// sequence becomes a single aes-scheme to-external packet. Fails
    /// before any write if the binding is missing or the session key has
    /// not been bootstrapped yet.
    pub async fn submit(
        &self,
        application: &str,
        identity_id: i64,
        data: Value,
    ) -> Result<i64, GatewayError> {
        let values = match data {
            Value::Array(items) => items,
            other => vec![other],
        };

        let binding = self
            .store
            .application_identity(identity_id, application)
            .await?
            .ok_or_else(|| GatewayError::UnknownApplicationUser {
                application: application.to_owned(),
                identity_id,
            })?;
        let Some(key_hex) = binding.session_key else {
            return Err(GatewayError::SessionNotBootstrapped {
                application: application.to_owned(),
                identity_id,
            });
        };
        let key = SessionKey::from_hex(&key_hex)?;

        let payload = pipeline::encrypt(&values, &key)?;
        let packet_id = self
            .store
            .enqueue_packet(
                identity_id,
                application,
                Scheme::Aes,
                Direction::ToExternal,
                &payload,
            )
            .await?;
        Ok(packet_id)
    }
}

/// A decrypted payload is normally a JSON array of values; flatten it into
/// the result sequence. Any other shape passes through whole.
fn flatten(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Recognise a key-delivery marker and parse the delivered key. A marker
/// whose key material does not decode as a whole 32-byte key is treated as
/// ordinary content.
fn take_key_delivery(item: &Value) -> Option<SessionKey> {
    let marker = KeyDelivery::from_value(item)?;
    SessionKey::from_hex(&marker.session_key).ok()
}
