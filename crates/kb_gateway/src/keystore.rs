//! Identity key management: one RSA pair per VPN-side identity.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use kb_crypto::{KeyPairGenerator, RsaKeyPair};
use kb_store::Store;

use crate::error::GatewayError;

/// Source of currently-active identity ids, i.e. the external workforce
/// directory. Only the listing crosses this boundary; provisioning policy
/// lives on this side of it.
#[async_trait]
pub trait WorkforceDirectory: Send + Sync {
    async fn active_identity_ids(&self) -> Result<Vec<i64>, GatewayError>;
}

/// Key-pair storage and generation for VPN-side identities.
#[derive(Clone)]
pub struct KeyStore {
    store: Store,
    generator: Arc<dyn KeyPairGenerator>,
}

impl KeyStore {
    pub fn new(store: Store, generator: Arc<dyn KeyPairGenerator>) -> Self {
        Self { store, generator }
    }

    /// Generate and store a fresh pair for `identity_id`, replacing any
    /// existing pair (last write wins). Replacement strands packets still
    /// queued under the old key; they simply stay undecryptable.
    ///
    /// Generation is CPU-heavy and runs on a blocking worker thread so
    /// unrelated identities' operations keep flowing.
    pub async fn initialize(&self, identity_id: i64) -> Result<(), GatewayError> {
        if identity_id <= 0 {
            return Err(GatewayError::InvalidIdentity(identity_id));
        }
        let generator = Arc::clone(&self.generator);
        let pair = tokio::task::spawn_blocking(move || generator.generate())
            .await
            .map_err(|e| kb_crypto::CryptoError::KeyGeneration(e.to_string()))??;
        self.store
            .upsert_identity_keys(identity_id, &pair.public_pem()?, &pair.private_pem()?)
            .await?;
        Ok(())
    }

    /// Parsed key pair for `identity_id`, if initialised.
    pub async fn key_pair(&self, identity_id: i64) -> Result<Option<RsaKeyPair>, GatewayError> {
        match self.store.identity(identity_id).await? {
            None => Ok(None),
            Some(row) => Ok(Some(RsaKeyPair::from_pems(
                &row.rsa_public_key,
                &row.rsa_private_key,
            )?)),
        }
    }

    /// Initialise every directory-active identity that has no key pair yet.
    ///
    /// Deliberately sequential: key generation is the most expensive
    /// operation in the system, and provisioning a backlog in parallel
    /// would spike CPU. One at a time bounds the load. The run is
    /// re-entrant, so an aborted batch resumes where it stopped.
    pub async fn initialize_missing(
        &self,
        directory: &dyn WorkforceDirectory,
    ) -> Result<u64, GatewayError> {
        let active = directory.active_identity_ids().await?;
        let existing: HashSet<i64> = self.store.identity_ids().await?.into_iter().collect();
        let missing: Vec<i64> = active
            .into_iter()
            .filter(|id| !existing.contains(id))
            .collect();

        info!(count = missing.len(), "initialising relay identities");
        let mut done = 0u64;
        for identity_id in missing {
            self.initialize(identity_id).await?;
            info!(identity_id, "initialised relay identity");
            done += 1;
        }
        Ok(done)
    }
}
