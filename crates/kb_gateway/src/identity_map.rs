//! Pseudonymous application identities and their session keys.

use std::collections::BTreeMap;

use tracing::info;

use kb_crypto::SessionKey;
use kb_store::Store;

use crate::error::GatewayError;

/// Per-(identity, application) bindings: the pseudonymous external id and
/// the negotiated AES session key.
#[derive(Clone)]
pub struct IdentityMap {
    store: Store,
}

impl IdentityMap {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Bind every unbound identity to `application` under a fresh external
    /// id. Re-running never duplicates a binding and never changes an
    /// existing external id.
    pub async fn provision(&self, application: &str) -> Result<u64, GatewayError> {
        let created = self
            .store
            .provision_application_identities(application)
            .await?;
        if created > 0 {
            info!(application, created, "provisioned application identities");
        }
        Ok(created)
    }

    /// Resolve a pseudonymous id back to the internal identity.
    pub async fn lookup_by_external_id(
        &self,
        application: &str,
        external_user_id: &str,
    ) -> Result<Option<i64>, GatewayError> {
        Ok(self
            .store
            .application_identity_by_external_id(application, external_user_id)
            .await?
            .map(|row| row.identity_id))
    }

    /// external_user_id -> RSA public key PEM for every binding of
    /// `application`, for bootstrap key delivery to the external side.
    /// Only public material leaves this call.
    pub async fn public_keys_for(
        &self,
        application: &str,
    ) -> Result<BTreeMap<String, String>, GatewayError> {
        Ok(self
            .store
            .public_keys_for_application(application)
            .await?
            .into_iter()
            .collect())
    }

    /// Current session key for one binding, if bootstrapped.
    pub async fn session_key(
        &self,
        identity_id: i64,
        application: &str,
    ) -> Result<Option<SessionKey>, GatewayError> {
        let row = self
            .store
            .application_identity(identity_id, application)
            .await?;
        match row.and_then(|r| r.session_key) {
            None => Ok(None),
            Some(hex_key) => Ok(Some(SessionKey::from_hex(&hex_key)?)),
        }
    }

    /// Overwrite the session key (whole-key point write; readers see the
    /// old key or the new one, never a mixture).
    pub async fn rotate_session_key(
        &self,
        identity_id: i64,
        application: &str,
        key: &SessionKey,
    ) -> Result<(), GatewayError> {
        Ok(self
            .store
            .rotate_session_key(identity_id, application, key)
            .await?)
    }
}
