//! Identity repository: one RSA key-pair row per VPN-side identity.

use chrono::Utc;

use crate::{db::Store, error::StoreError, models::IdentityRow};

impl Store {
    /// Insert or replace the key pair for `identity_id` (last write wins).
    /// Replacing a pair strands any queued packet still encrypted to the
    /// old public key; such packets simply stay undecryptable.
    pub async fn upsert_identity_keys(
        &self,
        identity_id: i64,
        public_pem: &str,
        private_pem: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO identities (identity_id, rsa_public_key, rsa_private_key, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(identity_id) DO UPDATE SET
                 rsa_public_key = excluded.rsa_public_key,
                 rsa_private_key = excluded.rsa_private_key",
        )
        .bind(identity_id)
        .bind(public_pem)
        .bind(private_pem)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn identity(&self, identity_id: i64) -> Result<Option<IdentityRow>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>("SELECT * FROM identities WHERE identity_id = ?")
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All known identity ids, for directory set-difference provisioning.
    pub async fn identity_ids(&self) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar("SELECT identity_id FROM identities ORDER BY identity_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
