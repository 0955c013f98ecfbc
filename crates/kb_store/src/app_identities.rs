//! Application-identity repository: pseudonymous per-application bindings
//! and their negotiated session keys.

use chrono::Utc;
use uuid::Uuid;

use kb_crypto::SessionKey;

use crate::{db::Store, error::StoreError, models::AppIdentityRow};

impl Store {
    /// Create missing bindings for `application`: every identity without
    /// one gets a fresh, globally-unique external id and no session key.
    ///
    /// Safe to re-run. The UNIQUE (identity_id, application) index plus
    /// `ON CONFLICT DO NOTHING` make a rerun after partial failure converge
    /// instead of duplicating rows, and existing external ids are never
    /// touched. Returns the number of bindings created.
    pub async fn provision_application_identities(
        &self,
        application: &str,
    ) -> Result<u64, StoreError> {
        let missing: Vec<i64> = sqlx::query_scalar(
            "SELECT i.identity_id
             FROM identities i
             LEFT JOIN application_identities au
                 ON i.identity_id = au.identity_id AND au.application = ?
             WHERE au.id IS NULL
             ORDER BY i.identity_id",
        )
        .bind(application)
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;
        for identity_id in missing {
            let res = sqlx::query(
                "INSERT INTO application_identities
                     (identity_id, application, external_user_id, session_key, created_at)
                 VALUES (?, ?, ?, NULL, ?)
                 ON CONFLICT(identity_id, application) DO NOTHING",
            )
            .bind(identity_id)
            .bind(application)
            .bind(Uuid::new_v4().to_string())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            created += res.rows_affected();
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn application_identity(
        &self,
        identity_id: i64,
        application: &str,
    ) -> Result<Option<AppIdentityRow>, StoreError> {
        let row = sqlx::query_as::<_, AppIdentityRow>(
            "SELECT * FROM application_identities WHERE identity_id = ? AND application = ?",
        )
        .bind(identity_id)
        .bind(application)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn application_identity_by_external_id(
        &self,
        application: &str,
        external_user_id: &str,
    ) -> Result<Option<AppIdentityRow>, StoreError> {
        let row = sqlx::query_as::<_, AppIdentityRow>(
            "SELECT * FROM application_identities WHERE application = ? AND external_user_id = ?",
        )
        .bind(application)
        .bind(external_user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// (external_user_id, rsa_public_key) for every binding of
    /// `application` — the bulk export used to hand bootstrap keys to the
    /// external side. Only public material crosses this call.
    pub async fn public_keys_for_application(
        &self,
        application: &str,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT au.external_user_id, i.rsa_public_key
             FROM application_identities au
             JOIN identities i ON i.identity_id = au.identity_id
             WHERE au.application = ?
             ORDER BY au.external_user_id",
        )
        .bind(application)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Overwrite the session key for one binding. A single-row UPDATE:
    /// concurrent readers observe the old key or the new key in full, never
    /// a partial write. The key arrives typed, so it is rotated as a whole
    /// or not at all.
    pub async fn rotate_session_key(
        &self,
        identity_id: i64,
        application: &str,
        key: &SessionKey,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE application_identities SET session_key = ?
             WHERE identity_id = ? AND application = ?",
        )
        .bind(key.to_hex())
        .bind(identity_id)
        .bind(application)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "no application identity for identity {identity_id} in {application}"
            )));
        }
        Ok(())
    }
}
