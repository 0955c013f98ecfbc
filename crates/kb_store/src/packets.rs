//! Packet queue repository.

use chrono::Utc;
use tracing::debug;

use kb_proto::{Direction, Scheme};

use crate::{
    db::Store,
    error::StoreError,
    models::{ExportedPacket, PacketRow},
};

/// Scheme predicate for pending-packet scans. Retrieval drains rsa-scheme
/// packets first (bootstrap before message), then everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeFilter {
    Is(Scheme),
    IsNot(Scheme),
}

impl Store {
    /// Append one packet. Fields are caller-asserted; the queue does not
    /// inspect payloads. Returns the new packet id.
    pub async fn enqueue_packet(
        &self,
        identity_id: i64,
        application: &str,
        scheme: Scheme,
        direction: Direction,
        payload: &str,
    ) -> Result<i64, StoreError> {
        let res = sqlx::query(
            "INSERT INTO packets (identity_id, application, scheme, direction, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(identity_id)
        .bind(application)
        .bind(scheme.as_tag())
        .bind(direction.as_tag())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Pending packets for one (identity, application) pair, oldest first.
    pub async fn find_pending(
        &self,
        identity_id: i64,
        application: &str,
        filter: SchemeFilter,
        direction: Direction,
    ) -> Result<Vec<PacketRow>, StoreError> {
        let sql = match filter {
            SchemeFilter::Is(_) => {
                "SELECT * FROM packets
                 WHERE identity_id = ? AND application = ? AND direction = ? AND scheme = ?
                 ORDER BY packet_id"
            }
            SchemeFilter::IsNot(_) => {
                "SELECT * FROM packets
                 WHERE identity_id = ? AND application = ? AND direction = ? AND scheme != ?
                 ORDER BY packet_id"
            }
        };
        let (SchemeFilter::Is(scheme) | SchemeFilter::IsNot(scheme)) = filter;

        let rows = sqlx::query_as::<_, PacketRow>(sql)
            .bind(identity_id)
            .bind(application)
            .bind(direction.as_tag())
            .bind(scheme.as_tag())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Drain the to-external queue for `application`.
    ///
    /// Select and delete happen in ONE transaction: a crash before commit
    /// loses nothing, a crash after commit cannot hand the same row out
    /// twice. Packets whose identity has no binding for `application` are
    /// excluded from both the select and the delete — they are not
    /// exportable and must not be destroyed (see `unmapped_export_count`).
    pub async fn dequeue_for_export(
        &self,
        application: &str,
    ) -> Result<Vec<ExportedPacket>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
            "SELECT p.packet_id, au.external_user_id, p.scheme, p.direction, p.payload
             FROM packets p
             JOIN application_identities au
                 ON p.identity_id = au.identity_id AND p.application = au.application
             WHERE p.application = ? AND p.direction = ?
             ORDER BY p.packet_id",
        )
        .bind(application)
        .bind(Direction::ToExternal.as_tag())
        .fetch_all(&mut *tx)
        .await?;

        for (packet_id, ..) in &rows {
            sqlx::query("DELETE FROM packets WHERE packet_id = ?")
                .bind(packet_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(application, count = rows.len(), "dequeued packets for export");
        Ok(rows
            .into_iter()
            .map(|(_, external_user_id, scheme, direction, payload)| ExportedPacket {
                external_user_id,
                scheme,
                direction,
                payload,
            })
            .collect())
    }

    /// To-external packets whose identity has no binding for `application`.
    /// `dequeue_for_export` leaves them queued; callers may want to log
    /// when this is non-zero.
    pub async fn unmapped_export_count(&self, application: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM packets p
             LEFT JOIN application_identities au
                 ON p.identity_id = au.identity_id AND p.application = au.application
             WHERE p.application = ? AND p.direction = ? AND au.id IS NULL",
        )
        .bind(application)
        .bind(Direction::ToExternal.as_tag())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Delete a set of packets in one transaction. Missing ids are a no-op
    /// (idempotent cleanup).
    pub async fn delete_packets(&self, packet_ids: &[i64]) -> Result<(), StoreError> {
        if packet_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for packet_id in packet_ids {
            sqlx::query("DELETE FROM packets WHERE packet_id = ?")
                .bind(packet_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
