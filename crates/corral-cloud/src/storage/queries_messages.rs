//! Worker message storage and account message counters.

use corral_core::db::DatabaseError;

use super::db::CloudDatabase;
use super::models::{MessageCounter, WorkerMessage};

impl CloudDatabase {
    /// Store a worker message and bump the account's counters atomically.
    ///
    /// The (aid, tid, ts) unique constraint deduplicates device retries;
    /// a duplicate is reported as already stored without touching the
    /// counters.
    pub async fn store_worker_message(
        &self,
        account_id: &str,
        aid: &str,
        tid: &str,
        ts: f64,
        data: &str,
    ) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO worker_messages (aid, tid, ts, data) VALUES (?, ?, ?, ?)",
        )
        .bind(aid)
        .bind(tid)
        .bind(ts)
        .bind(data)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            sqlx::query(
                "INSERT INTO message_counters (account_id, total, worker) VALUES (?, 1, 1)
                 ON CONFLICT(account_id) DO UPDATE SET total = total + 1, worker = worker + 1",
            )
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Worker messages of one Thing in a half-open [from, to) timestamp
    /// range, oldest first.
    pub async fn get_worker_messages(
        &self,
        aid: &str,
        tid: &str,
        from_ts: f64,
        to_ts: f64,
    ) -> Result<Vec<WorkerMessage>, DatabaseError> {
        Ok(sqlx::query_as::<_, WorkerMessage>(
            "SELECT * FROM worker_messages WHERE aid = ? AND tid = ? AND ts >= ? AND ts < ?
             ORDER BY ts ASC",
        )
        .bind(aid)
        .bind(tid)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(self.pool())
        .await?)
    }

    /// Bump the management (and total) counters by one.
    pub async fn count_management_message(&self, account_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO message_counters (account_id, total, management) VALUES (?, 1, 1)
             ON CONFLICT(account_id) DO UPDATE SET total = total + 1, management = management + 1",
        )
        .bind(account_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Counter row for an account; zeroes when nothing has been counted yet.
    pub async fn get_message_counter(
        &self,
        account_id: &str,
    ) -> Result<MessageCounter, DatabaseError> {
        let row = sqlx::query_as::<_, MessageCounter>(
            "SELECT * FROM message_counters WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.unwrap_or(MessageCounter {
            account_id: account_id.to_string(),
            total: 0,
            worker: 0,
            management: 0,
        }))
    }
}
