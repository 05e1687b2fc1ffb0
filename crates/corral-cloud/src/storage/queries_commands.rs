//! Management command queue: enqueue, claim for delivery, acknowledge.

use corral_core::db::{DatabaseError, unix_timestamp_f};
use uuid::Uuid;

use super::db::CloudDatabase;
use super::models::{ManagementMessage, command_kind, command_status};

impl CloudDatabase {
    /// Queue a management message for a Thing. Returns the message uuid.
    pub async fn enqueue_management_message(
        &self,
        aid: &str,
        tid: &str,
        data: &str,
        kind: &str,
        thing_id: Option<&str>,
    ) -> Result<String, DatabaseError> {
        let uuid = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO management_messages (aid, tid, ts, uuid, status, type, thing_id, data)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(aid)
        .bind(tid)
        .bind(unix_timestamp_f())
        .bind(&uuid)
        .bind(command_status::QUEUED)
        .bind(kind)
        .bind(thing_id)
        .bind(data)
        .execute(self.pool())
        .await?;
        Ok(uuid)
    }

    /// Claim the oldest queued App-level message for delivery.
    ///
    /// Keyed by tid alone: a message queued while the Thing lived in
    /// another App (the unbound pseudo-App before migration) must still
    /// reach it. The claim is a compare-and-set on the status column, so
    /// two concurrent polls for the same Thing can never both walk away
    /// with the same message. When the CAS loses, the next candidate is
    /// tried.
    pub async fn claim_next_queued_message(
        &self,
        tid: &str,
    ) -> Result<Option<ManagementMessage>, DatabaseError> {
        loop {
            let candidate = sqlx::query_as::<_, ManagementMessage>(
                "SELECT * FROM management_messages
                 WHERE tid = ? AND status = ? AND type = ?
                 ORDER BY ts ASC LIMIT 1",
            )
            .bind(tid)
            .bind(command_status::QUEUED)
            .bind(command_kind::APP)
            .fetch_optional(self.pool())
            .await?;

            let Some(message) = candidate else {
                return Ok(None);
            };

            let claimed = sqlx::query(
                "UPDATE management_messages SET status = ? WHERE id = ? AND status = ?",
            )
            .bind(command_status::DELIVERED)
            .bind(message.id)
            .bind(command_status::QUEUED)
            .execute(self.pool())
            .await?
            .rows_affected()
                > 0;

            if claimed {
                return Ok(Some(message));
            }
        }
    }

    pub async fn find_management_message(
        &self,
        tid: &str,
        uuid: &str,
    ) -> Result<Option<ManagementMessage>, DatabaseError> {
        Ok(sqlx::query_as::<_, ManagementMessage>(
            "SELECT * FROM management_messages WHERE tid = ? AND uuid = ?",
        )
        .bind(tid)
        .bind(uuid)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Operator-side lookup by message uuid alone.
    pub async fn find_management_message_by_uuid(
        &self,
        uuid: &str,
    ) -> Result<Option<ManagementMessage>, DatabaseError> {
        Ok(sqlx::query_as::<_, ManagementMessage>(
            "SELECT * FROM management_messages WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Record the device's reply and mark the message received.
    pub async fn mark_message_received(
        &self,
        message_id: i64,
        reply: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE management_messages SET status = ?, reply = ? WHERE id = ?")
            .bind(command_status::RECEIVED)
            .bind(reply)
            .bind(message_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
