//! Session queries: pre-registration, registration, and status bookkeeping.

use corral_core::db::{DatabaseError, unix_timestamp};
use tracing::warn;
use uuid::Uuid;

use super::db::CloudDatabase;
use super::models::Session;

impl CloudDatabase {
    /// Create a pre-registered session carrying the recovered payload key.
    ///
    /// The session has no Thing yet; registration binds it.
    pub async fn create_preregistered_session(
        &self,
        key: u64,
        kty: &str,
    ) -> Result<Session, DatabaseError> {
        let token = Uuid::new_v4().to_string();
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO sessions (token, started, last_contact, key, kty) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(now)
        .bind(now)
        .bind(key.to_string())
        .bind(kty)
        .execute(self.pool())
        .await?;

        self.get_session(&token).await
    }

    pub async fn get_session(&self, token: &str) -> Result<Session, DatabaseError> {
        self.find_session(token)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Session {token}")))
    }

    /// Look up a session by token.
    ///
    /// Tokens are primary keys so duplicates cannot exist; the lookup
    /// still orders by rowid so that a schema relaxation would keep
    /// first-created-wins semantics.
    pub async fn find_session(&self, token: &str) -> Result<Option<Session>, DatabaseError> {
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE token = ? ORDER BY rowid ASC",
        )
        .bind(token)
        .fetch_all(self.pool())
        .await?;

        if sessions.len() > 1 {
            warn!(token, count = sessions.len(), "Duplicate session tokens, using first");
        }
        Ok(sessions.into_iter().next())
    }

    /// Most recent active session of a Thing, if any.
    pub async fn find_active_session(
        &self,
        thing_id: &str,
    ) -> Result<Option<Session>, DatabaseError> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE thing_id = ? AND active = 1 ORDER BY started DESC",
        )
        .bind(thing_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Bind a session to a Thing, retiring every other session of that
    /// Thing. Runs in one transaction so a crash cannot leave two active
    /// sessions behind.
    pub async fn register_session(
        &self,
        token: &str,
        thing_id: &str,
        pool_id: &str,
        os_version: Option<&str>,
        app_version: Option<&str>,
    ) -> Result<Session, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        sqlx::query("UPDATE sessions SET active = 0 WHERE thing_id = ? AND active = 1")
            .bind(thing_id)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE sessions SET thing_id = ?, pool_id = ?, os_version = ?, app_version = ?,
                 active = 1, last_contact = ? WHERE token = ?",
            )
            .bind(thing_id)
            .bind(pool_id)
            .bind(os_version)
            .bind(app_version)
            .bind(now)
            .bind(token)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO sessions (token, thing_id, pool_id, os_version, app_version, started, last_contact)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(token)
            .bind(thing_id)
            .bind(pool_id)
            .bind(os_version)
            .bind(app_version)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_session(token).await
    }

    /// Stamp the contact time; called on every management poll.
    pub async fn touch_session(&self, token: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sessions SET last_contact = ? WHERE token = ?")
            .bind(unix_timestamp())
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_session_os_status(
        &self,
        token: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sessions SET last_os_status = ? WHERE token = ?")
            .bind(status)
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_session_worker_status(
        &self,
        token: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sessions SET last_worker_status = ? WHERE token = ?")
            .bind(status)
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_session_management_status(
        &self,
        token: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sessions SET last_management_status = ? WHERE token = ?")
            .bind(status)
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_session_heartbeat_status(
        &self,
        token: &str,
        status: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sessions SET last_heartbeat_status = ? WHERE token = ?")
            .bind(status)
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
