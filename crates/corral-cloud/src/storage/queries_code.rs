//! Application code queries: files, commits, and assembled sources.

use corral_core::db::DatabaseError;

use super::db::CloudDatabase;
use super::models::{Commit, SourceFile};

impl CloudDatabase {
    /// Resolve a commit by its App-scoped identifier.
    pub async fn find_commit(
        &self,
        app_id: &str,
        cid: &str,
    ) -> Result<Option<Commit>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Commit>("SELECT * FROM commits WHERE app_id = ? AND cid = ?")
                .bind(app_id)
                .bind(cid)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Latest valid commit of an App, by commit timestamp.
    pub async fn latest_commit(&self, app_id: &str) -> Result<Option<Commit>, DatabaseError> {
        Ok(sqlx::query_as::<_, Commit>(
            "SELECT * FROM commits WHERE app_id = ? AND valid = 1 ORDER BY ts DESC LIMIT 1",
        )
        .bind(app_id)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Files of a commit in their stored order.
    pub async fn commit_files(&self, commit_id: i64) -> Result<Vec<SourceFile>, DatabaseError> {
        Ok(sqlx::query_as::<_, SourceFile>(
            "SELECT files.* FROM files
             JOIN commit_files ON commit_files.file_id = files.id
             WHERE commit_files.commit_id = ?
             ORDER BY commit_files.position ASC",
        )
        .bind(commit_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// One file of a commit, by name.
    pub async fn commit_file(
        &self,
        commit_id: i64,
        name: &str,
    ) -> Result<Option<SourceFile>, DatabaseError> {
        Ok(sqlx::query_as::<_, SourceFile>(
            "SELECT files.* FROM files
             JOIN commit_files ON commit_files.file_id = files.id
             WHERE commit_files.commit_id = ? AND files.name = ?",
        )
        .bind(commit_id)
        .bind(name)
        .fetch_optional(self.pool())
        .await?)
    }
}
