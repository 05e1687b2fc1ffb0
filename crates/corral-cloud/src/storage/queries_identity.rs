//! Account, App, Pool, Settings, and Thing queries.

use corral_core::db::{DatabaseError, unix_timestamp};
use uuid::Uuid;

use super::db::CloudDatabase;
use super::models::{Account, App, Pool, Settings, Thing, UNBOUND_AID};

/// Seed worker task for a freshly created App.
const DEFAULT_WORKER_CODE: &str = r"
import random

class WorkerTask(object):

    def __init__(self):
        logger.debug('Initializing worker task')
        self.prev_value = 21

    def call(self):
        '''Called every worker_interval seconds'''
        value = self.prev_value + random.randint(-1, 1)
        self.prev_value = value

        # Return a dict like {'temperature': value} to see readings
        # on the dashboard.

";

/// Seed management task for a freshly created App.
const DEFAULT_MANAGEMENT_CODE: &str = r"
class ManagementTask(object):

    def call(self, data):
        '''Called every management_interval seconds'''
        return 'Got \'{}\''.format(data)

";

const EMPTY_WORKER_CODE: &str = "\nclass WorkerTask(object):\n\n    def call(self):\n        pass\n";

const EMPTY_MANAGEMENT_CODE: &str =
    "\nclass ManagementTask(object):\n\n    def call(self, data):\n        pass\n";

/// Parameters for [`CloudDatabase::create_app`].
pub struct CreateAppParams<'a> {
    pub name: &'a str,
    pub account_id: &'a str,
    /// Wire AID; generated when absent.
    pub aid: Option<&'a str>,
    pub management_interval: &'a str,
    pub worker_interval: &'a str,
    pub os_version: &'a str,
    /// Provision the hidden unbound pseudo-App skeleton instead of the
    /// three-pool default layout.
    pub empty_app: bool,
    pub use_latest_app_version: bool,
}

impl<'a> CreateAppParams<'a> {
    pub fn new(name: &'a str, account_id: &'a str) -> Self {
        Self {
            name,
            account_id,
            aid: None,
            management_interval: "60",
            worker_interval: "300",
            os_version: "factory",
            empty_app: false,
            use_latest_app_version: false,
        }
    }
}

impl CloudDatabase {
    // =========================================================================
    // Account queries
    // =========================================================================

    /// Create an account with the given plan limits.
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        plan_messages_limit: i64,
        plan_things_limit: i64,
    ) -> Result<Account, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let apikey = Uuid::new_v4().to_string();
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO accounts (id, username, email, apikey, plan_messages_limit, plan_things_limit, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(&apikey)
        .bind(plan_messages_limit)
        .bind(plan_things_limit)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_account(&id).await
    }

    pub async fn get_account(&self, id: &str) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {id}")))
    }

    pub async fn find_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
                .bind(username)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn find_account_by_apikey(
        &self,
        apikey: &str,
    ) -> Result<Option<Account>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE apikey = ?")
                .bind(apikey)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    // =========================================================================
    // App queries
    // =========================================================================

    /// Create an App with its pools, settings, and seed commit.
    pub async fn create_app(&self, params: CreateAppParams<'_>) -> Result<App, DatabaseError> {
        let app_id = Uuid::new_v4().to_string();
        let aid = params
            .aid
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let now = unix_timestamp();
        let app_version = now.to_string();

        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT INTO apps (id, aid, name, account_id, hidden) VALUES (?, ?, ?, ?, ?)")
            .bind(&app_id)
            .bind(&aid)
            .bind(params.name)
            .bind(params.account_id)
            .bind(i64::from(params.empty_app))
            .execute(&mut *tx)
            .await?;

        let default_pool_id = if params.empty_app {
            insert_pool(&mut tx, &app_id, &app_version, now, &params, "unbound", (true, false, false), true)
                .await?
        } else {
            insert_pool(&mut tx, &app_id, &app_version, now, &params, "production", (false, false, true), false)
                .await?;
            insert_pool(
                &mut tx,
                &app_id,
                &app_version,
                now,
                &params,
                "staging",
                (false, true, false),
                params.use_latest_app_version,
            )
            .await?;
            insert_pool(
                &mut tx,
                &app_id,
                &app_version,
                now,
                &params,
                "development",
                (true, false, false),
                params.use_latest_app_version,
            )
            .await?
        };

        sqlx::query("UPDATE apps SET default_pool_id = ? WHERE id = ?")
            .bind(&default_pool_id)
            .bind(&app_id)
            .execute(&mut *tx)
            .await?;

        // Seed a two-file commit so a fresh App is immediately servable.
        let (worker_code, management_code) = if params.empty_app {
            (EMPTY_WORKER_CODE, EMPTY_MANAGEMENT_CODE)
        } else {
            (DEFAULT_WORKER_CODE, DEFAULT_MANAGEMENT_CODE)
        };

        let mut file_ids = Vec::new();
        for (name, content) in [
            ("worker_task.py", worker_code),
            ("management_task.py", management_code),
        ] {
            let result = sqlx::query(
                "INSERT INTO files (app_id, name, content, ts, committed) VALUES (?, ?, ?, ?, 1)",
            )
            .bind(&app_id)
            .bind(name)
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            file_ids.push(result.last_insert_rowid());
        }

        let commit = sqlx::query("INSERT INTO commits (app_id, cid, ts, valid) VALUES (?, ?, ?, 1)")
            .bind(&app_id)
            .bind(&app_version)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        #[allow(clippy::cast_possible_wrap)]
        for (position, file_id) in file_ids.iter().enumerate() {
            sqlx::query("INSERT INTO commit_files (commit_id, file_id, position) VALUES (?, ?, ?)")
                .bind(commit.last_insert_rowid())
                .bind(file_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_app(&app_id).await
    }

    pub async fn get_app(&self, id: &str) -> Result<App, DatabaseError> {
        sqlx::query_as::<_, App>("SELECT * FROM apps WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("App {id}")))
    }

    pub async fn find_app_by_aid(&self, aid: &str) -> Result<Option<App>, DatabaseError> {
        Ok(sqlx::query_as::<_, App>("SELECT * FROM apps WHERE aid = ?")
            .bind(aid)
            .fetch_optional(self.pool())
            .await?)
    }

    /// Fetch the account's unbound pseudo-App, creating it lazily.
    pub async fn find_or_create_unbound_app(
        &self,
        account_id: &str,
    ) -> Result<App, DatabaseError> {
        let existing =
            sqlx::query_as::<_, App>("SELECT * FROM apps WHERE account_id = ? AND aid = ?")
                .bind(account_id)
                .bind(UNBOUND_AID)
                .fetch_optional(self.pool())
                .await?;
        if let Some(app) = existing {
            return Ok(app);
        }

        let mut params = CreateAppParams::new("NoneApp", account_id);
        params.aid = Some(UNBOUND_AID);
        params.management_interval = "5";
        params.empty_app = true;
        self.create_app(params).await
    }

    // =========================================================================
    // Pool and Settings queries
    // =========================================================================

    pub async fn get_pool(&self, id: &str) -> Result<Pool, DatabaseError> {
        sqlx::query_as::<_, Pool>("SELECT * FROM pools WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pool {id}")))
    }

    pub async fn find_pool(&self, app_id: &str, name: &str) -> Result<Option<Pool>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Pool>("SELECT * FROM pools WHERE app_id = ? AND name = ?")
                .bind(app_id)
                .bind(name)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn get_settings(&self, id: &str) -> Result<Settings, DatabaseError> {
        sqlx::query_as::<_, Settings>("SELECT * FROM settings WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Settings {id}")))
    }

    /// Resolve the settings a Thing runs with: its own override when
    /// enabled, the pool's bundle otherwise. Also returns the pool for
    /// annotation.
    pub async fn effective_settings(
        &self,
        thing: &Thing,
    ) -> Result<(Settings, Pool), DatabaseError> {
        let pool = self.get_pool(&thing.pool_id).await?;
        let settings = if thing.use_custom_settings != 0
            && let Some(settings_id) = &thing.settings_id
        {
            self.get_settings(settings_id).await?
        } else {
            self.get_settings(&pool.settings_id).await?
        };
        Ok((settings, pool))
    }

    // =========================================================================
    // Thing queries
    // =========================================================================

    pub async fn create_thing(
        &self,
        tid: &str,
        app_id: &str,
        pool_id: &str,
        app_set_via: &str,
    ) -> Result<Thing, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO things (id, tid, app_id, pool_id, app_set_via) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tid)
        .bind(app_id)
        .bind(pool_id)
        .bind(app_set_via)
        .execute(self.pool())
        .await?;

        self.get_thing(&id).await
    }

    pub async fn get_thing(&self, id: &str) -> Result<Thing, DatabaseError> {
        sqlx::query_as::<_, Thing>("SELECT * FROM things WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Thing {id}")))
    }

    pub async fn find_thing(
        &self,
        tid: &str,
        app_id: &str,
    ) -> Result<Option<Thing>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, Thing>("SELECT * FROM things WHERE tid = ? AND app_id = ?")
                .bind(tid)
                .bind(app_id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Look a Thing up by tid anywhere in the account's Apps.
    pub async fn find_thing_in_account(
        &self,
        account_id: &str,
        tid: &str,
    ) -> Result<Option<Thing>, DatabaseError> {
        Ok(sqlx::query_as::<_, Thing>(
            "SELECT things.* FROM things JOIN apps ON things.app_id = apps.id
             WHERE apps.account_id = ? AND things.tid = ?",
        )
        .bind(account_id)
        .bind(tid)
        .fetch_optional(self.pool())
        .await?)
    }

    /// Count devices across all of the account's Apps, for quota checks.
    pub async fn count_things(&self, account_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM things JOIN apps ON things.app_id = apps.id
             WHERE apps.account_id = ?",
        )
        .bind(account_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.0)
    }

    /// Move a Thing to another App and pool. Used when a device that first
    /// registered via an Account-ID claims a real App.
    pub async fn rebind_thing_app(
        &self,
        thing_id: &str,
        app_id: &str,
        pool_id: &str,
        app_set_via: &str,
    ) -> Result<Thing, DatabaseError> {
        sqlx::query("UPDATE things SET app_id = ?, pool_id = ?, app_set_via = ? WHERE id = ?")
            .bind(app_id)
            .bind(pool_id)
            .bind(app_set_via)
            .bind(thing_id)
            .execute(self.pool())
            .await?;
        self.get_thing(thing_id).await
    }

    /// Overwrite reported attributes, writing only the fields that changed.
    pub async fn sync_thing_attributes(
        &self,
        thing: &Thing,
        platform: Option<&str>,
        capabilities: Option<&str>,
        frozen_os: bool,
    ) -> Result<(), DatabaseError> {
        if thing.platform.as_deref() != platform {
            sqlx::query("UPDATE things SET platform = ? WHERE id = ?")
                .bind(platform)
                .bind(&thing.id)
                .execute(self.pool())
                .await?;
        }
        if thing.capabilities.as_deref() != capabilities {
            sqlx::query("UPDATE things SET capabilities = ? WHERE id = ?")
                .bind(capabilities)
                .bind(&thing.id)
                .execute(self.pool())
                .await?;
        }
        if (thing.frozen_os != 0) != frozen_os {
            sqlx::query("UPDATE things SET frozen_os = ? WHERE id = ?")
                .bind(i64::from(frozen_os))
                .bind(&thing.id)
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // Cascading deletion
    // =========================================================================

    /// Delete an App with everything hanging off it.
    ///
    /// Message rows are keyed by (aid, tid) rather than foreign keys, so
    /// they go first, explicitly. Settings rows are referenced by pools
    /// and things, so their ids are captured before the referencing rows
    /// are removed and deleted last.
    pub async fn delete_app(&self, app_id: &str) -> Result<(), DatabaseError> {
        let app = self.get_app(app_id).await?;
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM worker_messages WHERE aid = ?")
            .bind(&app.aid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM management_messages WHERE aid = ?")
            .bind(&app.aid)
            .execute(&mut *tx)
            .await?;
        // Messages may carry an aid from before a Thing migrated here.
        sqlx::query(
            "DELETE FROM management_messages WHERE thing_id IN (SELECT id FROM things WHERE app_id = ?)",
        )
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM sessions WHERE thing_id IN (SELECT id FROM things WHERE app_id = ?)",
        )
        .bind(app_id)
        .execute(&mut *tx)
        .await?;

        let thing_settings: Vec<String> = sqlx::query_scalar(
            "SELECT settings_id FROM things WHERE app_id = ? AND settings_id IS NOT NULL",
        )
        .bind(app_id)
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM things WHERE app_id = ?")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM commit_files WHERE commit_id IN (SELECT id FROM commits WHERE app_id = ?)",
        )
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM commits WHERE app_id = ?")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM files WHERE app_id = ?")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;

        let pool_settings: Vec<String> =
            sqlx::query_scalar("SELECT settings_id FROM pools WHERE app_id = ?")
                .bind(app_id)
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM pools WHERE app_id = ?")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;

        for settings_id in thing_settings.iter().chain(&pool_settings) {
            sqlx::query("DELETE FROM settings WHERE id = ?")
                .bind(settings_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete an account, its Apps, and its counter row.
    pub async fn delete_account(&self, account_id: &str) -> Result<(), DatabaseError> {
        let apps = sqlx::query_as::<_, App>("SELECT * FROM apps WHERE account_id = ?")
            .bind(account_id)
            .fetch_all(self.pool())
            .await?;
        for app in apps {
            self.delete_app(&app.id).await?;
        }
        sqlx::query("DELETE FROM message_counters WHERE account_id = ?")
            .bind(account_id)
            .execute(self.pool())
            .await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

/// Insert a settings bundle and its pool inside an App-creation transaction.
#[allow(clippy::too_many_arguments)]
async fn insert_pool(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    app_id: &str,
    app_version: &str,
    now: i64,
    params: &CreateAppParams<'_>,
    name: &str,
    stage_flags: (bool, bool, bool),
    use_latest: bool,
) -> Result<String, DatabaseError> {
    let settings_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO settings (id, os_version, app_version, management_interval, worker_interval, edited)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&settings_id)
    .bind(params.os_version)
    .bind(app_version)
    .bind(params.management_interval)
    .bind(params.worker_interval)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let pool_id = Uuid::new_v4().to_string();
    let (development, staging, production) = stage_flags;
    sqlx::query(
        "INSERT INTO pools (id, app_id, name, settings_id, use_latest_app_version, development, staging, production)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&pool_id)
    .bind(app_id)
    .bind(name)
    .bind(&settings_id)
    .bind(i64::from(use_latest))
    .bind(i64::from(development))
    .bind(i64::from(staging))
    .bind(i64::from(production))
    .execute(&mut **tx)
    .await?;
    Ok(pool_id)
}
