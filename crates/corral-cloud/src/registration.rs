//! Device identity resolution: pre-registration and registration.

use corral_core::{ApiError, ApiResult};
use corral_crypto::{Aes128Ecb, Srsa, extract_numeric_key};
use tracing::{debug, info};
use uuid::Uuid;

use crate::storage::{App, CloudDatabase, Session, Thing, UNBOUND_AID};

/// The only supported key encoding tag.
pub const KEY_ENCODING_SRSA1: &str = "srsa1";

/// Result of a pre-registration handshake: the unbound session plus a
/// payload cipher keyed with the recovered key, for encrypting this very
/// response.
pub struct Preregistration {
    pub session: Session,
    pub cipher: Aes128Ecb,
}

/// Decrypt the device-submitted symmetric key and open an unbound session.
pub async fn preregister(
    db: &CloudDatabase,
    srsa: &Srsa,
    key_ciphertext: &str,
    kty: &str,
    ken: &str,
) -> ApiResult<Preregistration> {
    if ken != KEY_ENCODING_SRSA1 {
        return Err(ApiError::Validation(format!(
            "Unsupported key encoding \"{ken}\""
        )));
    }

    let plaintext = srsa.decrypt_text(key_ciphertext)?;
    // The recovered plaintext may carry incidental non-digit characters
    // around the key; the first maximal digit run is the key.
    let key = extract_numeric_key(&plaintext)?;

    let session = db.create_preregistered_session(key, kty).await?;
    debug!(token = %session.token, "Pre-registered session");

    Ok(Preregistration {
        session,
        cipher: Aes128Ecb::new(key, true),
    })
}

/// Registration request after envelope splicing.
#[derive(Debug, Default)]
pub struct RegisterParams {
    pub tid: Option<String>,
    pub aid: Option<String>,
    pub token: Option<String>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    pub platform: Option<String>,
    pub capabilities: Option<String>,
    pub frozen: bool,
    pub pool: Option<String>,
}

pub struct Registration {
    pub session: Session,
    pub epoch: i64,
}

enum ResolvedVia {
    AppId,
    AccountId,
}

/// Resolve the claimed identity, create the Thing when needed, and bind a
/// fresh (or pre-registered) session to it.
pub async fn register(db: &CloudDatabase, params: RegisterParams) -> ApiResult<Registration> {
    let tid = params
        .tid
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Auth("Missing tid".to_string()))?;
    let aid = params
        .aid
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::Auth("Missing aid".to_string()))?;

    // A supplied token must name an existing session (pre-registered or a
    // prior registration); devices do not get to mint their own. Checked
    // before any state is touched.
    let token = match params.token.clone() {
        Some(token) => {
            if db.find_session(&token).await?.is_none() {
                return Err(ApiError::Auth("Token not found".to_string()));
            }
            token
        }
        None => Uuid::new_v4().to_string(),
    };

    // The App-ID namespace wins when both match.
    let (account, mut app, via) = if let Some(app) = db.find_app_by_aid(aid).await? {
        let account = db.get_account(&app.account_id).await?;
        (account, app, ResolvedVia::AppId)
    } else if let Some(account) = db.find_account_by_username(aid).await? {
        let app = db.find_or_create_unbound_app(&account.id).await?;
        (account, app, ResolvedVia::AccountId)
    } else {
        return Err(ApiError::Validation("AID is not valid".to_string()));
    };

    let thing = match db.find_thing(tid, &app.id).await? {
        Some(thing) => thing,
        None => match via {
            ResolvedVia::AppId => {
                if let Some(existing) = db.find_thing_in_account(&account.id, tid).await? {
                    let existing_app = db.get_app(&existing.app_id).await?;
                    if existing_app.aid != UNBOUND_AID {
                        return Err(ApiError::Conflict(
                            "Thing is already associated with another App in the same account"
                                .to_string(),
                        ));
                    }
                    // An unbound Thing claiming a real App moves to it.
                    let pool = resolve_target_pool(db, &app, params.pool.as_deref()).await?;
                    let thing = db
                        .rebind_thing_app(&existing.id, &app.id, &pool, "register")
                        .await?;
                    info!(tid, app = %app.name, "Rebound unbound Thing");
                    thing
                } else {
                    check_thing_quota(db, &account.id, account.plan_things_limit).await?;
                    let pool = resolve_target_pool(db, &app, params.pool.as_deref()).await?;
                    let thing = db.create_thing(tid, &app.id, &pool, "register").await?;
                    info!(tid, app = %app.name, "Created Thing");
                    thing
                }
            }
            ResolvedVia::AccountId => {
                if let Some(existing) = db.find_thing_in_account(&account.id, tid).await? {
                    // Account-ID registration carries no App claim, so the
                    // Thing keeps the App it already belongs to.
                    app = db.get_app(&existing.app_id).await?;
                    existing
                } else {
                    check_thing_quota(db, &account.id, account.plan_things_limit).await?;
                    let pool = resolve_target_pool(db, &app, None).await?;
                    let thing = db.create_thing(tid, &app.id, &pool, "backend").await?;
                    info!(tid, account = %account.username, "Created unbound Thing");
                    thing
                }
            }
        },
    };

    db.sync_thing_attributes(
        &thing,
        params.platform.as_deref(),
        params.capabilities.as_deref(),
        params.frozen,
    )
    .await?;

    let session = db
        .register_session(
            &token,
            &thing.id,
            &thing.pool_id,
            params.os_version.as_deref(),
            params.app_version.as_deref(),
        )
        .await?;

    Ok(Registration {
        session,
        epoch: corral_core::db::unix_timestamp(),
    })
}

async fn check_thing_quota(db: &CloudDatabase, account_id: &str, limit: i64) -> ApiResult<()> {
    if db.count_things(account_id).await? >= limit {
        return Err(ApiError::QuotaExceeded(
            "Plan limit for Things reached".to_string(),
        ));
    }
    Ok(())
}

async fn resolve_target_pool(
    db: &CloudDatabase,
    app: &App,
    pool_name: Option<&str>,
) -> ApiResult<String> {
    if let Some(name) = pool_name
        && let Some(pool) = db.find_pool(&app.id, name).await?
    {
        return Ok(pool.id);
    }
    app.default_pool_id.clone().ok_or_else(|| {
        ApiError::Consistency(format!("App \"{}\" has no default pool", app.name))
    })
}

/// The spliced token of a request, resolved to its active-session Thing.
pub async fn require_active_thing(
    db: &CloudDatabase,
    session: &Session,
) -> ApiResult<(Thing, App)> {
    if session.active == 0 {
        return Err(ApiError::Auth("Session is not active".to_string()));
    }
    let thing_id = session
        .thing_id
        .as_deref()
        .ok_or_else(|| ApiError::Auth("Session is not registered".to_string()))?;
    let thing = db.get_thing(thing_id).await?;
    // A Thing pointing at a missing App is a server-side anomaly, not the
    // device's fault.
    let app = match db.get_app(&thing.app_id).await {
        Ok(app) => app,
        Err(corral_core::db::DatabaseError::NotFound(_)) => {
            return Err(ApiError::Consistency(format!(
                "Thing \"{}\" has no App",
                thing.tid
            )));
        }
        Err(e) => return Err(e.into()),
    };
    Ok((thing, app))
}
