use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use corral_cloud::artifacts::OsArtifacts;
use corral_cloud::server::{AppState, build_router};
use corral_cloud::storage::{Account, App, CloudDatabase, CreateAppParams, UNBOUND_AID};
use corral_core::CloudConfig;
use corral_crypto::{Aes128Ecb, Srsa};

// Exponent pair matching the built-in modulus, test fixture only.
const TEST_PUBKEY: u64 = 65_537;
const TEST_PRIVKEY: u64 = 2_477_575_639_715_728_109;

struct TestServer {
    state: AppState,
    _artifacts_dir: tempfile::TempDir,
}

async fn server() -> TestServer {
    let db = CloudDatabase::open_in_memory().await.unwrap();
    let artifacts_dir = tempfile::tempdir().unwrap();
    let state = AppState {
        db,
        srsa: Arc::new(Srsa::new(TEST_PUBKEY, TEST_PRIVKEY)),
        config: Arc::new(CloudConfig::default()),
        artifacts: Arc::new(OsArtifacts::new(artifacts_dir.path().to_path_buf())),
    };
    TestServer {
        state,
        _artifacts_dir: artifacts_dir,
    }
}

impl TestServer {
    fn db(&self) -> &CloudDatabase {
        &self.state.db
    }

    async fn seed_account(&self, username: &str, things_limit: i64) -> Account {
        self.db()
            .create_account(username, &format!("{username}@example.com"), 100_000, things_limit)
            .await
            .unwrap()
    }

    async fn seed_app(&self, name: &str, account: &Account) -> App {
        self.db()
            .create_app(CreateAppParams::new(name, &account.id))
            .await
            .unwrap()
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, String) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, text) = self.post(uri, body).await;
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register a device and return its session token.
    async fn register_device(&self, tid: &str, aid: &str) -> String {
        let (status, body) = self
            .post_json("/api/v1/things/register/", json!({ "tid": tid, "aid": aid }))
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn epoch_returns_server_time() {
    let server = server().await;
    let request = Request::get("/api/v1/time/epoch_s/")
        .body(Body::empty())
        .unwrap();
    let response = build_router(server.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["epoch_s"].as_i64().unwrap() > 1_600_000_000);
}

#[tokio::test]
async fn registration_is_idempotent() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;

    let first_token = server.register_device("T1", &app.aid).await;
    let second_token = server.register_device("T1", &app.aid).await;
    assert_ne!(first_token, second_token);

    assert_eq!(server.db().count_things(&account.id).await.unwrap(), 1);

    let first = server.db().get_session(&first_token).await.unwrap();
    let second = server.db().get_session(&second_token).await.unwrap();
    assert_eq!(first.active, 0);
    assert_eq!(second.active, 1);
}

#[tokio::test]
async fn cross_app_registration_conflicts() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app_x = server.seed_app("x", &account).await;
    let app_y = server.seed_app("y", &account).await;

    server.register_device("T1", &app_x.aid).await;

    let (status, body) = server
        .post_json(
            "/api/v1/things/register/",
            json!({ "tid": "T1", "aid": app_y.aid }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(
        body.as_str().unwrap().contains("already associated"),
        "unexpected body: {body}"
    );
    assert_eq!(server.db().count_things(&account.id).await.unwrap(), 1);
}

#[tokio::test]
async fn unbound_thing_moves_to_claimed_app() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;

    // First contact knows only the account.
    server.register_device("T1", "alice").await;
    let thing = server
        .db()
        .find_thing_in_account(&account.id, "T1")
        .await
        .unwrap()
        .unwrap();
    let pseudo_app = server.db().get_app(&thing.app_id).await.unwrap();
    assert_eq!(pseudo_app.aid, UNBOUND_AID);

    // Later registration claims the real App.
    server.register_device("T1", &app.aid).await;
    let thing = server
        .db()
        .find_thing_in_account(&account.id, "T1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(thing.app_id, app.id);
    assert_eq!(server.db().count_things(&account.id).await.unwrap(), 1);
}

#[tokio::test]
async fn queued_commands_survive_app_migration() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;

    // Command queued while the Thing still lives in the unbound pseudo-App.
    server.register_device("T1", "alice").await;
    let (status, _) = server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "reboot" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Migration to the real App must not strand it.
    let token = server.register_device("T1", &app.aid).await;
    let (status, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg"], "reboot");
}

#[tokio::test]
async fn quota_blocks_new_things_but_not_reregistration() {
    let server = server().await;
    let account = server.seed_account("alice", 1).await;
    let app = server.seed_app("greenhouse", &account).await;

    server.register_device("T1", &app.aid).await;

    let (status, body) = server
        .post_json(
            "/api/v1/things/register/",
            json!({ "tid": "T2", "aid": app.aid }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.as_str().unwrap().contains("limit"), "body: {body}");

    // The existing Thing is exempt from the creation quota.
    server.register_device("T1", &app.aid).await;
}

#[tokio::test]
async fn self_minted_tokens_are_rejected() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;

    let (status, body) = server
        .post_json(
            "/api/v1/things/register/",
            json!({ "tid": "T1", "aid": app.aid, "token": "made-up-token" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.as_str().unwrap().contains("Token not found"));
    // Rejected before any state was created.
    assert_eq!(server.db().count_things(&account.id).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_aid_is_rejected() {
    let server = server().await;
    let (status, body) = server
        .post_json(
            "/api/v1/things/register/",
            json!({ "tid": "T1", "aid": "nobody" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("not valid"));
}

#[tokio::test]
async fn worker_message_round_trip() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    let (status, _) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": {"a": 1}, "ts": 100.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": "hello", "ts": 101.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/worker/get/",
            json!({ "apikey": account.apikey, "tid": "T1", "from": 0.0, "to": 200.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);

    // A dict stays a dict, a bare string stays a string.
    let first: Value = serde_json::from_str(messages[0]["data"].as_str().unwrap()).unwrap();
    assert_eq!(first, json!({"a": 1}));
    let second: Value = serde_json::from_str(messages[1]["data"].as_str().unwrap()).unwrap();
    assert_eq!(second, json!("hello"));
}

#[tokio::test]
async fn device_message_size_limit_is_512() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    // 511 chars serialize to 513 bytes with the quotes.
    let (status, body) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": "x".repeat(511) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("too long"));

    let (status, _) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": "x".repeat(510) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn web_message_size_limit_is_1024() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    server.register_device("T1", &app.aid).await;

    let (status, _) = server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "x".repeat(1024) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "x".repeat(1025) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("too long"));
}

#[tokio::test]
async fn web_worker_drop_uses_the_1024_byte_cap() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    server.register_device("T1", &app.aid).await;

    // 1022 chars serialize to 1024 bytes with the quotes; well past the
    // device-side cap, still within the operator-side one.
    let (status, _) = server
        .post_json(
            "/api/web/v1/msg/worker/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "x".repeat(1022), "ts": 50.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/worker/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "x".repeat(1023) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("too long"));

    // The stored message reads back like any device-dropped one.
    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/worker/get/",
            json!({ "apikey": account.apikey, "tid": "T1", "from": 0.0, "to": 100.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!((messages[0]["ts"].as_f64().unwrap() - 50.0).abs() < 1e-9);

    let (status, _) = server
        .post_json(
            "/api/web/v1/msg/worker/new/",
            json!({ "apikey": "wrong", "tid": "T1", "msg": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn quota_blocks_messages_at_plan_limit() {
    let server = server().await;
    let account = server
        .db()
        .create_account("alice", "alice@example.com", 1, 5)
        .await
        .unwrap();
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    let (status, _) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": "one", "ts": 1.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post_json(
            "/api/v1/apps/worker/",
            json!({ "token": token, "msg": "two", "ts": 2.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn poll_returns_settings_and_delivers_one_command() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "reboot" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let mid = body["mid"].as_str().unwrap().to_string();

    let (status, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pool"], "development");
    assert!(body["settings"]["management_interval"].is_string());
    assert_eq!(body["msg"], "reboot");
    assert_eq!(body["mid"], Value::String(mid.clone()));
    assert_eq!(body["type"], "APP");

    // The queue holds nothing else; the next poll carries no command.
    let (status, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("msg").is_none());

    // Device replies; the operator sees the loop closed.
    let (status, _) = server
        .post_json(
            "/api/v1/things/report/",
            json!({
                "token": token,
                "what": "management",
                "status": "OK",
                "msg": { "mid": mid, "rep": "done" },
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The reply also lands as the session's management verdict.
    let session = server.db().get_session(&token).await.unwrap();
    assert_eq!(session.last_management_status, "OK");

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/management/get/",
            json!({ "apikey": account.apikey, "mid": mid }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Received");
    assert_eq!(body["reply"], "done");
}

#[tokio::test]
async fn cmd_flag_queues_an_os_level_command() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "reset", "cmd": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let mid = body["mid"].as_str().unwrap().to_string();

    // App-level polling does not pick up CMD messages.
    let (status, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("msg").is_none());

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/management/get/",
            json!({ "apikey": account.apikey, "mid": mid }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Queued");
}

#[tokio::test]
async fn concurrent_polls_deliver_exactly_once() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "reboot" }),
        )
        .await;

    let poll_a = server.post_json("/api/v1/apps/management/", json!({ "token": token }));
    let poll_b = server.post_json("/api/v1/apps/management/", json!({ "token": token }));
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(poll_a, poll_b);

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    let delivered =
        usize::from(body_a.get("msg").is_some()) + usize::from(body_b.get("msg").is_some());
    assert_eq!(delivered, 1, "a: {body_a}, b: {body_b}");
}

#[tokio::test]
async fn unhealthy_device_gets_no_commands() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    server
        .post_json(
            "/api/web/v1/msg/management/new/",
            json!({ "apikey": account.apikey, "tid": "T1", "msg": "reboot" }),
        )
        .await;

    let (status, _) = server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "os", "status": "KO", "msg": "boot loop" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("msg").is_none(), "body: {body}");

    // Recovery reopens delivery.
    server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "os", "status": "OK" }),
        )
        .await;
    let (_, body) = server
        .post_json("/api/v1/apps/management/", json!({ "token": token }))
        .await;
    assert_eq!(body["msg"], "reboot");
}

#[tokio::test]
async fn app_code_download_modes() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;
    let commit = server
        .db()
        .latest_commit(&app.id)
        .await
        .unwrap()
        .unwrap();

    let (status, body) = server
        .post_json(
            "/api/v1/apps/get/",
            json!({ "token": token, "version": commit.cid, "list": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["worker_task.py", "management_task.py"]));

    let (status, text) = server
        .post(
            "/api/v1/apps/get/",
            json!({ "token": token, "version": commit.cid, "file_name": "worker_task.py" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.starts_with("import logger\n"));
    assert!(text.contains("import sensors"));
    assert!(text.ends_with(&format!("version='{}'", commit.cid)));

    // Legacy blob mode: every file in stored order.
    let (status, text) = server
        .post(
            "/api/v1/apps/get/",
            json!({ "token": token, "version": commit.cid }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("class WorkerTask"));
    assert!(text.contains("class ManagementTask"));

    let (status, _) = server
        .post_json(
            "/api/v1/apps/get/",
            json!({ "token": token, "version": "no-such-commit" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn os_artifact_download() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    let dir = server._artifacts_dir.path().join("1.0").join("esp8266");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("files.txt"), "aa:20:version.py\nbb:16:boot.py\n").unwrap();
    std::fs::write(dir.join("version.py"), "version = '1.0'\n").unwrap();
    std::fs::write(dir.join("boot.py"), "import machine\n").unwrap();

    let (status, body) = server
        .post_json(
            "/api/v1/os/get/",
            json!({ "token": token, "version": "1.0", "platform": "esp8266", "list": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version.py"], 20);
    assert_eq!(body["boot.py"], 16);

    let (status, text) = server
        .post(
            "/api/v1/os/get/",
            json!({ "token": token, "version": "1.0", "platform": "esp8266", "file_name": "boot.py" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "import machine\n");

    let (status, _) = server
        .post_json(
            "/api/v1/os/get/",
            json!({ "token": token, "version": "9.9", "platform": "esp8266", "list": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preregistration_bootstraps_an_encrypted_channel() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;

    // Device picks key 84861 and sends it asymmetrically encrypted.
    let srsa = Srsa::new(TEST_PUBKEY, TEST_PRIVKEY);
    let key_ciphertext = srsa.encrypt_text("84861");

    let (status, text) = server
        .post(
            "/api/v1/things/preregister/",
            json!({ "key": key_ciphertext, "kty": "srsa1", "ken": "srsa1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The response is already encrypted with the recovered key.
    let cipher = Aes128Ecb::new(84_861, true);
    let body: Value = serde_json::from_str(&cipher.decrypt_text(&text).unwrap()).unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    // Register through the encrypted envelope, reusing the session token.
    let inner = json!({ "tid": "T1", "aid": app.aid, "token": token }).to_string();
    let (status, text) = server
        .post(
            "/api/v1/things/register/",
            json!({ "encrypted": cipher.encrypt_text(&inner), "token": token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&cipher.decrypt_text(&text).unwrap()).unwrap();
    assert_eq!(body["token"], Value::String(token.clone()));
    assert!(body["epoch"].as_i64().unwrap() > 1_600_000_000);

    // The handshake key survived registration.
    let session = server.db().get_session(&token).await.unwrap();
    assert_eq!(session.key.as_deref(), Some("84861"));
    assert_eq!(session.active, 1);
}

#[tokio::test]
async fn preregistration_tolerates_padded_keys() {
    let server = server().await;

    let srsa = Srsa::new(TEST_PUBKEY, TEST_PRIVKEY);
    let key_ciphertext = srsa.encrypt_text("  12345\n");

    let (status, text) = server
        .post(
            "/api/v1/things/preregister/",
            json!({ "key": key_ciphertext, "kty": "srsa1", "ken": "srsa1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let cipher = Aes128Ecb::new(12_345, true);
    let body: Value = serde_json::from_str(&cipher.decrypt_text(&text).unwrap()).unwrap();
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn unsupported_key_encoding_is_rejected() {
    let server = server().await;
    let (status, body) = server
        .post_json(
            "/api/v1/things/preregister/",
            json!({ "key": "123", "kty": "srsa1", "ken": "rot13" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("Unsupported"));
}

#[tokio::test]
async fn envelope_without_token_is_unauthorized() {
    let server = server().await;
    let (status, body) = server
        .post_json(
            "/api/v1/things/register/",
            json!({ "encrypted": "deadbeef" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.as_str().unwrap().contains("Token is missing"));
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let server = server().await;
    let (status, _) = server
        .post_json(
            "/api/v1/apps/management/",
            json!({ "token": "no-such-token" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn web_api_requires_valid_apikey() {
    let server = server().await;
    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/worker/get/",
            json!({ "tid": "T1", "from": 0.0, "to": 1.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].as_str().unwrap().contains("private API"));

    let (status, body) = server
        .post_json(
            "/api/web/v1/msg/worker/get/",
            json!({ "apikey": "wrong", "tid": "T1", "from": 0.0, "to": 1.0 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].as_str().unwrap().contains("Wrong API key"));
}

#[tokio::test]
async fn report_status_asymmetry() {
    let server = server().await;
    let account = server.seed_account("alice", 5).await;
    let app = server.seed_app("greenhouse", &account).await;
    let token = server.register_device("T1", &app.aid).await;

    // Status with detail appends.
    server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "worker", "status": "KO", "msg": "sensor gone" }),
        )
        .await;
    let session = server.db().get_session(&token).await.unwrap();
    assert_eq!(session.last_worker_status, "KO: sensor gone");

    // A bare status replaces wholesale.
    server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "worker", "status": "OK" }),
        )
        .await;
    let session = server.db().get_session(&token).await.unwrap();
    assert_eq!(session.last_worker_status, "OK");

    // Older firmware reports the OS status under the former product name.
    server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "pythings", "status": "KO", "msg": "boot loop" }),
        )
        .await;
    let session = server.db().get_session(&token).await.unwrap();
    assert_eq!(session.last_os_status, "KO: boot loop");

    let (status, body) = server
        .post_json(
            "/api/v1/things/report/",
            json!({ "token": token, "what": "bogus", "status": "OK" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("Unknown status target"));
}
