use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tempfile::tempdir;
use tokio::sync::watch;

use campus_gate::authz::{Principal, Role};
use campus_gate::events::{self, init_event_bus, record, verify_chain};
use campus_gate::guard::{AccessGuard, GuardConfig, GuardState, RouteRequirement};
use campus_gate::jwt::JwtConfig;
use campus_gate::session::{
    load_tokens, persist_tokens, take_login_redirect, Session, SessionStorage, SessionTokens, SqliteStorage,
    StorageScope, ACCESS_TOKEN_KEY,
};

#[tokio::test]
async fn session_scope_does_not_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("storage.db")).await?;

    let storage = SqliteStorage::open(pool.clone()).await?;
    persist_tokens(&storage, &SessionTokens::new("short-lived"), false).await?;
    storage.set(StorageScope::Durable, "theme", "dark").await?;
    assert!(load_tokens(&storage).await?.is_some());

    let reopened = SqliteStorage::open(pool).await?;
    assert!(load_tokens(&reopened).await?.is_none());
    assert_eq!(reopened.get(StorageScope::Durable, "theme").await?.as_deref(), Some("dark"));

    Ok(())
}

#[tokio::test]
async fn remembered_login_hydrates_after_restart() -> Result<()> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("hydrate.db")).await?;
    let jwt = JwtConfig::new("test-secret", 1);

    let user = Principal::new("t1", "Tia", Role::Teacher);
    let token = jwt.encode(&user)?;

    let storage = SqliteStorage::open(pool.clone()).await?;
    Session::new()
        .complete_login(&storage, user.clone(), SessionTokens::new(token), true)
        .await?;

    let storage = SqliteStorage::open(pool).await?;
    let session = Session::new();
    assert!(session.hydrate(&storage, &jwt, Duration::from_secs(1)).await);
    assert_eq!(session.snapshot().user, Some(user));

    Ok(())
}

#[tokio::test]
async fn tampered_token_is_purged_on_hydrate() -> Result<()> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("tampered.db")).await?;
    let storage = SqliteStorage::open(pool).await?;
    storage.set(StorageScope::Durable, ACCESS_TOKEN_KEY, "garbage").await?;

    let session = Session::new();
    let jwt = JwtConfig::new("test-secret", 1);
    assert!(!session.hydrate(&storage, &jwt, Duration::from_secs(1)).await);
    assert!(load_tokens(&storage).await?.is_none());
    assert!(!session.snapshot().is_authenticated());

    Ok(())
}

#[tokio::test]
async fn denied_guard_leaves_redirect_for_login() -> Result<()> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("redirect.db")).await?;
    let storage: Arc<dyn SessionStorage> = Arc::new(SqliteStorage::open(pool).await?);

    let session = Session::new();
    let (out_tx, mut out_rx) = watch::channel(GuardState::Unvalidated);
    let guard = AccessGuard::new(RouteRequirement::authenticated().require_class(), Arc::new(GuardConfig::default()));
    let task = tokio::spawn(guard.run(
        session.subscribe(),
        "/institute/I1/class/C1/attendance".to_string(),
        storage.clone(),
        out_tx,
    ));

    out_rx.changed().await?;
    assert!(matches!(*out_rx.borrow_and_update(), GuardState::Denied { .. }));

    let redirect = session
        .complete_login(storage.as_ref(), Principal::new("t1", "Tia", Role::Teacher), SessionTokens::new("tok"), false)
        .await?;
    assert_eq!(redirect.as_deref(), Some("/institute/I1/class/C1/attendance"));

    out_rx.changed().await?;
    assert_eq!(*out_rx.borrow_and_update(), GuardState::Allowed);
    assert_eq!(take_login_redirect(storage.as_ref()).await?, None);

    drop(out_rx);
    task.await?;
    Ok(())
}

#[tokio::test]
async fn audit_chain_detects_tampering() -> Result<()> {
    let dir = tempdir()?;
    let pool = campus_gate::db::connect_file(&dir.path().join("audit.db")).await?;

    let (bus, mut rx) = init_event_bus();
    let session = Session::new().with_events(bus);
    session.login(Principal::new("u1", "Uma", Role::Parent), SessionTokens::new("tok"));
    record(&pool, &rx.recv().await?).await?;
    record(&pool, &json!({"name": "guard.denied", "payload": {"severity": "critical"}})).await?;
    record(&pool, &json!({"name": "guard.allowed", "payload": {"severity": "noise"}})).await?;

    assert_eq!(verify_chain(&pool).await?, None);

    let first: String = sqlx::query_scalar("SELECT event_name FROM audit_log ORDER BY seq ASC LIMIT 1")
        .fetch_one(&pool)
        .await?;
    assert_eq!(first, "session.login");

    sqlx::query("UPDATE audit_log SET payload = '{}' WHERE seq = 2")
        .execute(&pool)
        .await?;
    assert_eq!(verify_chain(&pool).await?, Some(2));

    // the listener persists whatever reaches the bus
    let (bus, rx) = init_event_bus();
    let listener = tokio::spawn(events::start_audit_listener(rx, pool.clone()));
    let _ = bus.send(json!({"name": "session.logout"}));
    drop(bus);
    listener.await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log").fetch_one(&pool).await?;
    assert_eq!(count, 4);

    Ok(())
}
