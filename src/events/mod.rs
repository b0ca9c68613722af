use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<String>, subject_id: Option<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPayload {
    pub entity: Value,
    pub severity: Severity,
}

/// Publish `<entity_type>.<action>` for `entity` on the bus.
///
/// Fire and forget: a bus without subscribers is not an error.
pub fn publish<T: Loggable>(event_bus: &EventBus, action: &str, actor_id: Option<&str>, entity: &T) {
    let name = format!("{}.{}", T::entity_type(), action);
    let payload = AuditPayload {
        entity: serde_json::to_value(entity).unwrap_or_default(),
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        name,
        actor_id.map(str::to_string),
        Some(entity.subject_id()),
        payload,
    );

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

/// Chain hash: `sha256(prev_hash || payload)`, hex encoded.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persist one bus event into `audit_log`, linking it to the previous entry.
pub async fn record(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(Value::as_str);
    let subject_id = event.get("subject_id").and_then(Value::as_str);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or(Severity::default().as_str());
    let occurred_at = event
        .get("occurred_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let payload = serde_json::to_string(event).unwrap_or_default();

    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    let hash = chain_hash(prev_hash.as_deref(), &payload);

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(actor_id)
    .bind(subject_id)
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}

/// Walk `audit_log` in insertion order and recompute every link. Returns the
/// `seq` of the first entry whose stored hashes do not match.
pub async fn verify_chain(pool: &SqlitePool) -> Result<Option<i64>, sqlx::Error> {
    let rows = sqlx::query("SELECT seq, payload, prev_hash, hash FROM audit_log ORDER BY seq ASC")
        .fetch_all(pool)
        .await?;

    let mut prev: Option<String> = None;
    for row in rows {
        let seq: i64 = row.try_get("seq")?;
        let payload: String = row.try_get("payload")?;
        let stored_prev: Option<String> = row.try_get("prev_hash")?;
        let hash: String = row.try_get("hash")?;

        if stored_prev != prev || chain_hash(prev.as_deref(), &payload) != hash {
            return Ok(Some(seq));
        }
        prev = Some(hash);
    }
    Ok(None)
}

pub async fn start_audit_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("audit listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(e) = record(&pool, &event).await {
                    tracing::error!("failed to save audit entry: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit listener lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("audit listener stopped");
}
