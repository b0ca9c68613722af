//! Client-side storage for tokens and the pending post-login redirect.
//!
//! Two scopes mirror browser storage: `Durable` survives restarts ("remember
//! me"), `Session` lasts for one session only.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const LOGIN_REDIRECT_KEY: &str = "login_redirect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    Durable,
    Session,
}

impl StorageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Durable => "durable",
            StorageScope::Session => "session",
        }
    }

    pub fn for_remember(remember: bool) -> Self {
        if remember {
            StorageScope::Durable
        } else {
            StorageScope::Session
        }
    }
}

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, scope: StorageScope, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> AppResult<()>;
    async fn remove(&self, scope: StorageScope, key: &str) -> AppResult<()>;
    /// Drop everything in `scope`, as a closing tab does for session storage.
    async fn clear(&self, scope: StorageScope) -> AppResult<()>;
}

/// Access token plus optional refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

/// Write `tokens` to the scope picked by `remember`, removing any pair held in
/// the other scope so only one pair is ever stored.
pub async fn persist_tokens(storage: &dyn SessionStorage, tokens: &SessionTokens, remember: bool) -> AppResult<()> {
    remove_tokens(storage).await?;

    let scope = StorageScope::for_remember(remember);
    storage.set(scope, ACCESS_TOKEN_KEY, &tokens.access_token).await?;
    if let Some(refresh) = &tokens.refresh_token {
        storage.set(scope, REFRESH_TOKEN_KEY, refresh).await?;
    }
    tracing::debug!(scope = scope.as_str(), "tokens persisted");
    Ok(())
}

/// Stored token pair, session scope first.
pub async fn load_tokens(storage: &dyn SessionStorage) -> AppResult<Option<(StorageScope, SessionTokens)>> {
    for scope in [StorageScope::Session, StorageScope::Durable] {
        if let Some(access_token) = storage.get(scope, ACCESS_TOKEN_KEY).await? {
            let refresh_token = storage.get(scope, REFRESH_TOKEN_KEY).await?;
            return Ok(Some((
                scope,
                SessionTokens {
                    access_token,
                    refresh_token,
                },
            )));
        }
    }
    Ok(None)
}

pub async fn remove_tokens(storage: &dyn SessionStorage) -> AppResult<()> {
    for scope in [StorageScope::Session, StorageScope::Durable] {
        storage.remove(scope, ACCESS_TOKEN_KEY).await?;
        storage.remove(scope, REFRESH_TOKEN_KEY).await?;
    }
    Ok(())
}

/// Remember where a denied navigation was headed. Only one path is kept.
pub async fn save_login_redirect(storage: &dyn SessionStorage, path: &str) -> AppResult<()> {
    storage.set(StorageScope::Session, LOGIN_REDIRECT_KEY, path).await
}

/// Read and forget the pending post-login redirect.
pub async fn take_login_redirect(storage: &dyn SessionStorage) -> AppResult<Option<String>> {
    let path = storage.get(StorageScope::Session, LOGIN_REDIRECT_KEY).await?;
    if path.is_some() {
        storage.remove(StorageScope::Session, LOGIN_REDIRECT_KEY).await?;
    }
    Ok(path)
}

// =============================================================================
// IN-MEMORY BACKEND
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(StorageScope, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<(StorageScope, String), String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::internal("storage lock poisoned"))
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(&(scope, key.to_string())).cloned())
    }

    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> AppResult<()> {
        self.lock()?.remove(&(scope, key.to_string()));
        Ok(())
    }

    async fn clear(&self, scope: StorageScope) -> AppResult<()> {
        self.lock()?.retain(|(s, _), _| *s != scope);
        Ok(())
    }
}

// =============================================================================
// SQLITE BACKEND
// =============================================================================

/// SQLite-backed storage. Opening it starts a new session, so session-scope
/// rows left by a previous run are discarded.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn open(pool: SqlitePool) -> AppResult<Self> {
        let storage = Self { pool };
        storage.clear(StorageScope::Session).await?;
        Ok(storage)
    }
}

#[async_trait]
impl SessionStorage for SqliteStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> AppResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM storage_entries WHERE scope = ? AND key = ?",
        )
        .bind(scope.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO storage_entries (scope, key, value, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (scope, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(scope.as_str())
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM storage_entries WHERE scope = ? AND key = ?")
            .bind(scope.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self, scope: StorageScope) -> AppResult<()> {
        sqlx::query("DELETE FROM storage_entries WHERE scope = ?")
            .bind(scope.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_me_picks_durable_scope() {
        let storage = MemoryStorage::new();
        let tokens = SessionTokens::new("a1").with_refresh("r1");

        persist_tokens(&storage, &tokens, true).await.unwrap();
        assert_eq!(
            storage.get(StorageScope::Durable, ACCESS_TOKEN_KEY).await.unwrap().as_deref(),
            Some("a1")
        );
        assert_eq!(storage.get(StorageScope::Session, ACCESS_TOKEN_KEY).await.unwrap(), None);

        let (scope, loaded) = load_tokens(&storage).await.unwrap().unwrap();
        assert_eq!(scope, StorageScope::Durable);
        assert_eq!(loaded, tokens);
    }

    #[tokio::test]
    async fn only_one_pair_is_kept() {
        let storage = MemoryStorage::new();
        persist_tokens(&storage, &SessionTokens::new("old").with_refresh("r"), true).await.unwrap();
        persist_tokens(&storage, &SessionTokens::new("new"), false).await.unwrap();

        assert_eq!(storage.get(StorageScope::Durable, ACCESS_TOKEN_KEY).await.unwrap(), None);
        assert_eq!(storage.get(StorageScope::Durable, REFRESH_TOKEN_KEY).await.unwrap(), None);
        let (scope, loaded) = load_tokens(&storage).await.unwrap().unwrap();
        assert_eq!(scope, StorageScope::Session);
        assert_eq!(loaded, SessionTokens::new("new"));
    }

    #[tokio::test]
    async fn redirect_is_taken_once() {
        let storage = MemoryStorage::new();
        save_login_redirect(&storage, "/grades").await.unwrap();
        save_login_redirect(&storage, "/homework").await.unwrap();

        assert_eq!(take_login_redirect(&storage).await.unwrap().as_deref(), Some("/homework"));
        assert_eq!(take_login_redirect(&storage).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_only_touches_one_scope() {
        let storage = MemoryStorage::new();
        storage.set(StorageScope::Durable, "k", "d").await.unwrap();
        storage.set(StorageScope::Session, "k", "s").await.unwrap();
        storage.clear(StorageScope::Session).await.unwrap();

        assert_eq!(storage.get(StorageScope::Durable, "k").await.unwrap().as_deref(), Some("d"));
        assert_eq!(storage.get(StorageScope::Session, "k").await.unwrap(), None);
    }
}
