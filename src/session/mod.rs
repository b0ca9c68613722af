//! Session/context state
//!
//! One [`Session`] per signed-in client holds the current user, the token
//! pair, and the selected scopes. It is the only writer of that state; every
//! mutation is published as a whole [`SessionSnapshot`] through a
//! `tokio::sync::watch` channel, so subscribers (guards) never see a torn
//! update such as a user without its tokens.

mod scope;
mod storage;

pub use scope::{ScopeKind, ScopeRef, ScopeSelection};
pub use storage::{
    load_tokens, persist_tokens, remove_tokens, save_login_redirect, take_login_redirect, MemoryStorage,
    SessionStorage, SessionTokens, SqliteStorage, StorageScope, ACCESS_TOKEN_KEY, LOGIN_REDIRECT_KEY,
    REFRESH_TOKEN_KEY,
};

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::authz::Principal;
use crate::errors::AppResult;
use crate::events::{publish, EventBus};

/// Turns a stored token pair back into a user. Implemented by the
/// authentication collaborator; see [`crate::jwt::JwtConfig`].
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, tokens: &SessionTokens) -> AppResult<Principal>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub user: Option<Principal>,
    #[serde(skip)]
    pub tokens: Option<SessionTokens>,
    pub scope: ScopeSelection,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.tokens.is_some()
    }

    /// Token present but user not yet restored.
    pub fn is_pending(&self) -> bool {
        self.user.is_none() && self.tokens.is_some()
    }
}

#[derive(Debug)]
pub struct Session {
    state: watch::Sender<SessionSnapshot>,
    events: Option<EventBus>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self { state, events: None }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Install user and tokens in one update; scopes start empty.
    pub fn login(&self, user: Principal, tokens: SessionTokens) {
        tracing::info!(user_id = %user.id, role = %user.role, "session started");
        if let Some(bus) = &self.events {
            publish(bus, "login", Some(&user.id), &user);
        }
        self.state.send_replace(SessionSnapshot {
            user: Some(user),
            tokens: Some(tokens),
            scope: ScopeSelection::default(),
        });
    }

    /// Persist tokens for the chosen storage scope, start the session, and
    /// hand back the path a guard stashed before sending the user to log in.
    pub async fn complete_login(
        &self,
        storage: &dyn SessionStorage,
        user: Principal,
        tokens: SessionTokens,
        remember: bool,
    ) -> AppResult<Option<String>> {
        persist_tokens(storage, &tokens, remember).await?;
        self.login(user, tokens);
        take_login_redirect(storage).await
    }

    /// Clear state in one update, then purge stored tokens and any pending
    /// redirect.
    pub async fn logout(&self, storage: &dyn SessionStorage) -> AppResult<()> {
        let previous = self.state.send_replace(SessionSnapshot::default());
        if let Some(user) = &previous.user {
            tracing::info!(user_id = %user.id, "session ended");
            if let Some(bus) = &self.events {
                publish(bus, "logout", Some(&user.id), user);
            }
        }

        remove_tokens(storage).await?;
        storage.remove(StorageScope::Session, LOGIN_REDIRECT_KEY).await
    }

    /// Select (or clear) one scope. Dependent scopes are cleared as needed;
    /// an invalid selection is rejected without publishing anything.
    pub fn select_scope(&self, kind: ScopeKind, value: Option<ScopeRef>) -> AppResult<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| match state.scope.select(kind, value) {
            Ok(()) => true,
            Err(err) => {
                result = Err(err);
                false
            }
        });
        if result.is_ok() {
            tracing::debug!(scope = %kind, "scope selection changed");
        }
        result
    }

    /// Restore the session from stored tokens.
    ///
    /// The token is published first (so guards wait instead of denying), then
    /// validated within `timeout`. On any failure the stored tokens are
    /// removed and the state is left empty. Never fails; returns whether a
    /// user was restored.
    pub async fn hydrate(
        &self,
        storage: &dyn SessionStorage,
        validator: &dyn TokenValidator,
        timeout: Duration,
    ) -> bool {
        let stored = match load_tokens(storage).await {
            Ok(Some((_, tokens))) => tokens,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored tokens");
                return false;
            }
        };

        self.state.send_modify(|state| {
            state.user = None;
            state.tokens = Some(stored.clone());
        });

        let failure = match tokio::time::timeout(timeout, validator.validate(&stored)).await {
            Ok(Ok(user)) => {
                let restored = self.state.send_if_modified(|state| {
                    if state.tokens.as_ref() != Some(&stored) {
                        return false;
                    }
                    state.user = Some(user.clone());
                    true
                });
                if restored {
                    tracing::info!(user_id = %user.id, "session restored");
                    if let Some(bus) = &self.events {
                        publish(bus, "restored", Some(&user.id), &user);
                    }
                } else {
                    tracing::debug!("session changed during hydration, discarding restored user");
                }
                return restored;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("validation timed out after {}ms", timeout.as_millis()),
        };

        tracing::warn!(reason = %failure, "stored session rejected");
        // A login that landed while validating owns storage now.
        let still_stored = matches!(load_tokens(storage).await, Ok(Some((_, ref current))) if *current == stored);
        let still_current = self.state.borrow().tokens.as_ref() == Some(&stored);
        if still_stored && still_current {
            if let Err(err) = remove_tokens(storage).await {
                tracing::warn!(error = %err, "could not purge rejected tokens");
            }
        } else {
            tracing::debug!("session replaced during hydration, keeping stored tokens");
        }
        self.state.send_if_modified(|state| {
            if state.tokens.as_ref() != Some(&stored) {
                return false;
            }
            *state = SessionSnapshot::default();
            true
        });
        false
    }
}
