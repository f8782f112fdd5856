//! Caller identity and login sessions.
//!
//! Handlers never read session state directly. They resolve an
//! [`IdentityContext`] once per request and hand it to the engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::TenantScope;

/// Who is calling. A store session carries `store_id`/`store_name`; an admin
/// session carries neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub store_id: Option<i64>,
    pub store_name: Option<String>,
    pub admin: bool,
}

impl IdentityContext {
    pub fn store(store_id: i64, store_name: impl Into<String>) -> Self {
        Self {
            store_id: Some(store_id),
            store_name: Some(store_name.into()),
            admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            store_id: None,
            store_name: None,
            admin: true,
        }
    }

    /// A store identity needs both halves; a stale half-filled session is not one.
    pub fn is_store(&self) -> bool {
        self.store_id.is_some() && self.store_name.is_some()
    }

    /// Effective tenant: the session's store, or `default_store_id` when unset.
    pub fn scope(&self, default_store_id: i64) -> TenantScope {
        TenantScope::new(self.store_id.unwrap_or(default_store_id), default_store_id)
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: IdentityContext,
    expires_at: DateTime<Utc>,
}

/// Opaque-token session table.
///
/// Tokens are random v4 UUIDs; the identity never leaves the server.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts a session and returns its token.
    pub async fn open(&self, identity: IdentityContext, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let entry = SessionEntry {
            identity,
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| existing.expires_at > now);
        sessions.insert(token.clone(), entry);
        token
    }

    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Option<IdentityContext> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.identity.clone())
    }

    pub async fn revoke(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
