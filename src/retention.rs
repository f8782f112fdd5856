//! Retention sweep for shipped history.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::error::AppResult;
use crate::storage::InventoryStore;

/// Shipped records older than this are removed. Stock is never removed.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retention: Duration::days(RETENTION_DAYS),
        }
    }

    /// Records last touched at or before this instant are eligible.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.retention
    }

    /// Deletes CUSTOMER/PEER/VOID records aged past the retention window and
    /// returns how many went.
    pub async fn sweep(&self) -> AppResult<u64> {
        let cutoff = self.cutoff();
        let deleted = self.store.delete_shipped_esims(cutoff).await?;
        tracing::info!(deleted, cutoff = %cutoff, "retention sweep finished");
        Ok(deleted)
    }
}

/// Accepts the shared secret from `Authorization: Bearer <secret>` or `?secret=`.
pub fn secret_matches(configured: &str, authorization: Option<&str>, query_secret: Option<&str>) -> bool {
    if configured.is_empty() {
        return false;
    }

    let bearer = authorization.map(|header| {
        let header = header.trim();
        match header.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => header[7..].trim(),
            _ => header,
        }
    });

    bearer == Some(configured) || query_secret == Some(configured)
}
