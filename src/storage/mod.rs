//! Persistence gateway.
//!
//! Every component reads and writes inventory through [`InventoryStore`]; the
//! physical rows are owned by the backend behind it. Timestamps are always
//! supplied by the caller so the gateway never consults a clock.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::model::{EsimRecord, EsimStatus, EsimUpdate, NewEsim, NewStore, Store, TenantScope};

pub use memory::InMemoryInventoryStore;
pub use sqlite::SqliteInventoryStore;

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates tables and applies additive migrations. Safe to call on every boot.
    async fn init(&self) -> AppResult<()>;

    async fn list_stores(&self) -> AppResult<Vec<Store>>;
    async fn create_store(&self, store: NewStore, now: DateTime<Utc>) -> AppResult<Store>;
    async fn find_store_by_slug(&self, slug: &str) -> AppResult<Option<Store>>;
    async fn find_store_by_id(&self, id: i64) -> AppResult<Option<Store>>;
    /// Returns the number of rows changed (0 when the store does not exist).
    async fn update_store_password(&self, store_id: i64, password_hash: &str) -> AppResult<u64>;

    /// Records visible to `scope`: in-stock rows first, then by status, newest first.
    async fn list_esims(&self, scope: TenantScope) -> AppResult<Vec<EsimRecord>>;
    /// The single creation primitive. Status is forced to UNUSED and both
    /// timestamps are set to `now`.
    async fn create_esim(&self, esim: NewEsim, now: DateTime<Utc>) -> AppResult<EsimRecord>;
    /// `None` scope updates regardless of owner.
    async fn update_esim(
        &self,
        update: EsimUpdate,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;
    async fn delete_esim(&self, id: i64, scope: Option<TenantScope>) -> AppResult<u64>;
    async fn update_many_with_customer(
        &self,
        ids: &[i64],
        status: EsimStatus,
        customer_name: Option<&str>,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;
    /// `None` scope looks across every tenant.
    async fn find_esims_by_ids(
        &self,
        ids: &[i64],
        scope: Option<TenantScope>,
    ) -> AppResult<Vec<EsimRecord>>;
    /// Deletes shipped records whose `updated_at` is at or before `cutoff`.
    async fn delete_shipped_esims(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Ordering used by every listing: stock first, then status text, newest first.
pub(crate) fn listing_order(a: &EsimRecord, b: &EsimRecord) -> std::cmp::Ordering {
    b.status
        .is_in_stock()
        .cmp(&a.status.is_in_stock())
        .then_with(|| a.status.as_str().cmp(b.status.as_str()))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}
