use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{InventoryStore, listing_order};
use crate::error::{AppError, AppResult};
use crate::model::{EsimRecord, EsimStatus, EsimUpdate, NewEsim, NewStore, Store, TenantScope};

#[derive(Default)]
struct Tables {
    stores: BTreeMap<i64, Store>,
    esims: BTreeMap<i64, EsimRecord>,
    next_store_id: i64,
    next_esim_id: i64,
}

impl Tables {
    fn allocate_store_id(&mut self) -> i64 {
        self.next_store_id += 1;
        self.next_store_id
    }

    fn allocate_esim_id(&mut self) -> i64 {
        self.next_esim_id += 1;
        self.next_esim_id
    }
}

/// Process-local gateway with the same observable semantics as the SQLite one.
/// Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryInventoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_scope(record: &EsimRecord, scope: Option<TenantScope>) -> bool {
    scope.is_none_or(|scope| record.is_visible_to(scope))
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn init(&self) -> AppResult<()> {
        Ok(())
    }

    async fn list_stores(&self) -> AppResult<Vec<Store>> {
        let tables = self.tables.read().await;
        Ok(tables.stores.values().cloned().collect())
    }

    async fn create_store(&self, store: NewStore, now: DateTime<Utc>) -> AppResult<Store> {
        let mut tables = self.tables.write().await;

        if tables.stores.values().any(|existing| existing.slug == store.slug) {
            return Err(AppError::Conflict(format!(
                "store slug '{}' already exists",
                store.slug
            )));
        }

        let id = tables.allocate_store_id();
        let created = Store {
            id,
            name: store.name,
            slug: store.slug,
            password_hash: store.password_hash,
            created_at: now,
        };
        tables.stores.insert(id, created.clone());
        Ok(created)
    }

    async fn find_store_by_slug(&self, slug: &str) -> AppResult<Option<Store>> {
        let tables = self.tables.read().await;
        Ok(tables.stores.values().find(|store| store.slug == slug).cloned())
    }

    async fn find_store_by_id(&self, id: i64) -> AppResult<Option<Store>> {
        let tables = self.tables.read().await;
        Ok(tables.stores.get(&id).cloned())
    }

    async fn update_store_password(&self, store_id: i64, password_hash: &str) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        match tables.stores.get_mut(&store_id) {
            Some(store) => {
                store.password_hash = password_hash.to_string();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn list_esims(&self, scope: TenantScope) -> AppResult<Vec<EsimRecord>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<EsimRecord> = tables
            .esims
            .values()
            .filter(|record| record.is_visible_to(scope))
            .cloned()
            .collect();
        rows.sort_by(listing_order);
        Ok(rows)
    }

    async fn create_esim(&self, esim: NewEsim, now: DateTime<Utc>) -> AppResult<EsimRecord> {
        let mut tables = self.tables.write().await;
        let id = tables.allocate_esim_id();
        let details = esim.details;

        let record = EsimRecord {
            id,
            store_id: esim.store_id,
            country: details.country,
            plan_name: details.plan_name,
            days: details.days,
            batch_name: details.batch_name,
            cost_price: details.cost_price,
            sell_price: details.sell_price,
            status: EsimStatus::Unused,
            customer_name: None,
            customer_contact: None,
            notes: details.notes,
            qr_path: details.qr_path,
            created_at: now,
            updated_at: now,
        };
        tables.esims.insert(id, record.clone());
        Ok(record)
    }

    async fn update_esim(
        &self,
        update: EsimUpdate,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables
            .esims
            .get_mut(&update.id)
            .filter(|record| in_scope(record, scope))
        else {
            return Ok(0);
        };

        record.status = update.status;
        record.customer_name = update.customer_name;
        record.customer_contact = update.customer_contact;
        record.notes = update.notes;
        record.updated_at = record.updated_at.max(now);
        Ok(1)
    }

    async fn delete_esim(&self, id: i64, scope: Option<TenantScope>) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let visible = tables
            .esims
            .get(&id)
            .is_some_and(|record| in_scope(record, scope));

        if visible {
            tables.esims.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn update_many_with_customer(
        &self,
        ids: &[i64],
        status: EsimStatus,
        customer_name: Option<&str>,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let mut affected = 0;

        for record in tables.esims.values_mut() {
            if !ids.contains(&record.id) || !in_scope(record, scope) {
                continue;
            }
            record.status = status;
            record.customer_name = customer_name.map(str::to_string);
            record.updated_at = record.updated_at.max(now);
            affected += 1;
        }

        Ok(affected)
    }

    async fn find_esims_by_ids(
        &self,
        ids: &[i64],
        scope: Option<TenantScope>,
    ) -> AppResult<Vec<EsimRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .esims
            .values()
            .filter(|record| ids.contains(&record.id) && in_scope(record, scope))
            .cloned()
            .collect())
    }

    async fn delete_shipped_esims(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.esims.len();
        tables
            .esims
            .retain(|_, record| record.status.is_in_stock() || record.updated_at > cutoff);
        Ok((before - tables.esims.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EsimDetails;

    fn new_esim(store_id: Option<i64>) -> NewEsim {
        NewEsim {
            store_id,
            details: EsimDetails::default(),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let first = NewStore {
            name: "A".into(),
            slug: "a".into(),
            password_hash: "h".into(),
        };
        store.create_store(first.clone(), Utc::now()).await.unwrap();
        assert!(store.create_store(first, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn scoped_update_skips_foreign_rows() {
        let store = InMemoryInventoryStore::new();
        let now = Utc::now();
        let mine = store.create_esim(new_esim(Some(2)), now).await.unwrap();
        let theirs = store.create_esim(new_esim(Some(3)), now).await.unwrap();

        let affected = store
            .update_many_with_customer(
                &[mine.id, theirs.id],
                EsimStatus::Peer,
                Some("bob"),
                Some(TenantScope::new(2, 1)),
                now,
            )
            .await
            .unwrap();

        assert_eq!(affected, 1);
        let rows = store.find_esims_by_ids(&[theirs.id], None).await.unwrap();
        assert_eq!(rows[0].status, EsimStatus::Unused);
    }
}
