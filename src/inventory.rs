//! Inventory lifecycle engine.
//!
//! Status moves freely between all four states. What the engine does enforce
//! is ownership: every mutation first fetches the requested rows through the
//! caller's [`TenantScope`] and only then mutates the rows that came back, so
//! ids owned by someone else are reported as skipped instead of vanishing.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::identity::IdentityContext;
use crate::model::{EsimRecord, EsimStatus, EsimUpdate, TenantScope, non_blank};
use crate::share::share_link;
use crate::storage::InventoryStore;

/// Group title for history rows without a customer name.
pub const UNNAMED_CUSTOMER: &str = "unnamed";

#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    pub in_stock: Vec<EsimRecord>,
    pub history: Vec<EsimRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryGroup {
    pub customer: String,
    pub share_link: String,
    pub items: Vec<EsimRecord>,
}

/// Result of a bulk mutation. `skipped` lists requested ids the caller does not own
/// (or that do not exist); they are never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub affected: u64,
    pub skipped: Vec<i64>,
}

#[derive(Clone)]
pub struct InventoryEngine {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    default_store_id: i64,
}

impl InventoryEngine {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, default_store_id: i64) -> Self {
        Self {
            store,
            clock,
            default_store_id,
        }
    }

    pub fn scope(&self, identity: &IdentityContext) -> TenantScope {
        identity.scope(self.default_store_id)
    }

    pub async fn list(&self, identity: &IdentityContext) -> AppResult<Vec<EsimRecord>> {
        self.store.list_esims(self.scope(identity)).await
    }

    /// Stock (`UNUSED`) and history (everything else), each in listing order.
    pub async fn view(&self, identity: &IdentityContext) -> AppResult<InventoryView> {
        let (in_stock, history): (Vec<EsimRecord>, Vec<EsimRecord>) = self
            .list(identity)
            .await?
            .into_iter()
            .partition(|record| record.status.is_in_stock());

        Ok(InventoryView { in_stock, history })
    }

    /// History grouped by customer name, most recently created group first.
    pub async fn history_groups(&self, identity: &IdentityContext) -> AppResult<Vec<HistoryGroup>> {
        let history = self.view(identity).await?.history;
        Ok(group_by_customer(history))
    }

    /// Replaces status and attribution of one owned record.
    /// Returns 0 when the id is unknown or owned by another tenant.
    pub async fn update(&self, identity: &IdentityContext, update: EsimUpdate) -> AppResult<u64> {
        let scope = self.scope(identity);
        let update = EsimUpdate {
            customer_name: non_blank(update.customer_name),
            customer_contact: non_blank(update.customer_contact),
            notes: non_blank(update.notes),
            ..update
        };

        let owned = self
            .store
            .find_esims_by_ids(&[update.id], Some(scope))
            .await?;
        if owned.is_empty() {
            tracing::debug!(id = update.id, store_id = scope.store_id(), "update skipped: not visible");
            return Ok(0);
        }

        self.store
            .update_esim(update, Some(scope), self.clock.now())
            .await
    }

    /// Ships (or voids, or restocks) several records at once, stamping one
    /// customer name across all of them.
    pub async fn bulk_set_status(
        &self,
        identity: &IdentityContext,
        ids: &[i64],
        status: EsimStatus,
        customer_name: Option<String>,
    ) -> AppResult<BulkOutcome> {
        let scope = self.scope(identity);
        let (owned, skipped) = self.partition_owned(scope, ids).await?;
        let customer_name = non_blank(customer_name);

        let affected = self
            .store
            .update_many_with_customer(
                &owned,
                status,
                customer_name.as_deref(),
                Some(scope),
                self.clock.now(),
            )
            .await?;

        tracing::info!(
            store_id = scope.store_id(),
            %status,
            affected,
            skipped = skipped.len(),
            "bulk status update"
        );
        Ok(BulkOutcome { affected, skipped })
    }

    pub async fn delete_many(&self, identity: &IdentityContext, ids: &[i64]) -> AppResult<BulkOutcome> {
        let scope = self.scope(identity);
        let (owned, skipped) = self.partition_owned(scope, ids).await?;

        let mut affected = 0;
        for id in owned {
            affected += self.store.delete_esim(id, Some(scope)).await?;
        }

        tracing::info!(store_id = scope.store_id(), affected, skipped = skipped.len(), "bulk delete");
        Ok(BulkOutcome { affected, skipped })
    }

    /// Returns a shipped record to stock. Customer name is cleared; contact and
    /// notes are kept for reference.
    pub async fn revert(&self, identity: &IdentityContext, id: i64) -> AppResult<u64> {
        let outcome = self
            .bulk_set_status(identity, &[id], EsimStatus::Unused, None)
            .await?;
        Ok(outcome.affected)
    }

    /// Splits requested ids into those visible to `scope` and the rest.
    async fn partition_owned(&self, scope: TenantScope, ids: &[i64]) -> AppResult<(Vec<i64>, Vec<i64>)> {
        let requested: BTreeSet<i64> = ids.iter().copied().filter(|id| *id > 0).collect();
        if requested.is_empty() {
            return Err(AppError::validation("at least one eSIM id is required"));
        }

        let requested: Vec<i64> = requested.into_iter().collect();
        let owned: BTreeSet<i64> = self
            .store
            .find_esims_by_ids(&requested, Some(scope))
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let skipped = requested
            .into_iter()
            .filter(|id| !owned.contains(id))
            .collect();
        Ok((owned.into_iter().collect(), skipped))
    }
}

/// Groups history rows by trimmed customer name, keeping row order inside a
/// group; groups are ordered by their first row's creation time, newest first.
pub fn group_by_customer(history: Vec<EsimRecord>) -> Vec<HistoryGroup> {
    let mut groups: Vec<(String, Vec<EsimRecord>)> = Vec::new();

    for record in history {
        let key = record
            .customer_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNNAMED_CUSTOMER)
            .to_string();

        match groups.iter().position(|(existing, _)| *existing == key) {
            Some(index) => groups[index].1.push(record),
            None => groups.push((key, vec![record])),
        }
    }

    groups.sort_by(|(_, a), (_, b)| {
        let a_first = a.first().map(|record| record.created_at);
        let b_first = b.first().map(|record| record.created_at);
        b_first.cmp(&a_first)
    });

    groups
        .into_iter()
        .map(|(customer, items)| {
            let ids: Vec<i64> = items.iter().map(|record| record.id).collect();
            HistoryGroup {
                customer,
                share_link: share_link(&ids),
                items,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(id: i64, customer: Option<&str>, age_minutes: i64) -> EsimRecord {
        let created = Utc::now() - Duration::minutes(age_minutes);
        EsimRecord {
            id,
            store_id: Some(1),
            country: None,
            plan_name: None,
            days: None,
            batch_name: None,
            cost_price: None,
            sell_price: None,
            status: EsimStatus::Customer,
            customer_name: customer.map(str::to_string),
            customer_contact: None,
            notes: None,
            qr_path: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn groups_by_trimmed_customer_name() {
        let groups = group_by_customer(vec![
            record(1, Some("Ann "), 10),
            record(2, Some("Bob"), 5),
            record(3, Some("Ann"), 20),
            record(4, None, 30),
            record(5, Some("  "), 1),
        ]);

        let names: Vec<&str> = groups.iter().map(|group| group.customer.as_str()).collect();
        // first rows: Ann -> id 1 (10m), Bob -> id 2 (5m), unnamed -> id 4 (30m)
        assert_eq!(names, vec!["Bob", "Ann", UNNAMED_CUSTOMER]);

        let ann = &groups[1];
        assert_eq!(ann.share_link, "/share?ids=1,3");
        assert_eq!(groups[2].items.len(), 2);
    }
}
