use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite};

use super::InventoryStore;
use crate::error::{AppError, AppResult};
use crate::model::{EsimRecord, EsimStatus, EsimUpdate, NewEsim, NewStore, Store, TenantScope};

const CREATE_STORES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS stores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

// qr_path and store_id arrive through `migrate_legacy_columns`.
const CREATE_ESIMS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS esims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    country TEXT,
    plan_name TEXT,
    days INTEGER,
    batch_name TEXT,
    status TEXT NOT NULL DEFAULT 'UNUSED',
    cost_price REAL,
    sell_price REAL,
    customer_name TEXT,
    customer_contact TEXT,
    notes TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

const CREATE_ESIMS_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_esims_store_status ON esims (store_id, status)";

const ESIM_COLUMNS: &str = "id, store_id, country, plan_name, days, batch_name, status, cost_price, \
     sell_price, customer_name, customer_contact, notes, qr_path, created_at, updated_at";

const STORE_COLUMNS: &str = "id, name, slug, password_hash, created_at";

/// Ids bound per statement. SQLite caps bind parameters at 32766.
const ID_CHUNK: usize = 500;

/// SQLite-backed gateway. Timestamps are stored as unix milliseconds.
#[derive(Clone)]
pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: i64,
    name: String,
    slug: String,
    password_hash: String,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
struct EsimRow {
    id: i64,
    store_id: Option<i64>,
    country: Option<String>,
    plan_name: Option<String>,
    days: Option<i64>,
    batch_name: Option<String>,
    status: String,
    cost_price: Option<f64>,
    sell_price: Option<f64>,
    customer_name: Option<String>,
    customer_contact: Option<String>,
    notes: Option<String>,
    qr_path: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<StoreRow> for Store {
    type Error = AppError;

    fn try_from(row: StoreRow) -> AppResult<Self> {
        Ok(Store {
            id: row.id,
            name: row.name,
            slug: row.slug,
            password_hash: row.password_hash,
            created_at: from_millis(row.created_at, "stores.created_at")?,
        })
    }
}

impl TryFrom<EsimRow> for EsimRecord {
    type Error = AppError;

    fn try_from(row: EsimRow) -> AppResult<Self> {
        Ok(EsimRecord {
            id: row.id,
            store_id: row.store_id,
            country: row.country,
            plan_name: row.plan_name,
            days: row.days,
            batch_name: row.batch_name,
            status: row.status.parse::<EsimStatus>()?,
            cost_price: row.cost_price,
            sell_price: row.sell_price,
            customer_name: row.customer_name,
            customer_contact: row.customer_contact,
            notes: row.notes,
            qr_path: row.qr_path,
            created_at: from_millis(row.created_at, "esims.created_at")?,
            updated_at: from_millis(row.updated_at, "esims.updated_at")?,
        })
    }
}

fn from_millis(millis: i64, column: &str) -> AppResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::storage(format!("invalid timestamp in {column}: {millis}")))
}

fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: Option<TenantScope>) {
    if let Some(scope) = scope {
        builder.push(" AND (store_id = ").push_bind(scope.store_id());
        if scope.includes_unowned() {
            builder.push(" OR store_id IS NULL");
        }
        builder.push(")");
    }
}

/// Sorted, without repeats, so chunks never overlap.
fn distinct_ids(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push("id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

impl SqliteInventoryStore {
    /// Opens (creating if missing) a database file in WAL mode.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> AppResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn column_names(&self, table: &str) -> AppResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn migrate_legacy_columns(&self) -> AppResult<()> {
        let columns = self.column_names("esims").await?;

        if !columns.iter().any(|name| name == "qr_path") {
            tracing::info!("adding esims.qr_path column");
            sqlx::query("ALTER TABLE esims ADD COLUMN qr_path TEXT")
                .execute(&self.pool)
                .await?;
        }

        if !columns.iter().any(|name| name == "store_id") {
            tracing::info!("adding esims.store_id column");
            sqlx::query("ALTER TABLE esims ADD COLUMN store_id INTEGER REFERENCES stores(id)")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl InventoryStore for SqliteInventoryStore {
    async fn init(&self) -> AppResult<()> {
        sqlx::query(CREATE_STORES_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_ESIMS_SQL).execute(&self.pool).await?;
        self.migrate_legacy_columns().await?;
        sqlx::query(CREATE_ESIMS_INDEX_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_stores(&self) -> AppResult<Vec<Store>> {
        let rows = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Store::try_from).collect()
    }

    async fn create_store(&self, store: NewStore, now: DateTime<Utc>) -> AppResult<Store> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "INSERT INTO stores (name, slug, password_hash, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {STORE_COLUMNS}"
        ))
        .bind(store.name)
        .bind(store.slug)
        .bind(store.password_hash)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Store::try_from(row)
    }

    async fn find_store_by_slug(&self, slug: &str) -> AppResult<Option<Store>> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE slug = ?"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Store::try_from).transpose()
    }

    async fn find_store_by_id(&self, id: i64) -> AppResult<Option<Store>> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Store::try_from).transpose()
    }

    async fn update_store_password(&self, store_id: i64, password_hash: &str) -> AppResult<u64> {
        let result = sqlx::query("UPDATE stores SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(store_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_esims(&self, scope: TenantScope) -> AppResult<Vec<EsimRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ESIM_COLUMNS} FROM esims WHERE 1 = 1"
        ));
        push_scope(&mut builder, Some(scope));
        builder.push(
            " ORDER BY CASE WHEN status = 'UNUSED' THEN 0 ELSE 1 END, \
             status ASC, created_at DESC, id DESC",
        );

        let rows = builder
            .build_query_as::<EsimRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(EsimRecord::try_from).collect()
    }

    async fn create_esim(&self, esim: NewEsim, now: DateTime<Utc>) -> AppResult<EsimRecord> {
        let details = esim.details;
        let millis = now.timestamp_millis();

        let row = sqlx::query_as::<_, EsimRow>(&format!(
            "INSERT INTO esims \
             (store_id, country, plan_name, days, batch_name, cost_price, sell_price, notes, \
              qr_path, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {ESIM_COLUMNS}"
        ))
        .bind(esim.store_id)
        .bind(details.country)
        .bind(details.plan_name)
        .bind(details.days)
        .bind(details.batch_name)
        .bind(details.cost_price)
        .bind(details.sell_price)
        .bind(details.notes)
        .bind(details.qr_path)
        .bind(EsimStatus::Unused.as_str())
        .bind(millis)
        .bind(millis)
        .fetch_one(&self.pool)
        .await?;

        EsimRecord::try_from(row)
    }

    async fn update_esim(
        &self,
        update: EsimUpdate,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE esims SET status = ");
        builder
            .push_bind(update.status.as_str())
            .push(", customer_name = ")
            .push_bind(update.customer_name)
            .push(", customer_contact = ")
            .push_bind(update.customer_contact)
            .push(", notes = ")
            .push_bind(update.notes)
            .push(", updated_at = MAX(updated_at, ")
            .push_bind(now.timestamp_millis())
            .push(") WHERE id = ")
            .push_bind(update.id);
        push_scope(&mut builder, scope);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_esim(&self, id: i64, scope: Option<TenantScope>) -> AppResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM esims WHERE id = ");
        builder.push_bind(id);
        push_scope(&mut builder, scope);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn update_many_with_customer(
        &self,
        ids: &[i64],
        status: EsimStatus,
        customer_name: Option<&str>,
        scope: Option<TenantScope>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids = distinct_ids(ids);
        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE esims SET status = ");
            builder
                .push_bind(status.as_str())
                .push(", customer_name = ")
                .push_bind(customer_name.map(str::to_string))
                .push(", updated_at = MAX(updated_at, ")
                .push_bind(now.timestamp_millis())
                .push(") WHERE ");
            push_id_list(&mut builder, chunk);
            push_scope(&mut builder, scope);

            affected += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(affected)
    }

    async fn find_esims_by_ids(
        &self,
        ids: &[i64],
        scope: Option<TenantScope>,
    ) -> AppResult<Vec<EsimRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = distinct_ids(ids);
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let mut builder =
                QueryBuilder::<Sqlite>::new(format!("SELECT {ESIM_COLUMNS} FROM esims WHERE "));
            push_id_list(&mut builder, chunk);
            push_scope(&mut builder, scope);
            builder.push(" ORDER BY id ASC");

            let rows = builder
                .build_query_as::<EsimRow>()
                .fetch_all(&self.pool)
                .await?;
            for row in rows {
                records.push(EsimRecord::try_from(row)?);
            }
        }

        Ok(records)
    }

    async fn delete_shipped_esims(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM esims WHERE status IN (");
        let mut separated = builder.separated(", ");
        for status in EsimStatus::SHIPPED {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(") AND updated_at <= ");
        builder.push_bind(cutoff.timestamp_millis());

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
