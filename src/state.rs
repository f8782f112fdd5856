use std::sync::Arc;

use crate::accounts::AccountService;
use crate::clock::Clock;
use crate::config::{AppConfig, DatabaseBackend};
use crate::error::AppResult;
use crate::identity::SessionRegistry;
use crate::ingest::{IngestionService, QrStorage};
use crate::inventory::InventoryEngine;
use crate::retention::RetentionSweeper;
use crate::storage::{InMemoryInventoryStore, InventoryStore, SqliteInventoryStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn InventoryStore>,
    pub clock: Arc<dyn Clock>,
    pub sessions: Arc<SessionRegistry>,
    pub engine: InventoryEngine,
    pub accounts: AccountService,
    pub ingest: IngestionService,
    pub sweeper: RetentionSweeper,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        let qr_storage = QrStorage::new(config.upload_root(), config.qr_uses_api_route());

        Self {
            engine: InventoryEngine::new(store.clone(), clock.clone(), config.default_store_id),
            accounts: AccountService::new(store.clone(), clock.clone(), config.admin_credentials()),
            ingest: IngestionService::new(store.clone(), clock.clone(), qr_storage),
            sweeper: RetentionSweeper::new(store.clone(), clock.clone()),
            sessions: Arc::new(SessionRegistry::new(config.session_ttl())),
            config: Arc::new(config),
            store,
            clock,
        }
    }
}

/// Opens the configured backend and brings its schema up to date.
pub async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn InventoryStore>> {
    let store: Arc<dyn InventoryStore> = match config.database_backend {
        DatabaseBackend::Sqlite => {
            tracing::info!(path = %config.database_path.display(), "database backend: sqlite");
            Arc::new(
                SqliteInventoryStore::open(&config.database_path, config.db_max_connections).await?,
            )
        }
        DatabaseBackend::Memory => {
            tracing::info!("database backend: memory");
            Arc::new(InMemoryInventoryStore::new())
        }
    };

    store.init().await?;
    Ok(store)
}
