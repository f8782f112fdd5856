use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use esim_stock::{
    accounts::AccountService,
    clock::{Clock, SystemClock},
    config::AppConfig,
    model::Store,
    retention::RetentionSweeper,
    state::open_store,
    storage::InventoryStore,
    telemetry::{CLI_LOG_FILTER, init_tracing},
};

#[derive(Parser)]
#[command(name = "esimctl")]
#[command(about = "Operator tooling for the eSIM stock database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tables and apply column migrations, then exit.
    Migrate,
    CreateStore {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        password: String,
    },
    ResetPassword {
        #[arg(long)]
        store_id: i64,
        #[arg(long)]
        password: String,
    },
    ListStores,
    /// Run the retention sweep once.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(CLI_LOG_FILTER).context("failed to install log subscriber")?;

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load application configuration")?;
    let store = open_store(&config)
        .await
        .context("failed to open inventory database")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let accounts = AccountService::new(store.clone(), clock.clone(), config.admin_credentials());

    match cli.command {
        Command::Migrate => {
            println!("schema is up to date ({})", config.database_path.display());
        }
        Command::CreateStore {
            name,
            slug,
            password,
        } => {
            let created = accounts
                .create_store_account(&name, &slug, &password)
                .await
                .context("failed to create store")?;
            println!("created store #{} '{}' ({})", created.id, created.name, created.slug);
        }
        Command::ResetPassword { store_id, password } => {
            accounts
                .change_store_password(store_id, &password, &password)
                .await
                .with_context(|| format!("failed to reset password of store {store_id}"))?;
            println!("password of store #{store_id} updated");
        }
        Command::ListStores => {
            for line in list_stores(store.as_ref()).await? {
                println!("{line}");
            }
        }
        Command::Sweep => {
            let deleted = RetentionSweeper::new(store, clock)
                .sweep()
                .await
                .context("retention sweep failed")?;
            println!("deleted {deleted} shipped eSIMs");
        }
    }

    Ok(())
}

fn store_line(store: &Store) -> String {
    format!(
        "{:>5}  {:<24}  {:<24}  {}",
        store.id,
        store.slug,
        store.name,
        store.created_at.format("%Y-%m-%d")
    )
}

/// An empty table is a fresh install, not a failure.
async fn list_stores(store: &dyn InventoryStore) -> Result<Vec<String>> {
    let stores = store.list_stores().await.context("failed to list stores")?;
    if stores.is_empty() {
        return Ok(vec!["no stores provisioned yet".to_string()]);
    }

    Ok(stores.iter().map(store_line).collect())
}
