use crate::csv_io::load_wallets;
use crate::engine::EngineConfig;
use crate::postgres::PgStore;
use crate::storage::{LedgerStore, MemoryStore};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tracing::info;

/// Store and engine settings shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// PostgreSQL URL; the in-memory ledger is used when absent
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, default_value = "10")]
    pub max_db_connections: u32,

    /// CSV file of `address,balance` rows loaded before any request
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Roll back transfers that take longer than this
    #[arg(long)]
    pub transfer_timeout_ms: Option<u64>,
}

impl StoreArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            transfer_timeout: self.transfer_timeout_ms.map(Duration::from_millis),
        }
    }

    pub async fn open_store(&self) -> Result<Arc<dyn LedgerStore>> {
        let store: Arc<dyn LedgerStore> = match &self.database_url {
            Some(url) => {
                let store = PgStore::connect(url, self.max_db_connections.max(1)).await?;
                store.migrate().await?;
                store.health_check().await?;
                Arc::new(store)
            }
            None => {
                info!("No database URL configured, using in-memory ledger");
                Arc::new(MemoryStore::new())
            }
        };

        if let Some(path) = &self.seed {
            let file = File::open(path)
                .await
                .with_context(|| format!("cannot open seed file {}", path.display()))?;
            let wallets = load_wallets(file).await?;
            store.seed(&wallets).await?;
            info!(count = wallets.len(), "Seeded wallets");
        }

        Ok(store)
    }
}
