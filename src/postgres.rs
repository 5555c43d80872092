//! PostgreSQL ledger backend.
//!
//! Row locks come from `SELECT ... FOR UPDATE`; wallets are created with
//! `INSERT ... ON CONFLICT`, which Postgres makes atomic against concurrent
//! inserts of the same address.

use crate::errors::StoreError;
use crate::models::Wallet;
use crate::storage::{LedgerStore, LedgerTransaction};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tracing::info;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new connection pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Wallet schema is up to date");
        Ok(())
    }

    /// Round-trip a trivial query to confirm the pool can reach the server.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, StoreError> {
    Ok(Wallet {
        address: row.try_get("address")?,
        balance: row.try_get("balance")?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn read_balance(&self, address: &str) -> Result<Option<Decimal>, StoreError> {
        let balance = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM wallets WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(balance)
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn seed(&self, wallets: &[Wallet]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for wallet in wallets {
            sqlx::query(
                r#"
                INSERT INTO wallets (address, balance) VALUES ($1, $2)
                ON CONFLICT (address) DO UPDATE SET balance = EXCLUDED.balance
                "#,
            )
            .bind(&wallet.address)
            .bind(wallet.balance)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let rows = sqlx::query(r#"SELECT address, balance FROM wallets ORDER BY address COLLATE "C""#)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(wallet_from_row).collect()
    }
}

/// One open Postgres transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_ordered(&mut self, first: &str, second: &str) -> Result<Vec<Wallet>, StoreError> {
        // Rows are locked as the sort emits them; "C" collation keeps that
        // order identical to the byte order used by `ordered_pair`.
        let rows = sqlx::query(
            r#"
            SELECT address, balance FROM wallets
            WHERE address = $1 OR address = $2
            ORDER BY address COLLATE "C"
            FOR UPDATE
            "#,
        )
        .bind(first)
        .bind(second)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(wallet_from_row).collect()
    }

    async fn set_balance(&mut self, address: &str, balance: Decimal) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE wallets SET balance = $1 WHERE address = $2")
            .bind(balance)
            .bind(address)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("wallet {address} disappeared while locked")));
        }
        Ok(())
    }

    async fn credit_or_create(&mut self, address: &str, amount: Decimal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (address, balance) VALUES ($1, $2)
            ON CONFLICT (address) DO UPDATE SET balance = wallets.balance + EXCLUDED.balance
            "#,
        )
        .bind(address)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgLedgerTransaction { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgLedgerTransaction { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
