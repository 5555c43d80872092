pub mod amount;
pub mod balance;
pub mod cli;
pub mod config;
pub mod csv_io;
pub mod engine;
pub mod errors;
pub mod models;
pub mod postgres;
pub mod server;
pub mod storage;

pub use amount::{parse_amount, Amount};
pub use engine::{EngineConfig, TransferEngine, TransferState};
pub use errors::{LedgerError, StoreError};
pub use models::{LedgerReply, LedgerRequest, Wallet};
pub use postgres::PgStore;
pub use storage::{LedgerStore, LedgerTransaction, MemoryStore};
