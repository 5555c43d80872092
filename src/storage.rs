use crate::errors::StoreError;
use crate::models::Wallet;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Order two addresses the way every transaction must lock them.
///
/// All backends acquire row locks in ascending byte order of the address,
/// independent of which side is sending. Two transfers touching the same pair
/// therefore always queue on the same row first and can never wait on each
/// other in a cycle.
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Trait for wallet ledger backends
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Unlocked read of the last committed balance.
    async fn read_balance(&self, address: &str) -> Result<Option<Decimal>, StoreError>;

    /// Open a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    /// Insert or overwrite wallets outside of any transfer.
    async fn seed(&self, wallets: &[Wallet]) -> Result<(), StoreError>;

    /// All wallets sorted by address.
    async fn wallets(&self) -> Result<Vec<Wallet>, StoreError>;
}

/// Operations available inside one open ledger transaction.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Lock the rows of both addresses and return the ones that exist.
    ///
    /// The pair is sorted before it reaches the backend; callers pass sender
    /// and receiver in whatever order they like.
    async fn lock_pair(&mut self, a: &str, b: &str) -> Result<Vec<Wallet>, StoreError> {
        let (first, second) = ordered_pair(a, b);
        self.lock_ordered(first, second).await
    }

    /// Backend hook for [`LedgerTransaction::lock_pair`]; `first <= second`.
    async fn lock_ordered(&mut self, first: &str, second: &str) -> Result<Vec<Wallet>, StoreError>;

    /// Overwrite the balance of a row this transaction has locked.
    async fn set_balance(&mut self, address: &str, balance: Decimal) -> Result<(), StoreError>;

    /// Add `amount` to a wallet, creating it with `amount` if it does not exist.
    async fn credit_or_create(&mut self, address: &str, amount: Decimal) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// In-memory ledger with per-address locks held for a transaction's lifetime.
///
/// Committed balances live in one table; a transaction buffers its writes and
/// applies them under the table's write lock at commit, so unlocked readers
/// only ever observe committed state. Locks are keyed by address rather than
/// by row, which means an address that does not exist yet is locked as well
/// and two transfers creating the same wallet are serialized.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rows: RwLock<HashMap<String, Decimal>>,
    key_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryInner {
    fn key_lock(&self, address: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(address.to_string()).or_default().clone()
    }

    /// Forget locks nobody holds or waits on.
    fn prune_key_locks(&self, addresses: &[String]) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for address in addresses {
            if locks.get(address).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(address);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_wallets(wallets: impl IntoIterator<Item = Wallet>) -> Self {
        let rows = wallets
            .into_iter()
            .map(|w| (w.address, w.balance))
            .collect();
        Self {
            inner: Arc::new(MemoryInner {
                rows: RwLock::new(rows),
                key_locks: StdMutex::default(),
            }),
        }
    }

    /// Number of address locks currently tracked.
    pub fn tracked_locks(&self) -> usize {
        self.inner
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn read_balance(&self, address: &str) -> Result<Option<Decimal>, StoreError> {
        let rows = self.inner.rows.read().await;
        Ok(rows.get(address).copied())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            held: Vec::new(),
            pending: Vec::new(),
            finished: false,
        }))
    }

    async fn seed(&self, wallets: &[Wallet]) -> Result<(), StoreError> {
        let mut rows = self.inner.rows.write().await;
        for wallet in wallets {
            rows.insert(wallet.address.clone(), wallet.balance);
        }
        Ok(())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let rows = self.inner.rows.read().await;
        let mut wallets: Vec<Wallet> = rows
            .iter()
            .map(|(address, balance)| Wallet::new(address.clone(), *balance))
            .collect();
        wallets.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(wallets)
    }
}

enum PendingWrite {
    Set { address: String, balance: Decimal },
    Credit { address: String, amount: Decimal },
}

pub struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    held: Vec<(String, OwnedMutexGuard<()>)>,
    pending: Vec<PendingWrite>,
    finished: bool,
}

impl MemoryTransaction {
    fn holds(&self, address: &str) -> bool {
        self.held.iter().any(|(held, _)| held == address)
    }

    fn ensure_locked(&self, address: &str) -> Result<(), StoreError> {
        if self.holds(address) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(address.to_string()))
        }
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn lock_ordered(&mut self, first: &str, second: &str) -> Result<Vec<Wallet>, StoreError> {
        let addresses = if first == second {
            vec![first]
        } else {
            vec![first, second]
        };

        for address in &addresses {
            if self.holds(address) {
                continue;
            }
            let guard = self.inner.key_lock(address).lock_owned().await;
            self.held.push((address.to_string(), guard));
        }

        let rows = self.inner.rows.read().await;
        Ok(addresses
            .iter()
            .filter_map(|address| rows.get(*address).map(|b| Wallet::new(*address, *b)))
            .collect())
    }

    async fn set_balance(&mut self, address: &str, balance: Decimal) -> Result<(), StoreError> {
        self.ensure_locked(address)?;
        self.pending.push(PendingWrite::Set {
            address: address.to_string(),
            balance,
        });
        Ok(())
    }

    async fn credit_or_create(&mut self, address: &str, amount: Decimal) -> Result<(), StoreError> {
        self.ensure_locked(address)?;
        self.pending.push(PendingWrite::Credit {
            address: address.to_string(),
            amount,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let mut rows = this.inner.rows.write().await;

        // Stage everything first so an overflow leaves the table untouched.
        let mut staged: HashMap<&str, Decimal> = HashMap::new();
        for write in &this.pending {
            match write {
                PendingWrite::Set { address, balance } => {
                    staged.insert(address, *balance);
                }
                PendingWrite::Credit { address, amount } => {
                    let current = staged
                        .get(address.as_str())
                        .or_else(|| rows.get(address))
                        .copied();
                    let next = match current {
                        Some(balance) => balance.checked_add(*amount).ok_or(StoreError::Overflow)?,
                        None => *amount,
                    };
                    staged.insert(address, next);
                }
            }
        }
        for (address, balance) in staged {
            rows.insert(address.to_string(), balance);
        }
        drop(rows);

        this.pending.clear();
        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.pending.clear();
        this.finished = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                discarded_writes = self.pending.len(),
                "Uncommitted transaction dropped, rolling back"
            );
        }
        let released: Vec<String> = self
            .held
            .drain(..)
            .map(|(address, guard)| {
                drop(guard);
                address
            })
            .collect();
        self.inner.prune_key_locks(&released);
    }
}
