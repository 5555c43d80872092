use crate::amount::{parse_amount, Amount};
use crate::balance::get_balance;
use crate::errors::{LedgerError, StoreError};
use crate::models::{LedgerReply, LedgerRequest, RequestOp};
use crate::storage::{LedgerStore, LedgerTransaction};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Abort and roll back a transfer that has not committed within this time.
    pub transfer_timeout: Option<Duration>,
}

/// Progress of a transfer through its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Begin,
    LockedRead,
    Validated,
    SenderWritten,
    ReceiverWritten,
    Committed,
    RolledBack,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Committed | TransferState::RolledBack)
    }
}

/// Moves value between two wallets of an injected store.
///
/// The engine keeps no locks of its own; every guarantee comes from the
/// store's row locks, taken in address order, and its transactions.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Transfer `amount` from one wallet to another and return the sender's
    /// new balance. The receiver is created if it does not exist yet.
    ///
    /// Validation failures return before any transaction is opened. Every
    /// other failure, including the configured deadline or the caller dropping
    /// the future, leaves both balances as they were.
    pub async fn transfer(&self, from: &str, to: &str, amount: &str) -> Result<Decimal, LedgerError> {
        let amount = parse_amount(amount)?;
        if from == to {
            return Err(LedgerError::SameAddress);
        }

        match self.config.transfer_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.execute(from, to, amount)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(from, to, amount = %amount, ?limit, "Transfer deadline exceeded, rolled back");
                    Err(StoreError::DeadlineExceeded(limit).into())
                }
            },
            None => self.execute(from, to, amount).await,
        }
    }

    pub async fn balance(&self, address: &str) -> Result<Decimal, LedgerError> {
        get_balance(self.store.as_ref(), address).await
    }

    /// Serve one decoded request and turn the outcome into a reply row.
    pub async fn handle(&self, request: &LedgerRequest) -> LedgerReply {
        let result = match request.op {
            RequestOp::Transfer => {
                let Some(to) = request.to.as_deref() else {
                    return LedgerReply::invalid("transfer requires a receiver address");
                };
                let amount = request.amount.as_deref().unwrap_or_default();
                self.transfer(&request.from, to, amount).await
            }
            RequestOp::Balance => self.balance(&request.from).await,
        };

        match result {
            Ok(balance) => LedgerReply::ok(request.op, balance),
            Err(err) => LedgerReply::error(request.op, &err),
        }
    }

    async fn execute(&self, from: &str, to: &str, amount: Amount) -> Result<Decimal, LedgerError> {
        let mut state = TransferState::Begin;
        self.execute_tracked(from, to, amount, &mut state).await
    }

    async fn execute_tracked(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
        state: &mut TransferState,
    ) -> Result<Decimal, LedgerError> {
        let mut tx = self.store.begin().await?;

        let err = match apply(tx.as_mut(), from, to, amount, state).await {
            Ok(new_balance) => match tx.commit().await {
                Ok(()) => {
                    *state = TransferState::Committed;
                    info!(from, to, amount = %amount, new_balance = %new_balance, state = ?*state, "Transfer committed");
                    return Ok(new_balance);
                }
                // A failed commit leaves nothing applied; the backend has
                // already discarded the transaction.
                Err(e) => LedgerError::from(e),
            },
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    error!(from, to, error = %e, "Rollback failed");
                }
                err
            }
        };

        let reached = *state;
        *state = TransferState::RolledBack;
        if err.is_infrastructure() {
            error!(from, to, amount = %amount, ?reached, state = ?*state, error = %err, "Transfer failed");
        } else {
            debug!(from, to, amount = %amount, ?reached, state = ?*state, error = %err, "Transfer rejected");
        }
        Err(err)
    }
}

/// The critical section: everything between taking the row locks and commit.
/// Only arithmetic happens here besides the store calls.
async fn apply(
    tx: &mut dyn LedgerTransaction,
    from: &str,
    to: &str,
    amount: Amount,
    state: &mut TransferState,
) -> Result<Decimal, LedgerError> {
    let rows = tx.lock_pair(from, to).await?;
    *state = TransferState::LockedRead;

    let sender = rows
        .iter()
        .find(|wallet| wallet.address == from)
        .ok_or(LedgerError::SenderNotFound)?;
    let new_balance = sender
        .balance
        .checked_sub(*amount)
        .ok_or(StoreError::Overflow)?;
    if new_balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientBalance);
    }
    *state = TransferState::Validated;

    tx.set_balance(from, new_balance).await?;
    *state = TransferState::SenderWritten;

    tx.credit_or_create(to, *amount).await?;
    *state = TransferState::ReceiverWritten;

    Ok(new_balance)
}
