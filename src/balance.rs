use crate::errors::LedgerError;
use crate::storage::LedgerStore;
use rust_decimal::Decimal;

/// Latest committed balance of one wallet. Takes no locks and opens no
/// transaction, so two calls may straddle a transfer.
pub async fn get_balance(store: &dyn LedgerStore, address: &str) -> Result<Decimal, LedgerError> {
    store
        .read_balance(address)
        .await?
        .ok_or(LedgerError::NotFound)
}
