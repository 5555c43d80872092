use crate::errors::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the account table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

impl Wallet {
    pub fn new(address: impl Into<String>, balance: Decimal) -> Self {
        Self {
            address: address.into(),
            balance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOp {
    Transfer,
    Balance,
}

impl RequestOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOp::Transfer => "transfer",
            RequestOp::Balance => "balance",
        }
    }
}

/// A request row as read from the CSV wire format `op,from,to,amount`.
///
/// The amount stays as text so the validator sees exactly what the caller sent.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerRequest {
    pub op: RequestOp,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

impl LedgerRequest {
    pub fn transfer(from: impl Into<String>, to: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            op: RequestOp::Transfer,
            from: from.into(),
            to: Some(to.into()),
            amount: Some(amount.into()),
        }
    }

    pub fn balance(address: impl Into<String>) -> Self {
        Self {
            op: RequestOp::Balance,
            from: address.into(),
            to: None,
            amount: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// A reply row: `op,status,value,message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReply {
    pub op: String,
    pub status: ReplyStatus,
    /// Balance on success, error kind on failure.
    pub value: String,
    pub message: String,
}

impl LedgerReply {
    pub fn ok(op: RequestOp, balance: Decimal) -> Self {
        Self {
            op: op.as_str().to_string(),
            status: ReplyStatus::Ok,
            value: balance.normalize().to_string(),
            message: String::new(),
        }
    }

    pub fn error(op: RequestOp, err: &LedgerError) -> Self {
        Self {
            op: op.as_str().to_string(),
            status: ReplyStatus::Error,
            value: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Reply for a row that could not be decoded at all.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            op: "invalid".to_string(),
            status: ReplyStatus::Error,
            value: "invalid_request".to_string(),
            message: message.into(),
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self.status {
            ReplyStatus::Ok => "ok",
            ReplyStatus::Error => "error",
        }
    }
}
