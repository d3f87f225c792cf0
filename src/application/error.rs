use thiserror::Error;

use crate::domain::{Cents, OrderRef, UserId};

/// How a failure should be surfaced by whatever transport sits in front of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Business-rule rejection; state is unchanged and retrying will not help.
    Domain,
    /// Store or I/O failure; the unit of work was aborted.
    Infrastructure,
    /// A store invariant has been violated; needs an operator.
    Fatal,
}

#[derive(Error, Debug)]
pub enum ReplenishError {
    #[error("Invalid amount {0}: replenishment must be positive")]
    InvalidAmount(Cents),

    #[error("Balance overflow for user {user_id}: balance {balance}, adding {amount}")]
    BalanceOverflow {
        user_id: UserId,
        balance: Cents,
        amount: Cents,
    },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ReserveError {
    #[error("Invalid amount {0}: reservation must not be negative")]
    InvalidAmount(Cents),

    #[error("Insufficient balance for user {user_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        user_id: UserId,
        balance: Cents,
        required: Cents,
    },

    #[error("Transaction already processed: {0}")]
    AlreadyProcessed(OrderRef),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum WithdrawError {
    #[error("Invalid amount {0}: withdrawal must not be negative")]
    InvalidAmount(Cents),

    #[error("No reservation found to withdraw: {0}")]
    TransactionNotFound(OrderRef),

    #[error("Withdrawal of {requested} does not match reserved amount {reserved}")]
    WrongAmount { reserved: Cents, requested: Cents },

    #[error("Transaction already cancelled: {0}")]
    AlreadyCancelled(OrderRef),

    #[error("Reserved amount for user {user_id} would go negative: reserved {reserved}, releasing {amount}")]
    InternalInconsistency {
        user_id: UserId,
        reserved: Cents,
        amount: Cents,
    },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("User does not exist: {0}")]
    UserNotExists(UserId),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid report period: month {month}, year {year}")]
    InvalidPeriod { month: u32, year: i32 },

    #[error("Report error: {0}")]
    Store(#[from] anyhow::Error),
}

impl ReplenishError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReplenishError::InvalidAmount(_) | ReplenishError::BalanceOverflow { .. } => {
                ErrorClass::Domain
            }
            ReplenishError::Store(_) => ErrorClass::Infrastructure,
        }
    }
}

impl ReserveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReserveError::InvalidAmount(_)
            | ReserveError::InsufficientBalance { .. }
            | ReserveError::AlreadyProcessed(_) => ErrorClass::Domain,
            ReserveError::Store(_) => ErrorClass::Infrastructure,
        }
    }
}

impl WithdrawError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WithdrawError::InvalidAmount(_)
            | WithdrawError::TransactionNotFound(_)
            | WithdrawError::WrongAmount { .. }
            | WithdrawError::AlreadyCancelled(_) => ErrorClass::Domain,
            WithdrawError::InternalInconsistency { .. } => ErrorClass::Fatal,
            WithdrawError::Store(_) => ErrorClass::Infrastructure,
        }
    }
}

impl BalanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BalanceError::UserNotExists(_) => ErrorClass::Domain,
            BalanceError::Store(_) => ErrorClass::Infrastructure,
        }
    }
}

impl ReportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReportError::InvalidPeriod { .. } => ErrorClass::Domain,
            ReportError::Store(_) => ErrorClass::Infrastructure,
        }
    }
}
