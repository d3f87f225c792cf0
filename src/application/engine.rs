use anyhow::anyhow;
use tracing::{error, info, instrument, warn};

use crate::domain::{
    Account, AccountBalance, Cents, IntegrityReport, LedgerEntry, OrderId, OrderRef, ServiceId,
    UserId, build_integrity_report,
};
use crate::storage::{Repository, accounts, ledger};

use super::{BalanceError, ErrorClass, ReplenishError, ReserveError, WithdrawError};

/// Turns balance requests into ledger appends and balance updates.
///
/// Every mutating call runs in one unit of work that starts by locking the
/// user's account, so all mutations of one account are totally ordered and
/// any failure leaves both the ledger and the account untouched.
#[derive(Clone)]
pub struct TransactionEngine {
    repo: Repository,
}

impl TransactionEngine {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Credit `amount` to a user, creating the account on first use.
    /// Not idempotent: every call is a separate credit.
    #[instrument(skip(self))]
    pub async fn replenish(
        &self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Account, ReplenishError> {
        let result = self.try_replenish(user_id, amount).await;
        match &result {
            Ok(account) => info!(balance = account.balance, "Replenished account"),
            Err(err) => log_rejection(err.class(), err),
        }
        result
    }

    async fn try_replenish(
        &self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<Account, ReplenishError> {
        if amount <= 0 {
            return Err(ReplenishError::InvalidAmount(amount));
        }

        let mut uow = self.repo.begin().await?;
        accounts::get_or_create(uow.conn(), user_id).await?;
        let locked = accounts::lock_for_update(uow.conn(), user_id)
            .await?
            .ok_or_else(|| anyhow!("Account {} missing after creation", user_id))?;

        if locked.balance.checked_add(amount).is_none() {
            return Err(ReplenishError::BalanceOverflow {
                user_id,
                balance: locked.balance,
                amount,
            });
        }

        let mut credit = LedgerEntry::credit(user_id, amount);
        ledger::append(uow.conn(), &mut credit).await?;
        let account = accounts::apply_delta(uow.conn(), user_id, amount).await?;

        uow.commit().await?;
        Ok(account)
    }

    /// Reserve `amount` for an order: deduct it from the balance and record a hold.
    ///
    /// An unknown user is reported as `InsufficientBalance`. A second
    /// reservation for the same order is rejected with `AlreadyProcessed`.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        user_id: UserId,
        amount: Cents,
        order_id: OrderId,
        service_id: ServiceId,
    ) -> Result<Account, ReserveError> {
        let order = OrderRef::new(user_id, service_id, order_id);
        let result = self.try_reserve(order, amount).await;
        match &result {
            Ok(account) => info!(balance = account.balance, "Reserved order"),
            Err(err) => log_rejection(err.class(), err),
        }
        result
    }

    async fn try_reserve(&self, order: OrderRef, amount: Cents) -> Result<Account, ReserveError> {
        if amount < 0 {
            return Err(ReserveError::InvalidAmount(amount));
        }

        let mut uow = self.repo.begin().await?;

        // Existence check and lock in one statement
        let account = accounts::lock_for_update(uow.conn(), order.user_id)
            .await?
            .ok_or(ReserveError::InsufficientBalance {
                user_id: order.user_id,
                balance: 0,
                required: amount,
            })?;

        if !account.can_reserve(amount) {
            return Err(ReserveError::InsufficientBalance {
                user_id: order.user_id,
                balance: account.balance,
                required: amount,
            });
        }

        if ledger::find_by_tuple(uow.conn(), order, false)
            .await?
            .is_some()
        {
            return Err(ReserveError::AlreadyProcessed(order));
        }

        let mut debit = LedgerEntry::reservation_debit(order, amount);
        let mut hold = LedgerEntry::hold(order, amount);
        ledger::append(uow.conn(), &mut debit).await?;
        ledger::append(uow.conn(), &mut hold).await?;
        let account = accounts::apply_delta(uow.conn(), order.user_id, -amount).await?;

        uow.commit().await?;
        Ok(account)
    }

    /// Settle a reservation of exactly `amount` by releasing its hold.
    ///
    /// The balance was already reduced by `reserve`, so it is returned as
    /// read under the lock and not modified here.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Cents,
        order_id: OrderId,
        service_id: ServiceId,
    ) -> Result<Account, WithdrawError> {
        let order = OrderRef::new(user_id, service_id, order_id);
        let result = self.try_withdraw(order, amount).await;
        match &result {
            Ok(account) => info!(balance = account.balance, "Released reservation"),
            Err(err) => log_rejection(err.class(), err),
        }
        result
    }

    async fn try_withdraw(&self, order: OrderRef, amount: Cents) -> Result<Account, WithdrawError> {
        if amount < 0 {
            return Err(WithdrawError::InvalidAmount(amount));
        }

        let mut uow = self.repo.begin().await?;

        let account = accounts::lock_for_update(uow.conn(), order.user_id)
            .await?
            .ok_or(WithdrawError::TransactionNotFound(order))?;

        let hold = ledger::find_by_tuple(uow.conn(), order, true)
            .await?
            .ok_or(WithdrawError::TransactionNotFound(order))?;

        if hold.amount != amount {
            return Err(WithdrawError::WrongAmount {
                reserved: hold.amount,
                requested: amount,
            });
        }

        // Checked before the reserved sum: a released hold already nets to zero
        if ledger::find_release_of(uow.conn(), hold.id)
            .await?
            .is_some()
        {
            return Err(WithdrawError::AlreadyCancelled(order));
        }

        let reserved = ledger::sum_held_amount(uow.conn(), order.user_id).await?;
        if reserved - amount < 0 {
            return Err(WithdrawError::InternalInconsistency {
                user_id: order.user_id,
                reserved,
                amount,
            });
        }

        let mut release = LedgerEntry::release_of(&hold);
        ledger::append(uow.conn(), &mut release).await?;

        uow.commit().await?;
        Ok(account)
    }

    /// Current balance and outstanding reserved amount of a user.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: UserId) -> Result<AccountBalance, BalanceError> {
        // One unit of work so both figures come from the same snapshot
        let mut uow = self.repo.begin().await?;

        let account = accounts::get(uow.conn(), user_id)
            .await?
            .ok_or(BalanceError::UserNotExists(user_id))?;
        let reserved = ledger::sum_held_amount(uow.conn(), user_id).await?;

        uow.rollback().await?;
        Ok(AccountBalance {
            id: account.id,
            balance: account.balance,
            reserved,
        })
    }

    /// Every ledger entry of a user in append order.
    #[instrument(skip(self))]
    pub async fn history(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, BalanceError> {
        let pool = self.repo.pool();

        if accounts::get(pool, user_id).await?.is_none() {
            return Err(BalanceError::UserNotExists(user_id));
        }
        Ok(ledger::list_for_user(pool, user_id).await?)
    }

    /// Recompute every balance from the ledger and compare with the stored accounts.
    #[instrument(skip(self))]
    pub async fn check_integrity(&self) -> anyhow::Result<IntegrityReport> {
        let mut uow = self.repo.begin().await?;

        let audits = ledger::audit_accounts(uow.conn()).await?;
        let (entry_count, orphan_releases, over_released) =
            ledger::release_anomalies(uow.conn()).await?;
        uow.rollback().await?;

        let report =
            build_integrity_report(&audits, entry_count, orphan_releases, over_released);
        if !report.is_healthy() {
            error!(issues = report.issues.len(), "Ledger integrity check failed");
        }
        Ok(report)
    }
}

fn log_rejection(class: ErrorClass, err: &dyn std::fmt::Display) {
    match class {
        ErrorClass::Domain => warn!(error = %err, "Request rejected"),
        ErrorClass::Infrastructure => error!(error = %err, "Unit of work aborted"),
        ErrorClass::Fatal => error!(error = %err, fatal = true, "Ledger invariant violated"),
    }
}
