use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, UserId};

pub type EntryId = i64;
pub type ServiceId = i64;
pub type OrderId = i64;

/// Identifies one order of one user with one service.
/// Every reservation, hold and release for an order shares this tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRef {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
}

impl OrderRef {
    pub fn new(user_id: UserId, service_id: ServiceId, order_id: OrderId) -> Self {
        Self {
            user_id,
            service_id,
            order_id,
        }
    }
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user {} / service {} / order {}",
            self.user_id, self.service_id, self.order_id
        )
    }
}

/// The four shapes a ledger entry can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Money added to the balance.
    Credit,
    /// Balance deduction paired with a reservation.
    ReservationDebit,
    /// Outstanding reserved amount; does not touch the balance.
    Hold,
    /// Closes a hold.
    HoldRelease,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::ReservationDebit => "reservation_debit",
            EntryKind::Hold => "hold",
            EntryKind::HoldRelease => "hold_release",
        }
    }

    /// Entries of this kind move the account balance.
    pub fn affects_balance(&self) -> bool {
        matches!(self, EntryKind::Credit | EntryKind::ReservationDebit)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable record in the append-only ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic id assigned by the store on append
    pub id: EntryId,
    pub user_id: UserId,
    /// Signed amount; debits and releases are negative
    pub amount: Cents,
    pub service_id: Option<ServiceId>,
    pub order_id: Option<OrderId>,
    /// Hold bookkeeping entries do not affect the balance
    pub is_hold: bool,
    pub created_at: DateTime<Utc>,
    /// For hold releases, the hold entry being closed
    pub cancels_entry_id: Option<EntryId>,
}

impl LedgerEntry {
    fn new(user_id: UserId, amount: Cents, is_hold: bool) -> Self {
        Self {
            id: 0, // Will be set by the ledger store
            user_id,
            amount,
            service_id: None,
            order_id: None,
            is_hold,
            created_at: Utc::now(),
            cancels_entry_id: None,
        }
    }

    fn for_order(mut self, order: OrderRef) -> Self {
        self.service_id = Some(order.service_id);
        self.order_id = Some(order.order_id);
        self
    }

    /// Money added to a user's balance.
    pub fn credit(user_id: UserId, amount: Cents) -> Self {
        Self::new(user_id, amount, false)
    }

    /// The real balance deduction recorded when an order is reserved.
    pub fn reservation_debit(order: OrderRef, amount: Cents) -> Self {
        Self::new(order.user_id, -amount, false).for_order(order)
    }

    /// Records the outstanding reserved amount for an order.
    pub fn hold(order: OrderRef, amount: Cents) -> Self {
        Self::new(order.user_id, amount, true).for_order(order)
    }

    /// Closes out `hold`, settling the reservation.
    /// Callers pass an entry found with `is_hold = true`.
    pub fn release_of(hold: &LedgerEntry) -> Self {
        let mut release = Self::new(hold.user_id, -hold.amount, true);
        release.service_id = hold.service_id;
        release.order_id = hold.order_id;
        release.cancels_entry_id = Some(hold.id);
        release
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn kind(&self) -> EntryKind {
        match (self.is_hold, self.cancels_entry_id) {
            (true, Some(_)) => EntryKind::HoldRelease,
            (true, None) => EntryKind::Hold,
            (false, _) if self.order_id.is_some() => EntryKind::ReservationDebit,
            (false, _) => EntryKind::Credit,
        }
    }

    /// The order tuple this entry belongs to, if any.
    pub fn order_ref(&self) -> Option<OrderRef> {
        match (self.service_id, self.order_id) {
            (Some(service_id), Some(order_id)) => {
                Some(OrderRef::new(self.user_id, service_id, order_id))
            }
            _ => None,
        }
    }
}
