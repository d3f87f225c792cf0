use serde::{Deserialize, Serialize};

/// Money is held as integer minor units (cents, kopecks) to avoid floating-point drift.
pub type Cents = i64;

pub type UserId = i64;

/// Current balance row for one user.
/// Created implicitly on the first credit and only ever mutated under the account lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub balance: Cents,
}

impl Account {
    /// Whether a reservation of `amount` fits in the current balance.
    pub fn can_reserve(&self, amount: Cents) -> bool {
        self.balance - amount >= 0
    }
}

/// Balance inquiry result: the account plus the amount currently held for open orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub id: UserId,
    pub balance: Cents,
    pub reserved: Cents,
}
