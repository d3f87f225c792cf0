use serde::{Deserialize, Serialize};

use super::{Cents, EntryKind, LedgerEntry, OrderRef, UserId};

/// Lifecycle of one order tuple. There is no way back from `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    None,
    Reserved,
    Released,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::None => "none",
            OrderState::Reserved => "reserved",
            OrderState::Released => "released",
        }
    }
}

/// Balance implied by the ledger: credits plus reservation debits.
/// Hold bookkeeping is excluded.
pub fn compute_balance(user_id: UserId, entries: &[LedgerEntry]) -> Cents {
    entries
        .iter()
        .filter(|e| e.user_id == user_id && e.kind().affects_balance())
        .map(|e| e.amount)
        .sum()
}

/// Amount currently held for open orders: holds net of their releases.
pub fn outstanding_reserved(user_id: UserId, entries: &[LedgerEntry]) -> Cents {
    entries
        .iter()
        .filter(|e| e.user_id == user_id && e.is_hold)
        .map(|e| e.amount)
        .sum()
}

/// Derive the state of an order tuple from the ledger.
pub fn order_state(order: OrderRef, entries: &[LedgerEntry]) -> OrderState {
    let hold = entries
        .iter()
        .find(|e| e.kind() == EntryKind::Hold && e.order_ref() == Some(order));

    match hold {
        None => OrderState::None,
        Some(hold) => {
            let released = entries
                .iter()
                .any(|e| e.cancels_entry_id == Some(hold.id));
            if released {
                OrderState::Released
            } else {
                OrderState::Reserved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_id(mut entry: LedgerEntry, id: i64) -> LedgerEntry {
        entry.id = id;
        entry
    }

    fn reserved_ledger(order: OrderRef) -> Vec<LedgerEntry> {
        vec![
            with_id(LedgerEntry::credit(order.user_id, 100), 1),
            with_id(LedgerEntry::reservation_debit(order, 40), 2),
            with_id(LedgerEntry::hold(order, 40), 3),
        ]
    }

    #[test]
    fn test_compute_balance_empty() {
        assert_eq!(compute_balance(1, &[]), 0);
    }

    #[test]
    fn test_balance_ignores_holds() {
        let order = OrderRef::new(1, 9, 5);
        let entries = reserved_ledger(order);

        assert_eq!(compute_balance(1, &entries), 60);
        assert_eq!(outstanding_reserved(1, &entries), 40);
    }

    #[test]
    fn test_release_clears_reserved_but_not_balance() {
        let order = OrderRef::new(1, 9, 5);
        let mut entries = reserved_ledger(order);
        let release = with_id(LedgerEntry::release_of(&entries[2]), 4);
        entries.push(release);

        assert_eq!(compute_balance(1, &entries), 60);
        assert_eq!(outstanding_reserved(1, &entries), 0);
    }

    #[test]
    fn test_balances_are_per_user() {
        let entries = vec![
            with_id(LedgerEntry::credit(1, 100), 1),
            with_id(LedgerEntry::credit(2, 30), 2),
        ];

        assert_eq!(compute_balance(1, &entries), 100);
        assert_eq!(compute_balance(2, &entries), 30);
        assert_eq!(compute_balance(3, &entries), 0);
    }

    #[test]
    fn test_order_state_transitions() {
        let order = OrderRef::new(1, 9, 5);
        let other = OrderRef::new(1, 9, 6);

        let mut entries = vec![with_id(LedgerEntry::credit(1, 100), 1)];
        assert_eq!(order_state(order, &entries), OrderState::None);

        entries = reserved_ledger(order);
        assert_eq!(order_state(order, &entries), OrderState::Reserved);
        assert_eq!(order_state(other, &entries), OrderState::None);

        let release = with_id(LedgerEntry::release_of(&entries[2]), 4);
        entries.push(release);
        assert_eq!(order_state(order, &entries), OrderState::Released);
        assert_eq!(OrderState::Released.as_str(), "released");
    }
}
