use serde::{Deserialize, Serialize};

use super::{Account, Cents};

/// Per-account figures gathered from the stores for an integrity pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountAudit {
    pub account: Account,
    /// Sum of credits and reservation debits in the ledger
    pub ledger_balance: Cents,
    /// Sum of holds and releases in the ledger
    pub reserved: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub account_count: i64,
    pub entry_count: i64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(
    audits: &[AccountAudit],
    entry_count: i64,
    orphan_releases: i64,
    over_released_holds: i64,
) -> IntegrityReport {
    let mut issues = Vec::new();

    for audit in audits {
        let account = audit.account;
        if account.balance != audit.ledger_balance {
            issues.push(format!(
                "Account {} balance {} does not match ledger balance {}",
                account.id, account.balance, audit.ledger_balance
            ));
        }
        if account.balance < 0 {
            issues.push(format!(
                "Account {} has negative balance {}",
                account.id, account.balance
            ));
        }
        if audit.reserved < 0 {
            issues.push(format!(
                "Account {} has negative reserved amount {}",
                account.id, audit.reserved
            ));
        }
    }

    if orphan_releases > 0 {
        issues.push(format!(
            "{} hold release(s) do not reference a hold entry",
            orphan_releases
        ));
    }
    if over_released_holds > 0 {
        issues.push(format!(
            "{} hold(s) have been released more than once",
            over_released_holds
        ));
    }

    IntegrityReport {
        account_count: audits.len() as i64,
        entry_count,
        issues,
    }
}
