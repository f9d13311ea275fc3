use crate::error::{CashflowError, Result};
use crate::schema::BankBalance;
use log::warn;

/// Recomputes `total_balance` from the five sub-balances. Every write path for
/// a [`BankBalance`] goes through here.
pub fn enforce_total(balance: &mut BankBalance) {
    let expected: i64 = balance.sub_balances().iter().sum();
    if balance.total_balance != expected {
        if balance.total_balance != 0 {
            warn!(
                "bank balance total for {} corrected from {} to {}",
                balance.year_month, balance.total_balance, expected
            );
        }
        balance.total_balance = expected;
    }
}

pub fn verify_total(balance: &BankBalance) -> Result<()> {
    let expected: i64 = balance.sub_balances().iter().sum();
    if balance.total_balance != expected {
        return Err(CashflowError::BalanceMismatch {
            organization_id: balance.organization_id,
            year_month: balance.year_month.to_string(),
            stored: balance.total_balance,
            expected,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub checked: usize,
    pub mismatches: Vec<String>,
}

impl VerificationResult {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Checks every balance and collects the months whose stored total disagrees
/// with its sub-balances.
pub fn verify_balances(balances: &[BankBalance]) -> VerificationResult {
    let mismatches = balances
        .iter()
        .filter_map(|b| verify_total(b).err())
        .map(|e| e.to_string())
        .collect();

    VerificationResult {
        checked: balances.len(),
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforce_total() {
        let mut balance = BankBalance::new(1, "2024-01".parse().unwrap(), [10_000, 5_000, 0, 0, 0]);
        balance.balance3 = 2_500;
        assert!(verify_total(&balance).is_err());

        enforce_total(&mut balance);
        assert_eq!(balance.total_balance, 17_500);
        assert!(verify_total(&balance).is_ok());
    }

    #[test]
    fn test_verify_balances_reports_mismatch() {
        let good = BankBalance::new(1, "2024-01".parse().unwrap(), [1, 1, 1, 1, 1]);
        let mut bad = BankBalance::new(1, "2024-02".parse().unwrap(), [1, 1, 1, 1, 1]);
        bad.total_balance = 4;

        let result = verify_balances(&[good, bad]);
        assert_eq!(result.checked, 2);
        assert!(!result.is_consistent());
        assert!(result.mismatches[0].contains("2024-02"));
    }
}
