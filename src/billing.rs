//! Income projected from billing rows and factoring terms.
//!
//! Three billing months feed a target month M:
//! - M: transfer-channel user burden and the factoring advance,
//! - M-1: direct-debit user burden and the factoring remainder,
//! - M-2: insurance reimbursement when nothing is factored.

use crate::chart_of_accounts::{IncomeField, OrganizationId};
use crate::error::Result;
use crate::schema::{BillingRecord, FactoringSetting};
use crate::store::FinanceStore;
use crate::utils::{round_half_up, YearMonth};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingIncome {
    pub insurance_income: i64,
    pub user_burden_transfer: i64,
    pub user_burden_withdrawal: i64,
    pub factoring_income_1: i64,
    pub factoring_income_2: i64,
}

impl BillingIncome {
    /// Pure projection from already-fetched rows.
    pub fn from_rows(
        current: &[BillingRecord],
        previous: &[BillingRecord],
        two_prior: &[BillingRecord],
        setting: Option<&FactoringSetting>,
    ) -> Self {
        let user_burden_transfer = current
            .iter()
            .filter(|r| r.is_transfer)
            .map(BillingRecord::user_burden)
            .sum();
        let user_burden_withdrawal = previous
            .iter()
            .filter(|r| !r.is_transfer)
            .map(BillingRecord::user_burden)
            .sum();

        let (insurance_income, factoring_income_1, factoring_income_2) = match setting {
            Some(setting) => (
                0,
                factoring_advance(insurance_sum(current), setting),
                factoring_remainder(insurance_sum(previous), setting),
            ),
            None => (insurance_sum(two_prior), 0, 0),
        };

        Self {
            insurance_income,
            user_burden_transfer,
            user_burden_withdrawal,
            factoring_income_1,
            factoring_income_2,
        }
    }

    /// The projected amount for `field`, or `None` for fields billing does
    /// not drive.
    pub fn get(&self, field: IncomeField) -> Option<i64> {
        match field {
            IncomeField::InsuranceIncome => Some(self.insurance_income),
            IncomeField::UserBurdenTransfer => Some(self.user_burden_transfer),
            IncomeField::UserBurdenWithdrawal => Some(self.user_burden_withdrawal),
            IncomeField::FactoringIncome1 => Some(self.factoring_income_1),
            IncomeField::FactoringIncome2 => Some(self.factoring_income_2),
            _ => None,
        }
    }
}

fn insurance_sum(rows: &[BillingRecord]) -> i64 {
    rows.iter().map(|r| r.insurance_payment).sum()
}

/// Same-month advance: the factored share less the fee on it and the fixed
/// usage fee, never negative. Nothing is advanced on an empty month.
pub fn factoring_advance(insurance_payment: i64, setting: &FactoringSetting) -> i64 {
    if insurance_payment <= 0 {
        return 0;
    }
    let factored = round_half_up(insurance_payment as f64 * setting.factoring_fraction());
    let fee = round_half_up(factored as f64 * setting.fee_fraction());
    (factored - fee - setting.usage_fee).max(0)
}

/// The share withheld from last month's advance, paid out a month later.
pub fn factoring_remainder(insurance_payment: i64, setting: &FactoringSetting) -> i64 {
    if insurance_payment <= 0 {
        return 0;
    }
    insurance_payment - round_half_up(insurance_payment as f64 * setting.factoring_fraction())
}

pub fn project_billing_income<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    target: YearMonth,
) -> Result<BillingIncome> {
    let current = store.billing_rows(org, target.to_billing_month())?;
    let previous = store.billing_rows(org, target.previous(1).to_billing_month())?;
    let two_prior = store.billing_rows(org, target.previous(2).to_billing_month())?;
    let setting = store.factoring_setting(org)?;

    let income = BillingIncome::from_rows(&current, &previous, &two_prior, setting.as_ref());
    debug!(
        "billing projection org={} month={} rows={}/{}/{} factoring={} result={:?}",
        org,
        target,
        current.len(),
        previous.len(),
        two_prior.len(),
        setting.is_some(),
        income
    );
    Ok(income)
}
