//! Status-dependent monthly projections.
//!
//! The stored [`MonthStatus`] of a month picks how its figures are sourced:
//!
//! | status       | billing-driven income        | loan-driven expense          | everything else |
//! |--------------|------------------------------|------------------------------|-----------------|
//! | `actual`     | stored record                | stored record                | stored record   |
//! | `forecast`   | projection, else average     | loan engine, else average    | average         |
//! | `prediction` | average                      | average (long-term: engine)  | average         |
//!
//! Loan-driven expense fields are `representativeLoanRepayment`,
//! `shortTermLoanRepayment`, `longTermLoanRepayment` and `paymentInterest`.
//! Forecast months take all four from the loan engine, with principal bucketed
//! by each loan's category; prediction months take only
//! `longTermLoanRepayment` from it.
//!
//! New borrowings (`longTermLoan`) always come from the loan set, whatever the
//! status. A derived value of zero falls through to the trailing average.

use crate::averages::trailing_average;
use crate::billing::project_billing_income;
use crate::chart_of_accounts::{ExpenseField, ExpenseRecord, IncomeField, IncomeRecord, OrganizationId};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::loans::{calculate_loan_repayments, new_borrowings};
use crate::schema::MonthStatus;
use crate::store::FinanceStore;
use crate::utils::YearMonth;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A month's projected record together with the status that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthProjection<R> {
    pub year_month: YearMonth,
    pub status: MonthStatus,
    pub record: R,
}

pub struct StatusDispatcher<'a, S: FinanceStore + ?Sized> {
    store: &'a S,
    history_limit: usize,
}

fn derived_or(derived: Option<i64>, fallback: impl FnOnce() -> i64) -> i64 {
    match derived {
        Some(value) if value != 0 => value,
        _ => fallback(),
    }
}

impl<'a, S: FinanceStore + ?Sized> StatusDispatcher<'a, S> {
    pub fn new(store: &'a S, config: &EngineConfig) -> Self {
        Self {
            store,
            history_limit: config.history_limit,
        }
    }

    /// Stored status for the month, `Actual` when none was ever set.
    pub fn month_status(&self, org: OrganizationId, month: YearMonth) -> Result<MonthStatus> {
        Ok(self.store.month_status(org, month)?.unwrap_or_default())
    }

    pub fn income_by_status(
        &self,
        org: OrganizationId,
        target: YearMonth,
        status: MonthStatus,
    ) -> Result<IncomeRecord> {
        debug!(
            "income projection org={} month={} status={} window={:?}",
            org,
            target,
            status,
            target.preceding(3)
        );

        if status == MonthStatus::Actual {
            return Ok(self
                .store
                .income_record(org, target)?
                .unwrap_or_else(|| IncomeRecord::zeroed(org, target)));
        }

        let history = self.store.income_records(org, self.history_limit)?;
        let borrowed = new_borrowings(self.store, org, target)?;
        let average = |field: IncomeField| trailing_average(&history, field, target);

        let record = match status {
            MonthStatus::Forecast => {
                let billing = project_billing_income(self.store, org, target)?;
                IncomeRecord::from_fn(org, target, |field| match field {
                    IncomeField::LongTermLoan => borrowed,
                    _ => derived_or(billing.get(field), || average(field)),
                })
            }
            _ => IncomeRecord::from_fn(org, target, |field| match field {
                IncomeField::LongTermLoan => borrowed,
                _ => average(field),
            }),
        };
        Ok(record)
    }

    pub fn expense_by_status(
        &self,
        org: OrganizationId,
        target: YearMonth,
        status: MonthStatus,
    ) -> Result<ExpenseRecord> {
        debug!(
            "expense projection org={} month={} status={} window={:?}",
            org,
            target,
            status,
            target.preceding(3)
        );

        if status == MonthStatus::Actual {
            return Ok(self
                .store
                .expense_record(org, target)?
                .unwrap_or_else(|| ExpenseRecord::zeroed(org, target)));
        }

        let history = self.store.expense_records(org, self.history_limit)?;
        let loans = calculate_loan_repayments(self.store, org, target)?;
        let average = |field: ExpenseField| trailing_average(&history, field, target);

        let record = match status {
            MonthStatus::Forecast => ExpenseRecord::from_fn(org, target, |field| {
                derived_or(loans.get(field), || average(field))
            }),
            _ => ExpenseRecord::from_fn(org, target, |field| match field {
                ExpenseField::LongTermLoanRepayment => derived_or(loans.get(field), || average(field)),
                _ => average(field),
            }),
        };
        Ok(record)
    }

    /// Projection for a month using its stored status.
    pub fn income_for_month(
        &self,
        org: OrganizationId,
        target: YearMonth,
    ) -> Result<MonthProjection<IncomeRecord>> {
        let status = self.month_status(org, target)?;
        Ok(MonthProjection {
            year_month: target,
            status,
            record: self.income_by_status(org, target, status)?,
        })
    }

    pub fn expense_for_month(
        &self,
        org: OrganizationId,
        target: YearMonth,
    ) -> Result<MonthProjection<ExpenseRecord>> {
        let status = self.month_status(org, target)?;
        Ok(MonthProjection {
            year_month: target,
            status,
            record: self.expense_by_status(org, target, status)?,
        })
    }

    /// One projection per requested month, each tagged with its month.
    pub fn list_income_by_status(
        &self,
        org: OrganizationId,
        months: &[YearMonth],
    ) -> Result<Vec<MonthProjection<IncomeRecord>>> {
        months
            .iter()
            .map(|month| self.income_for_month(org, *month))
            .collect()
    }

    pub fn list_expense_by_status(
        &self,
        org: OrganizationId,
        months: &[YearMonth],
    ) -> Result<Vec<MonthProjection<ExpenseRecord>>> {
        months
            .iter()
            .map(|month| self.expense_for_month(org, *month))
            .collect()
    }
}
