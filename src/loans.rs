//! Active-loan aggregation and the loan registry.
//!
//! The registry is the only writer of loans; each mutation appends a
//! [`LoanHistory`] row with JSON snapshots of the terms before and after.
//! Projections never read that history.

use crate::amortization::{calculate_repayment, repayment_schedule, ScheduleEntry};
use crate::chart_of_accounts::{ExpenseField, OrganizationId};
use crate::error::{CashflowError, Result};
use crate::schema::{Loan, LoanAction, LoanCategory, LoanHistory, LoanId, LoanPatch, UserId};
use crate::store::FinanceStore;
use crate::utils::YearMonth;
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Organization-wide repayment totals for one month, principal bucketed by
/// [`LoanCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanRepaymentTotals {
    pub representative_loan_repayment: i64,
    pub short_term_loan_repayment: i64,
    pub long_term_loan_repayment: i64,
    pub payment_interest: i64,
}

impl LoanRepaymentTotals {
    fn add(&mut self, category: LoanCategory, principal: i64, interest: i64) {
        match category {
            LoanCategory::Representative => self.representative_loan_repayment += principal,
            LoanCategory::ShortTerm => self.short_term_loan_repayment += principal,
            LoanCategory::LongTerm => self.long_term_loan_repayment += principal,
        }
        self.payment_interest += interest;
    }

    /// The loan-derived amount for `field`, or `None` for fields loans do not
    /// drive.
    pub fn get(&self, field: ExpenseField) -> Option<i64> {
        match field {
            ExpenseField::RepresentativeLoanRepayment => Some(self.representative_loan_repayment),
            ExpenseField::ShortTermLoanRepayment => Some(self.short_term_loan_repayment),
            ExpenseField::LongTermLoanRepayment => Some(self.long_term_loan_repayment),
            ExpenseField::PaymentInterest => Some(self.payment_interest),
            _ => None,
        }
    }
}

/// Loans enabled and effective on or before `as_of`.
pub fn resolve_active_loans<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    as_of: NaiveDate,
) -> Result<Vec<Loan>> {
    store.active_loans(org, as_of)
}

/// Pure aggregation over an already-resolved loan set.
pub fn sum_repayments(loans: &[Loan], target: YearMonth) -> LoanRepaymentTotals {
    let mut totals = LoanRepaymentTotals::default();
    for loan in loans {
        if let Some(breakdown) = calculate_repayment(loan, target) {
            totals.add(
                loan.loan_category,
                breakdown.principal_amount,
                breakdown.interest_amount,
            );
        }
    }
    totals
}

/// Repayments due in `target` across every loan active at the end of that
/// month.
pub fn calculate_loan_repayments<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    target: YearMonth,
) -> Result<LoanRepaymentTotals> {
    let loans = resolve_active_loans(store, org, target.last_day())?;
    let totals = sum_repayments(&loans, target);
    debug!(
        "loan repayments org={} month={} loans={} totals={:?}",
        org,
        target,
        loans.len(),
        totals
    );
    Ok(totals)
}

/// Principal drawn in `target`: every loan of the organization whose
/// origination date falls in that month, active or not.
pub fn new_borrowings<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    target: YearMonth,
) -> Result<i64> {
    Ok(store
        .loans(org)?
        .iter()
        .filter(|l| target.contains(l.initial_borrowing_date))
        .map(|l| l.initial_borrowing_amount)
        .sum())
}

pub struct LoanRegistry<'a, S: FinanceStore + ?Sized> {
    store: &'a S,
    user: UserId,
}

impl<'a, S: FinanceStore + ?Sized> LoanRegistry<'a, S> {
    pub fn new(store: &'a S, user: UserId) -> Self {
        Self { store, user }
    }

    pub fn list(&self, org: OrganizationId) -> Result<Vec<Loan>> {
        self.store.loans(org)
    }

    pub fn create(&self, mut loan: Loan) -> Result<Loan> {
        validate_due_day(loan.repayment_due_date)?;
        loan.branch_name = loan.branch_name.filter(|b| !b.is_empty());
        let id = self.store.insert_loan(loan.clone())?;
        loan.id = id;
        self.record(&loan, LoanAction::Create, loan.effective_from, None)?;
        debug!("created loan {} for org {}", id, loan.organization_id);
        Ok(loan)
    }

    pub fn update(&self, id: LoanId, patch: &LoanPatch) -> Result<Loan> {
        if let Some(day) = patch.repayment_due_date {
            validate_due_day(day)?;
        }
        let before = self.get(id)?;
        let mut after = before.clone();
        patch.apply(&mut after);
        self.store.replace_loan(after.clone())?;
        self.record(&after, LoanAction::Update, after.effective_from, Some(&before))?;
        Ok(after)
    }

    /// Soft toggle. The new state applies from `effective_from`.
    pub fn set_active(&self, id: LoanId, active: bool, effective_from: NaiveDate) -> Result<Loan> {
        let before = self.get(id)?;
        let mut after = before.clone();
        after.is_active = active;
        after.effective_from = effective_from;
        self.store.replace_loan(after.clone())?;

        let action = if active {
            LoanAction::Activate
        } else {
            LoanAction::Deactivate
        };
        self.record(&after, action, effective_from, Some(&before))?;
        Ok(after)
    }

    pub fn delete(&self, id: LoanId) -> Result<()> {
        if !self.store.delete_loan(id)? {
            return Err(CashflowError::LoanNotFound(id));
        }
        Ok(())
    }

    pub fn history(&self, id: LoanId) -> Result<Vec<LoanHistory>> {
        self.store.loan_history(id)
    }

    pub fn schedule(&self, id: LoanId, from: YearMonth, to: YearMonth) -> Result<Vec<ScheduleEntry>> {
        Ok(repayment_schedule(&self.get(id)?, from, to))
    }

    fn get(&self, id: LoanId) -> Result<Loan> {
        self.store.loan(id)?.ok_or(CashflowError::LoanNotFound(id))
    }

    fn record(
        &self,
        after: &Loan,
        action: LoanAction,
        effective_from: NaiveDate,
        before: Option<&Loan>,
    ) -> Result<()> {
        let previous_values = before.map(serde_json::to_string).transpose()?;
        self.store.append_loan_history(LoanHistory {
            loan_id: after.id,
            organization_id: after.organization_id,
            action,
            effective_from,
            previous_values,
            new_values: Some(serde_json::to_string(after)?),
            created_by: self.user,
        })
    }
}

fn validate_due_day(day: u32) -> Result<()> {
    if !(1..=31).contains(&day) {
        return Err(CashflowError::InvalidDueDay(day));
    }
    Ok(())
}
