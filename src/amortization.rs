//! Month-by-month loan repayment replay.
//!
//! A loan's stored terms never include its running balance. To find what is
//! owed in a target month the schedule is replayed from the first repayment
//! date, one due date at a time, up to (not including) the target month's due
//! date. The target month's split is then taken against the carried balance.

use crate::schema::{Loan, RepaymentMethod};
use crate::utils::{round_half_up, YearMonth};
use chrono::NaiveDate;
use log::warn;
use rust_decimal::prelude::ToPrimitive;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentBreakdown {
    pub repayment_amount: i64,
    pub principal_amount: i64,
    pub interest_amount: i64,
    pub remaining_principal: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub year_month: YearMonth,
    pub due_date: NaiveDate,
    #[serde(flatten)]
    pub breakdown: RepaymentBreakdown,
}

/// Annual percentage rate converted to a monthly fraction (`1.5 -> 0.00125`).
pub fn monthly_rate(loan: &Loan) -> f64 {
    loan.annual_interest_rate.to_f64().unwrap_or(0.0) / 12.0 / 100.0
}

/// Term inferred from the fixed principal installment, since the agreed term
/// is not stored on the loan. `None` when the installment is not positive.
pub fn estimated_total_months(loan: &Loan) -> Option<u32> {
    if loan.repayment_principal <= 0 || loan.initial_borrowing_amount <= 0 {
        return None;
    }
    let months = (loan.initial_borrowing_amount + loan.repayment_principal - 1) / loan.repayment_principal;
    u32::try_from(months).ok()
}

/// Standard annuity payment. A zero rate degenerates to straight division.
pub fn level_payment(principal: i64, monthly_rate: f64, total_months: u32) -> i64 {
    if total_months == 0 {
        return 0;
    }
    let n = total_months as f64;
    let p = principal as f64;
    if monthly_rate == 0.0 {
        return round_half_up(p / n);
    }
    let factor = (1.0 + monthly_rate).powf(n);
    round_half_up(p * monthly_rate * factor / (factor - 1.0))
}

/// Per-loan constants computed once, then applied to each replayed month.
struct Amortizer {
    method: RepaymentMethod,
    monthly_rate: f64,
    fixed_principal: i64,
    level_payment: i64,
}

impl Amortizer {
    fn new(loan: &Loan) -> Self {
        let rate = monthly_rate(loan);
        let level = match loan.repayment_method {
            RepaymentMethod::EqualPrincipal => 0,
            RepaymentMethod::EqualInstallment => match estimated_total_months(loan) {
                Some(months) => level_payment(loan.initial_borrowing_amount, rate, months),
                None => {
                    warn!(
                        "loan {} has no positive repayment principal; level payment treated as 0",
                        loan.id
                    );
                    0
                }
            },
        };

        Self {
            method: loan.repayment_method,
            monthly_rate: rate,
            fixed_principal: loan.repayment_principal.max(0),
            level_payment: level,
        }
    }

    /// Principal and interest due against `balance`. The principal is the
    /// contractual installment; only the carried balance is floored at zero.
    fn split(&self, balance: i64) -> (i64, i64) {
        let interest = round_half_up(balance as f64 * self.monthly_rate);
        let principal = match self.method {
            RepaymentMethod::EqualPrincipal => self.fixed_principal,
            RepaymentMethod::EqualInstallment => (self.level_payment - interest).max(0),
        };
        (principal, interest)
    }
}

fn first_repayment_month(loan: &Loan) -> YearMonth {
    YearMonth::from_date(loan.first_repayment_date)
}

/// Balance left after every due date strictly before `until`.
fn replay_balance(loan: &Loan, amortizer: &Amortizer, until: NaiveDate) -> i64 {
    let mut balance = loan.initial_borrowing_amount.max(0);
    let mut due = loan.first_repayment_date;
    while due < until && balance > 0 {
        let (principal, _) = amortizer.split(balance);
        balance = (balance - principal).max(0);
        match YearMonth::from_date(due).checked_shift(1) {
            Some(month) => due = month.day_clamped(loan.repayment_due_date),
            None => break,
        }
    }
    balance
}

/// Repayment due in `target` for a single loan, or `None` when the target
/// month falls before the first repayment month.
pub fn calculate_repayment(loan: &Loan, target: YearMonth) -> Option<RepaymentBreakdown> {
    if target < first_repayment_month(loan) {
        return None;
    }

    let amortizer = Amortizer::new(loan);
    let target_due = target.day_clamped(loan.repayment_due_date);
    let balance = replay_balance(loan, &amortizer, target_due);
    let (principal, interest) = amortizer.split(balance);

    Some(RepaymentBreakdown {
        repayment_amount: principal + interest,
        principal_amount: principal,
        interest_amount: interest,
        remaining_principal: (balance - principal).max(0),
    })
}

/// Schedule rows for every month in `from..=to` that has a repayment due.
/// Stops early once the loan is fully repaid.
pub fn repayment_schedule(loan: &Loan, from: YearMonth, to: YearMonth) -> Vec<ScheduleEntry> {
    let amortizer = Amortizer::new(loan);
    let start = from.max(first_repayment_month(loan));
    let mut entries = Vec::new();
    if start > to {
        return entries;
    }

    let mut month = start;
    let mut balance = replay_balance(loan, &amortizer, month.day_clamped(loan.repayment_due_date));
    while month <= to && balance > 0 {
        let (principal, interest) = amortizer.split(balance);
        let remaining = (balance - principal).max(0);
        entries.push(ScheduleEntry {
            year_month: month,
            due_date: month.day_clamped(loan.repayment_due_date),
            breakdown: RepaymentBreakdown {
                repayment_amount: principal + interest,
                principal_amount: principal,
                interest_amount: interest,
                remaining_principal: remaining,
            },
        });
        balance = remaining;
        match month.checked_shift(1) {
            Some(next) => month = next,
            None => break,
        }
    }
    entries
}
