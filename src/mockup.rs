//! Demo dataset served in [`RunMode::Mockup`].
//!
//! Twelve months of ledger rows, balances, billing and one loan for a single
//! organization, ending at an anchor month. Values follow a fixed wobble so
//! the same anchor always produces the same data.

use crate::chart_of_accounts::{ExpenseField, ExpenseRecord, IncomeField, IncomeRecord};
use crate::config::{EngineConfig, RunMode};
use crate::error::Result;
use crate::schema::*;
use crate::store::{FinanceStore, InMemoryStore};
use crate::utils::{round_half_up, YearMonth};
use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;

pub const DEMO_ORGANIZATION: &str = "Demo Care Station";
const DEMO_MONTHS: u32 = 12;
const DEMO_USERS: [&str; 8] = [
    "田中太郎", "佐藤花子", "鈴木一郎", "高橋次郎", "伊藤三郎", "渡辺四郎", "中村五郎", "小林六郎",
];

/// Deterministic offset in `-2..=2` for the `index`-th month.
fn wobble(index: usize) -> f64 {
    ((index * 7) % 5) as f64 - 2.0
}

fn income_share(field: IncomeField) -> f64 {
    match field {
        IncomeField::InsuranceIncome => 0.6,
        IncomeField::UserBurdenTransfer | IncomeField::UserBurdenWithdrawal => 0.15,
        IncomeField::FactoringIncome1 => 0.05,
        IncomeField::FactoringIncome2 => 0.02,
        IncomeField::OtherBusinessIncome => 0.01,
        IncomeField::InterestIncome | IncomeField::OtherNonBusinessIncome => 0.005,
        _ => 0.0,
    }
}

fn expense_share(field: ExpenseField) -> f64 {
    match field {
        ExpenseField::PersonnelCost => 0.65,
        ExpenseField::LegalWelfare => 0.12,
        ExpenseField::Rent => 0.05,
        ExpenseField::TravelVehicle | ExpenseField::Utilities => 0.03,
        ExpenseField::Advertising
        | ExpenseField::Consumables
        | ExpenseField::LeaseLoan
        | ExpenseField::Miscellaneous => 0.02,
        ExpenseField::Communication
        | ExpenseField::PaymentFee
        | ExpenseField::PettyCash
        | ExpenseField::CardPayment
        | ExpenseField::OtherNonBusinessExpense => 0.01,
        ExpenseField::PaymentCommission | ExpenseField::PaymentInterest => 0.005,
        _ => 0.0,
    }
}

/// Creates the demo organization in `store` and fills it with data for the
/// twelve months ending at `anchor`.
pub fn seed_demo_data<S: FinanceStore + ?Sized>(store: &S, anchor: YearMonth) -> Result<Organization> {
    let org = store.create_organization(DEMO_ORGANIZATION)?;
    let months = anchor.window_ending_here(DEMO_MONTHS);

    for (index, month) in months.iter().enumerate() {
        let w = wobble(index);

        let base_income = 8_000_000.0 + w * 100_000.0;
        store.upsert_income_record(IncomeRecord::from_fn(org.id, *month, |field| {
            round_half_up(base_income * income_share(field))
        }))?;

        let base_expense = 7_500_000.0 + w * 60_000.0;
        let mut expense = ExpenseRecord::from_fn(org.id, *month, |field| {
            round_half_up(base_expense * expense_share(field))
        });
        if index % 3 == 0 {
            expense.tax_payment = 150_000;
        }
        store.upsert_expense_record(expense)?;

        let total = 5_000_000.0 + w * 200_000.0 - index as f64 * 50_000.0;
        let split = [0.4, 0.3, 0.2, 0.08, 0.02].map(|share| round_half_up(total * share));
        store.upsert_bank_balance(BankBalance::new(org.id, *month, split))?;
    }

    let mut billing = Vec::new();
    for (month_index, month) in anchor.window_ending_here(3).iter().enumerate() {
        for (user_index, user) in DEMO_USERS.iter().enumerate() {
            let total_cost = 300_000 + (user_index as i64 * 25_000) + month_index as i64 * 5_000;
            let insurance = total_cost * 9 / 10;
            let burden = total_cost - insurance;
            let is_transfer = user_index % 2 == 0;
            billing.push(BillingRecord {
                id: 0,
                organization_id: org.id,
                billing_year_month: month.to_billing_month(),
                service_year_month: month.previous(1).to_billing_month(),
                user_name: user.to_string(),
                total_cost,
                insurance_payment: insurance,
                public_payment: 0,
                reduction: 0,
                user_burden_transfer: if is_transfer { burden } else { 0 },
                user_burden_withdrawal: if is_transfer { 0 } else { burden },
                is_transfer,
            });
        }
    }
    store.insert_billing_records(billing)?;
    store.upsert_factoring_setting(FactoringSetting::with_defaults(org.id))?;

    let origin = months.first().copied().unwrap_or(anchor);
    store.insert_loan(Loan {
        id: 0,
        organization_id: org.id,
        financial_institution: "Demo Shinkin Bank".to_string(),
        branch_name: Some("Main".to_string()),
        loan_category: LoanCategory::LongTerm,
        repayment_method: RepaymentMethod::EqualPrincipal,
        annual_interest_rate: Decimal::new(1500, 3),
        initial_borrowing_date: origin.day_clamped(10),
        repayment_due_date: 25,
        initial_borrowing_amount: 10_000_000,
        repayment_principal: 100_000,
        first_repayment_date: origin.next(1).day_clamped(25),
        is_active: true,
        effective_from: origin.first_day(),
    })?;

    for (offset, status) in [(1, MonthStatus::Forecast), (2, MonthStatus::Prediction)] {
        store.upsert_month_status(org.id, anchor.next(offset), status)?;
    }

    info!(
        "seeded demo organization {} with {} months ending {}",
        org.id, DEMO_MONTHS, anchor
    );
    Ok(org)
}

/// A store for the configured run mode: empty in live mode, pre-seeded in
/// mockup mode.
pub fn store_for_mode(config: &EngineConfig, today: NaiveDate) -> Result<InMemoryStore> {
    let store = InMemoryStore::new();
    if config.run_mode == RunMode::Mockup {
        seed_demo_data(&store, YearMonth::from_date(today).previous(1))?;
    }
    Ok(store)
}
