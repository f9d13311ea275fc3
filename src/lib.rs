//! # Care Cashflow
//!
//! Multi-tenant cash-flow tracking for care-service operators: monthly income
//! and expense ledgers, bank balances, per-client billing, factoring terms,
//! budgets and loans, rolled into status-dependent monthly projections.
//!
//! ## Core Concepts
//!
//! - **Month status**: each organization-month is tagged `actual`, `forecast`
//!   or `prediction`, and the tag alone decides where its figures come from
//! - **Actual**: the stored ledger row, or zeros
//! - **Forecast**: billing and factoring projections for income, the loan
//!   engine for repayments and interest, trailing averages for the rest
//! - **Prediction**: trailing three-month averages, with loan-derived
//!   long-term figures
//! - **Loan replay**: repayments are found by replaying each loan's schedule
//!   month by month from its first repayment date
//!
//! ## Example
//!
//! ```rust,ignore
//! use care_cashflow::*;
//!
//! let service = CashflowService::new(InMemoryStore::new(), EngineConfig::default())?;
//! let org = service.create_organization("Sakura Home Care")?;
//! let ctx = RequestContext::new(1, Some(org.id));
//!
//! let april: YearMonth = "2024-04".parse()?;
//! service.set_month_status(&ctx, april, MonthStatus::Forecast)?;
//! let income = service.income_for_month(&ctx, april)?;
//! ```

pub mod amortization;
pub mod averages;
pub mod balancer;
pub mod billing;
pub mod chart_of_accounts;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod loans;
pub mod mockup;
pub mod normalizer;
pub mod report;
pub mod schema;
pub mod store;
pub mod utils;

pub use amortization::{
    calculate_repayment, level_payment, repayment_schedule, RepaymentBreakdown, ScheduleEntry,
};
pub use averages::trailing_average;
pub use balancer::{enforce_total, verify_balances, verify_total, VerificationResult};
pub use billing::{project_billing_income, BillingIncome};
pub use chart_of_accounts::{
    ExpenseField, ExpenseRecord, FieldGroup, IncomeField, IncomeRecord, MonthlyLedger,
    OrganizationId,
};
pub use config::{EngineConfig, RunMode};
pub use engine::{MonthProjection, StatusDispatcher};
pub use error::{CashflowError, Result};
pub use ingestion::{import_billing_records, BillingInput, ImportReport};
pub use loans::{
    calculate_loan_repayments, new_borrowings, resolve_active_loans, LoanRegistry,
    LoanRepaymentTotals,
};
pub use normalizer::{normalize_amount_str, normalize_numeric_input, NumericInput};
pub use report::{
    build_report, compare_budget, dashboard, sales_budgets, BudgetLine, ConsolidatedReport,
    DashboardSummary, IncomeSplit, ReportRow, SalesBudget,
};
pub use schema::*;
pub use store::{FinanceStore, InMemoryStore};
pub use utils::{BillingMonth, YearMonth};

use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who is calling and on behalf of which organization. Built by the web
/// layer from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
}

impl RequestContext {
    pub fn new(user_id: UserId, organization_id: Option<OrganizationId>) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }

    pub fn require_organization(&self) -> Result<OrganizationId> {
        self.organization_id
            .ok_or(CashflowError::MissingOrganization)
    }
}

/// Income amounts keyed by field, as entered. Absent fields store 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncomeInput {
    pub year_month: YearMonth,
    #[serde(flatten)]
    pub amounts: HashMap<IncomeField, NumericInput>,
}

impl IncomeInput {
    pub fn into_record(self, org: OrganizationId) -> IncomeRecord {
        IncomeRecord::from_fn(org, self.year_month, |field| {
            self.amounts.get(&field).map_or(0, NumericInput::normalize)
        })
    }
}

/// Expense amounts keyed by field, as entered. Absent fields store 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub year_month: YearMonth,
    #[serde(flatten)]
    pub amounts: HashMap<ExpenseField, NumericInput>,
}

impl ExpenseInput {
    pub fn into_record(self, org: OrganizationId) -> ExpenseRecord {
        ExpenseRecord::from_fn(org, self.year_month, |field| {
            self.amounts.get(&field).map_or(0, NumericInput::normalize)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankBalanceInput {
    pub year_month: YearMonth,
    #[serde(default)]
    pub balance1: NumericInput,
    #[serde(default)]
    pub balance2: NumericInput,
    #[serde(default)]
    pub balance3: NumericInput,
    #[serde(default)]
    pub balance4: NumericInput,
    #[serde(default)]
    pub balance5: NumericInput,
}

impl BankBalanceInput {
    pub fn into_balance(self, org: OrganizationId) -> BankBalance {
        let balances = [
            self.balance1.normalize(),
            self.balance2.normalize(),
            self.balance3.normalize(),
            self.balance4.normalize(),
            self.balance5.normalize(),
        ];
        BankBalance::new(org, self.year_month, balances)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInput {
    pub year_month: BudgetPeriod,
    pub category: BudgetCategory,
    pub item_name: String,
    #[serde(default)]
    pub amount: NumericInput,
}

/// Tenant-scoped entry point. Every call resolves the organization from the
/// [`RequestContext`] first; rows belonging to other organizations are
/// reported as not found.
pub struct CashflowService<S: FinanceStore> {
    store: S,
    config: EngineConfig,
}

impl CashflowService<InMemoryStore> {
    /// An in-memory service for `config.run_mode`, seeded with demo data in
    /// mockup mode.
    pub fn in_memory(config: EngineConfig, today: NaiveDate) -> Result<Self> {
        let store = mockup::store_for_mode(&config, today)?;
        Self::new(store, config)
    }
}

impl<S: FinanceStore> CashflowService<S> {
    pub fn new(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "cashflow service ready: mode={:?} history_limit={} report_months={}",
            config.run_mode, config.history_limit, config.report_months
        );
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> StatusDispatcher<'_, S> {
        StatusDispatcher::new(&self.store, &self.config)
    }

    fn loan_registry(&self, ctx: &RequestContext) -> LoanRegistry<'_, S> {
        LoanRegistry::new(&self.store, ctx.user_id)
    }

    pub fn create_organization(&self, name: &str) -> Result<Organization> {
        let org = self.store.create_organization(name)?;
        info!("created organization {} ({})", org.id, org.name);
        Ok(org)
    }

    pub fn organization(&self, ctx: &RequestContext) -> Result<Organization> {
        let org = ctx.require_organization()?;
        self.store
            .organization(org)?
            .ok_or(CashflowError::OrganizationNotFound(org))
    }

    pub fn upsert_income(&self, ctx: &RequestContext, input: IncomeInput) -> Result<IncomeRecord> {
        let record = input.into_record(ctx.require_organization()?);
        self.store.upsert_income_record(record.clone())?;
        Ok(record)
    }

    pub fn upsert_expense(&self, ctx: &RequestContext, input: ExpenseInput) -> Result<ExpenseRecord> {
        let record = input.into_record(ctx.require_organization()?);
        self.store.upsert_expense_record(record.clone())?;
        Ok(record)
    }

    pub fn income_records(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<IncomeRecord>> {
        self.store.income_records(ctx.require_organization()?, limit)
    }

    pub fn expense_records(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<ExpenseRecord>> {
        self.store.expense_records(ctx.require_organization()?, limit)
    }

    pub fn upsert_bank_balance(&self, ctx: &RequestContext, input: BankBalanceInput) -> Result<BankBalance> {
        let balance = input.into_balance(ctx.require_organization()?);
        self.store.upsert_bank_balance(balance.clone())?;
        Ok(balance)
    }

    pub fn bank_balances(&self, ctx: &RequestContext, limit: usize) -> Result<Vec<BankBalance>> {
        self.store.bank_balances(ctx.require_organization()?, limit)
    }

    pub fn month_status(&self, ctx: &RequestContext, month: YearMonth) -> Result<MonthStatus> {
        self.dispatcher()
            .month_status(ctx.require_organization()?, month)
    }

    pub fn month_statuses(
        &self,
        ctx: &RequestContext,
        months: Option<&[YearMonth]>,
    ) -> Result<Vec<MonthStatusEntry>> {
        self.store
            .month_statuses(ctx.require_organization()?, months)
    }

    pub fn set_month_status(&self, ctx: &RequestContext, month: YearMonth, status: MonthStatus) -> Result<()> {
        let org = ctx.require_organization()?;
        debug!("month status org={} month={} -> {}", org, month, status);
        self.store.upsert_month_status(org, month, status)
    }

    pub fn income_by_status(&self, ctx: &RequestContext, month: YearMonth, status: MonthStatus) -> Result<IncomeRecord> {
        self.dispatcher()
            .income_by_status(ctx.require_organization()?, month, status)
    }

    pub fn expense_by_status(&self, ctx: &RequestContext, month: YearMonth, status: MonthStatus) -> Result<ExpenseRecord> {
        self.dispatcher()
            .expense_by_status(ctx.require_organization()?, month, status)
    }

    pub fn income_for_month(&self, ctx: &RequestContext, month: YearMonth) -> Result<MonthProjection<IncomeRecord>> {
        self.dispatcher()
            .income_for_month(ctx.require_organization()?, month)
    }

    pub fn expense_for_month(&self, ctx: &RequestContext, month: YearMonth) -> Result<MonthProjection<ExpenseRecord>> {
        self.dispatcher()
            .expense_for_month(ctx.require_organization()?, month)
    }

    pub fn list_income_by_status(
        &self,
        ctx: &RequestContext,
        months: &[YearMonth],
    ) -> Result<Vec<MonthProjection<IncomeRecord>>> {
        self.dispatcher()
            .list_income_by_status(ctx.require_organization()?, months)
    }

    pub fn list_expense_by_status(
        &self,
        ctx: &RequestContext,
        months: &[YearMonth],
    ) -> Result<Vec<MonthProjection<ExpenseRecord>>> {
        self.dispatcher()
            .list_expense_by_status(ctx.require_organization()?, months)
    }

    pub fn billing_rows(&self, ctx: &RequestContext, month: BillingMonth) -> Result<Vec<BillingRecord>> {
        self.store.billing_rows(ctx.require_organization()?, month)
    }

    pub fn create_billing_record(&self, ctx: &RequestContext, input: BillingInput) -> Result<BillingRecord> {
        let mut record = input.into_record(ctx.require_organization()?);
        let ids = self.store.insert_billing_records(vec![record.clone()])?;
        record.id = ids.first().copied().unwrap_or_default();
        Ok(record)
    }

    pub fn import_billing(&self, ctx: &RequestContext, rows: Vec<BillingInput>) -> Result<ImportReport> {
        import_billing_records(&self.store, ctx.require_organization()?, rows)
    }

    pub fn update_billing_record(
        &self,
        ctx: &RequestContext,
        id: BillingRecordId,
        patch: &BillingPatch,
    ) -> Result<BillingRecord> {
        self.owned_billing_record(ctx, id)?;
        self.store.update_billing_record(id, patch)
    }

    /// Deletes the listed rows that belong to the caller's organization and
    /// returns how many were removed.
    pub fn delete_billing_records(&self, ctx: &RequestContext, ids: &[BillingRecordId]) -> Result<usize> {
        let org = ctx.require_organization()?;
        let mut owned = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.store.billing_record(*id)? {
                if record.organization_id == org {
                    owned.push(*id);
                }
            }
        }
        self.store.delete_billing_records(&owned)
    }

    fn owned_billing_record(&self, ctx: &RequestContext, id: BillingRecordId) -> Result<BillingRecord> {
        let org = ctx.require_organization()?;
        self.store
            .billing_record(id)?
            .filter(|r| r.organization_id == org)
            .ok_or(CashflowError::BillingRecordNotFound(id))
    }

    pub fn billing_income(&self, ctx: &RequestContext, month: YearMonth) -> Result<BillingIncome> {
        project_billing_income(&self.store, ctx.require_organization()?, month)
    }

    pub fn factoring_setting(&self, ctx: &RequestContext) -> Result<Option<FactoringSetting>> {
        self.store.factoring_setting(ctx.require_organization()?)
    }

    /// Stores `setting` for the caller's organization, whatever
    /// `organization_id` it carries.
    pub fn upsert_factoring_setting(&self, ctx: &RequestContext, mut setting: FactoringSetting) -> Result<FactoringSetting> {
        setting.organization_id = ctx.require_organization()?;
        self.store.upsert_factoring_setting(setting.clone())?;
        Ok(setting)
    }

    pub fn upsert_budget(&self, ctx: &RequestContext, input: BudgetInput) -> Result<Budget> {
        let budget = Budget {
            organization_id: ctx.require_organization()?,
            year_month: input.year_month,
            category: input.category,
            item_name: input.item_name,
            amount: input.amount.normalize(),
        };
        self.store.upsert_budget(budget.clone())?;
        Ok(budget)
    }

    pub fn budgets(&self, ctx: &RequestContext, period: Option<BudgetPeriod>) -> Result<Vec<Budget>> {
        self.store.budgets(ctx.require_organization()?, period)
    }

    /// Monthly sales budgets split by the legacy ratio rows.
    pub fn sales_budgets(&self, ctx: &RequestContext) -> Result<Vec<SalesBudget>> {
        let budgets = self.budgets(ctx, None)?;
        Ok(sales_budgets(&budgets, IncomeSplit::from_legacy_rows(&budgets)))
    }

    pub fn budget_comparison(&self, ctx: &RequestContext, month: YearMonth) -> Result<Vec<BudgetLine>> {
        compare_budget(&self.store, &self.config, ctx.require_organization()?, month)
    }

    pub fn loans(&self, ctx: &RequestContext) -> Result<Vec<Loan>> {
        self.store.loans(ctx.require_organization()?)
    }

    pub fn create_loan(&self, ctx: &RequestContext, mut loan: Loan) -> Result<Loan> {
        loan.organization_id = ctx.require_organization()?;
        self.loan_registry(ctx).create(loan)
    }

    pub fn update_loan(&self, ctx: &RequestContext, id: LoanId, patch: &LoanPatch) -> Result<Loan> {
        self.owned_loan(ctx, id)?;
        self.loan_registry(ctx).update(id, patch)
    }

    pub fn set_loan_active(
        &self,
        ctx: &RequestContext,
        id: LoanId,
        active: bool,
        effective_from: NaiveDate,
    ) -> Result<Loan> {
        self.owned_loan(ctx, id)?;
        self.loan_registry(ctx)
            .set_active(id, active, effective_from)
    }

    pub fn delete_loan(&self, ctx: &RequestContext, id: LoanId) -> Result<()> {
        self.owned_loan(ctx, id)?;
        self.loan_registry(ctx).delete(id)
    }

    pub fn loan_history(&self, ctx: &RequestContext, id: LoanId) -> Result<Vec<LoanHistory>> {
        self.owned_loan(ctx, id)?;
        self.loan_registry(ctx).history(id)
    }

    pub fn loan_schedule(
        &self,
        ctx: &RequestContext,
        id: LoanId,
        from: YearMonth,
        to: YearMonth,
    ) -> Result<Vec<ScheduleEntry>> {
        self.owned_loan(ctx, id)?;
        self.loan_registry(ctx).schedule(id, from, to)
    }

    pub fn loan_repayments(&self, ctx: &RequestContext, month: YearMonth) -> Result<LoanRepaymentTotals> {
        calculate_loan_repayments(&self.store, ctx.require_organization()?, month)
    }

    fn owned_loan(&self, ctx: &RequestContext, id: LoanId) -> Result<Loan> {
        let org = ctx.require_organization()?;
        self.store
            .loan(id)?
            .filter(|l| l.organization_id == org)
            .ok_or(CashflowError::LoanNotFound(id))
    }

    /// Consolidated report for the configured number of months ending at
    /// `anchor`.
    pub fn report(&self, ctx: &RequestContext, anchor: YearMonth) -> Result<ConsolidatedReport> {
        build_report(&self.store, &self.config, ctx.require_organization()?, anchor)
    }

    pub fn dashboard(&self, ctx: &RequestContext) -> Result<DashboardSummary> {
        dashboard(&self.store, ctx.require_organization()?, self.config.history_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn service() -> (CashflowService<InMemoryStore>, RequestContext) {
        let service = CashflowService::new(InMemoryStore::new(), EngineConfig::default()).unwrap();
        let org = service.create_organization("Sakura Home Care").unwrap();
        (service, RequestContext::new(1, Some(org.id)))
    }

    #[test]
    fn test_missing_organization_is_rejected() {
        let (service, _) = service();
        let anonymous = RequestContext::new(1, None);
        assert!(matches!(
            service.income_for_month(&anonymous, ym("2024-01")),
            Err(CashflowError::MissingOrganization)
        ));
        assert!(matches!(
            service.dashboard(&anonymous),
            Err(CashflowError::MissingOrganization)
        ));
    }

    #[test]
    fn test_income_input_normalizes_amounts() {
        let (service, ctx) = service();
        let input: IncomeInput = serde_json::from_str(
            r#"{"yearMonth": "2024-01", "insuranceIncome": "¥1,234,567", "interestIncome": 12.5, "otherBusinessIncome": null}"#,
        )
        .unwrap();
        let record = service.upsert_income(&ctx, input).unwrap();
        assert_eq!(record.insurance_income, 1_234_567);
        assert_eq!(record.interest_income, 13);
        assert_eq!(record.other_business_income, 0);

        let stored = service.income_records(&ctx, 12).unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[test]
    fn test_bank_balance_input_total() {
        let (service, ctx) = service();
        let balance = service
            .upsert_bank_balance(
                &ctx,
                BankBalanceInput {
                    year_month: ym("2024-01"),
                    balance1: "１，０００".into(),
                    balance2: 2_000_i64.into(),
                    balance3: NumericInput::Missing,
                    balance4: "abc".into(),
                    balance5: "-500".into(),
                },
            )
            .unwrap();
        assert_eq!(balance.total_balance, 2_500);
    }

    #[test]
    fn test_other_tenants_rows_are_not_found() {
        let (service, ctx) = service();
        let other = service.create_organization("Other").unwrap();
        let other_ctx = RequestContext::new(2, Some(other.id));

        let record = service
            .create_billing_record(
                &ctx,
                BillingInput {
                    billing_year_month: "202401".parse().unwrap(),
                    service_year_month: "202312".parse().unwrap(),
                    user_name: "Kimura".to_string(),
                    total_cost: 1_000_i64.into(),
                    insurance_payment: 900_i64.into(),
                    public_payment: NumericInput::Missing,
                    reduction: NumericInput::Missing,
                    user_burden_transfer: 100_i64.into(),
                    user_burden_withdrawal: NumericInput::Missing,
                    is_transfer: true,
                },
            )
            .unwrap();

        assert!(matches!(
            service.update_billing_record(&other_ctx, record.id, &BillingPatch::default()),
            Err(CashflowError::BillingRecordNotFound(_))
        ));
        assert_eq!(service.delete_billing_records(&other_ctx, &[record.id]).unwrap(), 0);
        assert_eq!(service.delete_billing_records(&ctx, &[record.id]).unwrap(), 1);
    }

    #[test]
    fn test_factoring_setting_scoped_to_caller() {
        let (service, ctx) = service();
        assert!(service.factoring_setting(&ctx).unwrap().is_none());
        let stored = service
            .upsert_factoring_setting(&ctx, FactoringSetting::with_defaults(999))
            .unwrap();
        assert_eq!(Some(stored.organization_id), ctx.organization_id);
        assert_eq!(service.factoring_setting(&ctx).unwrap(), Some(stored));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            history_limit: 1,
            ..Default::default()
        };
        assert!(CashflowService::new(InMemoryStore::new(), config).is_err());
    }
}
