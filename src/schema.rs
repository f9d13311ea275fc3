use crate::chart_of_accounts::OrganizationId;
use crate::utils::{BillingMonth, YearMonth};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type LoanId = u64;
pub type BillingRecordId = u64;
pub type UserId = u64;

/// Sentinel period under which the legacy global income-split percentages
/// were stored.
pub const RATIO_SENTINEL: &str = "__RATIO__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

/// Month-end balances across up to five bank accounts.
///
/// `total_balance` is stored, not derived on read; every write path goes
/// through [`BankBalance::new`] or [`crate::balancer::enforce_total`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankBalance {
    pub organization_id: OrganizationId,
    pub year_month: YearMonth,
    pub balance1: i64,
    pub balance2: i64,
    pub balance3: i64,
    pub balance4: i64,
    pub balance5: i64,
    pub total_balance: i64,
}

impl BankBalance {
    pub fn new(organization_id: OrganizationId, year_month: YearMonth, balances: [i64; 5]) -> Self {
        let [balance1, balance2, balance3, balance4, balance5] = balances;
        Self {
            organization_id,
            year_month,
            balance1,
            balance2,
            balance3,
            balance4,
            balance5,
            total_balance: balances.iter().sum(),
        }
    }

    pub fn sub_balances(&self) -> [i64; 5] {
        [
            self.balance1,
            self.balance2,
            self.balance3,
            self.balance4,
            self.balance5,
        ]
    }
}

/// Natural key of a billing row, used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingKey {
    pub billing_year_month: BillingMonth,
    pub service_year_month: BillingMonth,
    pub user_name: String,
}

/// One client's billing for one service month, as claimed in a billing month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingRecord {
    #[serde(default)]
    pub id: BillingRecordId,
    pub organization_id: OrganizationId,
    pub billing_year_month: BillingMonth,
    pub service_year_month: BillingMonth,
    pub user_name: String,
    #[serde(default)]
    pub total_cost: i64,
    #[serde(default)]
    pub insurance_payment: i64,
    #[serde(default)]
    pub public_payment: i64,
    #[serde(default)]
    pub reduction: i64,
    #[serde(default)]
    pub user_burden_transfer: i64,
    #[serde(default)]
    pub user_burden_withdrawal: i64,
    /// `true`: the client pays by bank transfer; `false`: by direct debit.
    #[serde(default)]
    pub is_transfer: bool,
}

impl BillingRecord {
    pub fn key(&self) -> BillingKey {
        BillingKey {
            billing_year_month: self.billing_year_month,
            service_year_month: self.service_year_month,
            user_name: self.user_name.clone(),
        }
    }

    /// Both user-burden columns together; which channel actually collects it
    /// is decided by `is_transfer`.
    pub fn user_burden(&self) -> i64 {
        self.user_burden_transfer + self.user_burden_withdrawal
    }
}

/// Partial update for a billing row; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingPatch {
    pub billing_year_month: Option<BillingMonth>,
    pub service_year_month: Option<BillingMonth>,
    pub user_name: Option<String>,
    pub total_cost: Option<i64>,
    pub insurance_payment: Option<i64>,
    pub public_payment: Option<i64>,
    pub reduction: Option<i64>,
    pub user_burden_transfer: Option<i64>,
    pub user_burden_withdrawal: Option<i64>,
    pub is_transfer: Option<bool>,
}

impl BillingPatch {
    pub fn apply(&self, record: &mut BillingRecord) {
        if let Some(v) = self.billing_year_month {
            record.billing_year_month = v;
        }
        if let Some(v) = self.service_year_month {
            record.service_year_month = v;
        }
        if let Some(v) = &self.user_name {
            record.user_name = v.clone();
        }
        if let Some(v) = self.total_cost {
            record.total_cost = v;
        }
        if let Some(v) = self.insurance_payment {
            record.insurance_payment = v;
        }
        if let Some(v) = self.public_payment {
            record.public_payment = v;
        }
        if let Some(v) = self.reduction {
            record.reduction = v;
        }
        if let Some(v) = self.user_burden_transfer {
            record.user_burden_transfer = v;
        }
        if let Some(v) = self.user_burden_withdrawal {
            record.user_burden_withdrawal = v;
        }
        if let Some(v) = self.is_transfer {
            record.is_transfer = v;
        }
    }
}

/// Factoring terms for an organization. Rates are basis points
/// (10000 = 100%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FactoringSetting {
    pub organization_id: OrganizationId,
    pub factoring_rate: u32,
    pub remaining_rate: u32,
    pub fee_rate: u32,
    pub usage_fee: i64,
    /// Day of the following month the advance is paid.
    pub payment_day: u32,
    /// Day the deferred remainder is paid.
    pub remaining_payment_day: u32,
}

impl FactoringSetting {
    pub const BASIS_POINTS: f64 = 10_000.0;

    pub fn with_defaults(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            factoring_rate: 8000,
            remaining_rate: 2000,
            fee_rate: 70,
            usage_fee: 2000,
            payment_day: 15,
            remaining_payment_day: 5,
        }
    }

    pub fn factoring_fraction(&self) -> f64 {
        self.factoring_rate as f64 / Self::BASIS_POINTS
    }

    pub fn fee_fraction(&self) -> f64 {
        self.fee_rate as f64 / Self::BASIS_POINTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BudgetCategory {
    Income,
    Expense,
}

/// The month a budget row applies to, or the legacy ratio sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BudgetPeriod {
    Month(YearMonth),
    LegacyRatio,
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetPeriod::Month(month) => write!(f, "{}", month),
            BudgetPeriod::LegacyRatio => f.write_str(RATIO_SENTINEL),
        }
    }
}

impl TryFrom<String> for BudgetPeriod {
    type Error = crate::error::CashflowError;

    fn try_from(value: String) -> crate::error::Result<Self> {
        if value == RATIO_SENTINEL {
            Ok(BudgetPeriod::LegacyRatio)
        } else {
            value.parse().map(BudgetPeriod::Month)
        }
    }
}

impl From<BudgetPeriod> for String {
    fn from(value: BudgetPeriod) -> Self {
        value.to_string()
    }
}

impl JsonSchema for BudgetPeriod {
    fn schema_name() -> String {
        "BudgetPeriod".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub organization_id: OrganizationId,
    pub year_month: BudgetPeriod,
    pub category: BudgetCategory,
    pub item_name: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentMethod {
    /// Fixed principal per month; interest falls with the balance.
    EqualPrincipal,
    /// Fixed total payment per month; the principal share grows over time.
    EqualInstallment,
}

/// Which repayment bucket a loan's principal is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoanCategory {
    Representative,
    ShortTerm,
    #[default]
    LongTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    #[serde(default)]
    pub id: LoanId,
    pub organization_id: OrganizationId,
    pub financial_institution: String,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub loan_category: LoanCategory,
    pub repayment_method: RepaymentMethod,
    /// Annual percentage, e.g. `1.500` for 1.5%.
    pub annual_interest_rate: Decimal,
    pub initial_borrowing_date: NaiveDate,
    /// Day of month repayments fall due (1-31).
    pub repayment_due_date: u32,
    pub initial_borrowing_amount: i64,
    /// The fixed monthly principal installment for equal-principal loans.
    /// For equal-installment loans it only feeds the term estimate.
    pub repayment_principal: i64,
    pub first_repayment_date: NaiveDate,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub effective_from: NaiveDate,
}

fn default_true() -> bool {
    true
}

/// Partial update for a loan's terms; `None` leaves the term untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanPatch {
    pub financial_institution: Option<String>,
    pub branch_name: Option<Option<String>>,
    pub loan_category: Option<LoanCategory>,
    pub repayment_method: Option<RepaymentMethod>,
    pub annual_interest_rate: Option<Decimal>,
    pub initial_borrowing_date: Option<NaiveDate>,
    pub repayment_due_date: Option<u32>,
    pub initial_borrowing_amount: Option<i64>,
    pub repayment_principal: Option<i64>,
    pub first_repayment_date: Option<NaiveDate>,
    pub effective_from: Option<NaiveDate>,
}

impl LoanPatch {
    pub fn apply(&self, loan: &mut Loan) {
        if let Some(v) = &self.financial_institution {
            loan.financial_institution = v.clone();
        }
        if let Some(v) = &self.branch_name {
            loan.branch_name = v.clone().filter(|b| !b.is_empty());
        }
        if let Some(v) = self.loan_category {
            loan.loan_category = v;
        }
        if let Some(v) = self.repayment_method {
            loan.repayment_method = v;
        }
        if let Some(v) = self.annual_interest_rate {
            loan.annual_interest_rate = v;
        }
        if let Some(v) = self.initial_borrowing_date {
            loan.initial_borrowing_date = v;
        }
        if let Some(v) = self.repayment_due_date {
            loan.repayment_due_date = v;
        }
        if let Some(v) = self.initial_borrowing_amount {
            loan.initial_borrowing_amount = v;
        }
        if let Some(v) = self.repayment_principal {
            loan.repayment_principal = v;
        }
        if let Some(v) = self.first_repayment_date {
            loan.first_repayment_date = v;
        }
        if let Some(v) = self.effective_from {
            loan.effective_from = v;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanAction {
    Create,
    Update,
    Activate,
    Deactivate,
}

/// Append-only audit row for a loan mutation. Snapshots are opaque JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanHistory {
    pub loan_id: LoanId,
    pub organization_id: OrganizationId,
    pub action: LoanAction,
    pub effective_from: NaiveDate,
    pub previous_values: Option<String>,
    pub new_values: Option<String>,
    pub created_by: UserId,
}

/// How a month's figures are sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum MonthStatus {
    /// Stored ledger entries are authoritative.
    #[default]
    Actual,
    /// Billing, factoring and loan-derived figures with trailing-average fallback.
    Forecast,
    /// Trailing averages only, plus loan-derived long-term figures.
    Prediction,
}

impl fmt::Display for MonthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonthStatus::Actual => "actual",
            MonthStatus::Forecast => "forecast",
            MonthStatus::Prediction => "prediction",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthStatusEntry {
    pub organization_id: OrganizationId,
    pub year_month: YearMonth,
    pub status: MonthStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_balance_total() {
        let balance = BankBalance::new(1, "2024-01".parse().unwrap(), [100, 200, 300, 0, -50]);
        assert_eq!(balance.total_balance, 550);
        assert_eq!(balance.sub_balances().iter().sum::<i64>(), balance.total_balance);
    }

    #[test]
    fn test_budget_period_serde() {
        let ratio: BudgetPeriod = serde_json::from_str("\"__RATIO__\"").unwrap();
        assert_eq!(ratio, BudgetPeriod::LegacyRatio);
        let month: BudgetPeriod = serde_json::from_str("\"2024-05\"").unwrap();
        assert_eq!(month, BudgetPeriod::Month("2024-05".parse().unwrap()));
        assert!(serde_json::from_str::<BudgetPeriod>("\"RATIO\"").is_err());
    }

    #[test]
    fn test_loan_deserializes_decimal_rate_and_defaults() {
        let json = r#"{
            "organizationId": 1,
            "financialInstitution": "Shinkin Bank",
            "repaymentMethod": "equal_principal",
            "annualInterestRate": "1.500",
            "initialBorrowingDate": "2024-01-10",
            "repaymentDueDate": 25,
            "initialBorrowingAmount": 1200000,
            "repaymentPrincipal": 20000,
            "firstRepaymentDate": "2024-02-25",
            "effectiveFrom": "2024-01-10"
        }"#;
        let loan: Loan = serde_json::from_str(json).unwrap();
        assert_eq!(loan.annual_interest_rate.to_string(), "1.500");
        assert!(loan.is_active);
        assert_eq!(loan.loan_category, LoanCategory::LongTerm);
        assert_eq!(loan.branch_name, None);
    }

    #[test]
    fn test_billing_patch_toggles_transfer() {
        let mut record = BillingRecord {
            id: 1,
            organization_id: 1,
            billing_year_month: "202401".parse().unwrap(),
            service_year_month: "202312".parse().unwrap(),
            user_name: "Sato".to_string(),
            total_cost: 100_000,
            insurance_payment: 90_000,
            public_payment: 0,
            reduction: 0,
            user_burden_transfer: 0,
            user_burden_withdrawal: 10_000,
            is_transfer: false,
        };
        BillingPatch {
            is_transfer: Some(true),
            ..Default::default()
        }
        .apply(&mut record);
        assert!(record.is_transfer);
        assert_eq!(record.user_burden(), 10_000);
    }

    #[test]
    fn test_month_status_default_and_serde() {
        assert_eq!(MonthStatus::default(), MonthStatus::Actual);
        let status: MonthStatus = serde_json::from_str("\"prediction\"").unwrap();
        assert_eq!(status, MonthStatus::Prediction);
        assert_eq!(status.to_string(), "prediction");
    }
}
