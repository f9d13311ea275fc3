//! Views assembled from projections: the consolidated monthly report, the
//! dashboard summary and budget comparisons.

use crate::chart_of_accounts::{
    ExpenseField, ExpenseRecord, FieldGroup, IncomeField, IncomeRecord, OrganizationId,
};
use crate::config::EngineConfig;
use crate::engine::StatusDispatcher;
use crate::error::{CashflowError, Result};
use crate::schema::{Budget, BudgetCategory, BudgetPeriod, MonthStatus};
use crate::store::FinanceStore;
use crate::utils::{round_half_up, YearMonth};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item name of the per-month total sales budget.
pub const TOTAL_SALES_ITEM: &str = "合計売上予算";
/// Legacy ratio row holding the insurance share of sales, in percent.
pub const INSURANCE_RATIO_ITEM: &str = "保険入金割合";
/// Legacy ratio row holding the user-billed share of sales, in percent.
pub const USER_BURDEN_RATIO_ITEM: &str = "利用者請求割合";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub year_month: YearMonth,
    pub status: MonthStatus,
    pub income: IncomeRecord,
    pub expense: ExpenseRecord,
    pub income_total: i64,
    pub expense_total: i64,
    pub monthly_balance: i64,
    /// Running sum of monthly balances within the report window.
    pub cumulative_balance: i64,
    /// Balance carried into the next month; starts from 0 at the window's
    /// first month, so it tracks the cumulative balance.
    pub carry_over: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub organization_id: OrganizationId,
    /// Stored bank total for the month before the window, or 0. Reported
    /// alongside the rows; it does not feed the carry-over.
    pub opening_balance: i64,
    pub rows: Vec<ReportRow>,
    pub income_total: i64,
    pub expense_total: i64,
}

/// Builds the report for `config.report_months` months ending at `anchor`,
/// each month sourced according to its stored status.
pub fn build_report<S: FinanceStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    org: OrganizationId,
    anchor: YearMonth,
) -> Result<ConsolidatedReport> {
    config.validate()?;
    let span = u32::try_from(config.report_months).map_err(|_| {
        CashflowError::InvalidConfig(format!("report_months out of range: {}", config.report_months))
    })?;
    let months = anchor.window_ending_here(span);
    let dispatcher = StatusDispatcher::new(store, config);
    let incomes = dispatcher.list_income_by_status(org, &months)?;
    let expenses = dispatcher.list_expense_by_status(org, &months)?;

    let opening_balance = match months.first() {
        Some(first) => store
            .bank_balance(org, first.previous(1))?
            .map_or(0, |b| b.total_balance),
        None => 0,
    };

    let mut cumulative = 0;
    let mut carry_over = 0;
    let mut rows = Vec::with_capacity(months.len());
    for (income, expense) in incomes.into_iter().zip(expenses) {
        let income_total = income.record.total();
        let expense_total = expense.record.total();
        let monthly_balance = income_total - expense_total;
        cumulative += monthly_balance;
        carry_over += monthly_balance;
        rows.push(ReportRow {
            year_month: income.year_month,
            status: income.status,
            income: income.record,
            expense: expense.record,
            income_total,
            expense_total,
            monthly_balance,
            cumulative_balance: cumulative,
            carry_over,
        });
    }

    let report = ConsolidatedReport {
        organization_id: org,
        opening_balance,
        income_total: rows.iter().map(|r| r.income_total).sum(),
        expense_total: rows.iter().map(|r| r.expense_total).sum(),
        rows,
    };
    info!(
        "built report org={} window={}..{} months={} net={}",
        org,
        months.first().map(|m| m.to_string()).unwrap_or_default(),
        anchor,
        report.rows.len(),
        report.income_total - report.expense_total
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub year_month: YearMonth,
    pub balance: i64,
    pub income: i64,
    pub expense: i64,
    pub profit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldShare {
    pub key: String,
    pub label: String,
    pub group: FieldGroup,
    pub amount: i64,
    /// Share of the category total, in percent with one decimal.
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub current_balance: i64,
    pub previous_balance: i64,
    pub balance_change: i64,
    /// Oldest first.
    pub trend: Vec<TrendPoint>,
    pub income_composition: Vec<FieldShare>,
    pub expense_composition: Vec<FieldShare>,
}

fn percent_of(amount: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (amount as f64 / total as f64 * 1000.0).round() / 10.0
}

fn composition<F: Copy>(
    fields: &[F],
    amount: impl Fn(F) -> i64,
    describe: impl Fn(F) -> (&'static str, &'static str, FieldGroup),
) -> Vec<FieldShare> {
    let total: i64 = fields.iter().map(|f| amount(*f)).sum();
    fields
        .iter()
        .map(|f| {
            let (key, label, group) = describe(*f);
            let value = amount(*f);
            FieldShare {
                key: key.to_string(),
                label: label.to_string(),
                group,
                amount: value,
                percent: percent_of(value, total),
            }
        })
        .collect()
}

/// Summary over the `limit` most recent bank-balance months, from stored
/// records only.
pub fn dashboard<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    limit: usize,
) -> Result<DashboardSummary> {
    let balances = store.bank_balances(org, limit)?;
    let incomes = store.income_records(org, limit)?;
    let expenses = store.expense_records(org, limit)?;

    let current_balance = balances.first().map_or(0, |b| b.total_balance);
    let previous_balance = balances.get(1).map_or(0, |b| b.total_balance);

    let trend = balances
        .iter()
        .rev()
        .map(|b| {
            let income = incomes
                .iter()
                .find(|r| r.year_month == b.year_month)
                .map_or(0, IncomeRecord::total);
            let expense = expenses
                .iter()
                .find(|r| r.year_month == b.year_month)
                .map_or(0, ExpenseRecord::total);
            TrendPoint {
                year_month: b.year_month,
                balance: b.total_balance,
                income,
                expense,
                profit: income - expense,
            }
        })
        .collect();

    let income_composition = composition(
        IncomeField::ALL,
        |f| incomes.iter().map(|r| r.get(f)).sum(),
        |f| (f.key(), f.label(), f.group()),
    );
    let expense_composition = composition(
        ExpenseField::ALL,
        |f| expenses.iter().map(|r| r.get(f)).sum(),
        |f| (f.key(), f.label(), f.group()),
    );

    Ok(DashboardSummary {
        current_balance,
        previous_balance,
        balance_change: current_balance - previous_balance,
        trend,
        income_composition,
        expense_composition,
    })
}

/// How a total sales budget divides between insurance and user billing,
/// in whole percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncomeSplit {
    pub insurance_percent: i64,
    pub user_burden_percent: i64,
}

impl Default for IncomeSplit {
    fn default() -> Self {
        Self {
            insurance_percent: 90,
            user_burden_percent: 10,
        }
    }
}

impl IncomeSplit {
    /// Reads the legacy ratio rows. A lone row implies its complement; with
    /// neither present the default split applies.
    pub fn from_legacy_rows(budgets: &[Budget]) -> Self {
        let ratio = |item: &str| {
            budgets
                .iter()
                .find(|b| b.year_month == BudgetPeriod::LegacyRatio && b.item_name == item)
                .map(|b| b.amount.clamp(0, 100))
        };
        match (ratio(INSURANCE_RATIO_ITEM), ratio(USER_BURDEN_RATIO_ITEM)) {
            (Some(insurance), Some(user_burden)) => Self {
                insurance_percent: insurance,
                user_burden_percent: user_burden,
            },
            (Some(insurance), None) => Self {
                insurance_percent: insurance,
                user_burden_percent: 100 - insurance,
            },
            (None, Some(user_burden)) => Self {
                insurance_percent: 100 - user_burden,
                user_burden_percent: user_burden,
            },
            (None, None) => Self::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesBudget {
    pub year_month: YearMonth,
    pub total_sales: i64,
    pub insurance_income: i64,
    pub user_burden: i64,
}

/// Per-month total sales budgets split by `split`, oldest first. Ratio rows
/// are skipped.
pub fn sales_budgets(budgets: &[Budget], split: IncomeSplit) -> Vec<SalesBudget> {
    let mut by_month: BTreeMap<YearMonth, SalesBudget> = BTreeMap::new();
    for budget in budgets {
        let BudgetPeriod::Month(month) = budget.year_month else {
            continue;
        };
        if budget.item_name != TOTAL_SALES_ITEM {
            continue;
        }
        let share = |percent: i64| round_half_up(budget.amount as f64 * percent as f64 / 100.0);
        by_month.insert(
            month,
            SalesBudget {
                year_month: month,
                total_sales: budget.amount,
                insurance_income: share(split.insurance_percent),
                user_burden: share(split.user_burden_percent),
            },
        );
    }
    by_month.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    pub category: BudgetCategory,
    pub item_name: String,
    pub budgeted: i64,
    /// `None` for items that do not name a ledger field.
    pub actual: Option<i64>,
    pub variance: Option<i64>,
}

/// Budget rows for `month` against that month's status-dispatched figures.
/// Item names are matched to field keys; the total sales item is compared
/// with business income.
pub fn compare_budget<S: FinanceStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    org: OrganizationId,
    month: YearMonth,
) -> Result<Vec<BudgetLine>> {
    let budgets = store.budgets(org, Some(BudgetPeriod::Month(month)))?;
    let dispatcher = StatusDispatcher::new(store, config);
    let income = dispatcher.income_for_month(org, month)?.record;
    let expense = dispatcher.expense_for_month(org, month)?.record;

    let business_income: i64 = IncomeField::ALL
        .iter()
        .filter(|f| f.group() == FieldGroup::Business)
        .map(|f| income.get(*f))
        .sum();

    Ok(budgets
        .into_iter()
        .map(|budget| {
            let actual = match budget.category {
                BudgetCategory::Income if budget.item_name == TOTAL_SALES_ITEM => {
                    Some(business_income)
                }
                BudgetCategory::Income => {
                    IncomeField::from_key(&budget.item_name).map(|f| income.get(f))
                }
                BudgetCategory::Expense => {
                    ExpenseField::from_key(&budget.item_name).map(|f| expense.get(f))
                }
            };
            BudgetLine {
                category: budget.category,
                variance: actual.map(|a| a - budget.amount),
                budgeted: budget.amount,
                item_name: budget.item_name,
                actual,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BankBalance;
    use crate::store::InMemoryStore;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn budget(period: BudgetPeriod, category: BudgetCategory, item: &str, amount: i64) -> Budget {
        Budget {
            organization_id: 1,
            year_month: period,
            category,
            item_name: item.to_string(),
            amount,
        }
    }

    fn seed(store: &InMemoryStore) {
        for (month, income, expense) in [
            ("2024-01", 500_000, 400_000),
            ("2024-02", 450_000, 500_000),
            ("2024-03", 600_000, 350_000),
        ] {
            let mut i = IncomeRecord::zeroed(1, ym(month));
            i.insurance_income = income;
            store.upsert_income_record(i).unwrap();
            let mut e = ExpenseRecord::zeroed(1, ym(month));
            e.personnel_cost = expense;
            store.upsert_expense_record(e).unwrap();
        }
    }

    #[test]
    fn test_report_running_balances() {
        let store = InMemoryStore::new();
        seed(&store);
        store
            .upsert_bank_balance(BankBalance::new(1, ym("2023-12"), [1_000_000, 0, 0, 0, 0]))
            .unwrap();
        let config = EngineConfig {
            report_months: 3,
            ..Default::default()
        };

        let report = build_report(&store, &config, 1, ym("2024-03")).unwrap();
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.opening_balance, 1_000_000);

        let balances: Vec<i64> = report.rows.iter().map(|r| r.monthly_balance).collect();
        assert_eq!(balances, vec![100_000, -50_000, 250_000]);
        let cumulative: Vec<i64> = report.rows.iter().map(|r| r.cumulative_balance).collect();
        assert_eq!(cumulative, vec![100_000, 50_000, 300_000]);
        assert_eq!(report.rows[2].carry_over, 300_000);
        assert_eq!(report.income_total, 1_550_000);
        assert_eq!(report.expense_total, 1_250_000);
    }

    #[test]
    fn test_carry_over_ignores_prior_bank_total() {
        let store = InMemoryStore::new();
        store
            .upsert_bank_balance(BankBalance::new(1, ym("2024-01"), [1_000_000, 0, 0, 0, 0]))
            .unwrap();
        let mut income = IncomeRecord::zeroed(1, ym("2024-02"));
        income.other_business_income = 500;
        store.upsert_income_record(income).unwrap();
        let config = EngineConfig {
            report_months: 1,
            ..Default::default()
        };

        let report = build_report(&store, &config, 1, ym("2024-02")).unwrap();
        assert_eq!(report.opening_balance, 1_000_000);
        assert_eq!(report.rows[0].cumulative_balance, 500);
        assert_eq!(report.rows[0].carry_over, 500);
    }

    #[test]
    fn test_report_window_is_bounded() {
        let store = InMemoryStore::new();
        let config = EngineConfig {
            report_months: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(
            build_report(&store, &config, 1, ym("2024-02")),
            Err(CashflowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_report_projects_tagged_months() {
        let store = InMemoryStore::new();
        seed(&store);
        store
            .upsert_month_status(1, ym("2024-04"), MonthStatus::Prediction)
            .unwrap();
        let config = EngineConfig {
            report_months: 2,
            ..Default::default()
        };

        let report = build_report(&store, &config, 1, ym("2024-04")).unwrap();
        assert_eq!(report.rows[1].status, MonthStatus::Prediction);
        assert_eq!(report.rows[1].income_total, 516_667);
        assert_eq!(report.rows[1].expense_total, 416_667);
        assert_eq!(report.opening_balance, 0);
    }

    #[test]
    fn test_dashboard() {
        let store = InMemoryStore::new();
        seed(&store);
        let mut extra = store.income_record(1, ym("2024-03")).unwrap().unwrap();
        extra.interest_income = 600_000;
        store.upsert_income_record(extra).unwrap();
        store
            .upsert_bank_balance(BankBalance::new(1, ym("2024-02"), [800_000, 0, 0, 0, 0]))
            .unwrap();
        store
            .upsert_bank_balance(BankBalance::new(1, ym("2024-03"), [900_000, 150_000, 0, 0, 0]))
            .unwrap();

        let summary = dashboard(&store, 1, 12).unwrap();
        assert_eq!(summary.current_balance, 1_050_000);
        assert_eq!(summary.previous_balance, 800_000);
        assert_eq!(summary.balance_change, 250_000);
        assert_eq!(summary.trend.len(), 2);
        assert_eq!(summary.trend[0].year_month, ym("2024-02"));
        assert_eq!(summary.trend[1].profit, 850_000);

        let interest = summary
            .income_composition
            .iter()
            .find(|s| s.key == "interestIncome")
            .unwrap();
        assert_eq!(interest.percent, 27.9);
        assert!(summary
            .expense_composition
            .iter()
            .all(|s| s.key == "personnelCost" || s.percent == 0.0));
    }

    #[test]
    fn test_dashboard_empty_organization() {
        let store = InMemoryStore::new();
        let summary = dashboard(&store, 5, 12).unwrap();
        assert_eq!(summary.current_balance, 0);
        assert_eq!(summary.balance_change, 0);
        assert!(summary.trend.is_empty());
        assert!(summary.income_composition.iter().all(|s| s.percent == 0.0));
    }

    #[test]
    fn test_legacy_ratio_rows() {
        let rows = vec![budget(
            BudgetPeriod::LegacyRatio,
            BudgetCategory::Income,
            INSURANCE_RATIO_ITEM,
            80,
        )];
        let split = IncomeSplit::from_legacy_rows(&rows);
        assert_eq!(split.insurance_percent, 80);
        assert_eq!(split.user_burden_percent, 20);
        assert_eq!(IncomeSplit::from_legacy_rows(&[]), IncomeSplit::default());
    }

    #[test]
    fn test_sales_budgets_split() {
        let rows = vec![
            budget(BudgetPeriod::LegacyRatio, BudgetCategory::Income, INSURANCE_RATIO_ITEM, 85),
            budget(BudgetPeriod::Month(ym("2024-05")), BudgetCategory::Income, TOTAL_SALES_ITEM, 1_000_001),
            budget(BudgetPeriod::Month(ym("2024-04")), BudgetCategory::Income, TOTAL_SALES_ITEM, 2_000_000),
            budget(BudgetPeriod::Month(ym("2024-04")), BudgetCategory::Expense, "rent", 80_000),
        ];
        let split = IncomeSplit::from_legacy_rows(&rows);
        let sales = sales_budgets(&rows, split);
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0].year_month, ym("2024-04"));
        assert_eq!(sales[0].insurance_income, 1_700_000);
        assert_eq!(sales[0].user_burden, 300_000);
        assert_eq!(sales[1].insurance_income, 850_001);
    }

    #[test]
    fn test_compare_budget() {
        let store = InMemoryStore::new();
        seed(&store);
        let march = BudgetPeriod::Month(ym("2024-03"));
        for row in [
            budget(march, BudgetCategory::Income, TOTAL_SALES_ITEM, 550_000),
            budget(march, BudgetCategory::Expense, "personnelCost", 400_000),
            budget(march, BudgetCategory::Expense, "bonus pool", 10_000),
        ] {
            store.upsert_budget(row).unwrap();
        }

        let lines = compare_budget(&store, &EngineConfig::default(), 1, ym("2024-03")).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].actual, Some(600_000));
        assert_eq!(lines[0].variance, Some(50_000));
        assert_eq!(lines[1].variance, Some(-50_000));
        assert_eq!(lines[2].actual, None);
    }
}
