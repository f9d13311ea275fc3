//! Persistence boundary.
//!
//! [`FinanceStore`] is the typed accessor surface the projection code reads
//! through. Missing rows come back as `None` or empty vectors; only an
//! unreachable backend is an error ([`CashflowError::StorageUnavailable`]).
//! Upserts are last-write-wins.

use crate::balancer::enforce_total;
use crate::chart_of_accounts::{ExpenseRecord, IncomeRecord, OrganizationId};
use crate::error::{CashflowError, Result};
use crate::schema::*;
use crate::utils::{BillingMonth, YearMonth};
use chrono::NaiveDate;
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub trait FinanceStore {
    fn organization(&self, id: OrganizationId) -> Result<Option<Organization>>;
    fn create_organization(&self, name: &str) -> Result<Organization>;

    /// Most recent first, at most `limit` rows.
    fn income_records(&self, org: OrganizationId, limit: usize) -> Result<Vec<IncomeRecord>>;
    fn income_record(&self, org: OrganizationId, month: YearMonth) -> Result<Option<IncomeRecord>>;
    fn upsert_income_record(&self, record: IncomeRecord) -> Result<()>;

    /// Most recent first, at most `limit` rows.
    fn expense_records(&self, org: OrganizationId, limit: usize) -> Result<Vec<ExpenseRecord>>;
    fn expense_record(&self, org: OrganizationId, month: YearMonth)
        -> Result<Option<ExpenseRecord>>;
    fn upsert_expense_record(&self, record: ExpenseRecord) -> Result<()>;

    /// Most recent first, at most `limit` rows.
    fn bank_balances(&self, org: OrganizationId, limit: usize) -> Result<Vec<BankBalance>>;
    fn bank_balance(&self, org: OrganizationId, month: YearMonth) -> Result<Option<BankBalance>>;
    fn upsert_bank_balance(&self, balance: BankBalance) -> Result<()>;

    fn billing_rows(&self, org: OrganizationId, month: BillingMonth) -> Result<Vec<BillingRecord>>;
    fn billing_keys(&self, org: OrganizationId) -> Result<HashSet<BillingKey>>;
    fn billing_record(&self, id: BillingRecordId) -> Result<Option<BillingRecord>>;
    /// Stores the rows in order and returns their assigned ids.
    fn insert_billing_records(&self, records: Vec<BillingRecord>) -> Result<Vec<BillingRecordId>>;
    fn update_billing_record(&self, id: BillingRecordId, patch: &BillingPatch)
        -> Result<BillingRecord>;
    /// Returns how many rows were removed.
    fn delete_billing_records(&self, ids: &[BillingRecordId]) -> Result<usize>;

    fn factoring_setting(&self, org: OrganizationId) -> Result<Option<FactoringSetting>>;
    fn upsert_factoring_setting(&self, setting: FactoringSetting) -> Result<()>;

    fn budgets(&self, org: OrganizationId, period: Option<BudgetPeriod>) -> Result<Vec<Budget>>;
    fn upsert_budget(&self, budget: Budget) -> Result<()>;

    fn loans(&self, org: OrganizationId) -> Result<Vec<Loan>>;
    fn loan(&self, id: LoanId) -> Result<Option<Loan>>;
    /// Loans with `is_active` set and `effective_from <= as_of`, ordered by
    /// institution then branch.
    fn active_loans(&self, org: OrganizationId, as_of: NaiveDate) -> Result<Vec<Loan>>;
    fn insert_loan(&self, loan: Loan) -> Result<LoanId>;
    fn replace_loan(&self, loan: Loan) -> Result<()>;
    fn delete_loan(&self, id: LoanId) -> Result<bool>;

    fn append_loan_history(&self, entry: LoanHistory) -> Result<()>;
    fn loan_history(&self, loan_id: LoanId) -> Result<Vec<LoanHistory>>;

    fn month_status(&self, org: OrganizationId, month: YearMonth) -> Result<Option<MonthStatus>>;
    /// All stored statuses for `org`, optionally restricted to `months`,
    /// most recent first.
    fn month_statuses(
        &self,
        org: OrganizationId,
        months: Option<&[YearMonth]>,
    ) -> Result<Vec<MonthStatusEntry>>;
    fn upsert_month_status(&self, org: OrganizationId, month: YearMonth, status: MonthStatus)
        -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreData {
    organizations: BTreeMap<OrganizationId, Organization>,
    income: BTreeMap<(OrganizationId, YearMonth), IncomeRecord>,
    expense: BTreeMap<(OrganizationId, YearMonth), ExpenseRecord>,
    balances: BTreeMap<(OrganizationId, YearMonth), BankBalance>,
    billing: BTreeMap<BillingRecordId, BillingRecord>,
    /// Insertion order; the last entry per organization wins.
    factoring: Vec<FactoringSetting>,
    budgets: Vec<Budget>,
    loans: BTreeMap<LoanId, Loan>,
    loan_history: Vec<LoanHistory>,
    statuses: BTreeMap<(OrganizationId, YearMonth), MonthStatus>,
    next_organization_id: u64,
    next_billing_id: u64,
    next_loan_id: u64,
}

/// A [`FinanceStore`] kept entirely in memory. Used by tests, by mockup mode,
/// and as the reference behaviour for database-backed implementations.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreData>> {
        self.data
            .read()
            .map_err(|e| CashflowError::StorageUnavailable(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreData>> {
        self.data
            .write()
            .map_err(|e| CashflowError::StorageUnavailable(e.to_string()))
    }
}

fn most_recent<T: Clone>(
    map: &BTreeMap<(OrganizationId, YearMonth), T>,
    org: OrganizationId,
    limit: usize,
) -> Vec<T> {
    map.iter()
        .rev()
        .filter(|((o, _), _)| *o == org)
        .take(limit)
        .map(|(_, v)| v.clone())
        .collect()
}

impl FinanceStore for InMemoryStore {
    fn organization(&self, id: OrganizationId) -> Result<Option<Organization>> {
        Ok(self.read()?.organizations.get(&id).cloned())
    }

    fn create_organization(&self, name: &str) -> Result<Organization> {
        let mut data = self.write()?;
        data.next_organization_id += 1;
        let organization = Organization {
            id: data.next_organization_id,
            name: name.to_string(),
        };
        data.organizations
            .insert(organization.id, organization.clone());
        Ok(organization)
    }

    fn income_records(&self, org: OrganizationId, limit: usize) -> Result<Vec<IncomeRecord>> {
        Ok(most_recent(&self.read()?.income, org, limit))
    }

    fn income_record(&self, org: OrganizationId, month: YearMonth) -> Result<Option<IncomeRecord>> {
        Ok(self.read()?.income.get(&(org, month)).cloned())
    }

    fn upsert_income_record(&self, record: IncomeRecord) -> Result<()> {
        debug!(
            "upsert income record org={} month={}",
            record.organization_id, record.year_month
        );
        self.write()?
            .income
            .insert((record.organization_id, record.year_month), record);
        Ok(())
    }

    fn expense_records(&self, org: OrganizationId, limit: usize) -> Result<Vec<ExpenseRecord>> {
        Ok(most_recent(&self.read()?.expense, org, limit))
    }

    fn expense_record(
        &self,
        org: OrganizationId,
        month: YearMonth,
    ) -> Result<Option<ExpenseRecord>> {
        Ok(self.read()?.expense.get(&(org, month)).cloned())
    }

    fn upsert_expense_record(&self, record: ExpenseRecord) -> Result<()> {
        debug!(
            "upsert expense record org={} month={}",
            record.organization_id, record.year_month
        );
        self.write()?
            .expense
            .insert((record.organization_id, record.year_month), record);
        Ok(())
    }

    fn bank_balances(&self, org: OrganizationId, limit: usize) -> Result<Vec<BankBalance>> {
        Ok(most_recent(&self.read()?.balances, org, limit))
    }

    fn bank_balance(&self, org: OrganizationId, month: YearMonth) -> Result<Option<BankBalance>> {
        Ok(self.read()?.balances.get(&(org, month)).cloned())
    }

    fn upsert_bank_balance(&self, mut balance: BankBalance) -> Result<()> {
        enforce_total(&mut balance);
        self.write()?
            .balances
            .insert((balance.organization_id, balance.year_month), balance);
        Ok(())
    }

    fn billing_rows(&self, org: OrganizationId, month: BillingMonth) -> Result<Vec<BillingRecord>> {
        Ok(self
            .read()?
            .billing
            .values()
            .filter(|r| r.organization_id == org && r.billing_year_month == month)
            .cloned()
            .collect())
    }

    fn billing_keys(&self, org: OrganizationId) -> Result<HashSet<BillingKey>> {
        Ok(self
            .read()?
            .billing
            .values()
            .filter(|r| r.organization_id == org)
            .map(BillingRecord::key)
            .collect())
    }

    fn billing_record(&self, id: BillingRecordId) -> Result<Option<BillingRecord>> {
        Ok(self.read()?.billing.get(&id).cloned())
    }

    fn insert_billing_records(&self, records: Vec<BillingRecord>) -> Result<Vec<BillingRecordId>> {
        let mut data = self.write()?;
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            data.next_billing_id += 1;
            record.id = data.next_billing_id;
            ids.push(record.id);
            data.billing.insert(record.id, record);
        }
        Ok(ids)
    }

    fn update_billing_record(
        &self,
        id: BillingRecordId,
        patch: &BillingPatch,
    ) -> Result<BillingRecord> {
        let mut data = self.write()?;
        let record = data
            .billing
            .get_mut(&id)
            .ok_or(CashflowError::BillingRecordNotFound(id))?;
        patch.apply(record);
        Ok(record.clone())
    }

    fn delete_billing_records(&self, ids: &[BillingRecordId]) -> Result<usize> {
        let mut data = self.write()?;
        Ok(ids
            .iter()
            .filter(|id| data.billing.remove(id).is_some())
            .count())
    }

    fn factoring_setting(&self, org: OrganizationId) -> Result<Option<FactoringSetting>> {
        Ok(self
            .read()?
            .factoring
            .iter()
            .rev()
            .find(|s| s.organization_id == org)
            .cloned())
    }

    fn upsert_factoring_setting(&self, setting: FactoringSetting) -> Result<()> {
        let mut data = self.write()?;
        data.factoring
            .retain(|s| s.organization_id != setting.organization_id);
        data.factoring.push(setting);
        Ok(())
    }

    fn budgets(&self, org: OrganizationId, period: Option<BudgetPeriod>) -> Result<Vec<Budget>> {
        Ok(self
            .read()?
            .budgets
            .iter()
            .filter(|b| b.organization_id == org)
            .filter(|b| period.map_or(true, |p| b.year_month == p))
            .cloned()
            .collect())
    }

    fn upsert_budget(&self, budget: Budget) -> Result<()> {
        let mut data = self.write()?;
        let existing = data.budgets.iter_mut().find(|b| {
            b.organization_id == budget.organization_id
                && b.year_month == budget.year_month
                && b.category == budget.category
                && b.item_name == budget.item_name
        });
        match existing {
            Some(slot) => *slot = budget,
            None => data.budgets.push(budget),
        }
        Ok(())
    }

    fn loans(&self, org: OrganizationId) -> Result<Vec<Loan>> {
        Ok(self
            .read()?
            .loans
            .values()
            .filter(|l| l.organization_id == org)
            .cloned()
            .collect())
    }

    fn loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.read()?.loans.get(&id).cloned())
    }

    fn active_loans(&self, org: OrganizationId, as_of: NaiveDate) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .read()?
            .loans
            .values()
            .filter(|l| l.organization_id == org && l.is_active && l.effective_from <= as_of)
            .cloned()
            .collect();
        loans.sort_by(|a, b| {
            a.financial_institution
                .cmp(&b.financial_institution)
                .then_with(|| a.branch_name.cmp(&b.branch_name))
        });
        Ok(loans)
    }

    fn insert_loan(&self, mut loan: Loan) -> Result<LoanId> {
        let mut data = self.write()?;
        data.next_loan_id += 1;
        loan.id = data.next_loan_id;
        let id = loan.id;
        data.loans.insert(id, loan);
        Ok(id)
    }

    fn replace_loan(&self, loan: Loan) -> Result<()> {
        let mut data = self.write()?;
        let slot = data
            .loans
            .get_mut(&loan.id)
            .ok_or(CashflowError::LoanNotFound(loan.id))?;
        *slot = loan;
        Ok(())
    }

    fn delete_loan(&self, id: LoanId) -> Result<bool> {
        Ok(self.write()?.loans.remove(&id).is_some())
    }

    fn append_loan_history(&self, entry: LoanHistory) -> Result<()> {
        self.write()?.loan_history.push(entry);
        Ok(())
    }

    fn loan_history(&self, loan_id: LoanId) -> Result<Vec<LoanHistory>> {
        Ok(self
            .read()?
            .loan_history
            .iter()
            .filter(|h| h.loan_id == loan_id)
            .cloned()
            .collect())
    }

    fn month_status(&self, org: OrganizationId, month: YearMonth) -> Result<Option<MonthStatus>> {
        Ok(self.read()?.statuses.get(&(org, month)).copied())
    }

    fn month_statuses(
        &self,
        org: OrganizationId,
        months: Option<&[YearMonth]>,
    ) -> Result<Vec<MonthStatusEntry>> {
        Ok(self
            .read()?
            .statuses
            .iter()
            .rev()
            .filter(|((o, m), _)| *o == org && months.map_or(true, |ms| ms.contains(m)))
            .map(|((o, m), s)| MonthStatusEntry {
                organization_id: *o,
                year_month: *m,
                status: *s,
            })
            .collect())
    }

    fn upsert_month_status(
        &self,
        org: OrganizationId,
        month: YearMonth,
        status: MonthStatus,
    ) -> Result<()> {
        self.write()?.statuses.insert((org, month), status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_records_most_recent_first_with_limit() {
        let store = InMemoryStore::new();
        for month in ["2023-11", "2024-01", "2023-12", "2024-02"] {
            store
                .upsert_income_record(IncomeRecord::zeroed(1, ym(month)))
                .unwrap();
        }
        store
            .upsert_income_record(IncomeRecord::zeroed(2, ym("2024-03")))
            .unwrap();

        let records = store.income_records(1, 3).unwrap();
        let months: Vec<String> = records.iter().map(|r| r.year_month.to_string()).collect();
        assert_eq!(months, vec!["2024-02", "2024-01", "2023-12"]);
    }

    #[test]
    fn test_upsert_replaces_row() {
        let store = InMemoryStore::new();
        let mut record = ExpenseRecord::zeroed(1, ym("2024-01"));
        record.rent = 100;
        store.upsert_expense_record(record.clone()).unwrap();
        record.rent = 250;
        store.upsert_expense_record(record).unwrap();

        let stored = store.expense_record(1, ym("2024-01")).unwrap().unwrap();
        assert_eq!(stored.rent, 250);
        assert_eq!(store.expense_records(1, 12).unwrap().len(), 1);
    }

    #[test]
    fn test_bank_balance_total_recomputed_on_upsert() {
        let store = InMemoryStore::new();
        let mut balance = BankBalance::new(1, ym("2024-01"), [1, 2, 3, 4, 5]);
        balance.balance1 = 100;
        store.upsert_bank_balance(balance).unwrap();

        let stored = store.bank_balance(1, ym("2024-01")).unwrap().unwrap();
        assert_eq!(stored.total_balance, 114);
    }

    #[test]
    fn test_factoring_latest_wins() {
        let store = InMemoryStore::new();
        store
            .upsert_factoring_setting(FactoringSetting::with_defaults(1))
            .unwrap();
        let mut updated = FactoringSetting::with_defaults(1);
        updated.factoring_rate = 9000;
        store.upsert_factoring_setting(updated).unwrap();

        assert_eq!(store.factoring_setting(1).unwrap().unwrap().factoring_rate, 9000);
        assert!(store.factoring_setting(2).unwrap().is_none());
    }

    #[test]
    fn test_month_status_filtering() {
        let store = InMemoryStore::new();
        store
            .upsert_month_status(1, ym("2024-01"), MonthStatus::Forecast)
            .unwrap();
        store
            .upsert_month_status(1, ym("2024-02"), MonthStatus::Prediction)
            .unwrap();

        assert_eq!(store.month_status(1, ym("2024-03")).unwrap(), None);
        let filtered = store.month_statuses(1, Some(&[ym("2024-02")])).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].status, MonthStatus::Prediction);
        assert_eq!(store.month_statuses(1, None).unwrap()[0].year_month, ym("2024-02"));
    }

    #[test]
    fn test_billing_delete_counts_existing_only() {
        let store = InMemoryStore::new();
        let row = BillingRecord {
            id: 0,
            organization_id: 1,
            billing_year_month: "202401".parse().unwrap(),
            service_year_month: "202312".parse().unwrap(),
            user_name: "Tanaka".to_string(),
            total_cost: 0,
            insurance_payment: 0,
            public_payment: 0,
            reduction: 0,
            user_burden_transfer: 0,
            user_burden_withdrawal: 0,
            is_transfer: false,
        };
        let ids = store
            .insert_billing_records(vec![row.clone(), row])
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.delete_billing_records(&[1, 2, 99]).unwrap(), 2);
        assert!(matches!(
            store.update_billing_record(1, &BillingPatch::default()),
            Err(CashflowError::BillingRecordNotFound(1))
        ));
    }
}
