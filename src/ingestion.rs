//! Batch import of billing rows.
//!
//! Rows arrive with loosely formatted amounts (CSV exports, form posts). Each
//! is normalized, then classified by its natural key
//! `(billing month, service month, user name)`: new rows are inserted, a key
//! repeated inside the batch is dropped after its first occurrence, and a key
//! already stored for the organization is reported as a conflict.

use crate::chart_of_accounts::OrganizationId;
use crate::error::Result;
use crate::normalizer::NumericInput;
use crate::schema::{BillingKey, BillingRecord, BillingRecordId};
use crate::store::FinanceStore;
use crate::utils::BillingMonth;
use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingInput {
    pub billing_year_month: BillingMonth,
    pub service_year_month: BillingMonth,
    pub user_name: String,
    #[serde(default)]
    pub total_cost: NumericInput,
    #[serde(default)]
    pub insurance_payment: NumericInput,
    #[serde(default)]
    pub public_payment: NumericInput,
    #[serde(default)]
    pub reduction: NumericInput,
    #[serde(default)]
    pub user_burden_transfer: NumericInput,
    #[serde(default)]
    pub user_burden_withdrawal: NumericInput,
    #[serde(default)]
    pub is_transfer: bool,
}

impl BillingInput {
    pub fn into_record(self, organization_id: OrganizationId) -> BillingRecord {
        BillingRecord {
            id: 0,
            organization_id,
            billing_year_month: self.billing_year_month,
            service_year_month: self.service_year_month,
            user_name: self.user_name.trim().to_string(),
            total_cost: self.total_cost.normalize(),
            insurance_payment: self.insurance_payment.normalize(),
            public_payment: self.public_payment.normalize(),
            reduction: self.reduction.normalize(),
            user_burden_transfer: self.user_burden_transfer.normalize(),
            user_burden_withdrawal: self.user_burden_withdrawal.normalize(),
            is_transfer: self.is_transfer,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub inserted: Vec<BillingRecordId>,
    pub duplicates_in_batch: Vec<BillingKey>,
    pub existing_conflicts: Vec<BillingKey>,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.duplicates_in_batch.len() + self.existing_conflicts.len()
    }
}

pub fn import_billing_records<S: FinanceStore + ?Sized>(
    store: &S,
    org: OrganizationId,
    rows: Vec<BillingInput>,
) -> Result<ImportReport> {
    let existing = store.billing_keys(org)?;
    let mut seen: HashSet<BillingKey> = HashSet::new();
    let mut report = ImportReport::default();
    let mut accepted = Vec::new();

    for row in rows {
        let record = row.into_record(org);
        let key = record.key();
        if existing.contains(&key) {
            report.existing_conflicts.push(key);
        } else if !seen.insert(key.clone()) {
            report.duplicates_in_batch.push(key);
        } else {
            accepted.push(record);
        }
    }

    if report.skipped() > 0 {
        warn!(
            "billing import org={} skipped {} rows ({} repeated in batch, {} already stored)",
            org,
            report.skipped(),
            report.duplicates_in_batch.len(),
            report.existing_conflicts.len()
        );
    }

    report.inserted = store.insert_billing_records(accepted)?;
    info!(
        "billing import org={} inserted {} rows",
        org,
        report.inserted.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn input(user: &str, insurance: &str) -> BillingInput {
        BillingInput {
            billing_year_month: "202404".parse().unwrap(),
            service_year_month: "202403".parse().unwrap(),
            user_name: user.to_string(),
            total_cost: NumericInput::Missing,
            insurance_payment: insurance.into(),
            public_payment: NumericInput::Missing,
            reduction: NumericInput::Missing,
            user_burden_transfer: NumericInput::Missing,
            user_burden_withdrawal: "１，２００円".into(),
            is_transfer: false,
        }
    }

    #[test]
    fn test_amounts_normalized() {
        let record = input("  Suzuki ", "¥90,000").into_record(3);
        assert_eq!(record.organization_id, 3);
        assert_eq!(record.user_name, "Suzuki");
        assert_eq!(record.insurance_payment, 90_000);
        assert_eq!(record.user_burden_withdrawal, 1_200);
        assert_eq!(record.total_cost, 0);
    }

    #[test]
    fn test_classification() {
        let store = InMemoryStore::new();
        let first = import_billing_records(&store, 1, vec![input("Ito", "100")]).unwrap();
        assert_eq!(first.inserted.len(), 1);

        let second = import_billing_records(
            &store,
            1,
            vec![
                input("Ito", "200"),
                input("Kato", "300"),
                input("Kato", "400"),
                input("Mori", "500"),
            ],
        )
        .unwrap();
        assert_eq!(second.inserted.len(), 2);
        assert_eq!(second.existing_conflicts.len(), 1);
        assert_eq!(second.existing_conflicts[0].user_name, "Ito");
        assert_eq!(second.duplicates_in_batch.len(), 1);
        assert_eq!(second.skipped(), 2);

        let rows = store.billing_rows(1, "202404".parse().unwrap()).unwrap();
        let kato = rows.iter().find(|r| r.user_name == "Kato").unwrap();
        assert_eq!(kato.insurance_payment, 300);
    }

    #[test]
    fn test_other_organizations_do_not_conflict() {
        let store = InMemoryStore::new();
        import_billing_records(&store, 1, vec![input("Ito", "100")]).unwrap();
        let report = import_billing_records(&store, 2, vec![input("Ito", "100")]).unwrap();
        assert_eq!(report.inserted.len(), 1);
        assert!(report.existing_conflicts.is_empty());
    }
}
