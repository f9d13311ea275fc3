//! The fixed catalogue of monthly income and expense line items.
//!
//! Each line item is a variant of [`IncomeField`] or [`ExpenseField`], and the
//! record types carry one integer-yen column per variant. Code that needs to
//! touch every column walks the catalogue with `for_each_field` / `from_fn`
//! rather than addressing columns by string name.

use crate::utils::YearMonth;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub type OrganizationId = u64;

/// Whether a line item belongs to ordinary operations or sits below the
/// operating line (loans, interest, taxes, deposits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Business,
    NonBusiness,
}

/// A record holding one amount per catalogue field for one organization-month.
pub trait MonthlyLedger {
    type Field: Copy + PartialEq + std::fmt::Debug + 'static;

    fn fields() -> &'static [Self::Field];
    fn year_month(&self) -> YearMonth;
    fn amount(&self, field: Self::Field) -> i64;
}

macro_rules! monthly_record {
    (
        $(#[$record_meta:meta])*
        record $record:ident;
        field $field_ty:ident;
        {
            $( $column:ident => $variant:ident, $key:literal, $label:literal, $group:ident; )+
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(rename_all = "camelCase")]
        pub enum $field_ty {
            $( $variant, )+
        }

        impl $field_ty {
            pub const ALL: &'static [$field_ty] = &[ $( $field_ty::$variant, )+ ];

            /// Stable camelCase key, also used as the budget item name.
            pub fn key(&self) -> &'static str {
                match self {
                    $( $field_ty::$variant => $key, )+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $( $field_ty::$variant => $label, )+
                }
            }

            pub fn group(&self) -> FieldGroup {
                match self {
                    $( $field_ty::$variant => FieldGroup::$group, )+
                }
            }

            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $( $key => Some($field_ty::$variant), )+
                    _ => None,
                }
            }
        }

        $(#[$record_meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
        #[serde(rename_all = "camelCase")]
        pub struct $record {
            pub organization_id: OrganizationId,
            pub year_month: YearMonth,
            $(
                #[serde(default)]
                pub $column: i64,
            )+
        }

        impl $record {
            pub fn zeroed(organization_id: OrganizationId, year_month: YearMonth) -> Self {
                Self::from_fn(organization_id, year_month, |_| 0)
            }

            /// Builds a record by asking `value` for every catalogue field in order.
            pub fn from_fn<F>(organization_id: OrganizationId, year_month: YearMonth, mut value: F) -> Self
            where
                F: FnMut($field_ty) -> i64,
            {
                Self {
                    organization_id,
                    year_month,
                    $( $column: value($field_ty::$variant), )+
                }
            }

            pub fn get(&self, field: $field_ty) -> i64 {
                match field {
                    $( $field_ty::$variant => self.$column, )+
                }
            }

            pub fn set(&mut self, field: $field_ty, amount: i64) {
                match field {
                    $( $field_ty::$variant => self.$column = amount, )+
                }
            }

            pub fn for_each_field<F>(&self, mut visit: F)
            where
                F: FnMut($field_ty, i64),
            {
                $( visit($field_ty::$variant, self.$column); )+
            }

            pub fn total(&self) -> i64 {
                let mut sum = 0;
                self.for_each_field(|_, amount| sum += amount);
                sum
            }

            pub fn is_zero(&self) -> bool {
                let mut zero = true;
                self.for_each_field(|_, amount| zero &= amount == 0);
                zero
            }
        }

        impl MonthlyLedger for $record {
            type Field = $field_ty;

            fn fields() -> &'static [$field_ty] {
                $field_ty::ALL
            }

            fn year_month(&self) -> YearMonth {
                self.year_month
            }

            fn amount(&self, field: $field_ty) -> i64 {
                self.get(field)
            }
        }
    };
}

monthly_record! {
    /// Cash received in one month, one row per organization-month.
    record IncomeRecord;
    field IncomeField;
    {
        insurance_income => InsuranceIncome, "insuranceIncome", "Insurance reimbursement", Business;
        user_burden_transfer => UserBurdenTransfer, "userBurdenTransfer", "User burden (bank transfer)", Business;
        user_burden_withdrawal => UserBurdenWithdrawal, "userBurdenWithdrawal", "User burden (direct debit)", Business;
        factoring_income_1 => FactoringIncome1, "factoringIncome1", "Factoring advance", Business;
        factoring_income_2 => FactoringIncome2, "factoringIncome2", "Factoring remainder", Business;
        other_business_income => OtherBusinessIncome, "otherBusinessIncome", "Other business income", Business;
        representative_loan => RepresentativeLoan, "representativeLoan", "Loan from representative", NonBusiness;
        short_term_loan => ShortTermLoan, "shortTermLoan", "Short-term borrowing", NonBusiness;
        long_term_loan => LongTermLoan, "longTermLoan", "Long-term borrowing", NonBusiness;
        interest_income => InterestIncome, "interestIncome", "Interest income", NonBusiness;
        other_non_business_income => OtherNonBusinessIncome, "otherNonBusinessIncome", "Other non-business income", NonBusiness;
    }
}

monthly_record! {
    /// Cash paid out in one month, one row per organization-month.
    record ExpenseRecord;
    field ExpenseField;
    {
        personnel_cost => PersonnelCost, "personnelCost", "Personnel", Business;
        legal_welfare => LegalWelfare, "legalWelfare", "Statutory welfare", Business;
        advertising => Advertising, "advertising", "Advertising", Business;
        travel_vehicle => TravelVehicle, "travelVehicle", "Travel and vehicles", Business;
        communication => Communication, "communication", "Communication", Business;
        consumables => Consumables, "consumables", "Consumables and supplies", Business;
        utilities => Utilities, "utilities", "Utilities", Business;
        rent => Rent, "rent", "Rent", Business;
        lease_loan => LeaseLoan, "leaseLoan", "Leases", Business;
        payment_fee => PaymentFee, "paymentFee", "Payment fees", Business;
        payment_commission => PaymentCommission, "paymentCommission", "Commissions", Business;
        payment_interest => PaymentInterest, "paymentInterest", "Interest paid", NonBusiness;
        miscellaneous => Miscellaneous, "miscellaneous", "Miscellaneous", Business;
        petty_cash => PettyCash, "pettyCash", "Petty cash", Business;
        card_payment => CardPayment, "cardPayment", "Card settlement", Business;
        representative_loan_repayment => RepresentativeLoanRepayment, "representativeLoanRepayment", "Representative loan repayment", NonBusiness;
        short_term_loan_repayment => ShortTermLoanRepayment, "shortTermLoanRepayment", "Short-term loan repayment", NonBusiness;
        long_term_loan_repayment => LongTermLoanRepayment, "longTermLoanRepayment", "Long-term loan repayment", NonBusiness;
        regular_deposit => RegularDeposit, "regularDeposit", "Regular deposit", NonBusiness;
        tax_payment => TaxPayment, "taxPayment", "Tax payment", NonBusiness;
        other_non_business_expense => OtherNonBusinessExpense, "otherNonBusinessExpense", "Other non-business expense", NonBusiness;
    }
}
