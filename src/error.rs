use thiserror::Error;

#[derive(Error, Debug)]
pub enum CashflowError {
    #[error("Organization not set for the current session")]
    MissingOrganization,

    #[error("Organization {0} does not exist")]
    OrganizationNotFound(u64),

    #[error("Invalid year-month '{0}': expected YYYY-MM")]
    InvalidYearMonth(String),

    #[error("Invalid billing month '{0}': expected YYYYMM")]
    InvalidBillingMonth(String),

    #[error("Invalid repayment due day {0}: must be between 1 and 31")]
    InvalidDueDay(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Loan {0} does not exist")]
    LoanNotFound(u64),

    #[error("Billing record {0} does not exist")]
    BillingRecordNotFound(u64),

    #[error(
        "Bank balance for {year_month} (org {organization_id}) totals {stored}, sub-balances sum to {expected}"
    )]
    BalanceMismatch {
        organization_id: u64,
        year_month: String,
        stored: i64,
        expected: i64,
    },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CashflowError>;
