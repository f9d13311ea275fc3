use crate::chart_of_accounts::MonthlyLedger;
use crate::utils::{round_half_up, YearMonth};

/// Number of calendar months the fallback looks back over.
pub const TRAILING_WINDOW: u32 = 3;

/// Mean of `field` over the three months before `target`, rounded half-up.
///
/// A month without a record contributes 0 but still counts toward the
/// divisor; a stored zero is an ordinary data point. With no record in the
/// window at all the result is 0.
pub fn trailing_average<R: MonthlyLedger>(records: &[R], field: R::Field, target: YearMonth) -> i64 {
    let window = target.preceding(TRAILING_WINDOW);
    let mut found = 0;
    let mut sum = 0i64;
    for month in &window {
        if let Some(record) = records.iter().find(|r| r.year_month() == *month) {
            found += 1;
            sum += record.amount(field);
        }
    }
    if found == 0 {
        return 0;
    }
    round_half_up(sum as f64 / TRAILING_WINDOW as f64)
}
