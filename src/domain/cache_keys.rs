//! Logical cache keys shared by the limit guard, the deposit check and the
//! account snapshot cache.

pub const DEFAULT_DAILY_LIMIT: &str = "default_daily_limit";
pub const MIN_DEPOSIT_AMOUNT: &str = "min_deposit_amount";

pub fn daily_limit(account_no: &str) -> String {
    format!("daily_limit_{account_no}")
}

/// Today's running transfer sum.
pub fn daily_transaction(account_no: &str) -> String {
    format!("daily_transaction_{account_no}")
}

pub fn limit_per_transaction(account_no: &str) -> String {
    format!("limit_per_transaction:{account_no}")
}

pub fn account_snapshot(account_no: &str) -> String {
    format!("account_no:{account_no}")
}
