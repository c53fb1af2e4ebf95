use crate::error::TransferError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// A monetary value held by an account.
///
/// Wraps `rust_decimal::Decimal` so balances cannot be mixed up with raw
/// amounts coming off the wire.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive amount moved by a single operation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, TransferError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(TransferError::NonPositiveAmount)
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = TransferError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
    Fraud,
    Zero,
}

impl AccountStatus {
    /// Whether the account may be the source of money movement.
    pub fn can_send(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Zero)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Fraud => "fraud",
            AccountStatus::Zero => "zero",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            "fraud" => Ok(AccountStatus::Fraud),
            "zero" => Ok(AccountStatus::Zero),
            other => Err(format!("unknown account status '{other}'")),
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger account.
///
/// `version` is bumped by every committed write and is what the stores
/// compare to detect a concurrent modification.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub account_no: String,
    /// Owning identity.
    pub owner: String,
    pub balance: Balance,
    /// Bank code the account belongs to. Drives the transfer fee.
    pub institution: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Account {
    pub fn new(
        account_no: impl Into<String>,
        institution: impl Into<String>,
        balance: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_no: account_no.into(),
            owner: String::new(),
            balance: Balance::new(balance),
            institution: institution.into(),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    /// Credits the balance.
    pub fn deposit(&mut self, amount: Balance) {
        self.balance += amount;
    }

    /// Debits the balance if it covers `amount`, leaving it untouched otherwise.
    pub fn withdraw(&mut self, amount: Balance) -> Result<(), TransferError> {
        if self.balance >= amount {
            self.balance -= amount;
            Ok(())
        } else {
            Err(TransferError::InsufficientBalance {
                available: self.balance.0,
                required: amount.0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(TransferError::NonPositiveAmount)
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(TransferError::NonPositiveAmount)
        ));
    }

    #[test]
    fn test_amount_rejects_negative_json() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-5\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"5.5\"").unwrap();
        assert_eq!(parsed.value(), dec!(5.5));
    }

    #[test]
    fn test_account_withdraw_insufficient_leaves_balance() {
        let mut account = Account::new("1000000001", "KBANK", dec!(100.00));

        let result = account.withdraw(Balance::new(dec!(200.00)));
        assert!(matches!(
            result,
            Err(TransferError::InsufficientBalance { .. })
        ));
        assert_eq!(account.balance, Balance::new(dec!(100.00)));
    }

    #[test]
    fn test_account_withdraw_exact_balance() {
        let mut account = Account::new("1000000001", "KBANK", dec!(100.00));
        account.withdraw(Balance::new(dec!(100.00))).unwrap();
        assert_eq!(account.balance, Balance::ZERO);
    }

    #[test]
    fn test_status_parsing_and_send_rules() {
        assert_eq!("Inactive".parse::<AccountStatus>(), Ok(AccountStatus::Inactive));
        assert!("closed".parse::<AccountStatus>().is_err());
        assert!(AccountStatus::Active.can_send());
        assert!(AccountStatus::Zero.can_send());
        assert!(!AccountStatus::Fraud.can_send());
        assert!(!AccountStatus::Inactive.can_send());
    }
}
