use crate::domain::account::{Account, AccountStatus};
use crate::error::InputError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of the accounts seed file:
/// `account_no, owner, institution, status, balance[, daily_limit, per_transaction_limit]`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AccountRecord {
    pub account_no: String,
    pub owner: String,
    pub institution: String,
    pub status: AccountStatus,
    pub balance: Decimal,
    #[serde(default)]
    pub daily_limit: Option<Decimal>,
    #[serde(default)]
    pub per_transaction_limit: Option<Decimal>,
}

impl AccountRecord {
    pub fn to_account(&self) -> Result<Account, InputError> {
        if self.account_no.is_empty() {
            return Err(InputError::Invalid("empty account_no".into()));
        }
        if self.balance.is_sign_negative() {
            return Err(InputError::Invalid(format!(
                "account {} has a negative balance",
                self.account_no
            )));
        }
        let mut account = Account::new(&self.account_no, &self.institution, self.balance)
            .with_status(self.status);
        account.owner = self.owner.clone();
        Ok(account)
    }
}

pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<AccountRecord, InputError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(InputError::from))
    }
}
