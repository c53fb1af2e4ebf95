use crate::domain::account::Account;
use crate::error::InputError;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account_no: &'a str,
    institution: &'a str,
    status: &'a str,
    balance: String,
}

/// Writes the ledger as `account_no,institution,status,balance`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: &[Account]) -> Result<(), InputError> {
        for account in accounts {
            self.writer.serialize(AccountRow {
                account_no: &account.account_no,
                institution: &account.institution,
                status: account.status.as_str(),
                balance: format!("{:.2}", account.balance.value()),
            })?;
        }
        self.writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
