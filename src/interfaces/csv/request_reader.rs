use crate::error::InputError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// Which engine operation a request row targets.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RequestOp {
    Withdraw,
    Deposit,
    Transfer,
    Schedule,
}

/// One row of the requests file:
/// `op, type, account, receiver, amount, execute_at`.
///
/// `type` is the client-declared transaction type and is checked against
/// `op`, the way a request body is checked against the endpoint it hit.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RequestRecord {
    pub op: RequestOp,
    pub r#type: String,
    pub account: String,
    #[serde(default)]
    pub receiver: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub execute_at: Option<DateTime<Utc>>,
}

/// Reads request rows from a CSV source.
///
/// Whitespace is trimmed and short rows are accepted, so the trailing
/// `receiver` and `execute_at` columns may be left off for withdraw and deposit.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows, one result per row.
    pub fn requests(self) -> impl Iterator<Item = Result<RequestRecord, InputError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(InputError::from))
    }
}
