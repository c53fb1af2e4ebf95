//! Broker payload codec.
//!
//! Payloads are versioned JSON objects: `{"v":1,"kind":"...", ...fields}`.
//! Unknown fields are ignored so producers can add fields without breaking
//! older consumers. The older pipe-delimited layout is still understood on
//! decode, see [`legacy`].

use crate::domain::events::{ScheduledTransferMessage, TransactionNotification};
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WIRE_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    ScheduledTransfer(ScheduledTransferMessage),
    TransactionNotification(TransactionNotification),
}

pub fn encode(message: &WireMessage) -> StoreResult<Vec<u8>> {
    let mut value = serde_json::to_value(message)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| StoreError::Serialization("message is not an object".into()))?;
    object.insert("v".to_string(), Value::from(WIRE_VERSION));
    Ok(serde_json::to_vec(&value)?)
}

pub fn encode_scheduled(message: &ScheduledTransferMessage) -> StoreResult<Vec<u8>> {
    encode(&WireMessage::ScheduledTransfer(message.clone()))
}

pub fn encode_notification(event: &TransactionNotification) -> StoreResult<Vec<u8>> {
    encode(&WireMessage::TransactionNotification(event.clone()))
}

/// Decodes either a versioned JSON payload or a legacy pipe payload.
pub fn decode(payload: &[u8]) -> StoreResult<WireMessage> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| StoreError::Serialization(format!("payload is not utf-8: {e}")))?
        .trim();
    if !text.starts_with('{') {
        return legacy::decode(text);
    }

    let value: Value = serde_json::from_str(text)?;
    match value.get("v").and_then(Value::as_u64) {
        Some(v) if v >= 1 => {}
        Some(v) => return Err(StoreError::Serialization(format!("unsupported wire version {v}"))),
        None => return Err(StoreError::Serialization("missing wire version".into())),
    }
    Ok(serde_json::from_value(value)?)
}

/// The pipe-delimited layout used before the versioned encoding.
///
/// Scheduled: `id|type|amount|sender|receiver|submittedAt`.
/// Notification: `type|amount|account|createdAt|remaining[|receiver]`.
/// Fields cannot contain `|`; encoding rejects them instead of producing an
/// ambiguous line.
pub mod legacy {
    use super::WireMessage;
    use crate::domain::events::{ScheduledTransferMessage, TransactionNotification};
    use crate::domain::transaction::TransactionType;
    use crate::error::{StoreError, StoreResult};
    use chrono::{DateTime, NaiveDateTime, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const NOTIFICATION_TIME: &str = "%Y-%m-%d %H:%M:%S";

    fn field(value: &str) -> StoreResult<&str> {
        if value.contains('|') {
            Err(StoreError::Serialization(format!(
                "field '{value}' contains the delimiter"
            )))
        } else {
            Ok(value)
        }
    }

    pub fn encode_scheduled(message: &ScheduledTransferMessage) -> StoreResult<String> {
        Ok(format!(
            "{}|{}|{:.2}|{}|{}|{}",
            message.id,
            message.r#type,
            message.amount,
            field(&message.account_no)?,
            field(&message.receiver_no)?,
            message.submitted_at.to_rfc3339(),
        ))
    }

    pub fn encode_notification(event: &TransactionNotification) -> StoreResult<String> {
        let mut line = format!(
            "{}|{:.2}|{}|{}|{:.2}",
            event.r#type,
            event.amount,
            field(&event.account_no)?,
            event.created_at.format(NOTIFICATION_TIME),
            event.remaining_balance,
        );
        if event.r#type == TransactionType::Transfer {
            let receiver = event.receiver_no.as_deref().unwrap_or_default();
            line.push('|');
            line.push_str(field(receiver)?);
        }
        Ok(line)
    }

    pub fn decode(line: &str) -> StoreResult<WireMessage> {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.first().is_some_and(|p| p.parse::<u64>().is_ok()) {
            decode_scheduled(&parts).map(WireMessage::ScheduledTransfer)
        } else {
            decode_notification(&parts).map(WireMessage::TransactionNotification)
        }
    }

    fn decode_scheduled(parts: &[&str]) -> StoreResult<ScheduledTransferMessage> {
        let [id, kind, amount, account, receiver, submitted] = parts else {
            return Err(malformed("scheduled transfer", parts));
        };
        Ok(ScheduledTransferMessage {
            id: id.parse().map_err(|_| malformed("scheduled transfer", parts))?,
            r#type: parse_type(kind)?,
            amount: parse_amount(amount)?,
            account_no: account.to_string(),
            receiver_no: receiver.to_string(),
            submitted_at: parse_submitted_at(submitted)?,
        })
    }

    fn decode_notification(parts: &[&str]) -> StoreResult<TransactionNotification> {
        let (kind, amount, account, created, remaining, receiver) = match parts {
            [kind, amount, account, created, remaining] => {
                (kind, amount, account, created, remaining, None)
            }
            [kind, amount, account, created, remaining, receiver] => {
                (kind, amount, account, created, remaining, Some(receiver.to_string()))
            }
            _ => return Err(malformed("notification", parts)),
        };
        let created_at = NaiveDateTime::parse_from_str(created, NOTIFICATION_TIME)
            .map_err(|e| StoreError::Serialization(format!("bad timestamp '{created}': {e}")))?
            .and_utc();
        Ok(TransactionNotification {
            r#type: parse_type(kind)?,
            amount: parse_amount(amount)?,
            account_no: account.to_string(),
            created_at,
            remaining_balance: parse_amount(remaining)?,
            receiver_no: receiver,
        })
    }

    fn parse_type(kind: &str) -> StoreResult<TransactionType> {
        TransactionType::from_str(kind).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn parse_amount(amount: &str) -> StoreResult<Decimal> {
        Decimal::from_str(amount)
            .map_err(|e| StoreError::Serialization(format!("bad amount '{amount}': {e}")))
    }

    /// Accepts RFC 3339 and the `2006-01-02 15:04:05.999999 -0700 MST` layout.
    fn parse_submitted_at(value: &str) -> StoreResult<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Ok(parsed.with_timezone(&Utc));
        }
        // date, time, numeric offset, then a zone name that may itself look
        // like "+07"; only the first three matter.
        let parts: Vec<&str> = value.split_whitespace().take(3).collect();
        DateTime::parse_from_str(&parts.join(" "), "%Y-%m-%d %H:%M:%S%.f %z")
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|e| StoreError::Serialization(format!("bad timestamp '{value}': {e}")))
    }

    fn malformed(what: &str, parts: &[&str]) -> StoreError {
        StoreError::Serialization(format!("unexpected {what} format: {}", parts.join("|")))
    }
}
