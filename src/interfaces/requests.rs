use super::csv::request_reader::{RequestOp, RequestRecord};
use crate::application::engine::TransferEngine;
use crate::domain::transaction::{ScheduledTransaction, Transaction, TransactionType};
use crate::error::{Result, TransferError};

#[derive(Debug)]
pub enum RequestOutcome {
    Committed(Transaction),
    Scheduled(ScheduledTransaction),
}

/// Routes one request to the engine after checking the declared type
/// matches the operation.
pub async fn submit(engine: &TransferEngine, request: &RequestRecord) -> Result<RequestOutcome> {
    match request.op {
        RequestOp::Withdraw => {
            TransactionType::Withdraw.check_declared(&request.r#type)?;
            engine
                .withdraw(&request.account, request.amount)
                .await
                .map(RequestOutcome::Committed)
        }
        RequestOp::Deposit => {
            TransactionType::Deposit.check_declared(&request.r#type)?;
            engine
                .deposit(&request.account, request.amount)
                .await
                .map(RequestOutcome::Committed)
        }
        RequestOp::Transfer => {
            TransactionType::Transfer.check_declared(&request.r#type)?;
            engine
                .transfer(&request.account, receiver(request)?, request.amount)
                .await
                .map(RequestOutcome::Committed)
        }
        RequestOp::Schedule => {
            let execute_at = request
                .execute_at
                .unwrap_or_else(|| engine.clock().now());
            engine
                .schedule(
                    &request.r#type,
                    &request.account,
                    receiver(request)?,
                    request.amount,
                    execute_at,
                )
                .await
                .map(RequestOutcome::Scheduled)
        }
    }
}

fn receiver(request: &RequestRecord) -> Result<&str> {
    request
        .receiver
        .as_deref()
        .filter(|receiver| !receiver.is_empty())
        .ok_or_else(|| TransferError::RecipientNotFound(String::new()))
}
