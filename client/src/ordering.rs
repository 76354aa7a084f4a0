// Ordering and commit phase shared by deployments and transactions

use crate::{
    error::OrderingError,
    transport::{CommitListener, Transport},
};
use fabric_common::{
    proposal::{BroadcastStatus, CommitEvent, EndorsedTransaction},
    topology::OrdererConfig,
};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::timeout;

// Listen for the commit event before anything is sent to the orderer,
// a block delivered during the broadcast is then not missed.
pub async fn subscribe(
    transport: &dyn Transport,
    transaction: &EndorsedTransaction,
) -> Result<CommitListener, OrderingError> {
    transport
        .subscribe_commit(transaction.channel(), transaction.tx_id())
        .await
        .map_err(|e| OrderingError::Subscribe {
            channel: transaction.channel().to_owned(),
            tx_id: transaction.tx_id().clone(),
            reason: e.to_string(),
        })
}

// Submit to the orderer. A transport failure here leaves the outcome unknown:
// the orderer may have received the envelope before the connection dropped.
pub async fn broadcast(
    transport: &dyn Transport,
    transaction: &EndorsedTransaction,
    orderer: &OrdererConfig,
) -> Result<(), OrderingError> {
    debug!(
        "Broadcasting {} with {} endorsements to {}",
        transaction.tx_id(),
        transaction.endorsements.len(),
        orderer
    );

    match transport.broadcast(transaction, orderer).await {
        Ok(BroadcastStatus::Accepted) => Ok(()),
        Ok(BroadcastStatus::Rejected(reason)) => {
            warn!("Orderer {} rejected {}: {}", orderer.name, transaction.tx_id(), reason);
            Err(OrderingError::Rejected {
                orderer: orderer.name.clone(),
                tx_id: transaction.tx_id().clone(),
                reason,
            })
        }
        Err(e) => Err(OrderingError::CommitUnknown {
            orderer: orderer.name.clone(),
            tx_id: transaction.tx_id().clone(),
            reason: e.to_string(),
        }),
    }
}

// Wait on a listener registered before the broadcast
pub async fn await_commit(
    listener: CommitListener,
    transaction: &EndorsedTransaction,
    orderer: &OrdererConfig,
    wait: Duration,
) -> Result<CommitEvent, OrderingError> {
    let tx_id = transaction.tx_id();
    let unknown = |reason: String| OrderingError::CommitUnknown {
        orderer: orderer.name.clone(),
        tx_id: tx_id.clone(),
        reason,
    };

    let event = match timeout(wait, listener).await {
        Ok(Ok(event)) => event,
        Ok(Err(e)) => return Err(unknown(e.to_string())),
        Err(_) => {
            return Err(unknown(format!(
                "no commit event after {}s",
                wait.as_secs_f64()
            )))
        }
    };

    if event.tx_id != *tx_id {
        return Err(unknown(format!(
            "commit event for unexpected transaction {}",
            event.tx_id
        )));
    }

    if !event.valid {
        return Err(OrderingError::CommitInvalid {
            tx_id: event.tx_id,
            block_number: event.block_number,
            validation_code: event.validation_code,
        });
    }

    info!(
        "Transaction {} committed in block {} of channel '{}'",
        tx_id,
        event.block_number,
        transaction.channel()
    );
    Ok(event)
}

// Subscribe, broadcast once and wait for the commit within the budget
pub async fn submit(
    transport: &dyn Transport,
    transaction: &EndorsedTransaction,
    orderer: &OrdererConfig,
    wait: Duration,
) -> Result<CommitEvent, OrderingError> {
    let listener = subscribe(transport, transaction).await?;
    broadcast(transport, transaction, orderer).await?;
    await_commit(listener, transaction, orderer, wait).await
}
