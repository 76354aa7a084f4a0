// Invoke and query the chaincode live on a channel.
//
// Invoke: Proposed -> Endorsed -> Ordered -> Committed, or Failed at any step.
// Query: endorsement only, the first verified success answers.

use crate::{
    channel::ChannelHandle,
    endorsement::{self, Acceptance, EndorsementSummary},
    error::{InvokeError, PeerFailure, QueryError},
    ordering,
    transport::Transport,
    version::VersionTracker,
};
use fabric_common::{
    chaincode::ChaincodeId,
    config::{DEFAULT_COMMIT_WAIT_TIME, DEFAULT_PROPOSAL_WAIT_TIME},
    identity::Identity,
    proposal::{
        origin_transient_map, EndorsedTransaction, ProposalKind, ProposalRequest, TransactionId,
    },
    utils::preview_payload,
};
use log::{debug, info, trace, warn};
use std::{sync::Arc, time::Duration};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TransactionState {
    Proposed,
    Endorsed,
    Ordered,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionSettings {
    pub proposal_wait: Duration,
    pub commit_wait: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            proposal_wait: DEFAULT_PROPOSAL_WAIT_TIME,
            commit_wait: DEFAULT_COMMIT_WAIT_TIME,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub tx_id: TransactionId,
    pub chaincode: ChaincodeId,
    pub block_number: u64,
    // Payload of the first action of the committed transaction
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub tx_id: TransactionId,
    pub peer: String,
    pub payload: Vec<u8>,
    // Peers that did not produce a usable answer
    pub failures: Vec<PeerFailure>,
}

fn transition(tx_id: &TransactionId, from: TransactionState, to: TransactionState) {
    if log::log_enabled!(log::Level::Trace) {
        trace!("Transaction {}: {} -> {}", tx_id, from, to);
    }
}

pub struct TransactionOrchestrator {
    transport: Arc<dyn Transport>,
    tracker: VersionTracker,
    settings: TransactionSettings,
}

impl TransactionOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, settings: TransactionSettings) -> Self {
        Self {
            tracker: VersionTracker::new(Arc::clone(&transport)),
            transport,
            settings,
        }
    }

    // Invoke with the identity the channel was opened with
    pub async fn invoke(
        &self,
        channel: &ChannelHandle,
        function: &str,
        args: Vec<String>,
    ) -> Result<CommitResult, InvokeError> {
        self.invoke_as(channel, Arc::clone(channel.identity()), function, args)
            .await
    }

    pub async fn invoke_as(
        &self,
        channel: &ChannelHandle,
        identity: Arc<Identity>,
        function: &str,
        args: Vec<String>,
    ) -> Result<CommitResult, InvokeError> {
        let chaincode = self
            .tracker
            .current_descriptor(channel)
            .await?
            .ok_or_else(|| InvokeError::NoChaincodeInstantiated(channel.name().to_owned()))?;

        let request = ProposalRequest::new(
            ProposalKind::Transaction,
            channel.name(),
            chaincode.clone(),
            identity,
        )
        .with_function(function, args)
        .with_wait_time(self.settings.proposal_wait);
        let request = Arc::new(request);
        let tx_id = request.tx_id.clone();
        debug!(
            "Invoking {}({}) on {} as {}, tx {}",
            function,
            request.args.join(", "),
            chaincode,
            request.creator,
            tx_id
        );

        let outcomes = endorsement::send_proposal(
            &self.transport,
            &request,
            channel.peers(),
            Acceptance::Endorsed,
        )
        .await;

        // Every peer must endorse, a partial set is never sent to the orderer
        let summary = EndorsementSummary::from(outcomes);
        if !summary.is_unanimous() {
            transition(&tx_id, TransactionState::Proposed, TransactionState::Failed);
            return Err(InvokeError::EndorsementFailed {
                tx_id,
                failed: summary.failures.len(),
                total: summary.total(),
                failures: summary.failures,
            });
        }
        transition(&tx_id, TransactionState::Proposed, TransactionState::Endorsed);

        let transaction = EndorsedTransaction {
            proposal: request,
            endorsements: summary.responses,
        };
        let listener = match ordering::subscribe(self.transport.as_ref(), &transaction).await {
            Ok(listener) => listener,
            Err(e) => {
                transition(&tx_id, TransactionState::Endorsed, TransactionState::Failed);
                return Err(e.into());
            }
        };
        if let Err(e) =
            ordering::broadcast(self.transport.as_ref(), &transaction, channel.orderer()).await
        {
            transition(&tx_id, TransactionState::Endorsed, TransactionState::Failed);
            return Err(e.into());
        }
        transition(&tx_id, TransactionState::Endorsed, TransactionState::Ordered);

        let event = match ordering::await_commit(
            listener,
            &transaction,
            channel.orderer(),
            self.settings.commit_wait,
        )
        .await
        {
            Ok(event) => event,
            Err(e) => {
                transition(&tx_id, TransactionState::Ordered, TransactionState::Failed);
                return Err(e.into());
            }
        };

        let Some(action) = event.actions.into_iter().next() else {
            transition(&tx_id, TransactionState::Ordered, TransactionState::Failed);
            return Err(InvokeError::EmptyCommit(tx_id));
        };
        transition(&tx_id, TransactionState::Ordered, TransactionState::Committed);

        info!(
            "Invoke {} on channel '{}' committed in block {}",
            tx_id,
            channel.name(),
            event.block_number
        );
        Ok(CommitResult {
            tx_id,
            chaincode,
            block_number: event.block_number,
            payload: action.proposal_response_payload,
        })
    }

    // Query with the identity the channel was opened with
    pub async fn query(
        &self,
        channel: &ChannelHandle,
        function: &str,
        args: Vec<String>,
    ) -> Result<QueryResult, QueryError> {
        self.query_as(channel, Arc::clone(channel.identity()), function, args)
            .await
    }

    pub async fn query_as(
        &self,
        channel: &ChannelHandle,
        identity: Arc<Identity>,
        function: &str,
        args: Vec<String>,
    ) -> Result<QueryResult, QueryError> {
        let chaincode = self
            .tracker
            .current_descriptor(channel)
            .await?
            .ok_or_else(|| QueryError::NoChaincodeInstantiated(channel.name().to_owned()))?;

        let kind = ProposalKind::Query;
        let request = ProposalRequest::new(kind, channel.name(), chaincode, identity)
            .with_function(function, args)
            .with_transient(origin_transient_map(kind))
            .with_wait_time(self.settings.proposal_wait);
        let request = Arc::new(request);
        let tx_id = request.tx_id.clone();

        let outcomes = endorsement::send_proposal(
            &self.transport,
            &request,
            channel.peers(),
            Acceptance::Endorsed,
        )
        .await;

        let mut answer = None;
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(response) if answer.is_none() => answer = Some((outcome.peer, response.payload)),
                Ok(_) => {}
                Err(failure) => failures.push(failure),
            }
        }

        let Some((peer, payload)) = answer else {
            warn!("Query {} on channel '{}' got no usable answer", tx_id, channel.name());
            return Err(QueryError::Unanswered { tx_id, failures });
        };

        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "Query {}({}) answered by {}: {}",
                function,
                request.args.join(", "),
                peer,
                preview_payload(&payload, 128)
            );
        }

        Ok(QueryResult {
            tx_id,
            peer,
            payload,
            failures,
        })
    }
}
