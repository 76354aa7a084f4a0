// Concurrent fan-out of requests to the peers of a channel.
// Every peer call runs in its own task bounded by the request wait time,
// results are reported in peer order whatever the completion order.

use crate::{
    error::{FailureReason, PeerFailure},
    transport::{Transport, TransportError},
};
use fabric_common::{
    proposal::{ProposalRequest, ProposalResponse},
    topology::PeerConfig,
    utils::preview_payload,
};
use log::{debug, trace, warn};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::timeout};

// Run `call` against every peer concurrently
pub async fn for_each_peer<T, F, Fut>(
    peers: &[PeerConfig],
    wait: Duration,
    call: F,
) -> Vec<(PeerConfig, Result<T, FailureReason>)>
where
    T: Send + 'static,
    F: Fn(PeerConfig) -> Fut,
    Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    for (index, peer) in peers.iter().enumerate() {
        if log::log_enabled!(log::Level::Trace) {
            trace!("Spawning request task for peer {}", peer.name);
        }

        let future = call(peer.clone());
        join_set.spawn(async move {
            let result = match timeout(wait, future).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(FailureReason::Transport(e.to_string())),
                Err(_) => Err(FailureReason::Timeout(wait)),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T, FailureReason>>> = peers.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => {
                // The index of a panicked task is lost, its slot stays empty
                if log::log_enabled!(log::Level::Debug) {
                    debug!("Peer request task join error: {:?}", e);
                }
            }
        }
    }

    peers
        .iter()
        .cloned()
        .zip(slots)
        .map(|(peer, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(FailureReason::Aborted(String::from(
                    "task ended without result",
                )))
            });
            (peer, result)
        })
        .collect()
}

// What a single peer answered to a proposal
#[derive(Debug, Clone)]
pub struct PeerOutcome {
    pub peer: String,
    pub result: Result<ProposalResponse, PeerFailure>,
}

impl PeerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// Which responses count as a success for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    // Success status is enough (install)
    Status,
    // Success status and verified endorsement signature
    Endorsed,
}

impl Acceptance {
    fn check(&self, response: &ProposalResponse) -> Option<FailureReason> {
        if !response.is_success() {
            return Some(FailureReason::Status {
                status: response.status,
                message: response.message.clone(),
            });
        }

        if *self == Self::Endorsed && !response.verified {
            return Some(FailureReason::Unverified);
        }

        None
    }
}

// Send the proposal to every peer and classify each answer
pub async fn send_proposal(
    transport: &Arc<dyn Transport>,
    request: &Arc<ProposalRequest>,
    peers: &[PeerConfig],
    acceptance: Acceptance,
) -> Vec<PeerOutcome> {
    debug!(
        "Sending {} proposal {} to {} peers",
        request.kind,
        request.tx_id,
        peers.len()
    );

    let results = for_each_peer(peers, request.wait_time, |peer| {
        let transport = Arc::clone(transport);
        let request = Arc::clone(request);
        async move { transport.send_proposal(&request, &peer).await }
    })
    .await;

    results
        .into_iter()
        .map(|(peer, result)| {
            let result = match result {
                Ok(response) => match acceptance.check(&response) {
                    None => {
                        if log::log_enabled!(log::Level::Debug) {
                            debug!(
                                "{} proposal {} accepted by {}, payload: {}",
                                request.kind,
                                request.tx_id,
                                peer.name,
                                preview_payload(&response.payload, 64)
                            );
                        }
                        Ok(response)
                    }
                    Some(reason) => Err(reason),
                },
                Err(reason) => Err(reason),
            };

            let result = result.map_err(|reason| {
                let failure = PeerFailure {
                    peer: peer.name.clone(),
                    tx_id: Some(request.tx_id.clone()),
                    reason,
                };
                warn!("{} proposal failed: {}", request.kind, failure);
                failure
            });

            PeerOutcome {
                peer: peer.name,
                result,
            }
        })
        .collect()
}

// Split outcomes into the usable responses and the failures
#[derive(Debug, Clone, Default)]
pub struct EndorsementSummary {
    pub responses: Vec<ProposalResponse>,
    pub failures: Vec<PeerFailure>,
}

impl EndorsementSummary {
    pub fn total(&self) -> usize {
        self.responses.len() + self.failures.len()
    }

    pub fn is_unanimous(&self) -> bool {
        self.failures.is_empty() && !self.responses.is_empty()
    }
}

impl From<Vec<PeerOutcome>> for EndorsementSummary {
    fn from(outcomes: Vec<PeerOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome.result {
                Ok(response) => summary.responses.push(response),
                Err(failure) => summary.failures.push(failure),
            }
        }
        summary
    }
}
