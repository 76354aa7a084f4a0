// Collaborators the orchestration layer drives: the wire transport to
// peers and orderers, and the signing suite used for channel configs.

use crate::channel::ChannelHandle;
use async_trait::async_trait;
use fabric_common::{
    chaincode::ChaincodeInfo,
    identity::Identity,
    proposal::{
        BroadcastStatus, CommitEvent, ConfigSignature, EndorsedTransaction, ProposalRequest,
        ProposalResponse, TransactionId,
    },
    topology::{OrdererConfig, PeerConfig},
};
use futures::future::BoxFuture;
use thiserror::Error;

// Pending commit event of a single transaction
pub type CommitListener = BoxFuture<'static, Result<CommitEvent, TransportError>>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Endpoint {} is unreachable: {}", endpoint, reason)]
    Unreachable { endpoint: String, reason: String },
    #[error("Endpoint {} rejected the request: {}", endpoint, reason)]
    Rejected { endpoint: String, reason: String },
    #[error("Unexpected answer from {}: {}", endpoint, reason)]
    Protocol { endpoint: String, reason: String },
}

#[async_trait]
pub trait Transport: Send + Sync {
    // Send a proposal to a single peer and return its signed answer.
    // Non success statuses are returned as responses, not errors.
    async fn send_proposal(
        &self,
        request: &ProposalRequest,
        peer: &PeerConfig,
    ) -> Result<ProposalResponse, TransportError>;

    // Submit an endorsed transaction to the ordering service
    async fn broadcast(
        &self,
        transaction: &EndorsedTransaction,
        orderer: &OrdererConfig,
    ) -> Result<BroadcastStatus, TransportError>;

    // Register for the commit event of a transaction on the channel event hub.
    // Only blocks delivered after this call are observed, so callers subscribe
    // before broadcasting and bound the returned listener with their own timeout.
    async fn subscribe_commit(
        &self,
        channel: &str,
        tx_id: &TransactionId,
    ) -> Result<CommitListener, TransportError>;

    async fn query_instantiated_chaincodes(
        &self,
        channel: &str,
        peer: &PeerConfig,
        identity: &Identity,
    ) -> Result<Vec<ChaincodeInfo>, TransportError>;

    // Names of the channels the peer has joined
    async fn query_channels(
        &self,
        peer: &PeerConfig,
        identity: &Identity,
    ) -> Result<Vec<String>, TransportError>;

    async fn create_channel(
        &self,
        name: &str,
        orderer: &OrdererConfig,
        config: &[u8],
        signature: &ConfigSignature,
        identity: &Identity,
    ) -> Result<(), TransportError>;

    async fn join_peer(
        &self,
        channel: &str,
        peer: &PeerConfig,
        identity: &Identity,
    ) -> Result<(), TransportError>;

    // Open the channel locally: event hub connections and config retrieval
    async fn initialize_channel(&self, channel: &ChannelHandle) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("Identity '{}' has no private key", _0)]
    MissingKey(String),
    #[error("Signing failed: {}", _0)]
    Signing(String),
}

#[async_trait]
pub trait CryptoSuite: Send + Sync {
    async fn sign_channel_config(
        &self,
        config: &[u8],
        identity: &Identity,
    ) -> Result<ConfigSignature, CryptoError>;
}
