// Proposal, endorsement and commit messages exchanged with peers and orderers

use crate::{
    chaincode::ChaincodeId,
    config::{
        DEFAULT_PROPOSAL_WAIT_TIME, TRANSIENT_METHOD_KEY, TRANSIENT_ORIGIN_KEY,
        TRANSIENT_SDK_NAME, TX_NONCE_SIZE,
    },
    identity::Identity,
    time::{get_current_time_in_millis, TimestampMillis},
};
use indexmap::IndexMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use strum::Display as StrumDisplay;

// Transaction id: hex encoded SHA-256 of the nonce followed by the creator certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn from_parts(nonce: &[u8], creator: &Identity) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(creator.certificate_pem().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    // Generate a fresh nonce and the transaction id derived from it
    pub fn generate(creator: &Identity) -> (Self, Vec<u8>) {
        let mut nonce = vec![0u8; TX_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        (Self::from_parts(&nonce, creator), nonce)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum ProposalKind {
    Install,
    Instantiate,
    Upgrade,
    Transaction,
    Query,
}

impl ProposalKind {
    // Request name carried in the transient map
    pub const fn request_name(&self) -> &'static str {
        match self {
            Self::Install => "InstallProposalRequest",
            Self::Instantiate => "InstantiateProposalRequest",
            Self::Upgrade => "UpgradeProposalRequest",
            Self::Transaction => "TransactionProposalRequest",
            Self::Query => "QueryByChaincodeRequest",
        }
    }

    // Whether the endorsed proposal goes through the ordering service
    pub const fn requires_ordering(&self) -> bool {
        matches!(self, Self::Instantiate | Self::Upgrade | Self::Transaction)
    }
}

pub type TransientMap = IndexMap<String, Vec<u8>>;

// Small header identifying the origin of a request
pub fn origin_transient_map(kind: ProposalKind) -> TransientMap {
    let mut map = TransientMap::new();
    map.insert(
        TRANSIENT_ORIGIN_KEY.to_owned(),
        format!("{}:{}", kind.request_name(), TRANSIENT_SDK_NAME).into_bytes(),
    );
    map.insert(
        TRANSIENT_METHOD_KEY.to_owned(),
        kind.request_name().as_bytes().to_vec(),
    );
    map
}

#[derive(Debug, Clone)]
pub struct ProposalRequest {
    pub kind: ProposalKind,
    pub channel: String,
    pub tx_id: TransactionId,
    pub nonce: Vec<u8>,
    pub creator: Arc<Identity>,
    pub chaincode: ChaincodeId,
    pub function: String,
    pub args: Vec<String>,
    pub transient: TransientMap,
    // Encoded endorsement policy, install and instantiate/upgrade only
    pub policy: Option<Vec<u8>>,
    // Staged chaincode sources, install only
    pub source_location: Option<PathBuf>,
    pub wait_time: Duration,
    pub timestamp: TimestampMillis,
}

impl ProposalRequest {
    pub fn new<C: Into<String>>(
        kind: ProposalKind,
        channel: C,
        chaincode: ChaincodeId,
        creator: Arc<Identity>,
    ) -> Self {
        let (tx_id, nonce) = TransactionId::generate(&creator);
        Self {
            kind,
            channel: channel.into(),
            tx_id,
            nonce,
            creator,
            chaincode,
            function: String::new(),
            args: Vec::new(),
            transient: TransientMap::new(),
            policy: None,
            source_location: None,
            wait_time: DEFAULT_PROPOSAL_WAIT_TIME,
            timestamp: get_current_time_in_millis(),
        }
    }

    pub fn with_function<F: Into<String>>(mut self, function: F, args: Vec<String>) -> Self {
        self.function = function.into();
        self.args = args;
        self
    }

    pub fn with_transient(mut self, transient: TransientMap) -> Self {
        self.transient = transient;
        self
    }

    pub fn with_policy(mut self, policy: Option<Vec<u8>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_source_location(mut self, location: PathBuf) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Success,
    Failure,
}

// Answer of a single peer to a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub peer: String,
    pub endorser_msp_id: String,
    pub status: ProposalStatus,
    // Endorsement signature checked against the peer certificate
    pub verified: bool,
    pub tx_id: TransactionId,
    pub payload: Vec<u8>,
    pub message: String,
}

impl ProposalResponse {
    pub fn is_success(&self) -> bool {
        self.status == ProposalStatus::Success
    }

    // Usable endorsement: success status with a valid signature
    pub fn is_endorsed(&self) -> bool {
        self.is_success() && self.verified
    }
}

// Proposal together with the endorsements gathered for it, ready for ordering
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    pub proposal: Arc<ProposalRequest>,
    pub endorsements: Vec<ProposalResponse>,
}

impl EndorsedTransaction {
    pub fn tx_id(&self) -> &TransactionId {
        &self.proposal.tx_id
    }

    pub fn channel(&self) -> &str {
        &self.proposal.channel
    }
}

// Answer of the ordering service to a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastStatus {
    Accepted,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAction {
    pub proposal_response_payload: Vec<u8>,
}

// Event emitted by a peer once the block holding the transaction is committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub tx_id: TransactionId,
    pub block_number: u64,
    pub valid: bool,
    pub validation_code: String,
    pub actions: Vec<TransactionAction>,
}

// Signature over a channel configuration by an authorized identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSignature {
    pub signer: String,
    pub signature: Vec<u8>,
}
