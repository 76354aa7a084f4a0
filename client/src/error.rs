use crate::{archive::ArchiveError, transport::TransportError};
use fabric_common::{
    chaincode::ChaincodeVersion,
    error::{ConfigError, PolicyError},
    proposal::{ProposalStatus, TransactionId},
};
use std::{
    fmt::{self, Display, Formatter},
    io,
    path::PathBuf,
    time::Duration,
};
use thiserror::Error;

// Why a single peer did not produce a usable response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Status {
        status: ProposalStatus,
        message: String,
    },
    // Success status but the endorsement signature did not verify
    Unverified,
    Transport(String),
    Timeout(Duration),
    Aborted(String),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, message } => write!(f, "status {}: {}", status, message),
            Self::Unverified => f.write_str("endorsement signature not verified"),
            Self::Transport(reason) => write!(f, "transport error: {}", reason),
            Self::Timeout(wait) => write!(f, "no answer after {}ms", wait.as_millis()),
            Self::Aborted(reason) => write!(f, "request task aborted: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
    pub peer: String,
    pub tx_id: Option<TransactionId>,
    pub reason: FailureReason,
}

impl Display for PeerFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.tx_id {
            Some(tx_id) => write!(f, "peer {} (tx {}): {}", self.peer, tx_id, self.reason),
            None => write!(f, "peer {}: {}", self.peer, self.reason),
        }
    }
}

// Renders a list of failures on a single line for error messages
pub struct Failures<'a>(pub &'a [PeerFailure]);

impl Display for Failures<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel '{}' has no member peers", _0)]
    NoMembers(String),
    #[error("Cannot connect to channel '{}'{}: {}", channel, peer.as_ref().map(|p| format!(" through peer {}", p)).unwrap_or_default(), reason)]
    Connect {
        channel: String,
        peer: Option<String>,
        reason: String,
    },
    #[error("Cannot create channel '{}' on orderer {}: {}", channel, orderer, reason)]
    Create {
        channel: String,
        orderer: String,
        reason: String,
    },
    #[error("Channel '{}' was created but no peer could join it: {}", channel, Failures(failures))]
    NoPeerJoined {
        channel: String,
        failures: Vec<PeerFailure>,
    },
    #[error("Channel '{}' is already registered", _0)]
    AlreadyRegistered(String),
}

#[derive(Debug, Error)]
pub enum VersionQueryError {
    #[error("Channel '{}' has no peer to query", _0)]
    NoPeers(String),
    #[error("Cannot list instantiated chaincodes of channel '{}' on peer {}: {}", channel, peer, source)]
    Transport {
        channel: String,
        peer: String,
        #[source]
        source: TransportError,
    },
    #[error("Chaincode {} on channel '{}' (peer {}) has non numeric version '{}'", name, channel, peer, version)]
    NonNumericVersion {
        channel: String,
        peer: String,
        name: String,
        version: String,
    },
    #[error("Chaincode on channel '{}' (peer {}) is at version {}, no higher version exists", channel, peer, version)]
    VersionExhausted {
        channel: String,
        peer: String,
        version: ChaincodeVersion,
    },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Version(#[from] VersionQueryError),
    #[error("Requested chaincode version {} but the next version of the channel is {}", requested, expected)]
    VersionMismatch {
        expected: ChaincodeVersion,
        requested: ChaincodeVersion,
    },
    #[error("Cannot prepare staging directory {}: {}", path.display(), source)]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Invalid endorsement policy file {}: {}", path.display(), source)]
    InvalidPolicy {
        path: PathBuf,
        #[source]
        source: PolicyError,
    },
    #[error("Chaincode install {} failed on every peer: {}", tx_id, Failures(failures))]
    NoPeerSucceeded {
        tx_id: TransactionId,
        failures: Vec<PeerFailure>,
    },
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Version(#[from] VersionQueryError),
    #[error("Requested chaincode version {} but the next version of the channel is {}", requested, expected)]
    VersionMismatch {
        expected: ChaincodeVersion,
        requested: ChaincodeVersion,
    },
    #[error("Chaincode {} is live on channel '{}', cannot deploy {}", live, channel, requested)]
    NameMismatch {
        channel: String,
        live: String,
        requested: String,
    },
    #[error("Chaincode {} is already instantiated on channel '{}' at version {}", name, channel, version)]
    AlreadyInstantiated {
        channel: String,
        name: String,
        version: ChaincodeVersion,
    },
    #[error("No chaincode instantiated on channel '{}' to upgrade", _0)]
    NotInstantiated(String),
    #[error("Invalid endorsement policy file {}: {}", path.display(), source)]
    InvalidPolicy {
        path: PathBuf,
        #[source]
        source: PolicyError,
    },
    #[error("Endorsement of {} failed on {}/{} peers: {}", tx_id, failed, total, Failures(failures))]
    EndorsementFailed {
        tx_id: TransactionId,
        failed: usize,
        total: usize,
        failures: Vec<PeerFailure>,
    },
    #[error(transparent)]
    Ordering(#[from] OrderingError),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No chaincode instantiated on channel '{}'", _0)]
    NoChaincodeInstantiated(String),
    #[error(transparent)]
    Version(#[from] VersionQueryError),
    #[error("Endorsement of {} failed on {}/{} peers: {}", tx_id, failed, total, Failures(failures))]
    EndorsementFailed {
        tx_id: TransactionId,
        failed: usize,
        total: usize,
        failures: Vec<PeerFailure>,
    },
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error("Transaction {} was committed without any action", _0)]
    EmptyCommit(TransactionId),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("No chaincode instantiated on channel '{}'", _0)]
    NoChaincodeInstantiated(String),
    #[error(transparent)]
    Version(#[from] VersionQueryError),
    #[error("No peer answered query {}: {}", tx_id, Failures(failures))]
    Unanswered {
        tx_id: TransactionId,
        failures: Vec<PeerFailure>,
    },
}

// Outcome of the ordering and commit phase once endorsements are gathered
#[derive(Debug, Error)]
pub enum OrderingError {
    // Raised before the broadcast, nothing reached the orderer
    #[error("Cannot listen for the commit of transaction {} on channel '{}': {}", tx_id, channel, reason)]
    Subscribe {
        channel: String,
        tx_id: TransactionId,
        reason: String,
    },
    #[error("Orderer {} rejected transaction {}: {}", orderer, tx_id, reason)]
    Rejected {
        orderer: String,
        tx_id: TransactionId,
        reason: String,
    },
    // The transaction may or may not be committed, it must not be resubmitted blindly
    #[error("Commit of transaction {} through orderer {} is unknown: {}", tx_id, orderer, reason)]
    CommitUnknown {
        orderer: String,
        tx_id: TransactionId,
        reason: String,
    },
    #[error("Transaction {} was committed in block {} as invalid ({})", tx_id, block_number, validation_code)]
    CommitInvalid {
        tx_id: TransactionId,
        block_number: u64,
        validation_code: String,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Identity store I/O error on {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid identity file {}: {}", path.display(), source)]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Invalid user name '{}'", _0)]
    InvalidName(String),
    #[error("User '{}' is already registered", _0)]
    AlreadyRegistered(String),
    #[error("Certificate authority refused to register '{}': {}", name, source)]
    Register {
        name: String,
        #[source]
        source: crate::ca::CaError,
    },
    #[error("Cannot enroll '{}': {}", name, source)]
    Enroll {
        name: String,
        #[source]
        source: crate::ca::CaError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum IdentityLoadError {
    #[error("Cannot read {} of user '{}': {}", path.display(), name, source)]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("File {} of user '{}' is not PEM encoded", path.display(), name)]
    NotPem { name: String, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityLoadError),
}
