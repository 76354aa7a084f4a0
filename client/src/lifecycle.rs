// Chaincode lifecycle: install on every peer of a channel, then instantiate
// or upgrade through the ordering service. Versions are plain integers and
// always follow the live version of the channel.

use crate::{
    archive::ArchiveExtractor,
    channel::ChannelHandle,
    endorsement::{self, Acceptance, EndorsementSummary, PeerOutcome},
    error::{DeployError, InstallError, PeerFailure},
    ordering,
    transport::Transport,
    version::{following_version, VersionTracker},
};
use fabric_common::{
    chaincode::{ChaincodeDescriptor, ChaincodeId, ChaincodeVersion},
    config::{
        CHAINCODE_INIT_ARGS, CHAINCODE_INIT_FUNCTION, DEFAULT_CHAINCODE_BASE_DIR,
        DEFAULT_COMMIT_WAIT_TIME, DEFAULT_PROPOSAL_WAIT_TIME,
    },
    error::PolicyError,
    policy::EndorsementPolicy,
    proposal::{
        origin_transient_map, EndorsedTransaction, ProposalKind, ProposalRequest, TransactionId,
    },
};
use log::{debug, info, warn};
use std::{
    fmt::{self, Display, Formatter},
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    // Archives are extracted into <base_dir>/src
    pub base_dir: PathBuf,
    // Source location sent with install proposals, base_dir when unset
    pub source_dir: Option<PathBuf>,
    pub endorsement_policy_file: Option<PathBuf>,
    pub proposal_wait: Duration,
    pub commit_wait: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_CHAINCODE_BASE_DIR),
            source_dir: None,
            endorsement_policy_file: None,
            proposal_wait: DEFAULT_PROPOSAL_WAIT_TIME,
            commit_wait: DEFAULT_COMMIT_WAIT_TIME,
        }
    }
}

impl LifecycleSettings {
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("src")
    }

    pub fn source_location(&self) -> PathBuf {
        self.source_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    Instantiate,
    Upgrade,
}

impl DeployMode {
    pub fn kind(&self) -> ProposalKind {
        match self {
            Self::Instantiate => ProposalKind::Instantiate,
            Self::Upgrade => ProposalKind::Upgrade,
        }
    }
}

impl Display for DeployMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instantiate => f.write_str("instantiate"),
            Self::Upgrade => f.write_str("upgrade"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub chaincode: ChaincodeId,
    pub tx_id: TransactionId,
    pub extracted_entries: usize,
    pub policy: Option<EndorsementPolicy>,
    pub outcomes: Vec<PeerOutcome>,
}

impl InstallReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_ok())
            .map(|outcome| outcome.peer.as_str())
    }

    pub fn failures(&self) -> Vec<&PeerFailure> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
            .collect()
    }

    // Installed on every peer of the channel
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(PeerOutcome::is_ok)
    }
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub mode: DeployMode,
    pub chaincode: ChaincodeId,
    pub previous: Option<ChaincodeVersion>,
    pub tx_id: TransactionId,
    pub block_number: u64,
    pub endorsements: usize,
}

pub struct LifecycleOrchestrator {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn ArchiveExtractor>,
    tracker: VersionTracker,
    settings: LifecycleSettings,
}

impl LifecycleOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn ArchiveExtractor>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            tracker: VersionTracker::new(Arc::clone(&transport)),
            transport,
            extractor,
            settings,
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    // Stage the archive and install the chaincode on every peer of the channel.
    // Only fails when no peer at all accepted the install.
    pub async fn install(
        &self,
        channel: &ChannelHandle,
        descriptor: &ChaincodeDescriptor,
        archive: &Path,
    ) -> Result<InstallReport, InstallError> {
        let expected = self.tracker.next_version(channel).await?;
        let version = match descriptor.version {
            Some(requested) if requested != expected => {
                return Err(InstallError::VersionMismatch {
                    expected,
                    requested,
                })
            }
            _ => expected,
        };
        let chaincode = descriptor.to_id(version);

        let extracted_entries = self.stage(archive).await?;
        let policy = match descriptor.policy.clone() {
            Some(policy) => Some(policy),
            None => self
                .load_policy()
                .map_err(|(path, source)| InstallError::InvalidPolicy { path, source })?,
        };

        let request = ProposalRequest::new(
            ProposalKind::Install,
            channel.name(),
            chaincode.clone(),
            Arc::clone(channel.identity()),
        )
        .with_policy(policy.as_ref().map(EndorsementPolicy::to_bytes))
        .with_source_location(self.settings.source_location())
        .with_wait_time(self.settings.proposal_wait);
        let request = Arc::new(request);

        info!(
            "Installing chaincode {} on {} peers of channel '{}'",
            chaincode,
            channel.peers().len(),
            channel.name()
        );
        let outcomes = endorsement::send_proposal(
            &self.transport,
            &request,
            channel.peers(),
            Acceptance::Status,
        )
        .await;

        let report = InstallReport {
            chaincode,
            tx_id: request.tx_id.clone(),
            extracted_entries,
            policy,
            outcomes,
        };

        if report.succeeded().next().is_none() {
            return Err(InstallError::NoPeerSucceeded {
                tx_id: report.tx_id.clone(),
                failures: report.failures().into_iter().cloned().collect(),
            });
        }

        if report.is_complete() {
            info!("Chaincode {} installed on every peer", report.chaincode);
        } else {
            warn!(
                "Chaincode {} installed on {} of {} peers",
                report.chaincode,
                report.succeeded().count(),
                report.outcomes.len()
            );
        }

        Ok(report)
    }

    // Instantiate when nothing runs on the channel, upgrade otherwise
    pub async fn deploy(
        &self,
        channel: &ChannelHandle,
        descriptor: &ChaincodeDescriptor,
    ) -> Result<DeployReport, DeployError> {
        let current = self.tracker.current_descriptor(channel).await?;
        let mode = match current {
            Some(_) => DeployMode::Upgrade,
            None => DeployMode::Instantiate,
        };
        self.execute(channel, descriptor, mode, current).await
    }

    pub async fn instantiate(
        &self,
        channel: &ChannelHandle,
        descriptor: &ChaincodeDescriptor,
    ) -> Result<DeployReport, DeployError> {
        if let Some(current) = self.tracker.current_descriptor(channel).await? {
            return Err(DeployError::AlreadyInstantiated {
                channel: channel.name().to_owned(),
                name: current.name,
                version: current.version,
            });
        }

        self.execute(channel, descriptor, DeployMode::Instantiate, None)
            .await
    }

    pub async fn upgrade(
        &self,
        channel: &ChannelHandle,
        descriptor: &ChaincodeDescriptor,
    ) -> Result<DeployReport, DeployError> {
        let current = self
            .tracker
            .current_descriptor(channel)
            .await?
            .ok_or_else(|| DeployError::NotInstantiated(channel.name().to_owned()))?;

        self.execute(channel, descriptor, DeployMode::Upgrade, Some(current))
            .await
    }

    async fn execute(
        &self,
        channel: &ChannelHandle,
        descriptor: &ChaincodeDescriptor,
        mode: DeployMode,
        current: Option<ChaincodeId>,
    ) -> Result<DeployReport, DeployError> {
        if let Some(live) = current.as_ref() {
            if live.name != descriptor.name {
                return Err(DeployError::NameMismatch {
                    channel: channel.name().to_owned(),
                    live: live.name.clone(),
                    requested: descriptor.name.clone(),
                });
            }
        }

        let previous = current.map(|id| id.version);
        let expected = following_version(channel, previous)?;
        if let Some(requested) = descriptor.version {
            if requested != expected {
                return Err(DeployError::VersionMismatch {
                    expected,
                    requested,
                });
            }
        }
        let chaincode = descriptor.to_id(expected);

        let policy = match descriptor.policy.clone() {
            Some(policy) => Some(policy),
            None => self
                .load_policy()
                .map_err(|(path, source)| DeployError::InvalidPolicy { path, source })?,
        };

        let kind = mode.kind();
        let args = CHAINCODE_INIT_ARGS.iter().map(|arg| arg.to_string()).collect();
        let request = ProposalRequest::new(
            kind,
            channel.name(),
            chaincode.clone(),
            Arc::clone(channel.identity()),
        )
        .with_function(CHAINCODE_INIT_FUNCTION, args)
        .with_transient(origin_transient_map(kind))
        .with_policy(policy.as_ref().map(EndorsementPolicy::to_bytes))
        .with_wait_time(self.settings.proposal_wait);
        let request = Arc::new(request);
        let tx_id = request.tx_id.clone();

        info!(
            "Sending {} proposal for {} on channel '{}' (previous version: {})",
            mode,
            chaincode,
            channel.name(),
            previous.map_or_else(|| String::from("none"), |v| v.to_string())
        );
        let outcomes = endorsement::send_proposal(
            &self.transport,
            &request,
            channel.peers(),
            Acceptance::Endorsed,
        )
        .await;

        let summary = EndorsementSummary::from(outcomes);
        if !summary.is_unanimous() {
            return Err(DeployError::EndorsementFailed {
                tx_id,
                failed: summary.failures.len(),
                total: summary.total(),
                failures: summary.failures,
            });
        }

        let endorsements = summary.responses.len();
        debug!(
            "{} proposal {} endorsed by {} peers",
            mode, tx_id, endorsements
        );

        let transaction = EndorsedTransaction {
            proposal: request,
            endorsements: summary.responses,
        };
        let event = ordering::submit(
            self.transport.as_ref(),
            &transaction,
            channel.orderer(),
            self.settings.commit_wait,
        )
        .await?;

        info!(
            "Chaincode {} {}d on channel '{}'",
            chaincode,
            mode,
            channel.name()
        );
        Ok(DeployReport {
            mode,
            chaincode,
            previous,
            tx_id,
            block_number: event.block_number,
            endorsements,
        })
    }

    async fn stage(&self, archive: &Path) -> Result<usize, InstallError> {
        let staging = self.settings.staging_dir();
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|source| InstallError::Staging {
                path: staging.clone(),
                source,
            })?;

        let extractor = Arc::clone(&self.extractor);
        let archive = archive.to_path_buf();
        let destination = staging.clone();
        let entries = tokio::task::spawn_blocking(move || extractor.extract(&archive, &destination))
            .await
            .map_err(|e| InstallError::Staging {
                path: staging.clone(),
                source: io::Error::other(e.to_string()),
            })??;

        debug!("Staged {} entries into {}", entries, staging.display());
        Ok(entries)
    }

    // Missing file: deploy with the network default policy
    fn load_policy(&self) -> Result<Option<EndorsementPolicy>, (PathBuf, PolicyError)> {
        let Some(path) = self.settings.endorsement_policy_file.as_ref() else {
            debug!("No endorsement policy configured, using the network default");
            return Ok(None);
        };

        if !path.exists() {
            warn!(
                "Endorsement policy file {} not found, using the network default",
                path.display()
            );
            return Ok(None);
        }

        EndorsementPolicy::from_yaml_file(path)
            .map(Some)
            .map_err(|e| (path.clone(), e))
    }
}
