// Entry point tying the topology to the orchestration components

use crate::{
    archive::{ArchiveExtractor, DefaultExtractor},
    ca::CertificateAuthority,
    channel::{ChannelHandle, ChannelManager},
    error::GatewayError,
    identity::load_identity,
    lifecycle::{LifecycleOrchestrator, LifecycleSettings},
    membership::{IdentityStore, MembershipClient},
    simulator::SimulatedNetwork,
    transaction::{TransactionOrchestrator, TransactionSettings},
    transport::{CryptoSuite, Transport},
    version::VersionTracker,
};
use fabric_common::{identity::Identity, topology::NetworkTopology};
use log::{info, warn};
use std::{path::PathBuf, sync::Arc};

// External services the client talks to
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub crypto: Arc<dyn CryptoSuite>,
    pub ca: Arc<dyn CertificateAuthority>,
    pub extractor: Arc<dyn ArchiveExtractor>,
}

impl Collaborators {
    pub fn simulated(network: &SimulatedNetwork) -> Self {
        Self {
            transport: Arc::new(network.clone()),
            crypto: Arc::new(network.clone()),
            ca: Arc::new(network.clone()),
            extractor: Arc::new(DefaultExtractor),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub lifecycle: LifecycleSettings,
    pub transactions: TransactionSettings,
    // Directory of enrolled identities, kept in memory when unset
    pub identity_store: Option<PathBuf>,
}

pub struct Gateway {
    topology: NetworkTopology,
    ca: Arc<dyn CertificateAuthority>,
    store: Arc<IdentityStore>,
    channels: ChannelManager,
    tracker: VersionTracker,
    lifecycle: LifecycleOrchestrator,
    transactions: TransactionOrchestrator,
}

impl Gateway {
    pub fn new(
        topology: NetworkTopology,
        collaborators: Collaborators,
        settings: GatewaySettings,
    ) -> Result<Self, GatewayError> {
        topology.validate()?;

        let store = match settings.identity_store.as_ref() {
            Some(directory) => IdentityStore::open(directory)?,
            None => IdentityStore::in_memory(),
        };

        let Collaborators {
            transport,
            crypto,
            ca,
            extractor,
        } = collaborators;

        Ok(Self {
            channels: ChannelManager::new(Arc::clone(&transport), crypto)
                .with_join_wait(settings.transactions.proposal_wait),
            tracker: VersionTracker::new(Arc::clone(&transport)),
            lifecycle: LifecycleOrchestrator::new(
                Arc::clone(&transport),
                extractor,
                settings.lifecycle,
            ),
            transactions: TransactionOrchestrator::new(transport, settings.transactions),
            store: Arc::new(store),
            topology,
            ca,
        })
    }

    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub fn version_tracker(&self) -> &VersionTracker {
        &self.tracker
    }

    pub fn lifecycle(&self) -> &LifecycleOrchestrator {
        &self.lifecycle
    }

    pub fn transactions(&self) -> &TransactionOrchestrator {
        &self.transactions
    }

    pub fn identity_store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    // Connect to, or create, a channel declared in the topology
    pub async fn open_channel(
        &self,
        name: &str,
        identity: Arc<Identity>,
    ) -> Result<Arc<ChannelHandle>, GatewayError> {
        if let Some(handle) = self.channels.get(name) {
            return Ok(handle);
        }

        let members = self.topology.channel_members(name)?;
        let orderer = self.topology.channel_orderer(name)?;
        // Only needed on the create path, which reports its absence
        let genesis = match self.topology.genesis_block(name) {
            Ok(genesis) => genesis,
            Err(e) => {
                warn!("Genesis configuration of channel '{}' unavailable: {}", name, e);
                None
            }
        };

        let handle = self
            .channels
            .ensure_channel(name, &members, orderer, identity, genesis.as_deref())
            .await?;
        Ok(handle)
    }

    // Admin identity of an organization from its configured key files
    pub fn load_admin(&self, org: &str) -> Result<Arc<Identity>, GatewayError> {
        let organization = self.topology.organization(org)?;
        let identity = load_identity(&organization.admin, organization)?;
        Ok(Arc::new(identity))
    }

    // Enroll the bootstrap identity of an organization against its CA
    pub async fn enroll_admin(
        &self,
        org: &str,
        name: &str,
        secret: &str,
    ) -> Result<Arc<Identity>, GatewayError> {
        let organization = self.topology.organization(org)?;
        let identity = MembershipClient::enroll_admin(
            self.ca.as_ref(),
            &self.store,
            name,
            secret,
            organization.affiliation.clone(),
            organization.msp_id.clone(),
        )
        .await?;
        info!("{} ready for organization {}", identity, organization.name);
        Ok(identity)
    }

    // Registration client acting for an organization through its registrar
    pub fn membership(
        &self,
        org: &str,
        registrar: Arc<Identity>,
    ) -> Result<MembershipClient, GatewayError> {
        let organization = self.topology.organization(org)?;
        Ok(MembershipClient::new(
            Arc::clone(&self.ca),
            Arc::clone(&self.store),
            registrar,
            organization.affiliation.clone(),
            organization.msp_id.clone(),
        ))
    }
}
