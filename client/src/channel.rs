// Channel handles and the manager that connects to, or creates, channels

use crate::{
    endorsement::for_each_peer,
    error::{ChannelError, FailureReason, PeerFailure},
    transport::{CryptoSuite, Transport},
};
use dashmap::{mapref::entry::Entry, DashMap};
use fabric_common::{
    config::DEFAULT_PROPOSAL_WAIT_TIME,
    identity::Identity,
    topology::{OrdererConfig, PeerConfig},
    utils::parse_endpoint,
};
use log::{debug, info, warn};
use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    // The channel already existed on the network
    Connected,
    // The channel was created by this client
    Created,
}

impl Display for ChannelMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Created => f.write_str("created"),
        }
    }
}

// Initialized channel, shared by every operation targeting it
#[derive(Debug)]
pub struct ChannelHandle {
    name: String,
    peers: Vec<PeerConfig>,
    orderer: OrdererConfig,
    event_hubs: Vec<String>,
    identity: Arc<Identity>,
    mode: ChannelMode,
    failed_joins: Vec<PeerFailure>,
}

impl ChannelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    // Peers in declaration order, the first one is the reference peer
    pub fn peers(&self) -> &[PeerConfig] {
        &self.peers
    }

    pub fn reference_peer(&self) -> Option<&PeerConfig> {
        self.peers.first()
    }

    pub fn orderer(&self) -> &OrdererConfig {
        &self.orderer
    }

    pub fn event_hubs(&self) -> &[String] {
        &self.event_hubs
    }

    // Identity the channel was opened with
    pub fn identity(&self) -> &Arc<Identity> {
        &self.identity
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    // Peers that could not join a freshly created channel
    pub fn failed_joins(&self) -> &[PeerFailure] {
        &self.failed_joins
    }
}

// Builds a handle while checking peers one at a time
pub struct ChannelHandleBuilder {
    name: String,
    orderer: OrdererConfig,
    identity: Arc<Identity>,
    peers: Vec<PeerConfig>,
    names: HashSet<String>,
    event_hubs: Vec<String>,
}

impl ChannelHandleBuilder {
    pub fn new<N: Into<String>>(name: N, orderer: OrdererConfig, identity: Arc<Identity>) -> Self {
        Self {
            name: name.into(),
            orderer,
            identity,
            peers: Vec::new(),
            names: HashSet::new(),
            event_hubs: Vec::new(),
        }
    }

    pub fn add_peer(&mut self, peer: PeerConfig) -> Result<(), String> {
        if !self.names.insert(peer.name.clone()) {
            return Err(format!("peer {} is listed twice", peer.name));
        }

        if parse_endpoint(&peer.url).is_none() {
            return Err(format!("invalid peer url '{}'", peer.url));
        }

        if let Some(url) = &peer.event_hub_url {
            if parse_endpoint(url).is_none() {
                return Err(format!("invalid event hub url '{}'", url));
            }
            self.event_hubs.push(url.clone());
        }

        self.peers.push(peer);
        Ok(())
    }

    pub fn build(self, mode: ChannelMode, failed_joins: Vec<PeerFailure>) -> ChannelHandle {
        ChannelHandle {
            name: self.name,
            peers: self.peers,
            orderer: self.orderer,
            event_hubs: self.event_hubs,
            identity: self.identity,
            mode,
            failed_joins,
        }
    }
}

// Channels initialized by this process, keyed by name
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<ChannelHandle>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ChannelHandle>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    // A name is registered at most once
    pub fn register(&self, handle: ChannelHandle) -> Result<Arc<ChannelHandle>, ChannelError> {
        match self.channels.entry(handle.name.clone()) {
            Entry::Occupied(_) => Err(ChannelError::AlreadyRegistered(handle.name)),
            Entry::Vacant(entry) => {
                let handle = Arc::new(handle);
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    // Lock serializing the initialization of a single channel name
    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    crypto: Arc<dyn CryptoSuite>,
    registry: ChannelRegistry,
    join_wait: Duration,
}

impl ChannelManager {
    pub fn new(transport: Arc<dyn Transport>, crypto: Arc<dyn CryptoSuite>) -> Self {
        Self {
            transport,
            crypto,
            registry: ChannelRegistry::new(),
            join_wait: DEFAULT_PROPOSAL_WAIT_TIME,
        }
    }

    pub fn with_join_wait(mut self, join_wait: Duration) -> Self {
        self.join_wait = join_wait;
        self
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<ChannelHandle>> {
        self.registry.get(name)
    }

    // Return the initialized channel, connecting to it when the reference peer
    // already joined it, creating it from the genesis configuration otherwise.
    // Concurrent calls for the same name share a single initialization.
    pub async fn ensure_channel(
        &self,
        name: &str,
        members: &[PeerConfig],
        orderer: &OrdererConfig,
        identity: Arc<Identity>,
        genesis: Option<&[u8]>,
    ) -> Result<Arc<ChannelHandle>, ChannelError> {
        if let Some(handle) = self.registry.get(name) {
            return Ok(handle);
        }

        let lock = self.registry.lock_for(name);
        let _guard = lock.lock().await;
        if let Some(handle) = self.registry.get(name) {
            debug!("Channel '{}' was initialized while waiting", name);
            return Ok(handle);
        }

        let reference = members
            .first()
            .ok_or_else(|| ChannelError::NoMembers(name.to_owned()))?;

        let channels = self
            .transport
            .query_channels(reference, &identity)
            .await
            .map_err(|e| ChannelError::Connect {
                channel: name.to_owned(),
                peer: Some(reference.name.clone()),
                reason: e.to_string(),
            })?;

        let handle = if channels.iter().any(|channel| channel == name) {
            info!("Channel '{}' found on peer {}, connecting", name, reference.name);
            self.connect(name, members, orderer, identity).await?
        } else {
            info!("Channel '{}' not found on peer {}, creating it", name, reference.name);
            self.create(name, members, orderer, identity, genesis).await?
        };

        self.registry.register(handle)
    }

    async fn connect(
        &self,
        name: &str,
        members: &[PeerConfig],
        orderer: &OrdererConfig,
        identity: Arc<Identity>,
    ) -> Result<ChannelHandle, ChannelError> {
        let mut builder = ChannelHandleBuilder::new(name, orderer.clone(), identity);
        for peer in members {
            let peer_name = peer.name.clone();
            builder
                .add_peer(peer.clone())
                .map_err(|reason| ChannelError::Connect {
                    channel: name.to_owned(),
                    peer: Some(peer_name),
                    reason,
                })?;
        }

        let handle = builder.build(ChannelMode::Connected, Vec::new());
        self.initialize(handle).await
    }

    async fn create(
        &self,
        name: &str,
        members: &[PeerConfig],
        orderer: &OrdererConfig,
        identity: Arc<Identity>,
        genesis: Option<&[u8]>,
    ) -> Result<ChannelHandle, ChannelError> {
        let create_err = |reason: String| ChannelError::Create {
            channel: name.to_owned(),
            orderer: orderer.name.clone(),
            reason,
        };

        let genesis = genesis.ok_or_else(|| create_err(String::from("no genesis configuration")))?;
        let signature = self
            .crypto
            .sign_channel_config(genesis, &identity)
            .await
            .map_err(|e| create_err(e.to_string()))?;

        self.transport
            .create_channel(name, orderer, genesis, &signature, &identity)
            .await
            .map_err(|e| create_err(e.to_string()))?;
        info!("Channel '{}' created on orderer {}", name, orderer.name);

        let results = for_each_peer(members, self.join_wait, |peer| {
            let transport = Arc::clone(&self.transport);
            let identity = Arc::clone(&identity);
            let channel = name.to_owned();
            async move { transport.join_peer(&channel, &peer, &identity).await }
        })
        .await;

        let mut builder = ChannelHandleBuilder::new(name, orderer.clone(), Arc::clone(&identity));
        let mut failures = Vec::new();
        for (peer, result) in results {
            let peer_name = peer.name.clone();
            let reason = match result {
                Ok(()) => match builder.add_peer(peer) {
                    Ok(()) => {
                        info!("Peer {} joined channel '{}'", peer_name, name);
                        continue;
                    }
                    Err(reason) => FailureReason::Transport(reason),
                },
                Err(reason) => reason,
            };

            let failure = PeerFailure {
                peer: peer_name,
                tx_id: None,
                reason,
            };
            warn!("Peer could not join channel '{}': {}", name, failure);
            failures.push(failure);
        }

        if failures.len() == members.len() {
            return Err(ChannelError::NoPeerJoined {
                channel: name.to_owned(),
                failures,
            });
        }

        let handle = builder.build(ChannelMode::Created, failures);
        self.initialize(handle).await
    }

    async fn initialize(&self, handle: ChannelHandle) -> Result<ChannelHandle, ChannelError> {
        self.transport
            .initialize_channel(&handle)
            .await
            .map_err(|e| ChannelError::Connect {
                channel: handle.name.clone(),
                peer: None,
                reason: e.to_string(),
            })?;

        debug!(
            "Channel '{}' initialized ({}) with {} peers and {} event hubs",
            handle.name,
            handle.mode,
            handle.peers.len(),
            handle.event_hubs.len()
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_common::identity::Enrollment;

    fn identity() -> Arc<Identity> {
        Arc::new(Identity::new(
            "peerAdmin",
            "org1.department1",
            "ClinicMSP",
            Enrollment {
                private_key_pem: "key".into(),
                certificate_pem: "cert".into(),
            },
        ))
    }

    fn builder() -> ChannelHandleBuilder {
        ChannelHandleBuilder::new(
            "health",
            OrdererConfig::new("orderer.example.com", "grpc://localhost:7050"),
            identity(),
        )
    }

    #[test]
    fn test_builder_rejects_duplicate_peer() {
        let mut builder = builder();
        builder
            .add_peer(PeerConfig::new("peer0", "grpc://localhost:7051"))
            .unwrap();
        let err = builder
            .add_peer(PeerConfig::new("peer0", "grpc://localhost:8051"))
            .unwrap_err();
        assert!(err.contains("twice"));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let mut builder = builder();
        assert!(builder
            .add_peer(PeerConfig::new("peer0", "localhost:7051"))
            .is_err());

        let mut peer = PeerConfig::new("peer1", "grpc://localhost:7051");
        peer.event_hub_url = Some("not an url".into());
        assert!(builder.add_peer(peer).is_err());
    }

    #[test]
    fn test_builder_collects_event_hubs() {
        let mut builder = builder();
        let mut peer = PeerConfig::new("peer0", "grpc://localhost:7051");
        peer.event_hub_url = Some("grpc://localhost:7053".into());
        builder.add_peer(peer).unwrap();
        builder
            .add_peer(PeerConfig::new("peer1", "grpc://localhost:8051"))
            .unwrap();

        let handle = builder.build(ChannelMode::Connected, Vec::new());
        assert_eq!(handle.event_hubs(), ["grpc://localhost:7053"]);
        assert_eq!(handle.reference_peer().unwrap().name, "peer0");
        assert_eq!(handle.peers().len(), 2);
    }

    #[test]
    fn test_registry_registers_once() {
        let registry = ChannelRegistry::new();
        registry
            .register(builder().build(ChannelMode::Created, Vec::new()))
            .unwrap();
        assert!(registry.contains("health"));
        assert!(matches!(
            registry.register(builder().build(ChannelMode::Connected, Vec::new())),
            Err(ChannelError::AlreadyRegistered(name)) if name == "health"
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("health").unwrap().mode(), ChannelMode::Created);
    }
}
