// Network topology: organizations, peers, orderers and channels as declared
// in the configuration file. Pure data, loaded once before any operation runs.

use crate::{config::DEFAULT_AFFILIATION, error::ConfigError, utils::parse_endpoint};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConfig {
    pub url: String,
}

// Key and certificate files of an already enrolled user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub keystore_file: PathBuf,
    pub cert_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,
    // Event hub endpoint used to receive block and commit events
    #[serde(default)]
    pub event_hub_url: Option<String>,
}

impl PeerConfig {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, url: U) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            tls_cert_file: None,
            event_hub_url: None,
        }
    }
}

impl Display for PeerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrdererConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,
}

impl OrdererConfig {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, url: U) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            tls_cert_file: None,
        }
    }
}

impl Display for OrdererConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

fn default_affiliation() -> String {
    DEFAULT_AFFILIATION.to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub msp_id: String,
    pub admin: UserConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    pub peers: Vec<PeerConfig>,
    pub ca: CaConfig,
    // Affiliation new identities are registered under
    #[serde(default = "default_affiliation")]
    pub affiliation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    // Keys of the organizations whose peers are members of the channel
    pub organizations: Vec<String>,
    // Orderer name, the first declared orderer is used when not set
    #[serde(default)]
    pub orderer: Option<String>,
    // Channel configuration transaction, only needed to create the channel
    #[serde(default)]
    pub genesis_block_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub orgs: IndexMap<String, Organization>,
    pub orderers: Vec<OrdererConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl NetworkTopology {
    // Load the topology from a JSON or YAML file, chosen by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let topology: Self = match extension.as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        topology.validate()?;
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "Loaded topology from {}: {} organizations, {} orderers, {} channels",
                path.display(),
                topology.orgs.len(),
                topology.orderers.len(),
                topology.channels.len()
            );
        }

        Ok(topology)
    }

    // Check the cross references of the topology
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orderers.is_empty() {
            return Err(ConfigError::NoOrderer);
        }

        let mut peer_names = HashSet::new();
        for (key, org) in &self.orgs {
            if org.peers.is_empty() {
                return Err(ConfigError::NoPeers(key.clone()));
            }

            for peer in &org.peers {
                if !peer_names.insert(peer.name.as_str()) {
                    return Err(ConfigError::DuplicatePeer(peer.name.clone()));
                }
                check_endpoint(&peer.name, &peer.url)?;
                if let Some(url) = peer.event_hub_url.as_ref() {
                    check_endpoint(&peer.name, url)?;
                }
            }
        }

        for orderer in &self.orderers {
            check_endpoint(&orderer.name, &orderer.url)?;
        }

        for channel in &self.channels {
            for org in &channel.organizations {
                if !self.orgs.contains_key(org) {
                    return Err(ConfigError::UnknownOrganization(org.clone()));
                }
            }

            if let Some(orderer) = channel.orderer.as_ref() {
                self.orderer(orderer)?;
            }
        }

        Ok(())
    }

    pub fn organization(&self, key: &str) -> Result<&Organization, ConfigError> {
        self.orgs
            .get(key)
            .ok_or_else(|| ConfigError::UnknownOrganization(key.to_owned()))
    }

    pub fn orderer(&self, name: &str) -> Result<&OrdererConfig, ConfigError> {
        self.orderers
            .iter()
            .find(|orderer| orderer.name == name)
            .ok_or_else(|| ConfigError::UnknownOrderer(name.to_owned()))
    }

    pub fn channel(&self, name: &str) -> Result<&ChannelConfig, ConfigError> {
        self.channels
            .iter()
            .find(|channel| channel.name == name)
            .ok_or_else(|| ConfigError::UnknownChannel(name.to_owned()))
    }

    // All peers of the organizations joined to the channel, in declaration order
    pub fn channel_members(&self, name: &str) -> Result<Vec<PeerConfig>, ConfigError> {
        let channel = self.channel(name)?;
        let mut members = Vec::new();
        for key in &channel.organizations {
            members.extend(self.organization(key)?.peers.iter().cloned());
        }

        Ok(members)
    }

    pub fn channel_orderer(&self, name: &str) -> Result<&OrdererConfig, ConfigError> {
        let channel = self.channel(name)?;
        match channel.orderer.as_ref() {
            Some(orderer) => self.orderer(orderer),
            None => self.orderers.first().ok_or(ConfigError::NoOrderer),
        }
    }

    // Read the genesis configuration of a channel, if one is configured
    pub fn genesis_block(&self, name: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        let channel = self.channel(name)?;
        let Some(path) = channel.genesis_block_file.as_ref() else {
            return Ok(None);
        };

        fs::read(path)
            .map(Some)
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })
    }

    // Key of the first organization of the channel, the acting organization
    pub fn channel_owner_key(&self, name: &str) -> Result<&str, ConfigError> {
        let channel = self.channel(name)?;
        channel
            .organizations
            .first()
            .map(String::as_str)
            .ok_or_else(|| ConfigError::NoPeers(name.to_owned()))
    }

    pub fn channel_owner(&self, name: &str) -> Result<&Organization, ConfigError> {
        let key = self.channel_owner_key(name)?;
        self.organization(key)
    }
}

fn check_endpoint(name: &str, url: &str) -> Result<(), ConfigError> {
    parse_endpoint(url)
        .map(|_| ())
        .ok_or_else(|| ConfigError::InvalidEndpoint {
            name: name.to_owned(),
            url: url.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOPOLOGY_YAML: &str = r#"
orgs:
  clinic:
    name: Clinic
    msp_id: ClinicMSP
    admin:
      name: peerAdmin
      keystore_file: crypto/clinic/admin.key
      cert_file: crypto/clinic/admin.pem
    peers:
      - name: peer0.clinic
        url: grpc://localhost:7051
        event_hub_url: grpc://localhost:7053
      - name: peer1.clinic
        url: grpc://localhost:8051
    ca:
      url: http://localhost:7054
  insurer:
    name: Insurer
    msp_id: InsurerMSP
    admin:
      name: peerAdmin
      keystore_file: crypto/insurer/admin.key
      cert_file: crypto/insurer/admin.pem
    peers:
      - name: peer0.insurer
        url: grpcs://localhost:9051
    ca:
      url: http://localhost:8054
orderers:
  - name: orderer.example.com
    url: grpc://localhost:7050
channels:
  - name: health
    organizations: [clinic, insurer]
"#;

    fn write_topology(extension: &str, content: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn test_load_yaml_topology() {
        let path = write_topology(".yaml", TOPOLOGY_YAML);
        let topology = NetworkTopology::from_file(&path).unwrap();

        assert_eq!(topology.orgs.len(), 2);
        assert_eq!(topology.organization("clinic").unwrap().msp_id, "ClinicMSP");
        assert_eq!(
            topology.organization("clinic").unwrap().affiliation,
            DEFAULT_AFFILIATION
        );

        let members = topology.channel_members("health").unwrap();
        let names: Vec<_> = members.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["peer0.clinic", "peer1.clinic", "peer0.insurer"]);
        assert_eq!(
            topology.channel_orderer("health").unwrap().name,
            "orderer.example.com"
        );
        assert_eq!(topology.channel_owner("health").unwrap().name, "Clinic");
        assert!(topology.genesis_block("health").unwrap().is_none());
    }

    #[test]
    fn test_json_and_yaml_are_equivalent() {
        let yaml: NetworkTopology = serde_yaml::from_str(TOPOLOGY_YAML).unwrap();
        let json = serde_json::to_string(&yaml).unwrap();
        let path = write_topology(".json", &json);
        let topology = NetworkTopology::from_file(&path).unwrap();
        assert_eq!(
            topology.channel_members("health").unwrap(),
            yaml.channel_members("health").unwrap()
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let path = write_topology(".toml", TOPOLOGY_YAML);
        assert!(matches!(
            NetworkTopology::from_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_duplicate_peer_rejected() {
        let mut topology: NetworkTopology = serde_yaml::from_str(TOPOLOGY_YAML).unwrap();
        let duplicate = topology.orgs["clinic"].peers[0].clone();
        topology.orgs["insurer"].peers.push(duplicate);
        assert!(matches!(
            topology.validate(),
            Err(ConfigError::DuplicatePeer(name)) if name == "peer0.clinic"
        ));
    }

    #[test]
    fn test_unknown_channel_org_rejected() {
        let mut topology: NetworkTopology = serde_yaml::from_str(TOPOLOGY_YAML).unwrap();
        topology.channels[0].organizations.push("provider".into());
        assert!(matches!(
            topology.validate(),
            Err(ConfigError::UnknownOrganization(org)) if org == "provider"
        ));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut topology: NetworkTopology = serde_yaml::from_str(TOPOLOGY_YAML).unwrap();
        topology.orderers[0].url = "localhost".into();
        assert!(matches!(
            topology.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_missing_orderer_rejected() {
        let mut topology: NetworkTopology = serde_yaml::from_str(TOPOLOGY_YAML).unwrap();
        topology.orderers.clear();
        assert!(matches!(topology.validate(), Err(ConfigError::NoOrderer)));
    }
}
