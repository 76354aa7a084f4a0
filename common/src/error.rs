use std::{io, path::PathBuf};
use thiserror::Error;

// Errors raised while loading or validating the network topology
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error while reading {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid JSON in {}: {}", path.display(), source)]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid YAML in {}: {}", path.display(), source)]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Unsupported config file extension for {}", _0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Organization '{}' was not found in topology", _0)]
    UnknownOrganization(String),
    #[error("Channel '{}' was not found in topology", _0)]
    UnknownChannel(String),
    #[error("Orderer '{}' was not found in topology", _0)]
    UnknownOrderer(String),
    #[error("Peer name '{}' is declared more than once", _0)]
    DuplicatePeer(String),
    #[error("Organization '{}' has no peers", _0)]
    NoPeers(String),
    #[error("Topology has no orderer")]
    NoOrderer,
    #[error("Invalid endpoint '{}' for {}", url, name)]
    InvalidEndpoint { name: String, url: String },
}

// Errors raised while parsing an endorsement policy document
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Error while reading policy file {}: {}", path.display(), source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("Policy rule must be a mapping with exactly one key")]
    MalformedRule,
    #[error("Unknown policy rule '{}'", _0)]
    UnknownRule(String),
    #[error("Policy references unknown identity '{}'", _0)]
    UnknownIdentity(String),
    #[error("Rule '{}-of' requires at least {} sub rules, got {}", n, n, got)]
    NotEnoughRules { n: usize, got: usize },
    #[error("Policy has no identities")]
    NoIdentities,
}
