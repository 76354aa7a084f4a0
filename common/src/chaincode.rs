use crate::{config::BASELINE_CHAINCODE_VERSION, policy::EndorsementPolicy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt::{self, Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Chaincode version '{}' is not a non-negative integer: {}", version, source)]
pub struct VersionParseError {
    pub version: String,
    #[source]
    pub source: ParseIntError,
}

// Chaincode version, strictly increasing per channel.
// The network reports it as a string, we only accept integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChaincodeVersion(u64);

impl ChaincodeVersion {
    pub const BASELINE: Self = Self(BASELINE_CHAINCODE_VERSION);

    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    // Version following this one, None once u64::MAX is live
    pub const fn next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(version) => Some(Self(version)),
            None => None,
        }
    }
}

impl FromStr for ChaincodeVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|source| VersionParseError {
                version: s.to_owned(),
                source,
            })
    }
}

impl Display for ChaincodeVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ChaincodeVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'a> Deserialize<'a> for ChaincodeVersion {
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        // Accept both 3 and "3"
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => Self::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

// Chaincode name, path and version as sent in proposals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChaincodeId {
    pub name: String,
    pub path: String,
    pub version: ChaincodeVersion,
}

impl Display for ChaincodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.name, self.version, self.path)
    }
}

// Chaincode as requested by the caller of a lifecycle operation.
// When no version is given, the next version of the channel is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaincodeDescriptor {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub version: Option<ChaincodeVersion>,
    #[serde(skip)]
    pub policy: Option<EndorsementPolicy>,
}

impl ChaincodeDescriptor {
    pub fn new<N: Into<String>, P: Into<String>>(name: N, path: P) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: None,
            policy: None,
        }
    }

    pub fn with_version(mut self, version: ChaincodeVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_policy(mut self, policy: EndorsementPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn to_id(&self, version: ChaincodeVersion) -> ChaincodeId {
        ChaincodeId {
            name: self.name.clone(),
            path: self.path.clone(),
            version,
        }
    }
}

// Chaincode entry as reported by a peer for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeInfo {
    pub name: String,
    pub path: String,
    pub version: String,
}

impl ChaincodeInfo {
    pub fn parse_version(&self) -> Result<ChaincodeVersion, VersionParseError> {
        self.version.parse()
    }

    // Only valid once the version went through parse_version
    pub fn to_id(&self, version: ChaincodeVersion) -> ChaincodeId {
        ChaincodeId {
            name: self.name.clone(),
            path: self.path.clone(),
            version,
        }
    }
}
