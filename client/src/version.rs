use crate::{channel::ChannelHandle, error::VersionQueryError, transport::Transport};
use fabric_common::chaincode::{ChaincodeId, ChaincodeInfo, ChaincodeVersion};
use log::{debug, trace};
use std::sync::Arc;

// Reads the live chaincode of a channel from its reference peer.
// Nothing is cached: every call asks the network again.
#[derive(Clone)]
pub struct VersionTracker {
    transport: Arc<dyn Transport>,
}

impl VersionTracker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn instantiated_chaincodes(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Vec<ChaincodeInfo>, VersionQueryError> {
        let peer = channel
            .reference_peer()
            .ok_or_else(|| VersionQueryError::NoPeers(channel.name().to_owned()))?;

        self.transport
            .query_instantiated_chaincodes(channel.name(), peer, channel.identity())
            .await
            .map_err(|source| VersionQueryError::Transport {
                channel: channel.name().to_owned(),
                peer: peer.name.clone(),
                source,
            })
    }

    // Chaincode with the highest version, None when nothing is instantiated
    pub async fn current_descriptor(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Option<ChaincodeId>, VersionQueryError> {
        let chaincodes = self.instantiated_chaincodes(channel).await?;
        let peer = channel
            .reference_peer()
            .map(|peer| peer.name.as_str())
            .unwrap_or_default();

        let current = select_current(channel.name(), peer, &chaincodes)?;
        if log::log_enabled!(log::Level::Debug) {
            match &current {
                Some(id) => debug!("Channel '{}' runs chaincode {}", channel.name(), id),
                None => debug!("Channel '{}' has no instantiated chaincode", channel.name()),
            }
        }

        Ok(current)
    }

    pub async fn current_version(
        &self,
        channel: &ChannelHandle,
    ) -> Result<Option<ChaincodeVersion>, VersionQueryError> {
        Ok(self
            .current_descriptor(channel)
            .await?
            .map(|id| id.version))
    }

    // Version the next install or deploy must use
    pub async fn next_version(
        &self,
        channel: &ChannelHandle,
    ) -> Result<ChaincodeVersion, VersionQueryError> {
        let current = self.current_version(channel).await?;
        following_version(channel, current)
    }
}

// Version following the live one of the channel
pub fn following_version(
    channel: &ChannelHandle,
    current: Option<ChaincodeVersion>,
) -> Result<ChaincodeVersion, VersionQueryError> {
    match current {
        None => Ok(ChaincodeVersion::BASELINE),
        Some(version) => version
            .next()
            .ok_or_else(|| VersionQueryError::VersionExhausted {
                channel: channel.name().to_owned(),
                peer: channel
                    .reference_peer()
                    .map(|peer| peer.name.clone())
                    .unwrap_or_default(),
                version,
            }),
    }
}

// Every reported version must be numeric, a single bad entry fails the lookup
pub fn select_current(
    channel: &str,
    peer: &str,
    chaincodes: &[ChaincodeInfo],
) -> Result<Option<ChaincodeId>, VersionQueryError> {
    let mut current: Option<ChaincodeId> = None;
    for info in chaincodes {
        let version = info
            .parse_version()
            .map_err(|_| VersionQueryError::NonNumericVersion {
                channel: channel.to_owned(),
                peer: peer.to_owned(),
                name: info.name.clone(),
                version: info.version.clone(),
            })?;
        trace!("{} reports {} version {}", peer, info.name, version);

        if current.as_ref().map_or(true, |id| version > id.version) {
            current = Some(info.to_id(version));
        }
    }

    Ok(current)
}
