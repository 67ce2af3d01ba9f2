//! Client configuration: channel membership, timeouts and endorsement policy.

use std::{path::Path, sync::Arc, time::Duration};

use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tx_data::{ChannelID, EndorsementPolicy, PeerID, PolicyKind};

pub type PolicyConfig = PolicyKind;

#[derive(Debug, Error)]
pub enum ConfigErr {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("channel id is empty")]
    EmptyChannel,

    #[error("channel {0} has no peers")]
    NoPeers(ChannelID),

    #[error("channel {0} has no event source peer")]
    NoEventSource(ChannelID),

    #[error("peer {0} configured twice")]
    DuplicatePeer(PeerID),

    #[error("timeout {0} must be positive")]
    ZeroTimeout(&'static str),

    #[error("policy {0:?} can't be met by {1} peers")]
    UnsatisfiablePolicy(PolicyKind, usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub channel: ChannelConfig,
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: ChannelID,
    pub peers: Vec<PeerInfo>,
    pub orderer: OrdererInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: PeerID,
    pub addr: String,
    // Peers of the client's own org deliver commit events.
    #[serde(default = "default_event_source")]
    pub event_source: bool,
}

fn default_event_source() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdererInfo {
    pub addr: String,
}

/// All in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub proposal_ms: u64,
    pub broadcast_ms: u64,
    pub commit_ms: u64,
}

impl TimeoutConfig {
    #[inline]
    pub fn proposal(&self) -> Duration {
        Duration::from_millis(self.proposal_ms)
    }

    #[inline]
    pub fn broadcast(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }

    #[inline]
    pub fn commit(&self) -> Duration {
        Duration::from_millis(self.commit_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            proposal_ms: 10_000,
            broadcast_ms: 10_000,
            commit_ms: 30_000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            channel: ChannelConfig {
                channel_id: format!("samchannel"),
                peers: vec![
                    PeerInfo {
                        peer_id: format!("peer0.org1"),
                        addr: format!("grpcs://localhost:7051"),
                        event_source: true,
                    },
                    PeerInfo {
                        peer_id: format!("peer1.org1"),
                        addr: format!("grpcs://localhost:7056"),
                        event_source: true,
                    },
                ],
                orderer: OrdererInfo {
                    addr: format!("grpcs://localhost:7050"),
                },
            },
            timeouts: TimeoutConfig::default(),
            policy: PolicyConfig::AllGood,
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigErr> {
        let reader = std::fs::File::open(path)?;
        let conf: ClientConfig = serde_yaml::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigErr> {
        let conf: ClientConfig = serde_yaml::from_str(s)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        let ch = &self.channel;
        if ch.channel_id.is_empty() {
            return Err(ConfigErr::EmptyChannel);
        }
        if ch.peers.is_empty() {
            return Err(ConfigErr::NoPeers(ch.channel_id.clone()));
        }
        let mut seen = FnvHashSet::default();
        if let Some(dup) = ch.peers.iter().find(|p| !seen.insert(&p.peer_id)) {
            return Err(ConfigErr::DuplicatePeer(dup.peer_id.clone()));
        }
        if !ch.peers.iter().any(|p| p.event_source) {
            return Err(ConfigErr::NoEventSource(ch.channel_id.clone()));
        }

        let t = &self.timeouts;
        for (name, ms) in [
            ("proposal_ms", t.proposal_ms),
            ("broadcast_ms", t.broadcast_ms),
            ("commit_ms", t.commit_ms),
        ]
        .iter()
        {
            if *ms == 0 {
                return Err(ConfigErr::ZeroTimeout(*name));
            }
        }

        if let PolicyKind::AtLeast(m) = self.policy {
            if m == 0 || m > ch.peers.len() {
                return Err(ConfigErr::UnsatisfiablePolicy(self.policy, ch.peers.len()));
            }
        }
        Ok(())
    }

    pub fn event_sources(&self) -> impl Iterator<Item = &PeerInfo> {
        self.channel.peers.iter().filter(|p| p.event_source)
    }

    pub fn endorsement_policy(&self) -> Arc<dyn EndorsementPolicy> {
        Arc::from(self.policy.into_policy())
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigErr> {
        Ok(serde_yaml::to_string(self)?)
    }
}
