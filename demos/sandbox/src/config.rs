//! Configurations for the sandbox client and its simulated network.

use std::path::Path;

use orchestrator::{ClientConfig, ConfigErr};
use serde::{Deserialize, Serialize};
use tx_data::PeerID;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub client: ClientConfig,
    pub identity: IdentityConfig,
    pub network: NetworkSimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub msp_id: String,
    // base64 encoded.
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSimConfig {
    pub endorse_latency_ms: u64,
    pub commit_latency_ms: u64,
    // World state survives between runs when set.
    #[serde(default)]
    pub state_file: Option<String>,
    // These peers refuse connections.
    #[serde(default)]
    pub down_peers: Vec<PeerID>,
}

impl Default for NetworkSimConfig {
    fn default() -> Self {
        NetworkSimConfig {
            endorse_latency_ms: 20,
            commit_latency_ms: 200,
            state_file: None,
            down_peers: vec![],
        }
    }
}

impl SandboxConfig {
    pub fn new(identity: IdentityConfig) -> Self {
        SandboxConfig {
            client: ClientConfig::default(),
            identity,
            network: NetworkSimConfig::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigErr> {
        let reader = std::fs::File::open(path)?;
        let conf: SandboxConfig = serde_yaml::from_reader(reader)?;
        conf.client.validate()?;
        Ok(conf)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigErr> {
        let writer = std::fs::File::create(path)?;
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
