//! Sandbox channel: simulated peers, orderer and ledger that the client
//! library runs against, with the command line tools built on top.

pub mod chaincode;
pub mod config;
pub mod ledger;
pub mod network;
pub mod utils;

pub use config::{IdentityConfig, NetworkSimConfig, SandboxConfig};
pub use ledger::{LedgerErr, SharedLedger};
pub use network::{SimNetwork, SimOrderer, SimPeer};
pub use utils::{init_logger, load_signer, open_network, open_session, show_payload, SandboxErr};
