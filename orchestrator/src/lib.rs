//! Orchestrator sequences a transaction through endorsement, ordering and
//! commit, and owns the listeners and timers that confirm it.
//!

pub mod config;
pub mod events;
pub mod listener;
pub mod session;
mod timer;

pub use config::{ClientConfig, ConfigErr};
pub use events::{query_chain_info, wait_chaincode_event, wait_next_block, EventErr};
pub use listener::{CommitListener, SubscriptionState};
pub use session::{
    ChannelDescriptor, CommitResult, Connector, Session, SessionErr, SessionState, Stage, TxRequest,
};
