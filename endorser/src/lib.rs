//! Client side of the endorse-and-order protocol: proposal building,
//! endorsement collection and submission to the ordering service.

pub mod builder;
pub mod collector;
pub mod error;
pub mod submitter;
pub mod traits;

pub use builder::ProposalBuilder;
pub use collector::EndorsementCollector;
pub use error::{Result, TxErr};
pub use submitter::TransactionSubmitter;
pub use traits::*;
