use thiserror::Error;

use tx_data::{BlockNumber, BroadcastStatus, PeerID, PolicyViolation, TxID, ValidationCode};

use crate::traits::TransportErr;

pub type Result<T> = core::result::Result<T, TxErr>;

/// Every way a transaction can fail. A session ends with exactly one of them
/// or with a commit result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxErr {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error with {endpoint}: {reason}")]
    TransportError { endpoint: String, reason: String },

    #[error("endorsement failed: {reason}")]
    EndorsementFailed {
        peer: Option<PeerID>,
        reason: String,
    },

    #[error("ordering service rejected envelope, status={status}, info={info}")]
    OrderingRejected { status: BroadcastStatus, info: String },

    // The transaction may still commit later.
    #[error("no commit event for tx {0} before timeout, outcome unknown")]
    CommitTimeout(TxID),

    #[error("tx {tx_id} invalidated in block {block_number}: {code}")]
    TransactionInvalidated {
        tx_id: TxID,
        code: ValidationCode,
        block_number: BlockNumber,
    },
}

impl TxErr {
    /// Only transport failures are worth retrying, with backoff, by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxErr::TransportError { .. })
    }

    /// False when the ledger outcome is unknown.
    pub fn is_conclusive(&self) -> bool {
        !matches!(self, TxErr::CommitTimeout(_))
    }
}

impl From<TransportErr> for TxErr {
    fn from(e: TransportErr) -> Self {
        TxErr::TransportError {
            endpoint: e.endpoint().to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<PolicyViolation> for TxErr {
    fn from(v: PolicyViolation) -> Self {
        TxErr::EndorsementFailed {
            peer: v.peer().cloned(),
            reason: v.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport: TxErr = TransportErr::Closed("orderer0".to_string()).into();
        assert!(transport.is_retryable());
        assert!(transport.is_conclusive());
        assert!(transport.to_string().contains("orderer0"));

        let timeout = TxErr::CommitTimeout("abc".to_string());
        assert!(!timeout.is_retryable());
        assert!(!timeout.is_conclusive());

        let endorse: TxErr = PolicyViolation::BadResponse {
            peer: "peer1".to_string(),
            reason: "status 500: boom".to_string(),
        }
        .into();
        assert_eq!(
            endorse,
            TxErr::EndorsementFailed {
                peer: Some("peer1".to_string()),
                reason: "peer peer1 failed to endorse: status 500: boom".to_string(),
            }
        );
        assert!(!endorse.is_retryable());
    }
}
