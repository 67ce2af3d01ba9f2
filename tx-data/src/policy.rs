//! Endorsement policy evaluated by the client before ordering.
//!
//! The ledger evaluates the real policy again at validation time; this is only
//! the client-side gate that decides whether a response set is worth submitting.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EndorsementResponse, PeerID};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("no endorsement responses")]
    NoResponses,

    #[error("peer {peer} failed to endorse: {reason}")]
    BadResponse { peer: PeerID, reason: String },

    #[error("need {required} good endorsements, only {got} offered")]
    InsufficientEndorsements { required: usize, got: usize },

    #[error("endorsement payload from {peer} differs from {reference}")]
    PayloadMismatch { peer: PeerID, reference: PeerID },
}

impl PolicyViolation {
    /// Peer blamed for the violation, if any.
    pub fn peer(&self) -> Option<&PeerID> {
        match self {
            PolicyViolation::BadResponse { peer, .. }
            | PolicyViolation::PayloadMismatch { peer, .. } => Some(peer),
            _ => None,
        }
    }
}

pub trait EndorsementPolicy: Send + Sync {
    fn evaluate(&self, responses: &[EndorsementResponse]) -> Result<(), PolicyViolation>;
}

/// Every targeted peer must answer with status 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllGood;

impl EndorsementPolicy for AllGood {
    fn evaluate(&self, responses: &[EndorsementResponse]) -> Result<(), PolicyViolation> {
        if responses.is_empty() {
            return Err(PolicyViolation::NoResponses);
        }
        match responses.iter().find(|r| !r.is_good()) {
            Some(bad) => Err(PolicyViolation::BadResponse {
                peer: bad.peer.clone(),
                reason: bad.failure_reason().unwrap_or_default(),
            }),
            None => Ok(()),
        }
    }
}

/// At least `m` of the targeted peers must answer with status 200.
#[derive(Debug, Clone, Copy)]
pub struct AtLeast(pub usize);

impl EndorsementPolicy for AtLeast {
    fn evaluate(&self, responses: &[EndorsementResponse]) -> Result<(), PolicyViolation> {
        if responses.is_empty() {
            return Err(PolicyViolation::NoResponses);
        }
        let got = responses.iter().filter(|r| r.is_good()).count();
        if got >= self.0 {
            return Ok(());
        }
        // Report the first failure when there's one to blame.
        match responses.iter().find(|r| !r.is_good()) {
            Some(bad) if got == 0 => Err(PolicyViolation::BadResponse {
                peer: bad.peer.clone(),
                reason: bad.failure_reason().unwrap_or_default(),
            }),
            _ => Err(PolicyViolation::InsufficientEndorsements {
                required: self.0,
                got,
            }),
        }
    }
}

/// Serializable policy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    AllGood,
    AtLeast(usize),
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::AllGood
    }
}

impl PolicyKind {
    pub fn into_policy(self) -> Box<dyn EndorsementPolicy> {
        match self {
            PolicyKind::AllGood => Box::new(AllGood),
            PolicyKind::AtLeast(m) => Box::new(AtLeast(m)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Endorsement, EndorsedTransaction, Proposal, ProposalKind, ProposalResponse,
        SerializedIdentity, SignedProposal, NONCE_SIZE,
    };

    fn resp(peer: &str, status: u32, payload: &[u8]) -> EndorsementResponse {
        EndorsementResponse::ok(
            peer.to_string(),
            ProposalResponse {
                status,
                message: if status == 200 {
                    String::new()
                } else {
                    format!("chaincode error from {}", peer)
                },
                payload: payload.to_vec(),
                endorsement: Endorsement {
                    endorser: SerializedIdentity::new("Org1MSP", peer.as_bytes().to_vec()),
                    signature: vec![1, 2, 3],
                },
            },
        )
    }

    fn signed() -> SignedProposal {
        SignedProposal {
            proposal: Proposal::new(
                "samchannel".to_string(),
                "mycc".to_string(),
                ProposalKind::Invoke,
                "move".to_string(),
                vec![],
                [0u8; NONCE_SIZE],
                SerializedIdentity::new("Org1MSP", b"admin".to_vec()),
            ),
            signature: vec![9],
        }
    }

    #[test]
    fn test_all_good_fails_on_any_bad_peer() {
        let responses = vec![
            resp("peer0", 200, b"ok"),
            resp("peer1", 500, b""),
            EndorsementResponse::err("peer2".to_string(), "connection refused"),
        ];
        match AllGood.evaluate(&responses) {
            Err(PolicyViolation::BadResponse { peer, reason }) => {
                assert_eq!(peer, "peer1");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let responses = vec![
            EndorsementResponse::err("peer0".to_string(), "connection refused"),
            resp("peer1", 200, b"ok"),
        ];
        match AllGood.evaluate(&responses) {
            Err(PolicyViolation::BadResponse { peer, reason }) => {
                assert_eq!(peer, "peer0");
                assert_eq!(reason, "connection refused");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(AllGood.evaluate(&[]), Err(PolicyViolation::NoResponses));
    }

    #[test]
    fn test_at_least_accepts_partial_success() {
        let responses = vec![
            resp("peer0", 200, b"ok"),
            resp("peer1", 500, b""),
            resp("peer2", 200, b"ok"),
        ];
        assert!(AtLeast(2).evaluate(&responses).is_ok());
        assert_eq!(
            AtLeast(3).evaluate(&responses),
            Err(PolicyViolation::InsufficientEndorsements {
                required: 3,
                got: 2
            })
        );

        let tx = EndorsedTransaction::new(signed(), responses, &AtLeast(2)).unwrap();
        let peers = tx.responses().iter().map(|r| r.peer.as_str()).collect::<Vec<_>>();
        assert_eq!(peers, vec!["peer0", "peer2"]);
        assert_eq!(tx.payload(), b"ok");
    }

    #[test]
    fn test_payload_mismatch_is_rejected() {
        let responses = vec![resp("peer0", 200, b"a=590"), resp("peer1", 200, b"a=580")];
        let err = EndorsedTransaction::new(signed(), responses, &AllGood).unwrap_err();
        assert_eq!(
            err,
            PolicyViolation::PayloadMismatch {
                peer: "peer1".to_string(),
                reference: "peer0".to_string()
            }
        );
        assert_eq!(err.peer().map(|p| p.as_str()), Some("peer1"));
    }
}
