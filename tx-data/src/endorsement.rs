use serde::{Deserialize, Serialize};

use crate::{
    policy::{EndorsementPolicy, PolicyViolation},
    PeerID, SerializedIdentity, SignedProposal, TxID, STATUS_OK,
};

/// A peer's signed attestation over the simulated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser: SerializedIdentity,
    pub signature: Vec<u8>,
}

/// What a peer returns once transport succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub status: u32,
    pub message: String,
    pub payload: Vec<u8>,
    pub endorsement: Endorsement,
}

/// One per peer contacted. `outcome` holds either the peer's response (status code)
/// or the transport error, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementResponse {
    pub peer: PeerID,
    pub outcome: Result<ProposalResponse, String>,
}

impl EndorsementResponse {
    pub fn ok(peer: PeerID, resp: ProposalResponse) -> Self {
        Self {
            peer,
            outcome: Ok(resp),
        }
    }

    pub fn err(peer: PeerID, reason: impl ToString) -> Self {
        Self {
            peer,
            outcome: Err(reason.to_string()),
        }
    }

    /// Transport succeeded and status is 200.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(&self.outcome, Ok(resp) if resp.status == STATUS_OK)
    }

    pub fn status(&self) -> Option<u32> {
        self.outcome.as_ref().ok().map(|resp| resp.status)
    }

    /// Transport error, or the message of a non-200 response.
    pub fn failure_reason(&self) -> Option<String> {
        match &self.outcome {
            Err(e) => Some(e.clone()),
            Ok(resp) if resp.status != STATUS_OK => {
                Some(format!("status {}: {}", resp.status, resp.message))
            }
            Ok(_) => None,
        }
    }

    pub fn response(&self) -> Option<&ProposalResponse> {
        self.outcome.as_ref().ok()
    }
}

/// Proposal with the responses that satisfied the endorsement policy.
/// Only constructible through `EndorsedTransaction::new`.
#[derive(Debug, Clone)]
pub struct EndorsedTransaction {
    proposal: SignedProposal,
    responses: Vec<EndorsementResponse>,
}

impl EndorsedTransaction {
    /// Evaluate `policy` against `responses`, then check that every counted
    /// response carries the same payload.
    pub fn new(
        proposal: SignedProposal,
        responses: Vec<EndorsementResponse>,
        policy: &dyn EndorsementPolicy,
    ) -> Result<Self, PolicyViolation> {
        policy.evaluate(&responses)?;

        let good = responses
            .into_iter()
            .filter(|r| r.is_good())
            .collect::<Vec<_>>();

        if let Some((first, rest)) = good.split_first() {
            let reference = first.response().map(|r| &r.payload);
            if let Some(diverged) = rest.iter().find(|r| r.response().map(|r| &r.payload) != reference)
            {
                return Err(PolicyViolation::PayloadMismatch {
                    peer: diverged.peer.clone(),
                    reference: first.peer.clone(),
                });
            }
        }

        Ok(Self {
            proposal,
            responses: good,
        })
    }

    #[inline(always)]
    pub fn proposal(&self) -> &SignedProposal {
        &self.proposal
    }

    #[inline(always)]
    pub fn responses(&self) -> &Vec<EndorsementResponse> {
        &self.responses
    }

    #[inline(always)]
    pub fn tx_id(&self) -> &TxID {
        self.proposal.tx_id()
    }

    /// Endorsed payload, identical for every counted response.
    pub fn payload(&self) -> &[u8] {
        self.responses
            .first()
            .and_then(|r| r.response())
            .map(|r| r.payload.as_slice())
            .unwrap_or_default()
    }
}
