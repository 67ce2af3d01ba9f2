use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{put_bytes, ChaincodeID, ChannelID, SerializedIdentity, TxID};

/// Nonce size used by the ledger platform for proposal addressing.
pub const NONCE_SIZE: usize = 24;
pub type Nonce = [u8; NONCE_SIZE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalKind {
    // Endorse, order and commit.
    Invoke,
    // Endorse only, never ordered.
    Query,
    Instantiate {
        version: String,
        policy: Option<String>,
    },
    Upgrade {
        version: String,
        policy: Option<String>,
    },
}

impl ProposalKind {
    /// Function used when the caller doesn't name one.
    pub fn default_function(&self) -> &'static str {
        match self {
            ProposalKind::Invoke | ProposalKind::Query => "invoke",
            ProposalKind::Instantiate { .. } | ProposalKind::Upgrade { .. } => "init",
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            ProposalKind::Instantiate { version, .. } | ProposalKind::Upgrade { version, .. } => {
                Some(version)
            }
            _ => None,
        }
    }

    pub fn policy(&self) -> Option<&str> {
        match self {
            ProposalKind::Instantiate { policy, .. } | ProposalKind::Upgrade { policy, .. } => {
                policy.as_deref()
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        self.version().is_some()
    }

    fn tag(&self) -> u8 {
        match self {
            ProposalKind::Invoke => 0,
            ProposalKind::Query => 1,
            ProposalKind::Instantiate { .. } => 2,
            ProposalKind::Upgrade { .. } => 3,
        }
    }
}

/// Transaction id = lowercase hex of sha256(nonce || creator).
/// Peers and the ordering service recompute it, so this must not change.
pub fn compute_tx_id(nonce: &[u8], creator: &SerializedIdentity) -> TxID {
    let mut h = Sha256::default();
    h.update(nonce);
    h.update(creator.to_be_bytes());
    format!("{:x}", h.finalize())
}

/// Client-built request to execute chaincode. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    channel_id: ChannelID,
    chaincode_id: ChaincodeID,
    kind: ProposalKind,
    function: String,
    args: Vec<Vec<u8>>,
    nonce: Nonce,
    creator: SerializedIdentity,
    tx_id: TxID,
}

impl Proposal {
    /// Inputs are expected to be validated by the caller.
    pub fn new(
        channel_id: ChannelID,
        chaincode_id: ChaincodeID,
        kind: ProposalKind,
        function: String,
        args: Vec<Vec<u8>>,
        nonce: Nonce,
        creator: SerializedIdentity,
    ) -> Self {
        let tx_id = compute_tx_id(&nonce, &creator);
        Self {
            channel_id,
            chaincode_id,
            kind,
            function,
            args,
            nonce,
            creator,
            tx_id,
        }
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        let size = self.args.iter().fold(128, |n, a| n + a.len() + 4)
            + self.creator.id_bytes.len()
            + self.function.len();

        let mut buf = Vec::with_capacity(size);
        buf.push(self.kind.tag());
        put_bytes(&mut buf, self.channel_id.as_bytes());
        put_bytes(&mut buf, self.chaincode_id.as_bytes());
        put_bytes(&mut buf, self.kind.version().unwrap_or_default().as_bytes());
        put_bytes(&mut buf, self.kind.policy().unwrap_or_default().as_bytes());
        put_bytes(&mut buf, self.function.as_bytes());
        buf.extend_from_slice(&(self.args.len() as u32).to_be_bytes());
        for arg in &self.args {
            put_bytes(&mut buf, arg);
        }
        put_bytes(&mut buf, &self.nonce);
        put_bytes(&mut buf, self.creator.to_be_bytes());
        put_bytes(&mut buf, self.tx_id.as_bytes());
        buf
    }

    /// Chaincode input: function name followed by the arguments.
    pub fn invocation(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(self.function.as_bytes()).chain(self.args.iter().map(|a| a.as_slice()))
    }

    #[inline(always)]
    pub fn channel_id(&self) -> &ChannelID {
        &self.channel_id
    }

    #[inline(always)]
    pub fn chaincode_id(&self) -> &ChaincodeID {
        &self.chaincode_id
    }

    #[inline(always)]
    pub fn kind(&self) -> &ProposalKind {
        &self.kind
    }

    #[inline(always)]
    pub fn function(&self) -> &str {
        &self.function
    }

    #[inline(always)]
    pub fn args(&self) -> &Vec<Vec<u8>> {
        &self.args
    }

    #[inline(always)]
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    #[inline(always)]
    pub fn creator(&self) -> &SerializedIdentity {
        &self.creator
    }

    #[inline(always)]
    pub fn tx_id(&self) -> &TxID {
        &self.tx_id
    }
}

/// Proposal plus the creator's signature over `Proposal::to_be_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub signature: Vec<u8>,
}

impl SignedProposal {
    #[inline(always)]
    pub fn tx_id(&self) -> &TxID {
        self.proposal.tx_id()
    }

    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_bytes(&mut buf, self.proposal.to_be_bytes());
        put_bytes(&mut buf, &self.signature);
        buf
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn creator() -> SerializedIdentity {
        SerializedIdentity::new("Org1MSP", b"cert-of-admin".to_vec())
    }

    fn proposal(nonce: Nonce) -> Proposal {
        Proposal::new(
            "samchannel".to_string(),
            "mycc".to_string(),
            ProposalKind::Invoke,
            "move".to_string(),
            vec![b"b".to_vec(), b"a".to_vec(), b"10".to_vec()],
            nonce,
            creator(),
        )
    }

    #[test]
    fn test_tx_id_is_deterministic() {
        let nonce = [7u8; NONCE_SIZE];
        assert_eq!(compute_tx_id(&nonce, &creator()), compute_tx_id(&nonce, &creator()));
        assert_eq!(proposal(nonce).tx_id(), proposal(nonce).tx_id());
        assert_eq!(proposal(nonce).to_be_bytes(), proposal(nonce).to_be_bytes());

        // sha256 in lowercase hex.
        let tx_id = compute_tx_id(&nonce, &creator());
        assert_eq!(tx_id.len(), 64);
        assert!(tx_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tx_id_depends_on_nonce_and_creator() {
        let a = compute_tx_id(&[1u8; NONCE_SIZE], &creator());
        let b = compute_tx_id(&[2u8; NONCE_SIZE], &creator());
        let c = compute_tx_id(
            &[1u8; NONCE_SIZE],
            &SerializedIdentity::new("Org2MSP", b"cert-of-admin".to_vec()),
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invocation_starts_with_function() {
        let prop = proposal([0u8; NONCE_SIZE]);
        let input = prop.invocation().map(|s| s.to_vec()).collect::<Vec<_>>();
        assert_eq!(
            input,
            vec![b"move".to_vec(), b"b".to_vec(), b"a".to_vec(), b"10".to_vec()]
        );
    }

    #[test]
    fn test_kind_is_part_of_signed_bytes() {
        let nonce = [3u8; NONCE_SIZE];
        let invoke = proposal(nonce);
        let upgrade = Proposal::new(
            "samchannel".to_string(),
            "mycc".to_string(),
            ProposalKind::Upgrade {
                version: "v2".to_string(),
                policy: None,
            },
            "move".to_string(),
            vec![b"b".to_vec(), b"a".to_vec(), b"10".to_vec()],
            nonce,
            creator(),
        );
        assert_eq!(invoke.tx_id(), upgrade.tx_id());
        assert_ne!(invoke.to_be_bytes(), upgrade.to_be_bytes());
    }
}
