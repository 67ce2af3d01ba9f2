//! Proposal builder.
//!
//! Arguments are opaque byte strings, passed to chaincode in the order given.

use log::debug;
use signkit::{new_nonce, Signer};
use tx_data::{Nonce, Proposal, ProposalKind, SignedProposal};

use crate::error::{Result, TxErr};

#[derive(Debug, Clone)]
pub struct ProposalBuilder {
    channel_id: String,
    chaincode_id: String,
    kind: ProposalKind,
    function: Option<String>,
    args: Vec<Vec<u8>>,
}

impl ProposalBuilder {
    pub fn new(channel_id: impl Into<String>, chaincode_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            kind: ProposalKind::Invoke,
            function: None,
            args: vec![],
        }
    }

    pub fn kind(mut self, kind: ProposalKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<Vec<u8>>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build and sign with a fresh random nonce.
    pub fn build(self, signer: &dyn Signer) -> Result<SignedProposal> {
        self.build_with_nonce(signer, new_nonce())
    }

    pub fn build_with_nonce(self, signer: &dyn Signer, nonce: Nonce) -> Result<SignedProposal> {
        self.validate(signer)?;

        let function = match self.function {
            Some(f) => f,
            None => self.kind.default_function().to_string(),
        };
        let proposal = Proposal::new(
            self.channel_id,
            self.chaincode_id,
            self.kind,
            function,
            self.args,
            nonce,
            signer.identity().clone(),
        );
        let signature = signer.sign(&proposal.to_be_bytes());

        debug!(
            "built proposal tx={} on {}/{} fcn={}",
            proposal.tx_id(),
            proposal.channel_id(),
            proposal.chaincode_id(),
            proposal.function()
        );
        Ok(SignedProposal {
            proposal,
            signature,
        })
    }

    fn validate(&self, signer: &dyn Signer) -> Result<()> {
        if self.channel_id.is_empty() {
            return Err(TxErr::InvalidArgument("empty channel id".to_string()));
        }
        if self.chaincode_id.is_empty() {
            return Err(TxErr::InvalidArgument("empty chaincode id".to_string()));
        }
        if let Some(c) = self
            .chaincode_id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.'))
        {
            return Err(TxErr::InvalidArgument(format!(
                "chaincode id {:?} contains {:?}",
                self.chaincode_id, c
            )));
        }
        if matches!(&self.function, Some(f) if f.is_empty()) {
            return Err(TxErr::InvalidArgument("empty function name".to_string()));
        }
        if matches!(self.kind.version(), Some(v) if v.is_empty()) {
            return Err(TxErr::InvalidArgument(
                "chaincode version is required for instantiate/upgrade".to_string(),
            ));
        }
        if signer.identity().msp_id.is_empty() {
            return Err(TxErr::InvalidArgument("creator without msp id".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use signkit::DefaultSigner;
    use tx_data::{compute_tx_id, NONCE_SIZE};

    fn mv() -> ProposalBuilder {
        ProposalBuilder::new("samchannel", "mycc")
            .function("move")
            .args(vec!["b", "a", "10"])
    }

    #[test]
    fn test_same_inputs_same_tx_id() {
        let signer = DefaultSigner::random("Org1MSP");
        let nonce = [5u8; NONCE_SIZE];

        let a = mv().build_with_nonce(&signer, nonce).unwrap();
        let b = mv().build_with_nonce(&signer, nonce).unwrap();
        assert_eq!(a.tx_id(), b.tx_id());
        assert_eq!(a.tx_id(), &compute_tx_id(&nonce, signer.identity()));
        assert_eq!(a.proposal.args(), &vec![b"b".to_vec(), b"a".to_vec(), b"10".to_vec()]);

        let c = mv().build_with_nonce(&signer, [6u8; NONCE_SIZE]).unwrap();
        assert_ne!(a.tx_id(), c.tx_id());

        // Fresh nonces.
        assert_ne!(mv().build(&signer).unwrap().tx_id(), mv().build(&signer).unwrap().tx_id());
    }

    #[test]
    fn test_proposal_is_signed_by_creator() {
        let signer = DefaultSigner::random("Org1MSP");
        let signed = mv().build(&signer).unwrap();
        assert_eq!(signed.proposal.creator(), signer.identity());
        assert!(signkit::verify(
            signer.identity(),
            &signed.proposal.to_be_bytes(),
            &signed.signature
        )
        .unwrap());
    }

    #[test]
    fn test_default_function() {
        let signer = DefaultSigner::random("Org1MSP");
        let invoke = ProposalBuilder::new("samchannel", "mycc")
            .args(vec!["a"])
            .build(&signer)
            .unwrap();
        assert_eq!(invoke.proposal.function(), "invoke");

        let init = ProposalBuilder::new("samchannel", "mycc")
            .kind(ProposalKind::Instantiate {
                version: "v0".to_string(),
                policy: None,
            })
            .args(vec!["a", "600", "b", "300"])
            .build(&signer)
            .unwrap();
        assert_eq!(init.proposal.function(), "init");
        assert_eq!(init.proposal.kind().version(), Some("v0"));
    }

    #[test]
    fn test_malformed_input_rejected() {
        let signer = DefaultSigner::random("Org1MSP");
        let invalid = |b: ProposalBuilder| {
            matches!(b.build(&signer), Err(TxErr::InvalidArgument(_)))
        };

        assert!(invalid(ProposalBuilder::new("", "mycc")));
        assert!(invalid(ProposalBuilder::new("samchannel", "")));
        assert!(invalid(ProposalBuilder::new("samchannel", "my cc")));
        assert!(invalid(ProposalBuilder::new("samchannel", "mycc/../x")));
        assert!(invalid(ProposalBuilder::new("samchannel", "mycc").function("")));
        assert!(invalid(ProposalBuilder::new("samchannel", "mycc").kind(
            ProposalKind::Upgrade {
                version: String::new(),
                policy: None
            }
        )));
        assert!(matches!(
            mv().build(&DefaultSigner::random("")),
            Err(TxErr::InvalidArgument(_))
        ));

        // Byte args pass through untouched.
        let raw = ProposalBuilder::new("samchannel", "my_cc-1.0")
            .arg(vec![0u8, 255, 10])
            .build(&signer)
            .unwrap();
        assert_eq!(raw.proposal.args(), &vec![vec![0u8, 255, 10]]);
    }
}
