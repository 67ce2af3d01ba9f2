//! Session orchestrator.
//!
//! A session runs one transaction through build, endorse, subscribe, submit
//! and wait. Commit subscriptions are attached before the envelope reaches the
//! orderer so the commit event can't slip past.

use std::{fmt, sync::Arc};

use endorser::{
    EndorsementCollector, OrdererTransport, PeerTransport, ProposalBuilder, TransactionSubmitter,
    TransportErr, TxErr,
};
use log::{debug, info, warn};
use signkit::Signer;
use thiserror::Error;
use tx_data::{
    BlockNumber, ChaincodeID, ChannelID, EndorsementPolicy, PeerID, ProposalKind, TxID,
    ValidationCode,
};

use crate::config::{ClientConfig, OrdererInfo, PeerInfo, TimeoutConfig};
use crate::listener::CommitListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    ProposalSent,
    Endorsed,
    Submitted,
    Committed,
    TimedOut,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Endorse,
    Submit,
    Commit,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Build => "build",
            Stage::Endorse => "endorse",
            Stage::Submit => "submit",
            Stage::Commit => "commit",
            Stage::Query => "query",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {source}")]
pub struct SessionErr {
    pub stage: Stage,
    #[source]
    pub source: TxErr,
}

impl SessionErr {
    #[inline]
    pub fn kind(&self) -> &TxErr {
        &self.source
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub tx_id: TxID,
    pub validation_code: ValidationCode,
    pub block_number: BlockNumber,
    pub source_peer: PeerID,
}

/// What to run. Arguments are passed to chaincode untouched.
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub chaincode_id: ChaincodeID,
    pub kind: ProposalKind,
    pub function: Option<String>,
    pub args: Vec<Vec<u8>>,
}

impl TxRequest {
    pub fn invoke<I, A>(chaincode_id: impl Into<String>, function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        Self {
            chaincode_id: chaincode_id.into(),
            kind: ProposalKind::Invoke,
            function: Some(function.into()),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn query<I, A>(chaincode_id: impl Into<String>, function: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        Self {
            kind: ProposalKind::Query,
            ..Self::invoke(chaincode_id, function, args)
        }
    }

    /// Instantiate (or upgrade, with `upgrade = true`) `version` of a chaincode.
    pub fn lifecycle<I, A>(
        chaincode_id: impl Into<String>,
        version: impl Into<String>,
        upgrade: bool,
        policy: Option<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        let version = version.into();
        let kind = if upgrade {
            ProposalKind::Upgrade { version, policy }
        } else {
            ProposalKind::Instantiate { version, policy }
        };
        Self {
            chaincode_id: chaincode_id.into(),
            kind,
            function: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn builder(self, channel_id: &ChannelID) -> ProposalBuilder {
        let b = ProposalBuilder::new(channel_id.clone(), self.chaincode_id)
            .kind(self.kind)
            .args(self.args);
        match self.function {
            Some(f) => b.function(f),
            None => b,
        }
    }
}

/// Turns configured endpoints into transports.
pub trait Connector {
    fn peer(&self, info: &PeerInfo) -> Result<Arc<dyn PeerTransport>, TransportErr>;

    fn orderer(&self, info: &OrdererInfo) -> Result<Arc<dyn OrdererTransport>, TransportErr>;
}

/// Connected channel: endorsement targets, event sources and the orderer.
/// Immutable, shared by every session on the channel.
pub struct ChannelDescriptor {
    pub channel_id: ChannelID,
    pub peers: Vec<Arc<dyn PeerTransport>>,
    pub event_sources: Vec<Arc<dyn PeerTransport>>,
    pub orderer: Arc<dyn OrdererTransport>,
    pub timeouts: TimeoutConfig,
    pub policy: Arc<dyn EndorsementPolicy>,
}

impl ChannelDescriptor {
    pub fn connect(conf: &ClientConfig, connector: &dyn Connector) -> Result<Self, TxErr> {
        conf.validate()
            .map_err(|e| TxErr::InvalidArgument(e.to_string()))?;

        let mut peers = Vec::with_capacity(conf.channel.peers.len());
        let mut event_sources = vec![];
        for info in &conf.channel.peers {
            let peer = connector.peer(info)?;
            if info.event_source {
                event_sources.push(peer.clone());
            }
            peers.push(peer);
        }
        let orderer = connector.orderer(&conf.channel.orderer)?;
        info!(
            "connected to channel {} with {} peers, orderer {}",
            conf.channel.channel_id,
            peers.len(),
            orderer.endpoint()
        );

        Ok(Self {
            channel_id: conf.channel.channel_id.clone(),
            peers,
            event_sources,
            orderer,
            timeouts: conf.timeouts.clone(),
            policy: conf.endorsement_policy(),
        })
    }
}

pub struct Session {
    channel: Arc<ChannelDescriptor>,
    signer: Arc<dyn Signer>,
    state: SessionState,
}

impl Session {
    pub fn new(channel: Arc<ChannelDescriptor>, signer: Arc<dyn Signer>) -> Self {
        Self {
            channel,
            signer,
            state: SessionState::Created,
        }
    }

    pub fn connect(
        conf: &ClientConfig,
        connector: &dyn Connector,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, SessionErr> {
        let channel = ChannelDescriptor::connect(conf, connector).map_err(|source| SessionErr {
            stage: Stage::Build,
            source,
        })?;
        Ok(Self::new(Arc::new(channel), signer))
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn channel(&self) -> &Arc<ChannelDescriptor> {
        &self.channel
    }

    fn advance(&mut self, next: SessionState) {
        debug!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, stage: Stage, source: TxErr) -> SessionErr {
        let next = match &source {
            TxErr::CommitTimeout(_) => SessionState::TimedOut,
            _ => SessionState::Rejected,
        };
        warn!("session failed at {} stage: {}", stage, source);
        self.advance(next);
        SessionErr { stage, source }
    }

    fn collector(&self) -> EndorsementCollector {
        EndorsementCollector::new(self.channel.peers.clone(), self.channel.timeouts.proposal())
            .with_policy(self.channel.policy.clone())
    }

    /// Run `req` to commit. Query requests are refused, use `query`.
    pub async fn submit(mut self, req: TxRequest) -> Result<CommitResult, SessionErr> {
        if req.kind == ProposalKind::Query {
            let e = TxErr::InvalidArgument("query proposals are never ordered".to_string());
            return Err(self.fail(Stage::Build, e));
        }

        let prop = match req.builder(&self.channel.channel_id).build(self.signer.as_ref()) {
            Ok(prop) => prop,
            Err(e) => return Err(self.fail(Stage::Build, e)),
        };
        let tx_id = prop.tx_id().clone();
        info!("session tx={} sending proposal", tx_id);
        self.advance(SessionState::ProposalSent);

        let endorsed = match self.collector().collect(prop).await {
            Ok(tx) => tx,
            Err(e) => return Err(self.fail(Stage::Endorse, e)),
        };
        self.advance(SessionState::Endorsed);

        let listener = match CommitListener::attach(&self.channel.event_sources, &tx_id).await {
            Ok(l) => l,
            Err(e) => return Err(self.fail(Stage::Commit, e)),
        };

        let submitter =
            TransactionSubmitter::new(self.channel.orderer.clone(), self.channel.timeouts.broadcast());
        if let Err(e) = submitter.submit(&endorsed, self.signer.as_ref()).await {
            listener.close().await;
            return Err(self.fail(Stage::Submit, e));
        }
        self.advance(SessionState::Submitted);

        match listener.wait(self.channel.timeouts.commit()).await {
            Ok(ev) => {
                self.advance(SessionState::Committed);
                Ok(CommitResult {
                    tx_id: ev.tx_id,
                    validation_code: ev.validation_code,
                    block_number: ev.block_number,
                    source_peer: ev.source_peer,
                })
            }
            Err(e) => Err(self.fail(Stage::Commit, e)),
        }
    }

    /// Evaluate a read-only request and return each answering peer's payload.
    ///
    /// Nothing is ordered, a successful query leaves the session `Endorsed`.
    pub async fn query(&mut self, mut req: TxRequest) -> Result<Vec<(PeerID, Vec<u8>)>, SessionErr> {
        req.kind = ProposalKind::Query;
        let prop = match req.builder(&self.channel.channel_id).build(self.signer.as_ref()) {
            Ok(prop) => prop,
            Err(e) => return Err(self.fail(Stage::Build, e)),
        };
        self.advance(SessionState::ProposalSent);

        match self.collector().query(&prop).await {
            Ok(payloads) => {
                self.advance(SessionState::Endorsed);
                Ok(payloads)
            }
            Err(e) => Err(self.fail(Stage::Query, e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_kinds() {
        let q = TxRequest::query("mycc", "query", vec!["b"]);
        assert_eq!(q.kind, ProposalKind::Query);
        assert_eq!(q.function.as_deref(), Some("query"));

        let up = TxRequest::lifecycle("mycc", "v1", true, None, vec!["a", "600", "b", "300"]);
        assert_eq!(up.kind.version(), Some("v1"));
        assert!(matches!(up.kind, ProposalKind::Upgrade { .. }));
        assert_eq!(up.function, None);
    }

    #[test]
    fn test_session_err_display() {
        let e = SessionErr {
            stage: Stage::Endorse,
            source: TxErr::EndorsementFailed {
                peer: Some("peer1".to_string()),
                reason: "status 500".to_string(),
            },
        };
        assert_eq!(e.to_string(), "endorse stage failed: endorsement failed: status 500");
        assert!(!e.kind().is_retryable());
    }
}
