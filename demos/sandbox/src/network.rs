//! In-process peers and orderer over one `SharedLedger`.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use fnv::FnvHashMap;
use log::{debug, error, warn};

use endorser::{OrdererTransport, PeerTransport, Subscription, TransportErr};
use orchestrator::{
    config::{OrdererInfo, PeerInfo},
    Connector,
};
use signkit::{DefaultSigner, Signer};
use tx_data::*;

use crate::{config::NetworkSimConfig, ledger::SharedLedger};

const PEER_MSP: &str = "PeerOrgMSP";

pub struct SimPeer {
    id: PeerID,
    down: bool,
    latency: Duration,
    signer: DefaultSigner,
    ledger: Arc<SharedLedger>,
}

impl SimPeer {
    pub fn new(id: PeerID, ledger: Arc<SharedLedger>, sim: &NetworkSimConfig) -> Self {
        Self {
            down: sim.down_peers.contains(&id),
            latency: Duration::from_millis(sim.endorse_latency_ms),
            signer: DefaultSigner::random(PEER_MSP),
            ledger,
            id,
        }
    }

    fn check_up(&self) -> Result<(), TransportErr> {
        if self.down {
            return Err(TransportErr::Unreachable(
                self.id.clone(),
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }

    fn refuse(&self, message: String) -> ProposalResponse {
        warn!("{} refused proposal: {}", self.id, message);
        ProposalResponse {
            status: 500,
            message,
            payload: vec![],
            endorsement: Endorsement {
                endorser: self.signer.identity().clone(),
                signature: vec![],
            },
        }
    }

    fn endorse(&self, prop: &SignedProposal) -> ProposalResponse {
        let proposal = &prop.proposal;
        if proposal.channel_id() != self.ledger.channel_id() {
            return self.refuse(format!("channel {} not found", proposal.channel_id()));
        }
        if !matches!(
            signkit::verify(proposal.creator(), &proposal.to_be_bytes(), &prop.signature),
            Ok(true)
        ) {
            return self.refuse("access denied: creator signature invalid".to_string());
        }

        let sim = match self.ledger.simulate(proposal) {
            Ok(sim) => sim,
            Err(e) => return self.refuse(format!("chaincode error: {}", e)),
        };
        let payload = match proposal.kind() {
            ProposalKind::Query => sim.result,
            _ => match serde_json::to_vec(&sim) {
                Ok(p) => p,
                Err(e) => return self.refuse(e.to_string()),
            },
        };
        debug!("{} endorsed tx={}", self.id, prop.tx_id());

        ProposalResponse {
            status: STATUS_OK,
            message: String::new(),
            endorsement: Endorsement {
                endorser: self.signer.identity().clone(),
                signature: self.signer.sign(&payload),
            },
            payload,
        }
    }
}

#[async_trait]
impl PeerTransport for SimPeer {
    fn endpoint(&self) -> &PeerID {
        &self.id
    }

    async fn send_proposal(&self, prop: &SignedProposal) -> Result<ProposalResponse, TransportErr> {
        tokio::time::sleep(self.latency).await;
        self.check_up()?;
        Ok(self.endorse(prop))
    }

    async fn subscribe_commits(&self, tx_id: &TxID) -> Result<Subscription<CommitEvent>, TransportErr> {
        self.check_up()?;
        Ok(self.ledger.subscribe_commits(&self.id, tx_id))
    }

    async fn subscribe_chaincode_events(
        &self,
        chaincode_id: &str,
    ) -> Result<Subscription<ChaincodeEvent>, TransportErr> {
        self.check_up()?;
        Ok(self.ledger.subscribe_chaincode_events(&self.id, chaincode_id))
    }

    async fn subscribe_blocks(&self) -> Result<Subscription<BlockEvent>, TransportErr> {
        self.check_up()?;
        Ok(self.ledger.subscribe_blocks(&self.id))
    }

    async fn query_info(&self) -> Result<ChainInfo, TransportErr> {
        tokio::time::sleep(self.latency).await;
        self.check_up()?;
        Ok(self.ledger.chain_info())
    }
}

pub struct SimOrderer {
    addr: String,
    latency: Duration,
    ledger: Arc<SharedLedger>,
}

#[async_trait]
impl OrdererTransport for SimOrderer {
    fn endpoint(&self) -> &str {
        &self.addr
    }

    async fn broadcast(&self, env: &Envelope) -> Result<BroadcastResponse, TransportErr> {
        if env.payload.is_empty() || env.signature.is_empty() {
            return Ok(BroadcastResponse {
                status: BroadcastStatus::BadRequest,
                info: "empty envelope".to_string(),
            });
        }
        let (ledger, env, latency) = (self.ledger.clone(), env.clone(), self.latency);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if let Err(e) = ledger.commit(&env) {
                error!("failed to persist block for tx={}: {}", env.tx_id, e);
            }
        });
        Ok(BroadcastResponse::success())
    }
}

/// Hands out the same `SimPeer` for a peer id on every connect.
pub struct SimNetwork {
    ledger: Arc<SharedLedger>,
    sim: NetworkSimConfig,
    peers: Mutex<FnvHashMap<PeerID, Arc<SimPeer>>>,
}

impl SimNetwork {
    pub fn new(ledger: Arc<SharedLedger>, sim: NetworkSimConfig) -> Self {
        Self {
            ledger,
            sim,
            peers: Mutex::new(FnvHashMap::default()),
        }
    }

    #[inline]
    pub fn ledger(&self) -> &Arc<SharedLedger> {
        &self.ledger
    }
}

impl Connector for SimNetwork {
    fn peer(&self, info: &PeerInfo) -> Result<Arc<dyn PeerTransport>, TransportErr> {
        let mut peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
        let peer = peers
            .entry(info.peer_id.clone())
            .or_insert_with(|| Arc::new(SimPeer::new(info.peer_id.clone(), self.ledger.clone(), &self.sim)))
            .clone();
        Ok(peer)
    }

    fn orderer(&self, info: &OrdererInfo) -> Result<Arc<dyn OrdererTransport>, TransportErr> {
        Ok(Arc::new(SimOrderer {
            addr: info.addr.clone(),
            latency: Duration::from_millis(self.sim.commit_latency_ms),
            ledger: self.ledger.clone(),
        }))
    }
}
