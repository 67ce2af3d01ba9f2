//! Scripted peers and orderer.
//!
//! A `MockPeer` answers proposals as its `PeerScript` says and, once the
//! `MockOrderer` accepts an envelope, emits the scripted commit event to every
//! open feed for that transaction after the scripted delay.
use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use fnv::FnvHashMap;
use log::debug;

use endorser::{OrdererTransport, PeerTransport, Subscription, TchanS, TransportErr};
use orchestrator::{
    config::{OrdererInfo, PeerInfo},
    ChannelDescriptor, Connector,
};
use tx_data::*;

const FEED_BUFFER: usize = 8;

#[derive(Debug, Clone)]
pub struct PeerScript {
    pub status: u32,
    pub payload: Vec<u8>,
    pub endorse_delay: Duration,
    pub unreachable: bool,
    pub subscribe_fails: bool,
    // Commit code and delay after the envelope is ordered.
    pub commit: Option<(ValidationCode, Duration)>,
    // Feed breaks this long after subscribing.
    pub feed_error_after: Option<Duration>,
    pub event_name: String,
}

impl Default for PeerScript {
    fn default() -> Self {
        PeerScript {
            status: STATUS_OK,
            payload: b"a=90,b=210".to_vec(),
            endorse_delay: Duration::from_millis(0),
            unreachable: false,
            subscribe_fails: false,
            commit: Some((ValidationCode::Valid, Duration::from_millis(100))),
            feed_error_after: None,
            event_name: "moved".to_string(),
        }
    }
}

impl PeerScript {
    pub fn status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    pub fn commit_after(mut self, code: ValidationCode, delay: Duration) -> Self {
        self.commit = Some((code, delay));
        self
    }

    pub fn silent(mut self) -> Self {
        self.commit = None;
        self
    }

    pub fn endorse_delay(mut self, delay: Duration) -> Self {
        self.endorse_delay = delay;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn subscribe_fails(mut self) -> Self {
        self.subscribe_fails = true;
        self
    }

    pub fn feed_error_after(mut self, delay: Duration) -> Self {
        self.feed_error_after = Some(delay);
        self
    }
}

type Feed<E> = TchanS<Result<E, TransportErr>>;

pub struct MockPeer {
    id: PeerID,
    script: PeerScript,
    proposals: AtomicU32,
    subscriptions: AtomicU32,
    commit_feeds: Mutex<Vec<(TxID, Feed<CommitEvent>)>>,
    cc_feeds: Mutex<Vec<(ChaincodeID, Feed<ChaincodeEvent>)>>,
    block_feeds: Mutex<Vec<Feed<BlockEvent>>>,
    chain: Mutex<ChainInfo>,
}

impl MockPeer {
    pub fn new(id: &str, script: PeerScript) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script,
            proposals: AtomicU32::new(0),
            subscriptions: AtomicU32::new(0),
            commit_feeds: Mutex::new(vec![]),
            cc_feeds: Mutex::new(vec![]),
            block_feeds: Mutex::new(vec![]),
            chain: Mutex::new(ChainInfo::default()),
        })
    }

    pub fn num_proposals(&self) -> u32 {
        self.proposals.load(Ordering::SeqCst)
    }

    /// Subscriptions ever opened, released or not.
    pub fn num_subscriptions(&self) -> u32 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Feeds whose client side is still attached.
    pub fn open_feeds(&self) -> usize {
        let commits = lock(&self.commit_feeds).iter().filter(|(_, s)| !s.is_closed()).count();
        let ccs = lock(&self.cc_feeds).iter().filter(|(_, s)| !s.is_closed()).count();
        let blocks = lock(&self.block_feeds).iter().filter(|s| !s.is_closed()).count();
        commits + ccs + blocks
    }

    fn open<E: Send + 'static>(&self) -> Result<(Subscription<E>, Feed<E>), TransportErr> {
        if self.script.subscribe_fails {
            return Err(TransportErr::Unreachable(
                self.id.clone(),
                "event service unavailable".to_string(),
            ));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (sub, handle) = Subscription::channel(self.id.clone(), FEED_BUFFER);

        if let Some(after) = self.script.feed_error_after {
            let feed = handle.events.clone();
            let id = self.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let _ = feed.send(Err(TransportErr::Closed(id))).await;
            });
        }
        Ok((sub, handle.events))
    }

    /// Called by the orderer once `env` is cut into `block`.
    fn on_ordered(&self, channel_id: &ChannelID, env: &Envelope, block: BlockNumber) {
        {
            let mut chain = lock(&self.chain);
            *chain = chain.append(env);
        }
        let tx_id = &env.tx_id;
        let (code, delay) = match self.script.commit {
            Some(c) => c,
            None => return,
        };
        debug!("{} commits tx={} with {} after {:?}", self.id, tx_id, code, delay);

        let commit = CommitEvent {
            tx_id: tx_id.clone(),
            validation_code: code,
            block_number: block,
            source_peer: self.id.clone(),
        };
        for (_, feed) in lock(&self.commit_feeds).iter().filter(|(t, _)| t == tx_id) {
            emit(feed.clone(), commit.clone(), delay);
        }
        for (cc, feed) in lock(&self.cc_feeds).iter() {
            let ev = ChaincodeEvent {
                chaincode_id: cc.clone(),
                tx_id: tx_id.clone(),
                event_name: self.script.event_name.clone(),
                payload: self.script.payload.clone(),
                block_number: block,
            };
            emit(feed.clone(), ev, delay);
        }
        for feed in lock(&self.block_feeds).iter() {
            let ev = BlockEvent {
                block_number: block,
                channel_id: channel_id.clone(),
                tx_ids: vec![tx_id.clone()],
            };
            emit(feed.clone(), ev, delay);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn emit<E: Send + 'static>(feed: Feed<E>, ev: E, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // Dropped if the client let go of the feed.
        let _ = feed.send(Ok(ev)).await;
    });
}

#[async_trait]
impl PeerTransport for MockPeer {
    fn endpoint(&self) -> &PeerID {
        &self.id
    }

    async fn send_proposal(&self, prop: &SignedProposal) -> Result<ProposalResponse, TransportErr> {
        self.proposals.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.script.endorse_delay).await;
        if self.script.unreachable {
            return Err(TransportErr::Unreachable(
                self.id.clone(),
                "connection refused".to_string(),
            ));
        }
        let ok = self.script.status == STATUS_OK;
        Ok(ProposalResponse {
            status: self.script.status,
            message: if ok {
                String::new()
            } else {
                format!("chaincode {} failed", prop.proposal.chaincode_id())
            },
            payload: if ok { self.script.payload.clone() } else { vec![] },
            endorsement: Endorsement {
                endorser: SerializedIdentity::new("Org1MSP", self.id.as_bytes().to_vec()),
                signature: prop.tx_id().as_bytes().to_vec(),
            },
        })
    }

    async fn subscribe_commits(&self, tx_id: &TxID) -> Result<Subscription<CommitEvent>, TransportErr> {
        let (sub, feed) = self.open()?;
        lock(&self.commit_feeds).push((tx_id.clone(), feed));
        Ok(sub)
    }

    async fn subscribe_chaincode_events(
        &self,
        chaincode_id: &str,
    ) -> Result<Subscription<ChaincodeEvent>, TransportErr> {
        let (sub, feed) = self.open()?;
        lock(&self.cc_feeds).push((chaincode_id.to_string(), feed));
        Ok(sub)
    }

    async fn subscribe_blocks(&self) -> Result<Subscription<BlockEvent>, TransportErr> {
        let (sub, feed) = self.open()?;
        lock(&self.block_feeds).push(feed);
        Ok(sub)
    }

    async fn query_info(&self) -> Result<ChainInfo, TransportErr> {
        tokio::time::sleep(self.script.endorse_delay).await;
        if self.script.unreachable {
            return Err(TransportErr::Unreachable(
                self.id.clone(),
                "connection refused".to_string(),
            ));
        }
        Ok(lock(&self.chain).clone())
    }
}

pub struct MockOrderer {
    id: String,
    channel_id: ChannelID,
    status: BroadcastStatus,
    calls: AtomicU32,
    next_block: AtomicU64,
    peers: Vec<Arc<MockPeer>>,
    envelopes: Mutex<Vec<Envelope>>,
}

impl MockOrderer {
    pub fn new(peers: Vec<Arc<MockPeer>>, status: BroadcastStatus) -> Arc<Self> {
        Arc::new(Self {
            id: "orderer0".to_string(),
            channel_id: "samchannel".to_string(),
            status,
            calls: AtomicU32::new(0),
            next_block: AtomicU64::new(7),
            peers,
            envelopes: Mutex::new(vec![]),
        })
    }

    pub fn num_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        lock(&self.envelopes).clone()
    }
}

#[async_trait]
impl OrdererTransport for MockOrderer {
    fn endpoint(&self) -> &str {
        &self.id
    }

    async fn broadcast(&self, env: &Envelope) -> Result<BroadcastResponse, TransportErr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.envelopes).push(env.clone());
        if self.status != BroadcastStatus::Success {
            return Ok(BroadcastResponse {
                status: self.status,
                info: "envelope refused".to_string(),
            });
        }
        let block = self.next_block.fetch_add(1, Ordering::SeqCst);
        for p in &self.peers {
            p.on_ordered(&self.channel_id, env, block);
        }
        Ok(BroadcastResponse::success())
    }
}

pub struct MockConnector {
    pub peers: FnvHashMap<PeerID, Arc<MockPeer>>,
    pub orderer: Arc<MockOrderer>,
}

impl Connector for MockConnector {
    fn peer(&self, info: &PeerInfo) -> Result<Arc<dyn PeerTransport>, TransportErr> {
        match self.peers.get(&info.peer_id) {
            Some(p) => Ok(p.clone()),
            None => Err(TransportErr::Unreachable(info.addr.clone(), "unknown peer".to_string())),
        }
    }

    fn orderer(&self, _: &OrdererInfo) -> Result<Arc<dyn OrdererTransport>, TransportErr> {
        Ok(self.orderer.clone())
    }
}

/// Channel where every peer endorses and delivers events.
pub fn mock_channel(
    peers: &[Arc<MockPeer>],
    orderer: Arc<MockOrderer>,
    commit_timeout: Duration,
) -> Arc<ChannelDescriptor> {
    let transports = peers
        .iter()
        .map(|p| p.clone() as Arc<dyn PeerTransport>)
        .collect::<Vec<_>>();
    Arc::new(ChannelDescriptor {
        channel_id: "samchannel".to_string(),
        peers: transports.clone(),
        event_sources: transports,
        orderer,
        timeouts: orchestrator::config::TimeoutConfig {
            proposal_ms: 3_000,
            broadcast_ms: 3_000,
            commit_ms: commit_timeout.as_millis() as u64,
        },
        policy: Arc::new(AllGood),
    })
}
