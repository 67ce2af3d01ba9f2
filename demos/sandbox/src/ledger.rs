//! Channel ledger shared by the simulated peers.
//!
//! Every ordered envelope is cut into its own block, validated against the
//! world state and then announced to the peers' event feeds. Invalid
//! transactions take a block too, the same as on a real channel.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use endorser::{Subscription, TchanS, TransportErr};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tx_data::{
    BlockEvent, BlockNumber, ChainInfo, ChaincodeEvent, ChaincodeID, ChannelID, CommitEvent,
    Envelope, PeerID, Proposal, SerializedIdentity, TxID, ValidationCode,
};

use crate::chaincode::{self, SimResult};

const FEED_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum LedgerErr {
    #[error("state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("state snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: String,
    // Block that last wrote the key.
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaincodeState {
    pub version: String,
    pub kv: BTreeMap<String, Versioned>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldState {
    chain: ChainInfo,
    chaincodes: BTreeMap<ChaincodeID, ChaincodeState>,
    committed: BTreeSet<TxID>,
}

impl WorldState {
    #[inline]
    pub fn height(&self) -> BlockNumber {
        self.chain.height
    }

    pub fn get(&self, cc: &str, key: &str) -> Option<&Versioned> {
        self.chaincodes.get(cc).and_then(|s| s.kv.get(key))
    }

    pub fn version_of(&self, cc: &str) -> Option<&str> {
        self.chaincodes.get(cc).map(|s| s.version.as_str())
    }

    pub(crate) fn apply(&mut self, sim: &SimResult, block: BlockNumber) {
        if let Some(version) = &sim.lifecycle {
            self.chaincodes
                .entry(sim.chaincode_id.clone())
                .or_insert_with(|| ChaincodeState {
                    version: version.clone(),
                    kv: BTreeMap::new(),
                })
                .version = version.clone();
        }
        if let Some(cc) = self.chaincodes.get_mut(&sim.chaincode_id) {
            for (key, value) in &sim.rwset.writes {
                match value {
                    Some(value) => {
                        cc.kv.insert(
                            key.clone(),
                            Versioned {
                                value: value.clone(),
                                version: block,
                            },
                        );
                    }
                    None => {
                        cc.kv.remove(key);
                    }
                }
            }
        }
    }

    fn validate(&self, env: &Envelope) -> Result<SimResult, ValidationCode> {
        if self.committed.contains(&env.tx_id) {
            return Err(ValidationCode::DuplicateTxid);
        }
        let endorsements = parse_endorsements(&env.payload).ok_or(ValidationCode::BadPayload)?;
        if endorsements.is_empty() {
            return Err(ValidationCode::EndorsementPolicyFailure);
        }
        for e in &endorsements {
            if !matches!(signkit::verify(&e.endorser, &e.payload, &e.signature), Ok(true)) {
                return Err(ValidationCode::EndorsementPolicyFailure);
            }
        }

        let sim: SimResult = serde_json::from_slice(&endorsements[0].payload)
            .map_err(|_| ValidationCode::BadResponsePayload)?;
        if self.version_of(&sim.chaincode_id) != sim.base_version.as_deref() {
            return Err(if sim.lifecycle.is_some() {
                ValidationCode::ChaincodeVersionConflict
            } else {
                ValidationCode::ExpiredChaincode
            });
        }
        for (key, observed) in &sim.rwset.reads {
            if self.get(&sim.chaincode_id, key).map(|v| v.version) != *observed {
                return Err(ValidationCode::MvccReadConflict);
            }
        }
        Ok(sim)
    }
}

struct EndorsedPayload {
    endorser: SerializedIdentity,
    signature: Vec<u8>,
    payload: Vec<u8>,
}

fn take_u32(buf: &mut &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    let (head, rest) = buf.split_at(4);
    *buf = rest;
    let mut n = [0u8; 4];
    n.copy_from_slice(head);
    Some(u32::from_be_bytes(n))
}

fn take_bytes<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = take_u32(buf)? as usize;
    if buf.len() < len {
        return None;
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Some(head)
}

fn parse_identity(mut buf: &[u8]) -> Option<SerializedIdentity> {
    let msp_id = String::from_utf8(take_bytes(&mut buf)?.to_vec()).ok()?;
    let id_bytes = take_bytes(&mut buf)?.to_vec();
    Some(SerializedIdentity::new(msp_id, id_bytes))
}

/// Reverse of `Envelope::payload_of`, skipping the signed proposal.
fn parse_endorsements(mut buf: &[u8]) -> Option<Vec<EndorsedPayload>> {
    take_bytes(&mut buf)?;
    let count = take_u32(&mut buf)?;
    let mut endorsements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let endorser = parse_identity(take_bytes(&mut buf)?)?;
        let signature = take_bytes(&mut buf)?.to_vec();
        let payload = take_bytes(&mut buf)?.to_vec();
        endorsements.push(EndorsedPayload {
            endorser,
            signature,
            payload,
        });
    }
    if !buf.is_empty() {
        return None;
    }
    Some(endorsements)
}

type Feed<E> = TchanS<Result<E, TransportErr>>;

#[derive(Default)]
struct EventHub {
    commits: Vec<(PeerID, TxID, Feed<CommitEvent>)>,
    chaincode: Vec<(PeerID, ChaincodeID, Feed<ChaincodeEvent>)>,
    blocks: Vec<(PeerID, Feed<BlockEvent>)>,
}

impl EventHub {
    fn prune(&mut self) {
        self.commits.retain(|(_, _, f)| !f.is_closed());
        self.chaincode.retain(|(_, _, f)| !f.is_closed());
        self.blocks.retain(|(_, f)| !f.is_closed());
    }
}

fn push<E>(feed: &Feed<E>, ev: E) {
    if feed.try_send(Ok(ev)).is_err() {
        warn!("event feed full or closed, event dropped");
    }
}

pub struct SharedLedger {
    channel_id: ChannelID,
    state: Mutex<WorldState>,
    hub: Mutex<EventHub>,
    state_file: Option<PathBuf>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SharedLedger {
    pub fn new(channel_id: ChannelID) -> Self {
        Self {
            channel_id,
            state: Mutex::new(WorldState::default()),
            hub: Mutex::new(EventHub::default()),
            state_file: None,
        }
    }

    /// Ledger backed by `state_file`, restored from it if present.
    pub fn open(channel_id: ChannelID, state_file: impl Into<PathBuf>) -> Result<Self, LedgerErr> {
        let path = state_file.into();
        let state = if path.is_file() {
            let state: WorldState = serde_json::from_slice(&std::fs::read(&path)?)?;
            info!("restored ledger at height {} from {}", state.height(), path.display());
            state
        } else {
            WorldState::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            state_file: Some(path),
            ..Self::new(channel_id)
        })
    }

    #[inline]
    pub fn channel_id(&self) -> &ChannelID {
        &self.channel_id
    }

    pub fn height(&self) -> BlockNumber {
        lock(&self.state).height()
    }

    pub fn chain_info(&self) -> ChainInfo {
        lock(&self.state).chain.clone()
    }

    pub fn value_of(&self, cc: &str, key: &str) -> Option<String> {
        lock(&self.state).get(cc, key).map(|v| v.value.clone())
    }

    pub fn simulate(&self, prop: &Proposal) -> Result<SimResult, String> {
        chaincode::simulate(&lock(&self.state), prop)
    }

    /// Cut `env` into the next block and notify subscribers.
    ///
    /// The state lock is held until the block is persisted and announced, so
    /// blocks reach the state file and the feeds in height order.
    pub fn commit(&self, env: &Envelope) -> Result<(ValidationCode, BlockNumber), LedgerErr> {
        let mut state = lock(&self.state);
        state.chain = state.chain.append(env);
        let block = state.height();
        let (code, sim) = match state.validate(env) {
            Ok(sim) => {
                state.apply(&sim, block);
                (ValidationCode::Valid, Some(sim))
            }
            Err(code) => (code, None),
        };
        if code != ValidationCode::DuplicateTxid {
            state.committed.insert(env.tx_id.clone());
        }
        info!("block {}: tx={} {}", block, env.tx_id, code);

        // Persist before announcing, clients may exit on the commit event.
        let persisted = match &self.state_file {
            Some(path) => serde_json::to_vec(&*state)
                .map_err(LedgerErr::from)
                .and_then(|bytes| std::fs::write(path, bytes).map_err(LedgerErr::from)),
            None => Ok(()),
        };
        self.announce(&env.tx_id, code, block, sim.as_ref());
        drop(state);
        persisted?;
        Ok((code, block))
    }

    fn announce(&self, tx_id: &TxID, code: ValidationCode, block: BlockNumber, sim: Option<&SimResult>) {
        let mut hub = lock(&self.hub);
        hub.prune();

        for (peer, _, feed) in hub.commits.iter().filter(|(_, t, _)| t == tx_id) {
            push(
                feed,
                CommitEvent {
                    tx_id: tx_id.clone(),
                    validation_code: code,
                    block_number: block,
                    source_peer: peer.clone(),
                },
            );
        }
        if let Some((cc, (name, payload))) = sim.and_then(|s| s.event.as_ref().map(|e| (&s.chaincode_id, e))) {
            for (_, _, feed) in hub.chaincode.iter().filter(|(_, c, _)| c == cc) {
                push(
                    feed,
                    ChaincodeEvent {
                        chaincode_id: cc.clone(),
                        tx_id: tx_id.clone(),
                        event_name: name.clone(),
                        payload: payload.clone(),
                        block_number: block,
                    },
                );
            }
        }
        for (_, feed) in hub.blocks.iter() {
            push(
                feed,
                BlockEvent {
                    block_number: block,
                    channel_id: self.channel_id.clone(),
                    tx_ids: vec![tx_id.clone()],
                },
            );
        }
    }

    pub fn subscribe_commits(&self, peer: &PeerID, tx_id: &TxID) -> Subscription<CommitEvent> {
        let (sub, handle) = Subscription::channel(peer.clone(), FEED_BUFFER);
        debug!("{} watches tx={}", peer, tx_id);
        lock(&self.hub)
            .commits
            .push((peer.clone(), tx_id.clone(), handle.events));
        sub
    }

    pub fn subscribe_chaincode_events(&self, peer: &PeerID, cc: &str) -> Subscription<ChaincodeEvent> {
        let (sub, handle) = Subscription::channel(peer.clone(), FEED_BUFFER);
        lock(&self.hub)
            .chaincode
            .push((peer.clone(), cc.to_string(), handle.events));
        sub
    }

    pub fn subscribe_blocks(&self, peer: &PeerID) -> Subscription<BlockEvent> {
        let (sub, handle) = Subscription::channel(peer.clone(), FEED_BUFFER);
        lock(&self.hub).blocks.push((peer.clone(), handle.events));
        sub
    }

    /// Feeds still attached by clients.
    pub fn open_feeds(&self) -> usize {
        let mut hub = lock(&self.hub);
        hub.prune();
        hub.commits.len() + hub.chaincode.len() + hub.blocks.len()
    }
}
