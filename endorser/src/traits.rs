use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use tx_data::{
    BlockEvent, BroadcastResponse, ChainInfo, ChaincodeEvent, CommitEvent, Envelope, PeerID,
    ProposalResponse, SignedProposal, TxID,
};

pub type TchanR<T> = tokio::sync::mpsc::Receiver<T>;
pub type TchanS<T> = tokio::sync::mpsc::Sender<T>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportErr {
    #[error("{0} unreachable: {1}")]
    Unreachable(String, String),

    #[error("connection to {0} closed")]
    Closed(String),

    #[error("{0} didn't answer in time")]
    Timeout(String),
}

impl TransportErr {
    pub fn endpoint(&self) -> &str {
        match self {
            TransportErr::Unreachable(e, _) | TransportErr::Closed(e) | TransportErr::Timeout(e) => e,
        }
    }
}

/// Event feed opened on one peer.
///
/// The transport side keeps the matching `FeedHandle`: it pushes events into
/// `events` and watches `cancelled` to know when to release the feed.
/// Cancelling is idempotent and also happens on drop.
pub struct Subscription<E> {
    peer: PeerID,
    events: TchanR<Result<E, TransportErr>>,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct FeedHandle<E> {
    pub events: TchanS<Result<E, TransportErr>>,
    pub cancelled: oneshot::Receiver<()>,
}

impl<E> Subscription<E> {
    pub fn new(
        peer: PeerID,
        events: TchanR<Result<E, TransportErr>>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            peer,
            events,
            cancel: Some(cancel),
        }
    }

    /// Subscription with its transport-side handle.
    pub fn channel(peer: PeerID, buffer: usize) -> (Self, FeedHandle<E>) {
        let (events_s, events_r) = tokio::sync::mpsc::channel(buffer);
        let (cancel_s, cancel_r) = oneshot::channel();
        (
            Self::new(peer, events_r, cancel_s),
            FeedHandle {
                events: events_s,
                cancelled: cancel_r,
            },
        )
    }

    #[inline(always)]
    pub fn peer(&self) -> &PeerID {
        &self.peer
    }

    /// Next event, or `None` once the feed is closed or cancelled.
    pub async fn next(&mut self) -> Option<Result<E, TransportErr>> {
        if self.is_cancelled() {
            return None;
        }
        self.events.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // Transport may have hung up already.
            let _ = cancel.send(());
            self.events.close();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn endpoint(&self) -> &PeerID;

    async fn send_proposal(&self, prop: &SignedProposal) -> Result<ProposalResponse, TransportErr>;

    /// Commit events for `tx_id`. Must be attached before the transaction is broadcast.
    async fn subscribe_commits(&self, tx_id: &TxID) -> Result<Subscription<CommitEvent>, TransportErr>;

    async fn subscribe_chaincode_events(
        &self,
        chaincode_id: &str,
    ) -> Result<Subscription<ChaincodeEvent>, TransportErr>;

    async fn subscribe_blocks(&self) -> Result<Subscription<BlockEvent>, TransportErr>;

    /// Height and head hashes of the peer's ledger.
    async fn query_info(&self) -> Result<ChainInfo, TransportErr>;
}

#[async_trait]
pub trait OrdererTransport: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn broadcast(&self, env: &Envelope) -> Result<BroadcastResponse, TransportErr>;
}
