//! Commit listener.
//!
//! One forwarding task per peer subscription reports into a single coordinator
//! channel. The coordinator (`CommitListener::wait`) resolves on the first
//! terminal event or on its own timer, then stops every forwarder and joins
//! them, so no subscription outlives the call.

use std::{sync::Arc, time::Duration};

use endorser::{PeerTransport, Subscription, TchanR, TchanS, TransportErr, TxErr};
use fnv::FnvHashMap;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::{sync::broadcast, task::JoinHandle};
use tx_data::{CommitEvent, PeerID, TxID, ValidationCode};

use crate::timer::DefaultTimer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribed,
    Resolved(ValidationCode),
    TimedOut,
    Failed(String),
}

#[derive(Debug)]
enum Notice {
    Event(PeerID, CommitEvent),
    Failed(PeerID, TransportErr),
    Deadline,
}

pub struct CommitListener {
    tx_id: TxID,
    notice_r: TchanR<Notice>,
    notice_s: TchanS<Notice>,
    stop_ch: broadcast::Sender<()>,
    forwarders: Vec<JoinHandle<()>>,
    states: FnvHashMap<PeerID, SubscriptionState>,
    live: usize,
}

impl CommitListener {
    /// Subscribe to commit events for `tx_id` on every peer. Succeeds when at
    /// least one subscription is open.
    pub async fn attach(peers: &[Arc<dyn PeerTransport>], tx_id: &TxID) -> Result<Self, TxErr> {
        if peers.is_empty() {
            return Err(TxErr::InvalidArgument("no event source peers".to_string()));
        }
        let mut states = peers
            .iter()
            .map(|p| (p.endpoint().clone(), SubscriptionState::Idle))
            .collect::<FnvHashMap<_, _>>();

        // Each forwarder sends at most one notice and the timer one more,
        // so senders never block on a full channel.
        let (notice_s, notice_r) = tokio::sync::mpsc::channel(peers.len() + 1);
        let (stop_ch, _) = broadcast::channel(1);

        let subs = join_all(peers.iter().map(|p| p.subscribe_commits(tx_id))).await;

        let mut forwarders = Vec::with_capacity(peers.len());
        let mut first_err = None;
        for (peer, sub) in peers.iter().zip(subs) {
            let id = peer.endpoint().clone();
            match sub {
                Ok(sub) => {
                    debug!("tx={} subscribed to commits on {}", tx_id, id);
                    states.insert(id, SubscriptionState::Subscribed);
                    forwarders.push(tokio::spawn(forward(
                        sub,
                        tx_id.clone(),
                        notice_s.clone(),
                        stop_ch.subscribe(),
                    )));
                }
                Err(e) => {
                    warn!("tx={} failed to subscribe on {}: {}", tx_id, id, e);
                    states.insert(id, SubscriptionState::Failed(e.to_string()));
                    first_err.get_or_insert(e);
                }
            }
        }

        if forwarders.is_empty() {
            return Err(match first_err {
                Some(e) => e.into(),
                None => TxErr::InvalidArgument("no event source peers".to_string()),
            });
        }

        let live = forwarders.len();
        Ok(Self {
            tx_id: tx_id.clone(),
            notice_r,
            notice_s,
            stop_ch,
            forwarders,
            states,
            live,
        })
    }

    #[inline]
    pub fn tx_id(&self) -> &TxID {
        &self.tx_id
    }

    pub fn subscription_states(&self) -> &FnvHashMap<PeerID, SubscriptionState> {
        &self.states
    }

    /// Wait for the first terminal commit event. Non-VALID codes come back as
    /// `TransactionInvalidated`; no event before `timeout` is `CommitTimeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<CommitEvent, TxErr> {
        let timer = DefaultTimer::new(self.notice_s.clone());
        timer.start(Notice::Deadline, timeout);

        let outcome = loop {
            match self.notice_r.recv().await {
                Some(Notice::Event(peer, ev)) => {
                    info!(
                        "tx={} resolved by {}: {} in block {}",
                        self.tx_id, peer, ev.validation_code, ev.block_number
                    );
                    self.states
                        .insert(peer, SubscriptionState::Resolved(ev.validation_code));
                    break Ok(ev);
                }
                Some(Notice::Failed(peer, e)) => {
                    warn!("tx={} subscription on {} failed: {}", self.tx_id, peer, e);
                    self.states
                        .insert(peer, SubscriptionState::Failed(e.to_string()));
                    self.live -= 1;
                    if self.live == 0 {
                        break Err(TxErr::from(e));
                    }
                }
                Some(Notice::Deadline) | None => {
                    warn!("tx={} no commit event within {:?}", self.tx_id, timeout);
                    for st in self.states.values_mut() {
                        if *st == SubscriptionState::Subscribed {
                            *st = SubscriptionState::TimedOut;
                        }
                    }
                    break Err(TxErr::CommitTimeout(self.tx_id.clone()));
                }
            }
        };

        timer.stop_all_timer();
        self.release().await;
        debug!("tx={} subscription states: {:?}", self.tx_id, self.states);

        let ev = outcome?;
        if ev.validation_code.is_valid() {
            Ok(ev)
        } else {
            Err(TxErr::TransactionInvalidated {
                tx_id: ev.tx_id,
                code: ev.validation_code,
                block_number: ev.block_number,
            })
        }
    }

    /// Give up without waiting for an event.
    pub async fn close(mut self) {
        self.release().await;
    }

    /// Stop every forwarder and wait until their subscriptions are released.
    async fn release(&mut self) {
        let _ = self.stop_ch.send(());
        for r in join_all(self.forwarders.drain(..)).await {
            if let Err(e) = r {
                error!("forwarder of tx={} panicked: {}", self.tx_id, e);
            }
        }
    }
}

impl Drop for CommitListener {
    fn drop(&mut self) {
        // Forwarders also stop once the sender is gone.
        let _ = self.stop_ch.send(());
    }
}

async fn forward(
    mut sub: Subscription<CommitEvent>,
    tx_id: TxID,
    notice: TchanS<Notice>,
    mut stop: broadcast::Receiver<()>,
) {
    let peer = sub.peer().clone();
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            ev = sub.next() => match ev {
                Some(Ok(ev)) if ev.tx_id == tx_id => {
                    let _ = notice.send(Notice::Event(peer.clone(), ev)).await;
                    break;
                }
                Some(Ok(ev)) => debug!("{} ignores commit of tx={}", peer, ev.tx_id),
                Some(Err(e)) => {
                    let _ = notice.send(Notice::Failed(peer.clone(), e)).await;
                    break;
                }
                None => {
                    let _ = notice.send(Notice::Failed(peer.clone(), TransportErr::Closed(peer.clone()))).await;
                    break;
                }
            },
        }
    }
    sub.cancel();
}
