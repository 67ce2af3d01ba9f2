//! Endorsement collector.
//!
//! Fans a signed proposal out to every target peer at once and joins when each
//! peer has answered, failed or run out of time. Stateless across calls.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use log::{debug, warn};
use tx_data::{
    AllGood, EndorsedTransaction, EndorsementPolicy, EndorsementResponse, PeerID, SignedProposal,
};

use crate::error::{Result, TxErr};
use crate::traits::{PeerTransport, TransportErr};

pub struct EndorsementCollector {
    peers: Vec<Arc<dyn PeerTransport>>,
    per_peer_timeout: Duration,
    policy: Arc<dyn EndorsementPolicy>,
}

impl EndorsementCollector {
    /// Collector with the all-good policy.
    pub fn new(peers: Vec<Arc<dyn PeerTransport>>, per_peer_timeout: Duration) -> Self {
        Self {
            peers,
            per_peer_timeout,
            policy: Arc::new(AllGood),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn EndorsementPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[inline]
    pub fn peers(&self) -> &[Arc<dyn PeerTransport>] {
        &self.peers
    }

    /// One response per peer, in peer order.
    pub async fn fan_out(&self, prop: &SignedProposal) -> Vec<EndorsementResponse> {
        let dur = self.per_peer_timeout;
        let calls = self.peers.iter().map(|peer| async move {
            let id = peer.endpoint().clone();
            match tokio::time::timeout(dur, peer.send_proposal(prop)).await {
                Ok(Ok(resp)) => EndorsementResponse::ok(id, resp),
                Ok(Err(e)) => EndorsementResponse::err(id, e),
                Err(_) => {
                    let e = TransportErr::Timeout(id.clone());
                    EndorsementResponse::err(id, e)
                }
            }
        });
        join_all(calls).await
    }

    /// Endorse `prop` and build the transaction the policy accepts.
    pub async fn collect(&self, prop: SignedProposal) -> Result<EndorsedTransaction> {
        if self.peers.is_empty() {
            return Err(TxErr::InvalidArgument("no endorsing peers".to_string()));
        }
        let responses = self.fan_out(&prop).await;
        for r in &responses {
            match r.failure_reason() {
                Some(reason) => warn!("tx={} endorsement from {} failed: {}", prop.tx_id(), r.peer, reason),
                None => debug!("tx={} endorsed by {}", prop.tx_id(), r.peer),
            }
        }
        EndorsedTransaction::new(prop, responses, self.policy.as_ref()).map_err(TxErr::from)
    }

    /// Evaluate a read-only proposal. Returns the payload of every peer that
    /// answered with 200, in peer order. Nothing is sent to the orderer.
    pub async fn query(&self, prop: &SignedProposal) -> Result<Vec<(PeerID, Vec<u8>)>> {
        if self.peers.is_empty() {
            return Err(TxErr::InvalidArgument("no endorsing peers".to_string()));
        }
        let responses = self.fan_out(prop).await;

        let first_failure = responses
            .iter()
            .find_map(|r| r.failure_reason().map(|reason| (r.peer.clone(), reason)));
        let payloads = responses
            .into_iter()
            .filter(|r| r.is_good())
            .filter_map(|r| {
                let peer = r.peer;
                r.outcome.ok().map(|resp| (peer, resp.payload))
            })
            .collect::<Vec<_>>();

        if payloads.is_empty() {
            return Err(match first_failure {
                Some((peer, reason)) => TxErr::EndorsementFailed {
                    peer: Some(peer),
                    reason,
                },
                None => TxErr::EndorsementFailed {
                    peer: None,
                    reason: "no peer answered the query".to_string(),
                },
            });
        }
        Ok(payloads)
    }
}
