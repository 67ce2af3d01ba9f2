//! One-shot listeners on a single peer's chaincode-event and block feeds.
//! Both register, resolve on the first matching event, then unregister.
//! Also the peer's chain info query.

use std::time::Duration;

use endorser::{PeerTransport, Subscription, TransportErr};
use log::{debug, info};
use thiserror::Error;
use tx_data::{BlockEvent, ChainInfo, ChaincodeEvent, PeerID};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventErr {
    #[error("no matching event from {peer} within {waited:?}")]
    EventTimeout { peer: PeerID, waited: Duration },

    #[error(transparent)]
    Transport(#[from] TransportErr),
}

async fn first_matching<E, F>(sub: &mut Subscription<E>, pred: F) -> Result<E, TransportErr>
where
    F: Fn(&E) -> bool,
{
    while let Some(ev) = sub.next().await {
        let ev = ev?;
        if pred(&ev) {
            return Ok(ev);
        }
    }
    Err(TransportErr::Closed(sub.peer().clone()))
}

async fn wait_on<E, F>(mut sub: Subscription<E>, timeout: Duration, pred: F) -> Result<E, EventErr>
where
    F: Fn(&E) -> bool,
{
    let found = tokio::time::timeout(timeout, first_matching(&mut sub, pred)).await;
    sub.cancel();
    match found {
        Ok(r) => Ok(r?),
        Err(_) => Err(EventErr::EventTimeout {
            peer: sub.peer().clone(),
            waited: timeout,
        }),
    }
}

pub async fn wait_chaincode_event(
    peer: &dyn PeerTransport,
    chaincode_id: &str,
    event_name: &str,
    timeout: Duration,
) -> Result<ChaincodeEvent, EventErr> {
    let sub = peer.subscribe_chaincode_events(chaincode_id).await?;
    info!("listening for {}/{} on {}", chaincode_id, event_name, peer.endpoint());
    wait_on(sub, timeout, |ev: &ChaincodeEvent| {
        ev.chaincode_id == chaincode_id && ev.event_name == event_name
    })
    .await
}

pub async fn wait_next_block(peer: &dyn PeerTransport, timeout: Duration) -> Result<BlockEvent, EventErr> {
    let sub = peer.subscribe_blocks().await?;
    info!("listening for blocks on {}", peer.endpoint());
    wait_on(sub, timeout, |_: &BlockEvent| true).await
}

/// Ask `peer` for its ledger height and head hashes.
pub async fn query_chain_info(
    peer: &dyn PeerTransport,
    timeout: Duration,
) -> Result<ChainInfo, TransportErr> {
    match tokio::time::timeout(timeout, peer.query_info()).await {
        Ok(info) => {
            let info = info?;
            debug!("{} at height {}", peer.endpoint(), info.height);
            Ok(info)
        }
        Err(_) => Err(TransportErr::Timeout(peer.endpoint().clone())),
    }
}
