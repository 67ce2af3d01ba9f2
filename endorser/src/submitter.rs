use std::{sync::Arc, time::Duration};

use log::{info, warn};
use signkit::Signer;
use tx_data::{BroadcastResponse, EndorsedTransaction, Envelope};

use crate::error::{Result, TxErr};
use crate::traits::{OrdererTransport, TransportErr};

/// Hands endorsed transactions to the ordering service. An accepted envelope
/// is only queued for sequencing; commit is observed elsewhere.
pub struct TransactionSubmitter {
    orderer: Arc<dyn OrdererTransport>,
    timeout: Duration,
}

impl TransactionSubmitter {
    pub fn new(orderer: Arc<dyn OrdererTransport>, timeout: Duration) -> Self {
        Self { orderer, timeout }
    }

    pub fn envelope(tx: &EndorsedTransaction, signer: &dyn Signer) -> Envelope {
        let payload = Envelope::payload_of(tx);
        let signature = signer.sign(&payload);
        Envelope {
            tx_id: tx.tx_id().clone(),
            payload,
            signature,
        }
    }

    pub async fn submit(&self, tx: &EndorsedTransaction, signer: &dyn Signer) -> Result<BroadcastResponse> {
        let env = Self::envelope(tx, signer);
        let endpoint = self.orderer.endpoint().to_string();

        let resp = tokio::time::timeout(self.timeout, self.orderer.broadcast(&env))
            .await
            .map_err(|_| TransportErr::Timeout(endpoint.clone()))??;

        if !resp.is_success() {
            warn!("orderer {} rejected tx={}: {} {}", endpoint, env.tx_id, resp.status, resp.info);
            return Err(TxErr::OrderingRejected {
                status: resp.status,
                info: resp.info,
            });
        }
        info!("tx={} accepted by orderer {}", env.tx_id, endpoint);
        Ok(resp)
    }
}
