use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{put_bytes, EndorsedTransaction, TxID};

/// What the ordering service sequences: endorsed proposal plus the submitter's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tx_id: TxID,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    /// Payload layout:
    /// `signed proposal | u32 count | (endorser, signature, response payload)*`,
    /// every field length-prefixed.
    pub fn payload_of(tx: &EndorsedTransaction) -> Vec<u8> {
        let mut buf = Vec::new();
        put_bytes(&mut buf, tx.proposal().to_be_bytes());
        buf.extend_from_slice(&(tx.responses().len() as u32).to_be_bytes());
        for resp in tx.responses().iter().filter_map(|r| r.response()) {
            put_bytes(&mut buf, resp.endorsement.endorser.to_be_bytes());
            put_bytes(&mut buf, &resp.endorsement.signature);
            put_bytes(&mut buf, &resp.payload);
        }
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastStatus {
    Success,
    BadRequest,
    Forbidden,
    NotFound,
    ServiceUnavailable,
    InternalError,
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BroadcastStatus::Success => "SUCCESS",
            BroadcastStatus::BadRequest => "BAD_REQUEST",
            BroadcastStatus::Forbidden => "FORBIDDEN",
            BroadcastStatus::NotFound => "NOT_FOUND",
            BroadcastStatus::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            BroadcastStatus::InternalError => "INTERNAL_SERVER_ERROR",
        };
        f.write_str(s)
    }
}

/// Ordering service answer. `Success` means queued for sequencing, not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub status: BroadcastStatus,
    pub info: String,
}

impl BroadcastResponse {
    pub fn success() -> Self {
        Self {
            status: BroadcastStatus::Success,
            info: String::new(),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == BroadcastStatus::Success
    }
}
