use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

use crate::{put_bytes, BlockNumber, ChaincodeID, ChannelID, Envelope, PeerID, TxID};

macro_rules! validation_codes {
    ($($variant:ident = $num:literal => $name:literal,)*) => {
        /// Outcome of ledger-level validation of a submitted transaction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ValidationCode {
            $($variant,)*
        }

        impl ValidationCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ValidationCode::$variant => $name,)*
                }
            }

            /// Numeric code used on the wire by the ledger platform.
            pub fn code(&self) -> u8 {
                match self {
                    $(ValidationCode::$variant => $num,)*
                }
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($num => Some(ValidationCode::$variant),)*
                    _ => None,
                }
            }
        }

        impl FromStr for ValidationCode {
            type Err = UnknownValidationCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(ValidationCode::$variant),)*
                    _ => Err(UnknownValidationCode(s.to_string())),
                }
            }
        }
    };
}

validation_codes! {
    Valid = 0 => "VALID",
    NilEnvelope = 1 => "NIL_ENVELOPE",
    BadPayload = 2 => "BAD_PAYLOAD",
    BadCommonHeader = 3 => "BAD_COMMON_HEADER",
    BadCreatorSignature = 4 => "BAD_CREATOR_SIGNATURE",
    InvalidEndorserTransaction = 5 => "INVALID_ENDORSER_TRANSACTION",
    InvalidConfigTransaction = 6 => "INVALID_CONFIG_TRANSACTION",
    UnsupportedTxPayload = 7 => "UNSUPPORTED_TX_PAYLOAD",
    BadProposalTxid = 8 => "BAD_PROPOSAL_TXID",
    DuplicateTxid = 9 => "DUPLICATE_TXID",
    EndorsementPolicyFailure = 10 => "ENDORSEMENT_POLICY_FAILURE",
    MvccReadConflict = 11 => "MVCC_READ_CONFLICT",
    PhantomReadConflict = 12 => "PHANTOM_READ_CONFLICT",
    UnknownTxType = 13 => "UNKNOWN_TX_TYPE",
    TargetChainNotFound = 14 => "TARGET_CHAIN_NOT_FOUND",
    MarshalTxError = 15 => "MARSHAL_TX_ERROR",
    NilTxaction = 16 => "NIL_TXACTION",
    ExpiredChaincode = 17 => "EXPIRED_CHAINCODE",
    ChaincodeVersionConflict = 18 => "CHAINCODE_VERSION_CONFLICT",
    BadHeaderExtension = 19 => "BAD_HEADER_EXTENSION",
    BadChannelHeader = 20 => "BAD_CHANNEL_HEADER",
    BadResponsePayload = 21 => "BAD_RESPONSE_PAYLOAD",
    BadRwset = 22 => "BAD_RWSET",
    IllegalWriteset = 23 => "ILLEGAL_WRITESET",
    InvalidWriteset = 24 => "INVALID_WRITESET",
    InvalidChaincode = 25 => "INVALID_CHAINCODE",
    NotValidated = 254 => "NOT_VALIDATED",
    InvalidOtherReason = 255 => "INVALID_OTHER_REASON",
}

impl ValidationCode {
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self == ValidationCode::Valid
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validation code {0}")]
pub struct UnknownValidationCode(pub String);

/// Peer notification that a transaction was validated and written to the ledger.
/// Terminal per transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub tx_id: TxID,
    pub validation_code: ValidationCode,
    pub block_number: BlockNumber,
    pub source_peer: PeerID,
}

/// Event emitted by chaincode during a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeEvent {
    pub chaincode_id: ChaincodeID,
    pub tx_id: TxID,
    pub event_name: String,
    pub payload: Vec<u8>,
    pub block_number: BlockNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub block_number: BlockNumber,
    pub channel_id: ChannelID,
    pub tx_ids: Vec<TxID>,
}

/// Height and head of a peer's copy of the channel ledger.
/// Hashes are empty while the ledger has no block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub height: BlockNumber,
    pub current_block_hash: Vec<u8>,
    pub previous_block_hash: Vec<u8>,
}

impl ChainInfo {
    /// Chain info after `env` is cut into the next block.
    pub fn append(&self, env: &Envelope) -> ChainInfo {
        let height = self.height + 1;
        let mut h = Sha256::default();
        h.update(height.to_be_bytes());
        h.update(&self.current_block_hash);
        let mut body = Vec::new();
        put_bytes(&mut body, env.tx_id.as_bytes());
        put_bytes(&mut body, &env.payload);
        put_bytes(&mut body, &env.signature);
        h.update(&body);
        ChainInfo {
            height,
            current_block_hash: h.finalize().to_vec(),
            previous_block_hash: self.current_block_hash.clone(),
        }
    }

    pub fn current_hash_hex(&self) -> String {
        to_hex(&self.current_block_hash)
    }

    pub fn previous_hash_hex(&self) -> String {
        to_hex(&self.previous_block_hash)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
