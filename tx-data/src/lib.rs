pub mod endorsement;
pub mod envelope;
pub mod event;
pub mod identity;
pub mod policy;
pub mod proposal;

pub use endorsement::*;
pub use envelope::*;
pub use event::*;
pub use identity::*;
pub use policy::*;
pub use proposal::*;

pub type PeerID = String;
pub type ChannelID = String;
pub type ChaincodeID = String;
pub type TxID = String;
pub type BlockNumber = u64;

/// Status code of a successful proposal response.
pub const STATUS_OK: u32 = 200;

/// Append `bytes` prefixed by its length in big-endian u32.
#[inline]
pub fn put_bytes(buf: &mut Vec<u8>, bytes: impl AsRef<[u8]>) {
    let bytes = bytes.as_ref();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}
